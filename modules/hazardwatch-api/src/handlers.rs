use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Utc};
use hazardwatch_common::{HazardError, HazardStatus, SourceKind, ValidationDecision};
use hazardwatch_pipeline::NewReport;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::{check_rate_limit, AppState, SUBMISSIONS_PER_HOUR};

#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    pub source: String,
    pub text: String,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub media_paths: Option<Vec<String>>,
    pub has_media: Option<bool>,
    pub media_verified: Option<bool>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub gps_accuracy_m: Option<f64>,
}

impl SubmitReportRequest {
    fn into_new_report(self) -> NewReport {
        let media_paths = self.media_paths.unwrap_or_default();
        let has_media = self.has_media.unwrap_or(!media_paths.is_empty());

        NewReport {
            source: SourceKind::from_str(&self.source).expect("SourceKind::from_str is infallible"),
            text: self.text,
            lat: self.lat,
            lon: self.lon,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            media_paths,
            has_media,
            media_verified: self.media_verified.unwrap_or(false),
            user_id: self.user_id,
            user_name: self.user_name,
            gps_accuracy_m: self.gps_accuracy_m,
        }
    }
}

pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    Json(body): Json<SubmitReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    {
        let mut limiter = state.rate_limiter.lock().await;
        let entries = limiter.entry(addr.ip()).or_default();
        if !check_rate_limit(entries, std::time::Instant::now(), SUBMISSIONS_PER_HOUR) {
            warn!(ip = %addr.ip(), "rate limit exceeded for report submission");
            return Err(ApiError(HazardError::InvalidInput(
                "rate limit exceeded, try again later".to_string(),
            )));
        }
    }

    let new = body.into_new_report();
    let report_id = state.pipeline.submit_report(new).await?;
    state.worker_pool.enqueue(report_id).await;

    info!(report_id, "accepted report");
    Ok((axum::http::StatusCode::ACCEPTED, Json(serde_json::json!({ "id": report_id }))))
}

#[derive(Debug, Deserialize)]
pub struct EmergencyRequest {
    pub text: String,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub gps_accuracy_m: Option<f64>,
}

pub async fn submit_emergency(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmergencyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewReport {
        source: SourceKind::Lora,
        text: body.text,
        lat: body.lat,
        lon: body.lon,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
        media_paths: Vec::new(),
        has_media: false,
        media_verified: false,
        user_id: body.user_id,
        user_name: body.user_name,
        gps_accuracy_m: body.gps_accuracy_m,
    };

    let report_id = state.pipeline.submit_emergency(new).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(serde_json::json!({ "id": report_id }))))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub before_id: Option<i64>,
    pub limit: Option<i64>,
}

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let reports = state
        .pipeline
        .store()
        .list_reports(page.before_id, clamp_limit(page.limit))
        .await?;
    Ok(Json(reports))
}

#[derive(Debug, Deserialize)]
pub struct HazardListQuery {
    pub status: Option<String>,
    pub before_id: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_hazards(
    State(state): State<Arc<AppState>>,
    Query(page): Query<HazardListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match page.status.as_deref() {
        Some(s) => Some(
            HazardStatus::from_str(s)
                .map_err(|_| ApiError(HazardError::InvalidInput(format!("unknown status '{s}'"))))?,
        ),
        None => None,
    };

    let events = state
        .pipeline
        .store()
        .list_events(status, page.before_id, clamp_limit(page.limit))
        .await?;
    Ok(Json(events))
}

pub async fn get_hazard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state
        .pipeline
        .store()
        .get_event(id)
        .await?
        .ok_or_else(|| HazardError::NotFound(format!("hazard event {id}")))?;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub decision: ValidationDecision,
}

pub async fn validate_hazard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ValidateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.pipeline.validate(id, body.decision).await?;
    let event = state
        .pipeline
        .store()
        .get_event(id)
        .await?
        .ok_or_else(|| HazardError::NotFound(format!("hazard event {id}")))?;
    Ok(Json(event))
}

pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>> {
    let rx = state.pipeline.broadcaster().subscribe().await;
    let keepalive = std::time::Duration::from_secs(state.config.broadcast_keepalive_secs.max(1));
    let stream = hazardwatch_pipeline::broadcaster::sse_stream(rx, keepalive);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn health() -> impl IntoResponse {
    "ok"
}
