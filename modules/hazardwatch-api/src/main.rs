use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use hazardwatch_common::Config;
use hazardwatch_pipeline::{Broadcaster, Pipeline, Store, WorkerPool};

mod error;
mod handlers;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hazardwatch=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;

    let store = Store::new(pool);
    let broadcaster = Broadcaster::new(config.broadcast_queue_capacity);
    let pipeline = Pipeline::new(store, broadcaster);

    let worker_pool = WorkerPool::spawn(
        pipeline.clone(),
        config.pipeline_workers,
        config.pipeline_queue_capacity,
    );

    start_retry_sweep(pipeline.clone(), worker_pool.clone(), config.retry_sweep_interval_secs);

    let state = Arc::new(AppState {
        pipeline,
        worker_pool,
        config: config.clone(),
        rate_limiter: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        .route("/", get(handlers::health))
        .route("/api/reports", post(handlers::submit_report).get(handlers::list_reports))
        .route("/api/emergency", post(handlers::submit_emergency))
        .route("/api/hazards", get(handlers::list_hazards))
        .route("/api/hazards/{id}", get(handlers::get_hazard))
        .route("/api/hazards/{id}/validate", post(handlers::validate_hazard))
        .route("/api/events", get(handlers::stream_events))
        .with_state(state)
        .layer(if cfg!(debug_assertions) {
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        } else {
            let origins: Vec<HeaderValue> = std::env::var("CORS_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        })
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .fallback(|| async { (StatusCode::NOT_FOUND, "not found") });

    let addr = format!("{}:{}", config.http_host, config.http_port);
    tracing::info!("hazardwatch api starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Periodically re-enqueues reports left `processed = false` by a crash or
/// rolled-back transaction onto the worker pool (§4.5, §7).
fn start_retry_sweep(pipeline: Pipeline, worker_pool: WorkerPool, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            match pipeline.unprocessed_report_ids().await {
                Ok(ids) if ids.is_empty() => {}
                Ok(ids) => {
                    let recovered = ids.len();
                    for id in ids {
                        worker_pool.enqueue(id).await;
                    }
                    tracing::info!(recovered, "retry sweep re-enqueued stuck reports");
                }
                Err(err) => tracing::warn!(error = %err, "retry sweep failed"),
            }
        }
    });
}
