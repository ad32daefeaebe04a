//! Postgres-backed store for reports, hazard events and bulletins.
//!
//! Two entity tables plus a read-only bulletins table (§3, §6). The
//! `group_id → event_id` mapping is a unique index, not a substring search
//! over the evidence blob (§9).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use hazardwatch_common::{
    HazardError, HazardKind, HazardStatus, Report, SourceKind, ValidationDecision,
};
use hazardwatch_fusion::HazardEventSnapshot;
use sqlx::PgPool;

/// Fields supplied by a submitter, before any derived field is computed.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub source: SourceKind,
    pub text: String,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub media_paths: Vec<String>,
    pub has_media: bool,
    pub media_verified: bool,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub gps_accuracy_m: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: i64,
    source: String,
    text: String,
    lat: f64,
    lon: f64,
    timestamp: DateTime<Utc>,
    media_paths: Vec<String>,
    has_media: bool,
    media_verified: bool,
    user_id: Option<String>,
    user_name: Option<String>,
    gps_accuracy_m: Option<f64>,
    nlp_kind: Option<String>,
    nlp_conf: Option<f64>,
    credibility: Option<f64>,
    group_id: Option<i64>,
    processed: bool,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Report {
            id: row.id,
            source: SourceKind::from_str(&row.source).expect("SourceKind::from_str is infallible"),
            text: row.text,
            lat: row.lat,
            lon: row.lon,
            timestamp: row.timestamp,
            media_paths: row.media_paths,
            has_media: row.has_media,
            media_verified: row.media_verified,
            user_id: row.user_id,
            user_name: row.user_name,
            gps_accuracy_m: row.gps_accuracy_m,
            nlp_kind: row.nlp_kind.map(|k| HazardKind::from_str(&k).unwrap_or(HazardKind::Unknown)),
            nlp_conf: row.nlp_conf,
            credibility: row.credibility,
            group_id: row.group_id,
            processed: row.processed,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HazardEventRow {
    id: i64,
    group_id: i64,
    kind: String,
    confidence: f64,
    severity: i16,
    status: String,
    centroid_lat: f64,
    centroid_lon: f64,
    priority_score: f64,
    evidence: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<HazardEventRow> for hazardwatch_common::HazardEvent {
    fn from(row: HazardEventRow) -> Self {
        hazardwatch_common::HazardEvent {
            id: row.id,
            group_id: row.group_id,
            kind: HazardKind::from_str(&row.kind).unwrap_or(HazardKind::Unknown),
            confidence: row.confidence,
            severity: row.severity as u8,
            status: HazardStatus::from_str(&row.status).unwrap_or(HazardStatus::Review),
            centroid_lat: row.centroid_lat,
            centroid_lon: row.centroid_lon,
            priority_score: row.priority_score,
            evidence: row.evidence,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BulletinRow {
    id: i64,
    issued_at: DateTime<Utc>,
    hazard_kind: String,
    severity: i16,
    description: String,
}

impl From<BulletinRow> for hazardwatch_common::Bulletin {
    fn from(row: BulletinRow) -> Self {
        hazardwatch_common::Bulletin {
            id: row.id,
            issued_at: row.issued_at,
            hazard_kind: HazardKind::from_str(&row.hazard_kind).unwrap_or(HazardKind::Unknown),
            severity: row.severity as u8,
            description: row.description,
        }
    }
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_report(&self, new: NewReport) -> Result<i64, HazardError> {
        if !hazardwatch_common::geo::in_range(new.lat, new.lon) {
            return Err(HazardError::InvalidInput(format!(
                "coordinates out of range: ({}, {})",
                new.lat, new.lon
            )));
        }

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO reports
                (source, text, lat, lon, timestamp, media_paths, has_media, media_verified,
                 user_id, user_name, gps_accuracy_m, processed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, false)
            RETURNING id
            "#,
        )
        .bind(new.source.to_string())
        .bind(&new.text)
        .bind(new.lat)
        .bind(new.lon)
        .bind(new.timestamp)
        .bind(&new.media_paths)
        .bind(new.has_media)
        .bind(new.media_verified)
        .bind(&new.user_id)
        .bind(&new.user_name)
        .bind(new.gps_accuracy_m)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    pub async fn get_report(&self, id: i64) -> Result<Option<Report>, HazardError> {
        let row: Option<ReportRow> = sqlx::query_as("SELECT * FROM reports WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Report::from))
    }

    /// All processed reports except the one with `exclude_id` — the candidate
    /// pool the clusterer compares the new report against.
    pub async fn processed_reports_excluding(&self, exclude_id: i64) -> Result<Vec<Report>, HazardError> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            "SELECT * FROM reports WHERE processed = true AND id != $1 ORDER BY id ASC",
        )
        .bind(exclude_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Report::from).collect())
    }

    pub async fn group_reports(&self, group_id: i64) -> Result<Vec<Report>, HazardError> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            "SELECT * FROM reports WHERE processed = true AND group_id = $1 ORDER BY id ASC",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Report::from).collect())
    }

    pub async fn reports_not_yet_processed(&self) -> Result<Vec<i64>, HazardError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM reports WHERE processed = false ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn list_reports(&self, before_id: Option<i64>, limit: i64) -> Result<Vec<Report>, HazardError> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            r#"
            SELECT * FROM reports
            WHERE ($1::bigint IS NULL OR id < $1)
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(before_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Report::from).collect())
    }

    /// Classify/credibility/cluster/fuse results for one report, persisted
    /// atomically (§4.5 steps 4-6). Rolls back and leaves `processed = false`
    /// on any error.
    pub async fn persist_processing_result(
        &self,
        report_id: i64,
        nlp_kind: HazardKind,
        nlp_conf: f64,
        credibility: f64,
        group_id: i64,
        snapshot: &HazardEventSnapshot,
    ) -> Result<hazardwatch_common::HazardEvent, HazardError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE reports
            SET nlp_kind = $1, nlp_conf = $2, credibility = $3, group_id = $4, processed = true
            WHERE id = $5
            "#,
        )
        .bind(nlp_kind.to_string())
        .bind(nlp_conf)
        .bind(credibility)
        .bind(group_id)
        .bind(report_id)
        .execute(&mut *tx)
        .await?;

        let existing: Option<HazardEventRow> =
            sqlx::query_as("SELECT * FROM hazard_events WHERE group_id = $1")
                .bind(group_id)
                .fetch_optional(&mut *tx)
                .await?;

        let event = match existing {
            Some(row) => {
                let previous_status = HazardStatus::from_str(&row.status).unwrap_or(HazardStatus::Review);
                let (status, confidence) = if previous_status.is_pinned() {
                    (previous_status, row.confidence)
                } else {
                    (snapshot.status, snapshot.confidence)
                };

                let updated: HazardEventRow = sqlx::query_as(
                    r#"
                    UPDATE hazard_events
                    SET kind = $1, confidence = $2, severity = $3, status = $4,
                        centroid_lat = $5, centroid_lon = $6, priority_score = $7,
                        evidence = $8, updated_at = now()
                    WHERE group_id = $9
                    RETURNING *
                    "#,
                )
                .bind(snapshot.kind.to_string())
                .bind(confidence)
                .bind(snapshot.severity as i16)
                .bind(status.to_string())
                .bind(snapshot.centroid_lat)
                .bind(snapshot.centroid_lon)
                .bind(snapshot.priority_score)
                .bind(&snapshot.evidence)
                .bind(group_id)
                .fetch_one(&mut *tx)
                .await?;
                updated
            }
            None => {
                sqlx::query_as(
                    r#"
                    INSERT INTO hazard_events
                        (group_id, kind, confidence, severity, status, centroid_lat, centroid_lon,
                         priority_score, evidence, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now())
                    RETURNING *
                    "#,
                )
                .bind(group_id)
                .bind(snapshot.kind.to_string())
                .bind(snapshot.confidence)
                .bind(snapshot.severity as i16)
                .bind(snapshot.status.to_string())
                .bind(snapshot.centroid_lat)
                .bind(snapshot.centroid_lon)
                .bind(snapshot.priority_score)
                .bind(&snapshot.evidence)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;

        Ok(hazardwatch_common::HazardEvent::from(event))
    }

    /// Emergency fast path: insert the report (pre-marked processed) and its
    /// hazard event in one transaction, bypassing classify/cluster/fuse.
    pub async fn insert_emergency(
        &self,
        new: NewReport,
        nlp_kind: HazardKind,
        nlp_conf: f64,
        credibility: f64,
        severity: u8,
    ) -> Result<(i64, hazardwatch_common::HazardEvent), HazardError> {
        let mut tx = self.pool.begin().await?;

        let report_row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO reports
                (source, text, lat, lon, timestamp, media_paths, has_media, media_verified,
                 user_id, user_name, gps_accuracy_m, nlp_kind, nlp_conf, credibility, group_id, processed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, true)
            RETURNING id
            "#,
        )
        .bind(new.source.to_string())
        .bind(&new.text)
        .bind(new.lat)
        .bind(new.lon)
        .bind(new.timestamp)
        .bind(&new.media_paths)
        .bind(new.has_media)
        .bind(new.media_verified)
        .bind(&new.user_id)
        .bind(&new.user_name)
        .bind(new.gps_accuracy_m)
        .bind(nlp_kind.to_string())
        .bind(nlp_conf)
        .bind(credibility)
        .bind(None::<i64>)
        .fetch_one(&mut *tx)
        .await?;

        let report_id = report_row.0;
        let group_id = report_id; // an emergency report is always its own group.

        sqlx::query("UPDATE reports SET group_id = $1 WHERE id = $2")
            .bind(group_id)
            .bind(report_id)
            .execute(&mut *tx)
            .await?;

        let evidence = serde_json::json!({
            "group_id": group_id,
            "report_count": 1,
            "source_counts": {"lora": 1},
            "nlp_confidences": [nlp_conf],
            "credibilities": [credibility],
            "report_ids": [report_id],
            "keywords": ["sos", "emergency"],
        });

        let event_row: HazardEventRow = sqlx::query_as(
            r#"
            INSERT INTO hazard_events
                (group_id, kind, confidence, severity, status, centroid_lat, centroid_lon,
                 priority_score, evidence, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'emergency', $5, $6, $7, $8, now(), now())
            RETURNING *
            "#,
        )
        .bind(group_id)
        .bind(nlp_kind.to_string())
        .bind(nlp_conf)
        .bind(severity as i16)
        .bind(new.lat)
        .bind(new.lon)
        .bind(nlp_conf * (severity as f64 / 5.0))
        .bind(evidence)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((report_id, hazardwatch_common::HazardEvent::from(event_row)))
    }

    pub async fn get_event(&self, id: i64) -> Result<Option<hazardwatch_common::HazardEvent>, HazardError> {
        let row: Option<HazardEventRow> = sqlx::query_as("SELECT * FROM hazard_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hazardwatch_common::HazardEvent::from))
    }

    /// Most recent bulletin for `kind` issued at or before `before` — the
    /// only read the pipeline performs against the bulletin feed, and only
    /// for `incois`-sourced reports (§3).
    pub async fn latest_bulletin_for(
        &self,
        kind: HazardKind,
        before: DateTime<Utc>,
    ) -> Result<Option<hazardwatch_common::Bulletin>, HazardError> {
        let row: Option<BulletinRow> = sqlx::query_as(
            r#"
            SELECT * FROM bulletins
            WHERE hazard_kind = $1 AND issued_at <= $2
            ORDER BY issued_at DESC
            LIMIT 1
            "#,
        )
        .bind(kind.to_string())
        .bind(before)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(hazardwatch_common::Bulletin::from))
    }

    /// Out-of-band ingestion hook for the bulletin feed (§3: populated by an
    /// external job, not the HTTP surface).
    pub async fn insert_bulletin(
        &self,
        issued_at: DateTime<Utc>,
        hazard_kind: HazardKind,
        severity: u8,
        description: String,
    ) -> Result<i64, HazardError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO bulletins (issued_at, hazard_kind, severity, description)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(issued_at)
        .bind(hazard_kind.to_string())
        .bind(severity as i16)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn get_event_by_group(
        &self,
        group_id: i64,
    ) -> Result<Option<hazardwatch_common::HazardEvent>, HazardError> {
        let row: Option<HazardEventRow> = sqlx::query_as("SELECT * FROM hazard_events WHERE group_id = $1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hazardwatch_common::HazardEvent::from))
    }

    pub async fn list_events(
        &self,
        status: Option<HazardStatus>,
        before_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<hazardwatch_common::HazardEvent>, HazardError> {
        let status_str = status.map(|s| s.to_string());
        let rows: Vec<HazardEventRow> = sqlx::query_as(
            r#"
            SELECT * FROM hazard_events
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::bigint IS NULL OR id < $2)
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(status_str)
        .bind(before_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hazardwatch_common::HazardEvent::from).collect())
    }

    /// Administrator validation hook (§6, §4.4). Pins status and adjusts
    /// confidence; later automated fuses must not undo this (§9).
    pub async fn validate_event(
        &self,
        id: i64,
        decision: ValidationDecision,
    ) -> Result<hazardwatch_common::HazardEvent, HazardError> {
        let existing: Option<HazardEventRow> = sqlx::query_as("SELECT * FROM hazard_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let row = existing.ok_or_else(|| HazardError::NotFound(format!("hazard event {id}")))?;

        let (status, confidence) = match decision {
            ValidationDecision::Approved => (HazardStatus::Approved, (row.confidence + 0.20).min(1.0)),
            ValidationDecision::Rejected => (HazardStatus::Rejected, (row.confidence - 0.30).max(0.0)),
        };

        let updated: HazardEventRow = sqlx::query_as(
            r#"
            UPDATE hazard_events
            SET status = $1, confidence = $2, updated_at = now()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(status.to_string())
        .bind(confidence)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(hazardwatch_common::HazardEvent::from(updated))
    }
}
