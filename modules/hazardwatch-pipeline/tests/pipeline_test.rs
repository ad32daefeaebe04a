//! End-to-end pipeline tests: submit → process → fuse → read back.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::Utc;
use hazardwatch_common::{HazardStatus, SourceKind};
use hazardwatch_pipeline::{Broadcaster, NewReport, Pipeline, Store};
use sqlx::PgPool;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id BIGSERIAL PRIMARY KEY,
            source TEXT NOT NULL,
            text TEXT NOT NULL,
            lat DOUBLE PRECISION NOT NULL,
            lon DOUBLE PRECISION NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            media_paths TEXT[] NOT NULL DEFAULT '{}',
            has_media BOOLEAN NOT NULL DEFAULT false,
            media_verified BOOLEAN NOT NULL DEFAULT false,
            user_id TEXT,
            user_name TEXT,
            gps_accuracy_m DOUBLE PRECISION,
            nlp_kind TEXT,
            nlp_conf DOUBLE PRECISION,
            credibility DOUBLE PRECISION,
            group_id BIGINT,
            processed BOOLEAN NOT NULL DEFAULT false
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hazard_events (
            id BIGSERIAL PRIMARY KEY,
            group_id BIGINT NOT NULL,
            kind TEXT NOT NULL,
            confidence DOUBLE PRECISION NOT NULL,
            severity SMALLINT NOT NULL,
            status TEXT NOT NULL,
            centroid_lat DOUBLE PRECISION NOT NULL,
            centroid_lon DOUBLE PRECISION NOT NULL,
            priority_score DOUBLE PRECISION NOT NULL,
            evidence JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS hazard_events_group_id_idx ON hazard_events (group_id)")
        .execute(&pool)
        .await
        .ok()?;

    sqlx::query("TRUNCATE reports, hazard_events RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .ok()?;

    Some(pool)
}

fn flood_report(source: SourceKind) -> NewReport {
    NewReport {
        source,
        text: "heavy flooding, water rising fast near the marina".to_string(),
        lat: 13.05,
        lon: 80.27,
        timestamp: Utc::now(),
        media_paths: Vec::new(),
        has_media: false,
        media_verified: false,
        user_id: None,
        user_name: None,
        gps_accuracy_m: Some(10.0),
    }
}

#[tokio::test]
async fn single_citizen_report_lands_in_review_or_pending() {
    let Some(pool) = test_pool().await else { return };
    let store = Store::new(pool);
    let pipeline = Pipeline::new(store, Broadcaster::new(16));

    let id = pipeline.submit_report(flood_report(SourceKind::Citizen)).await.unwrap();
    pipeline.process_report(id).await.unwrap();

    let report = pipeline.store().get_report(id).await.unwrap().unwrap();
    assert!(report.processed);
    let group_id = report.group_id.unwrap();

    let event = pipeline.store().get_event_by_group(group_id).await.unwrap().unwrap();
    assert!(event.confidence < 0.85);
}

#[tokio::test]
async fn reprocessing_an_already_processed_report_is_a_no_op() {
    let Some(pool) = test_pool().await else { return };
    let store = Store::new(pool);
    let pipeline = Pipeline::new(store, Broadcaster::new(16));

    let id = pipeline.submit_report(flood_report(SourceKind::Citizen)).await.unwrap();
    pipeline.process_report(id).await.unwrap();
    let first = pipeline.store().get_report(id).await.unwrap().unwrap();

    pipeline.process_report(id).await.unwrap();
    let second = pipeline.store().get_report(id).await.unwrap().unwrap();

    assert_eq!(first.group_id, second.group_id);
}

#[tokio::test]
async fn emergency_beacon_creates_emergency_status_event() {
    let Some(pool) = test_pool().await else { return };
    let store = Store::new(pool);
    let pipeline = Pipeline::new(store, Broadcaster::new(16));

    let id = pipeline.submit_emergency(flood_report(SourceKind::Lora)).await.unwrap();
    let report = pipeline.store().get_report(id).await.unwrap().unwrap();
    assert!(report.processed);

    let group_id = report.group_id.unwrap();
    let event = pipeline.store().get_event_by_group(group_id).await.unwrap().unwrap();
    assert_eq!(event.status, HazardStatus::Emergency);
}

#[tokio::test]
async fn incois_corroboration_after_citizen_reports_confirms_event() {
    let Some(pool) = test_pool().await else { return };
    let store = Store::new(pool);
    let pipeline = Pipeline::new(store, Broadcaster::new(16));

    let mut first_group = None;
    for _ in 0..6 {
        let id = pipeline.submit_report(flood_report(SourceKind::Citizen)).await.unwrap();
        pipeline.process_report(id).await.unwrap();
        let report = pipeline.store().get_report(id).await.unwrap().unwrap();
        first_group = report.group_id;
    }

    let incois_id = pipeline.submit_report(flood_report(SourceKind::Incois)).await.unwrap();
    pipeline.process_report(incois_id).await.unwrap();
    let incois_report = pipeline.store().get_report(incois_id).await.unwrap().unwrap();

    assert_eq!(incois_report.group_id, first_group);
    let event = pipeline.store().get_event_by_group(first_group.unwrap()).await.unwrap().unwrap();
    assert!(event.confidence > 0.3, "{}", event.confidence);
}
