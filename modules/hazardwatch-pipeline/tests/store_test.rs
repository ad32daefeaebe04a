//! Integration tests for `Store`.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::Utc;
use hazardwatch_common::SourceKind;
use hazardwatch_fusion::HazardEventSnapshot;
use hazardwatch_common::{HazardKind, HazardStatus, ValidationDecision};
use hazardwatch_pipeline::{NewReport, Store};
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

fn sample_report(text: &str) -> NewReport {
    NewReport {
        source: SourceKind::Citizen,
        text: text.to_string(),
        lat: 13.05,
        lon: 80.27,
        timestamp: Utc::now(),
        media_paths: Vec::new(),
        has_media: false,
        media_verified: false,
        user_id: None,
        user_name: None,
        gps_accuracy_m: Some(15.0),
    }
}

#[tokio::test]
async fn insert_and_get_report_round_trips() {
    let Some(pool) = test_pool().await else { return };
    let store = Store::new(pool);

    let id = store.insert_report(sample_report("flooding near marina")).await.unwrap();
    let report = store.get_report(id).await.unwrap().unwrap();

    assert_eq!(report.id, id);
    assert_eq!(report.source, SourceKind::Citizen);
    assert!(!report.processed);
}

#[tokio::test]
async fn out_of_range_coordinates_are_rejected() {
    let Some(pool) = test_pool().await else { return };
    let store = Store::new(pool);

    let mut new = sample_report("test");
    new.lat = 200.0;
    let err = store.insert_report(new).await.unwrap_err();
    assert!(matches!(err, hazardwatch_common::HazardError::InvalidInput(_)));
}

#[tokio::test]
async fn persist_processing_result_creates_new_hazard_event() {
    let Some(pool) = test_pool().await else { return };
    let store = Store::new(pool);

    let id = store.insert_report(sample_report("flooding near marina")).await.unwrap();
    let snapshot = HazardEventSnapshot {
        kind: HazardKind::Flood,
        confidence: 0.42,
        severity: 3,
        status: HazardStatus::Pending,
        centroid_lat: 13.05,
        centroid_lon: 80.27,
        priority_score: 0.25,
        evidence: serde_json::json!({"report_count": 1}),
    };

    let event = store
        .persist_processing_result(id, HazardKind::Flood, 0.3, 0.6, id, &snapshot)
        .await
        .unwrap();

    assert_eq!(event.group_id, id);
    assert_eq!(event.status, HazardStatus::Pending);

    let report = store.get_report(id).await.unwrap().unwrap();
    assert!(report.processed);
    assert_eq!(report.group_id, Some(id));
}

#[tokio::test]
async fn validation_pins_status_and_confidence() {
    let Some(pool) = test_pool().await else { return };
    let store = Store::new(pool);

    let id = store.insert_report(sample_report("tremor felt strongly")).await.unwrap();
    let snapshot = HazardEventSnapshot {
        kind: HazardKind::Earthquake,
        confidence: 0.5,
        severity: 3,
        status: HazardStatus::Pending,
        centroid_lat: 13.05,
        centroid_lon: 80.27,
        priority_score: 0.3,
        evidence: serde_json::json!({}),
    };
    let event = store
        .persist_processing_result(id, HazardKind::Earthquake, 0.5, 0.6, id, &snapshot)
        .await
        .unwrap();

    let validated = store.validate_event(event.id, ValidationDecision::Approved).await.unwrap();
    assert_eq!(validated.status, HazardStatus::Approved);
    assert!(validated.confidence > 0.5);

    // a later fuse must not unpin status or confidence
    let second_snapshot = HazardEventSnapshot {
        kind: HazardKind::Earthquake,
        confidence: 0.1,
        severity: 1,
        status: HazardStatus::Review,
        centroid_lat: 13.06,
        centroid_lon: 80.28,
        priority_score: 0.05,
        evidence: serde_json::json!({"report_count": 2}),
    };
    let second_id = store.insert_report(sample_report("tremor again")).await.unwrap();
    let refreshed = store
        .persist_processing_result(second_id, HazardKind::Earthquake, 0.1, 0.4, id, &second_snapshot)
        .await
        .unwrap();

    assert_eq!(refreshed.status, HazardStatus::Approved);
    assert_eq!(refreshed.confidence, validated.confidence);
    assert_eq!(refreshed.centroid_lat, 13.06);
}
