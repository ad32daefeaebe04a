//! Per-report pipeline orchestration (§4.5): classify, score credibility,
//! cluster, fuse, persist and broadcast. Ties the four pure engines to the
//! store and the broadcaster.

use chrono::Utc;
use hazardwatch_classifier::Classifier;
use hazardwatch_cluster::{ClusterReport, Clusterer};
use hazardwatch_common::{HazardError, Report};
use hazardwatch_credibility::CredibilityScorer;
use hazardwatch_fusion::{FusionEngine, FusionReport};
use tracing::{info, instrument};

use crate::broadcaster::{Broadcaster, Frame};
use crate::group_lock::GroupLocks;
use crate::store::{NewReport, Store};

#[derive(Clone)]
pub struct Pipeline {
    store: Store,
    broadcaster: Broadcaster,
    group_locks: GroupLocks,
    classifier: Classifier,
    credibility: CredibilityScorer,
    clusterer: Clusterer,
    fusion: FusionEngine,
}

impl Pipeline {
    pub fn new(store: Store, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            broadcaster,
            group_locks: GroupLocks::new(),
            classifier: Classifier::new(),
            credibility: CredibilityScorer::new(),
            clusterer: Clusterer::new(),
            fusion: FusionEngine::new(),
        }
    }

    /// Accepts a new report and enqueues it for processing, returning its id
    /// immediately (§6 `POST /api/reports`).
    pub async fn submit_report(&self, new: NewReport) -> Result<i64, HazardError> {
        let report_id = self.store.insert_report(new.clone()).await?;
        self.broadcaster
            .publish(Frame::NewReport {
                data: serde_json::json!({
                    "id": report_id,
                    "source": new.source.to_string(),
                    "lat": new.lat,
                    "lon": new.lon,
                }),
            })
            .await;
        Ok(report_id)
    }

    /// The LoRa SOS fast path (§4.5): fixed classification, no clustering
    /// against other reports, always its own group and event.
    pub async fn submit_emergency(&self, new: NewReport) -> Result<i64, HazardError> {
        let classified = self.classifier.classify_emergency_beacon();
        let credibility = 0.95;
        let (report_id, event) = self
            .store
            .insert_emergency(new.clone(), classified.kind, classified.confidence, credibility, 5)
            .await?;

        self.broadcaster
            .publish(Frame::EmergencyAlert {
                data: serde_json::json!({
                    "report_id": report_id,
                    "event_id": event.id,
                    "lat": new.lat,
                    "lon": new.lon,
                }),
            })
            .await;

        Ok(report_id)
    }

    /// Runs the full classify → score → cluster → fuse → persist pipeline
    /// for one report. Idempotent: a report already marked `processed` is a
    /// no-op success (§4.5 edge case).
    #[instrument(skip(self), fields(report_id))]
    pub async fn process_report(&self, report_id: i64) -> Result<(), HazardError> {
        let report = self
            .store
            .get_report(report_id)
            .await?
            .ok_or_else(|| HazardError::NotFound(format!("report {report_id}")))?;

        if report.processed {
            info!(report_id, "report already processed, skipping");
            return Ok(());
        }

        let classified = self.classifier.classify(
            &report.text,
            &report.source,
            report.has_media,
            report.media_verified,
        );

        let credibility_result = self.credibility.score(
            &report.source,
            &report.text,
            report.lat,
            report.lon,
            Some(report.timestamp),
            report.media_paths.first().map(|s| s.as_str()),
            report.gps_accuracy_m,
            Utc::now(),
        );

        let candidates = self.store.processed_reports_excluding(report_id).await?;
        let cluster_candidates: Vec<ClusterReport> =
            candidates.iter().map(|r| to_cluster_report(r)).collect();

        let new_cluster_report = ClusterReport {
            id: report.id,
            lat: report.lat,
            lon: report.lon,
            timestamp: Some(report.timestamp),
            text: report.text.clone(),
            source: report.source.clone(),
            group_id: None,
        };

        let dedupe = self.clusterer.find_group(&new_cluster_report, &cluster_candidates);
        let group_id = dedupe.group_id;

        let lock = self.group_locks.lock_for(group_id).await;
        let _guard = lock.lock().await;

        let mut group_members = self.store.group_reports(group_id).await?;
        group_members.retain(|r| r.id != report_id);

        let mut fusion_reports = Vec::with_capacity(group_members.len() + 1);
        for member in &group_members {
            fusion_reports.push(self.build_member_fusion_report(member).await?);
        }

        let bulletin_severity = self.bulletin_severity_for(&report.source, classified.kind, report.timestamp).await?;
        fusion_reports.push(FusionReport {
            id: report.id,
            source: report.source.clone(),
            nlp_kind: classified.kind,
            nlp_conf: classified.confidence,
            credibility: credibility_result.score,
            severity_boost: classified.severity_boost,
            bulletin_severity,
            lat: report.lat,
            lon: report.lon,
            timestamp: report.timestamp,
            text: report.text.clone(),
            has_media: report.has_media,
            media_verified: report.media_verified,
            keywords: classified.keywords.clone(),
        });

        let snapshot = self.fusion.fuse(group_id, &fusion_reports);
        let should_alert = self.fusion.should_alert(&snapshot);

        let event = self
            .store
            .persist_processing_result(
                report_id,
                classified.kind,
                classified.confidence,
                credibility_result.score,
                group_id,
                &snapshot,
            )
            .await?;

        self.broadcaster
            .publish(Frame::ReportProcessed {
                data: serde_json::json!({
                    "report_id": report_id,
                    "group_id": group_id,
                    "is_duplicate": dedupe.is_duplicate,
                    "kind": classified.kind.to_string(),
                }),
            })
            .await;

        self.broadcaster
            .publish(Frame::HazardUpdated {
                data: serde_json::json!({
                    "event_id": event.id,
                    "group_id": event.group_id,
                    "kind": event.kind.to_string(),
                    "status": event.status.to_string(),
                    "confidence": event.confidence,
                    "severity": event.severity,
                }),
            })
            .await;

        if should_alert {
            self.broadcaster
                .publish(Frame::EmergencyAlert {
                    data: serde_json::json!({
                        "event_id": event.id,
                        "group_id": event.group_id,
                        "confidence": event.confidence,
                    }),
                })
                .await;
        }

        Ok(())
    }

    /// Administrator validation hook (§6, §9): pins status and confidence,
    /// exempting the event from further automated adjustment.
    pub async fn validate(
        &self,
        event_id: i64,
        decision: hazardwatch_common::ValidationDecision,
    ) -> Result<(), HazardError> {
        let event = self.store.validate_event(event_id, decision).await?;
        self.broadcaster
            .publish(Frame::HazardValidated {
                data: serde_json::json!({
                    "event_id": event.id,
                    "status": event.status.to_string(),
                    "confidence": event.confidence,
                }),
            })
            .await;
        Ok(())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Reports left `processed = false` by a prior crash or transaction
    /// rollback, for the retry sweep to re-enqueue onto the worker pool
    /// (§4.5, §7).
    pub async fn unprocessed_report_ids(&self) -> Result<Vec<i64>, HazardError> {
        self.store.reports_not_yet_processed().await
    }

    /// Existing group members keep their persisted `nlp_kind`/`nlp_conf`, but
    /// `severity_boost` and matched `keywords` are not separate columns —
    /// cheap and deterministic to recompute them from the stored text on
    /// each fuse.
    async fn build_member_fusion_report(&self, report: &Report) -> Result<FusionReport, HazardError> {
        let reclassified = self.classifier.classify(
            &report.text,
            &report.source,
            report.has_media,
            report.media_verified,
        );
        let nlp_kind = report.nlp_kind.unwrap_or(reclassified.kind);
        let bulletin_severity = self
            .bulletin_severity_for(&report.source, nlp_kind, report.timestamp)
            .await?;

        Ok(FusionReport {
            id: report.id,
            source: report.source.clone(),
            nlp_kind,
            nlp_conf: report.nlp_conf.unwrap_or(reclassified.confidence),
            credibility: report.credibility.unwrap_or(0.5),
            severity_boost: reclassified.severity_boost,
            bulletin_severity,
            lat: report.lat,
            lon: report.lon,
            timestamp: report.timestamp,
            text: report.text.clone(),
            has_media: report.has_media,
            media_verified: report.media_verified,
            keywords: reclassified.keywords,
        })
    }

    /// The bulletin feed is read only for `incois`-sourced reports (§3):
    /// the most recent bulletin of the same hazard kind issued at or
    /// before the report's timestamp.
    async fn bulletin_severity_for(
        &self,
        source: &hazardwatch_common::SourceKind,
        kind: hazardwatch_common::HazardKind,
        timestamp: chrono::DateTime<Utc>,
    ) -> Result<Option<u8>, HazardError> {
        if !matches!(source, hazardwatch_common::SourceKind::Incois) {
            return Ok(None);
        }
        let bulletin = self.store.latest_bulletin_for(kind, timestamp).await?;
        Ok(bulletin.map(|b| b.severity))
    }
}

fn to_cluster_report(report: &Report) -> ClusterReport {
    ClusterReport {
        id: report.id,
        lat: report.lat,
        lon: report.lon,
        timestamp: Some(report.timestamp),
        text: report.text.clone(),
        source: report.source.clone(),
        group_id: report.group_id,
    }
}
