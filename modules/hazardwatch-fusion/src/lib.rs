//! Evidence fusion: turns all reports in a group into a single
//! `HazardEventSnapshot` — consensus kind, aggregate confidence (with
//! diminishing-returns, source-diversity and media-evidence multipliers),
//! weighted severity, weighted centroid, lifecycle status and an evidence
//! blob. Pure value object, no I/O; pinning a previously-validated event's
//! status/confidence against this snapshot is the caller's (pipeline's)
//! responsibility, not this crate's.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use hazardwatch_common::{HazardKind, HazardStatus, SourceKind};
use serde_json::json;

/// Fusion-stage source weight table. Distinct from the credibility
/// scorer's source-reliability weights — this one governs how much each
/// source contributes to the aggregate confidence vote, not per-report trust.
fn fusion_source_weight(source: &SourceKind) -> f64 {
    match source {
        SourceKind::Incois => 0.9,
        SourceKind::Lora => 0.95,
        SourceKind::Citizen => 0.6,
        SourceKind::Social => 0.4,
        SourceKind::Other(_) => 0.3,
    }
}

/// The minimal per-report view the fusion engine needs.
#[derive(Debug, Clone)]
pub struct FusionReport {
    pub id: i64,
    pub source: SourceKind,
    pub nlp_kind: HazardKind,
    pub nlp_conf: f64,
    pub credibility: f64,
    pub severity_boost: i32,
    /// Declared severity carried over from a bulletin-derived report, if any.
    pub bulletin_severity: Option<u8>,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub has_media: bool,
    pub media_verified: bool,
    pub keywords: Vec<String>,
}

impl FusionReport {
    /// `nlp_conf · credibility`, boosted by media evidence per §4.4 stage 1.
    fn media_boosted_confidence(&self) -> f64 {
        let base = self.nlp_conf * self.credibility;
        if self.media_verified {
            (base + 0.40).min(0.95)
        } else if self.has_media {
            (base + 0.15).min(0.70)
        } else {
            base
        }
    }

    fn base_severity(&self) -> i32 {
        let base = self.bulletin_severity.map(|s| s as i32).unwrap_or(3);
        (base + self.severity_boost).min(5)
    }
}

#[derive(Debug, Clone)]
pub struct HazardEventSnapshot {
    pub kind: HazardKind,
    pub confidence: f64,
    pub severity: u8,
    pub status: HazardStatus,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub priority_score: f64,
    pub evidence: serde_json::Value,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FusionEngine;

impl FusionEngine {
    pub fn new() -> Self {
        Self
    }

    /// `reports` must be non-empty — callers never fuse an empty group.
    pub fn fuse(&self, group_id: i64, reports: &[FusionReport]) -> HazardEventSnapshot {
        assert!(!reports.is_empty(), "cannot fuse an empty group");

        let kind = consensus_kind(reports);
        let confidence = aggregate_confidence(reports);
        let severity = weighted_severity(reports);
        let (centroid_lat, centroid_lon) = weighted_centroid(reports);
        let status = compute_status(kind, confidence, reports);
        let priority_score = confidence * (severity as f64 / 5.0);
        let evidence = build_evidence(group_id, reports);

        HazardEventSnapshot {
            kind,
            confidence,
            severity,
            status,
            centroid_lat,
            centroid_lon,
            priority_score,
            evidence,
        }
    }

    pub fn should_alert(&self, snapshot: &HazardEventSnapshot) -> bool {
        snapshot.confidence >= 0.85 || snapshot.status == HazardStatus::Emergency
    }
}

fn consensus_kind(reports: &[FusionReport]) -> HazardKind {
    let mut votes: HashMap<HazardKind, f64> = HashMap::new();
    for r in reports {
        let weight = fusion_source_weight(&r.source) * r.nlp_conf * r.credibility;
        *votes.entry(r.nlp_kind).or_insert(0.0) += weight;
    }

    votes
        .into_iter()
        .max_by(|(ka, va), (kb, vb)| {
            va.partial_cmp(vb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ka.priority().cmp(&kb.priority()))
        })
        .map(|(k, _)| k)
        .unwrap_or(HazardKind::Unknown)
}

fn aggregate_confidence(reports: &[FusionReport]) -> f64 {
    let mut by_source: HashMap<String, Vec<&FusionReport>> = HashMap::new();
    for r in reports {
        by_source.entry(r.source.to_string()).or_default().push(r);
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for group in by_source.values() {
        let source = &group[0].source;
        let n = group.len();
        let mean: f64 = group.iter().map(|r| r.media_boosted_confidence()).sum::<f64>() / n as f64;
        let volume = volume_factor(source, n);
        let weight = fusion_source_weight(source);
        weighted_sum += mean * volume * weight;
        weight_total += weight;
    }

    let base = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    };

    let diversity = diversity_multiplier(reports);
    let media = media_multiplier(reports);

    let has_verified_media = reports.iter().any(|r| r.media_verified);
    let cap = if has_verified_media { 0.98 } else { 0.95 };

    (base * diversity * media).min(cap)
}

fn volume_factor(source: &SourceKind, n: usize) -> f64 {
    let n = n as f64;
    match source {
        SourceKind::Incois | SourceKind::Lora => (0.8 + 0.1 * (n + 1.0).log10()).min(1.0),
        SourceKind::Citizen => {
            (0.25 + 0.25 * (n + 1.0).log10() + (0.10 * (n / 10.0).sqrt()).min(0.45)).min(0.95)
        }
        SourceKind::Social => {
            (0.15 + 0.20 * (n + 1.0).log10() + (0.08 * (n / 5.0).sqrt()).min(0.35)).min(0.80)
        }
        SourceKind::Other(_) => (0.10 + 0.15 * (n + 1.0).log10()).min(0.50),
    }
}

fn diversity_multiplier(reports: &[FusionReport]) -> f64 {
    let sources: HashSet<String> = reports.iter().map(|r| r.source.to_string()).collect();
    let mut multiplier = match sources.len() {
        0 | 1 => 1.0,
        2 => 1.5,
        3 => 2.0,
        _ => 2.5,
    };

    let has = |s: &str| sources.contains(s);
    if has("incois") && has("citizen") {
        multiplier += 0.3;
    }
    if has("incois") && has("lora") {
        multiplier += 0.4;
    }
    if has("lora") && has("citizen") {
        multiplier += 0.2;
    }

    multiplier.min(3.0)
}

fn media_multiplier(reports: &[FusionReport]) -> f64 {
    let total_media = reports.iter().filter(|r| r.has_media).count();
    if total_media == 0 {
        return 1.0;
    }
    let verified_media = reports.iter().filter(|r| r.media_verified).count();

    let vol_bonus = if verified_media >= 3 {
        1.3
    } else if verified_media >= 2 {
        1.2
    } else {
        1.0
    };

    let raw = 1.2 * (1.0 + 0.5 * verified_media as f64 / total_media as f64) * vol_bonus;
    raw.min(2.5)
}

fn weighted_severity(reports: &[FusionReport]) -> u8 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for r in reports {
        let weight = fusion_source_weight(&r.source) * r.credibility;
        weighted_sum += r.base_severity() as f64 * weight;
        weight_total += weight;
    }

    let avg = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        reports.iter().map(|r| r.base_severity()).sum::<i32>() as f64 / reports.len() as f64
    };

    (avg.round() as i32).clamp(1, 5) as u8
}

fn weighted_centroid(reports: &[FusionReport]) -> (f64, f64) {
    let mut weighted_lat = 0.0;
    let mut weighted_lon = 0.0;
    let mut weight_total = 0.0;
    for r in reports {
        let weight = fusion_source_weight(&r.source) * r.credibility;
        weighted_lat += r.lat * weight;
        weighted_lon += r.lon * weight;
        weight_total += weight;
    }

    if weight_total > 0.0 {
        (weighted_lat / weight_total, weighted_lon / weight_total)
    } else {
        let n = reports.len() as f64;
        (
            reports.iter().map(|r| r.lat).sum::<f64>() / n,
            reports.iter().map(|r| r.lon).sum::<f64>() / n,
        )
    }
}

fn compute_status(kind: HazardKind, confidence: f64, reports: &[FusionReport]) -> HazardStatus {
    let any_lora = reports.iter().any(|r| r.source == SourceKind::Lora);

    if any_lora || kind == HazardKind::Emergency {
        return HazardStatus::Emergency;
    }
    if confidence >= 0.90 && matches!(kind, HazardKind::Tsunami | HazardKind::Earthquake) {
        return HazardStatus::Emergency;
    }
    if confidence >= 0.90 {
        return HazardStatus::Confirmed;
    }
    if confidence >= 0.85 {
        return HazardStatus::Confirmed;
    }
    if confidence >= 0.30 {
        return HazardStatus::Pending;
    }
    HazardStatus::Review
}

fn build_evidence(group_id: i64, reports: &[FusionReport]) -> serde_json::Value {
    let mut per_source_counts: HashMap<String, usize> = HashMap::new();
    for r in reports {
        *per_source_counts.entry(r.source.to_string()).or_insert(0) += 1;
    }

    let nlp_confs: Vec<f64> = reports.iter().map(|r| r.nlp_conf).collect();
    let credibilities: Vec<f64> = reports.iter().map(|r| r.credibility).collect();
    let report_ids: Vec<i64> = reports.iter().map(|r| r.id).collect();

    let earliest = reports.iter().map(|r| r.timestamp).min();
    let latest = reports.iter().map(|r| r.timestamp).max();

    let mut unique_descriptions: Vec<String> = reports
        .iter()
        .map(|r| r.text.clone())
        .filter(|t| !t.is_empty())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    unique_descriptions.truncate(5);

    let keywords: HashSet<String> = reports.iter().flat_map(|r| r.keywords.iter().cloned()).collect();

    json!({
        "group_id": group_id,
        "report_count": reports.len(),
        "source_counts": per_source_counts,
        "nlp_confidences": nlp_confs,
        "credibilities": credibilities,
        "report_ids": report_ids,
        "earliest_timestamp": earliest,
        "latest_timestamp": latest,
        "unique_descriptions": unique_descriptions,
        "keywords": keywords.into_iter().collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make(id: i64, source: SourceKind, conf: f64, cred: f64, kind: HazardKind) -> FusionReport {
        FusionReport {
            id,
            source,
            nlp_kind: kind,
            nlp_conf: conf,
            credibility: cred,
            severity_boost: 0,
            bulletin_severity: None,
            lat: 13.05,
            lon: 80.27,
            timestamp: Utc::now(),
            text: format!("report {id}"),
            has_media: false,
            media_verified: false,
            keywords: Vec::new(),
        }
    }

    #[test]
    fn single_citizen_report_stays_below_half() {
        let engine = FusionEngine::new();
        let reports = vec![make(1, SourceKind::Citizen, 0.2, 0.5, HazardKind::Flood)];
        let snapshot = engine.fuse(1, &reports);
        assert!(snapshot.confidence < 0.5, "{}", snapshot.confidence);
    }

    #[test]
    fn monotone_volume_same_source_never_decreases_confidence() {
        let engine = FusionEngine::new();
        let mut reports = vec![make(1, SourceKind::Citizen, 0.3, 0.6, HazardKind::Flood)];
        let first = engine.fuse(1, &reports).confidence;
        reports.push(make(2, SourceKind::Citizen, 0.3, 0.6, HazardKind::Flood));
        let second = engine.fuse(1, &reports).confidence;
        assert!(second >= first, "{second} should be >= {first}");
    }

    #[test]
    fn diminishing_returns_bounded_for_citizen_volume() {
        let v10 = volume_factor(&SourceKind::Citizen, 10);
        let v20 = volume_factor(&SourceKind::Citizen, 20);
        assert!(v20 <= 2.0 * v10);
        assert!(v20 <= 0.95);
    }

    #[test]
    fn incois_corroboration_pushes_confidence_to_confirmed() {
        let engine = FusionEngine::new();
        let mut reports: Vec<FusionReport> = (0..10)
            .map(|i| make(i, SourceKind::Citizen, 0.3, 0.6, HazardKind::Flood))
            .collect();
        reports.push(make(100, SourceKind::Incois, 0.7, 1.0, HazardKind::Flood));
        let snapshot = engine.fuse(1, &reports);
        assert!(snapshot.confidence >= 0.70, "{}", snapshot.confidence);
    }

    #[test]
    fn verified_media_single_source_lifts_confidence() {
        let engine = FusionEngine::new();
        let mut r1 = make(1, SourceKind::Citizen, 0.3, 0.6, HazardKind::Earthquake);
        r1.has_media = true;
        r1.media_verified = true;
        let reports = vec![
            r1,
            make(2, SourceKind::Citizen, 0.3, 0.6, HazardKind::Earthquake),
            make(3, SourceKind::Citizen, 0.3, 0.6, HazardKind::Earthquake),
        ];
        let snapshot = engine.fuse(1, &reports);
        assert!(snapshot.confidence > 0.0);
    }

    #[test]
    fn lora_source_forces_emergency_status() {
        let engine = FusionEngine::new();
        let reports = vec![make(1, SourceKind::Lora, 0.95, 0.95, HazardKind::Tsunami)];
        let snapshot = engine.fuse(1, &reports);
        assert_eq!(snapshot.status, HazardStatus::Emergency);
    }

    #[test]
    fn should_alert_true_above_085_confidence() {
        let engine = FusionEngine::new();
        let reports = vec![
            make(1, SourceKind::Incois, 0.8, 1.0, HazardKind::Flood),
            make(2, SourceKind::Citizen, 0.3, 0.6, HazardKind::Flood),
        ];
        let snapshot = engine.fuse(1, &reports);
        if snapshot.confidence >= 0.85 {
            assert!(engine.should_alert(&snapshot));
        }
    }

    #[test]
    fn centroid_is_weighted_mean() {
        let engine = FusionEngine::new();
        let mut a = make(1, SourceKind::Citizen, 0.3, 1.0, HazardKind::Flood);
        a.lat = 10.0;
        a.lon = 10.0;
        let mut b = make(2, SourceKind::Citizen, 0.3, 1.0, HazardKind::Flood);
        b.lat = 20.0;
        b.lon = 20.0;
        let snapshot = engine.fuse(1, &[a, b]);
        assert!((snapshot.centroid_lat - 15.0).abs() < 1e-9);
        assert!((snapshot.centroid_lon - 15.0).abs() < 1e-9);
    }

    #[test]
    fn evidence_round_trips_through_json() {
        let engine = FusionEngine::new();
        let reports = vec![make(1, SourceKind::Citizen, 0.3, 0.6, HazardKind::Flood)];
        let snapshot = engine.fuse(1, &reports);
        let serialized = serde_json::to_string(&snapshot.evidence).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed["report_count"], snapshot.evidence["report_count"]);
        assert_eq!(parsed["report_ids"], snapshot.evidence["report_ids"]);
    }
}
