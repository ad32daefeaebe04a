//! Spatio-temporal-lexical deduplication / clustering engine.
//!
//! Pure value object: given a new report and the set of already-processed
//! reports, decides whether the new report joins an existing group or
//! starts a new one. Groups are never split or merged once formed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hazardwatch_common::{geo::haversine_km, text::tokenize_for_similarity, SourceKind};

const SPATIAL_THRESHOLD_KM: f64 = 5.0;
const TEMPORAL_THRESHOLD_MINUTES: f64 = 30.0;
const COMBINED_THRESHOLD: f64 = 0.6;

const WEIGHT_SPATIAL: f64 = 0.4;
const WEIGHT_TEMPORAL: f64 = 0.3;
const WEIGHT_TEXTUAL: f64 = 0.3;

/// The minimal view of a report the clusterer needs — decoupled from the
/// store's full `Report` so this crate stays pure and I/O-free.
#[derive(Debug, Clone)]
pub struct ClusterReport {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub text: String,
    pub source: SourceKind,
    pub group_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupeResult {
    pub group_id: i64,
    pub is_duplicate: bool,
    pub similarity_score: f64,
    pub matched_ids: Vec<i64>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct GroupStatistics {
    pub count: usize,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub source_distribution: HashMap<String, usize>,
    pub unique_descriptions: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Clusterer;

impl Clusterer {
    pub fn new() -> Self {
        Self
    }

    pub fn spatial_similarity(&self, a: &ClusterReport, b: &ClusterReport) -> f64 {
        let distance_km = haversine_km(a.lat, a.lon, b.lat, b.lon);
        if distance_km > SPATIAL_THRESHOLD_KM {
            return 0.0;
        }
        (1.0 - distance_km / SPATIAL_THRESHOLD_KM).max(0.0)
    }

    pub fn temporal_similarity(&self, a: &ClusterReport, b: &ClusterReport) -> f64 {
        let (Some(ta), Some(tb)) = (a.timestamp, b.timestamp) else {
            return 0.5;
        };
        let diff_minutes = (tb - ta).num_seconds().unsigned_abs() as f64 / 60.0;
        if diff_minutes > TEMPORAL_THRESHOLD_MINUTES {
            return 0.0;
        }
        (1.0 - diff_minutes / TEMPORAL_THRESHOLD_MINUTES).max(0.0)
    }

    pub fn textual_similarity(&self, a: &ClusterReport, b: &ClusterReport) -> f64 {
        jaccard_similarity(&a.text, &b.text)
    }

    pub fn combined_similarity(&self, a: &ClusterReport, b: &ClusterReport) -> f64 {
        self.spatial_similarity(a, b) * WEIGHT_SPATIAL
            + self.temporal_similarity(a, b) * WEIGHT_TEMPORAL
            + self.textual_similarity(a, b) * WEIGHT_TEXTUAL
    }

    /// Assign `new_report` to an existing group or allocate a fresh one.
    /// `existing_reports` must already carry a `group_id` (processed reports).
    pub fn find_group(
        &self,
        new_report: &ClusterReport,
        existing_reports: &[ClusterReport],
    ) -> DedupeResult {
        if existing_reports.is_empty() {
            return DedupeResult {
                group_id: 1,
                is_duplicate: false,
                similarity_score: 0.0,
                matched_ids: Vec::new(),
                reason: "first report in database".to_string(),
            };
        }

        let mut best_match: Option<&ClusterReport> = None;
        let mut best_score = 0.0_f64;
        let mut matched_ids = Vec::new();

        for existing in existing_reports {
            let similarity = self.combined_similarity(new_report, existing);
            if similarity >= COMBINED_THRESHOLD {
                matched_ids.push(existing.id);
                if similarity > best_score {
                    best_score = similarity;
                    best_match = Some(existing);
                }
            }
        }

        match best_match {
            Some(best) => {
                let mut parts = Vec::new();

                let spatial = self.spatial_similarity(new_report, best);
                if spatial > 0.7 {
                    let distance = haversine_km(new_report.lat, new_report.lon, best.lat, best.lon);
                    parts.push(format!("same location ({distance:.1}km apart)"));
                }

                let temporal = self.temporal_similarity(new_report, best);
                if temporal > 0.7 {
                    if let (Some(a), Some(b)) = (new_report.timestamp, best.timestamp) {
                        let diff = (b - a).num_seconds().unsigned_abs() as f64 / 60.0;
                        parts.push(format!("similar time ({diff:.0}min apart)"));
                    }
                }

                let textual = self.textual_similarity(new_report, best);
                if textual > 0.4 {
                    parts.push(format!("similar description ({textual:.2} similarity)"));
                }

                DedupeResult {
                    group_id: best.group_id.unwrap_or(best.id),
                    is_duplicate: true,
                    similarity_score: best_score,
                    matched_ids,
                    reason: parts.join("; "),
                }
            }
            None => {
                let max_group_id = existing_reports
                    .iter()
                    .map(|r| r.group_id.unwrap_or(r.id))
                    .max()
                    .unwrap_or(0);
                DedupeResult {
                    group_id: max_group_id + 1,
                    is_duplicate: false,
                    similarity_score: best_score,
                    matched_ids: Vec::new(),
                    reason: "unique report - no duplicates found".to_string(),
                }
            }
        }
    }

    pub fn group_statistics(&self, group_reports: &[ClusterReport]) -> GroupStatistics {
        if group_reports.is_empty() {
            return GroupStatistics {
                count: 0,
                centroid_lat: 0.0,
                centroid_lon: 0.0,
                earliest: None,
                latest: None,
                source_distribution: HashMap::new(),
                unique_descriptions: Vec::new(),
            };
        }

        let n = group_reports.len() as f64;
        let centroid_lat = group_reports.iter().map(|r| r.lat).sum::<f64>() / n;
        let centroid_lon = group_reports.iter().map(|r| r.lon).sum::<f64>() / n;

        let earliest = group_reports.iter().filter_map(|r| r.timestamp).min();
        let latest = group_reports.iter().filter_map(|r| r.timestamp).max();

        let mut source_distribution = HashMap::new();
        for r in group_reports {
            *source_distribution.entry(r.source.to_string()).or_insert(0) += 1;
        }

        let mut unique_descriptions: Vec<String> = group_reports
            .iter()
            .map(|r| r.text.clone())
            .filter(|t| !t.is_empty())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        unique_descriptions.truncate(5);

        GroupStatistics {
            count: group_reports.len(),
            centroid_lat,
            centroid_lon,
            earliest,
            latest,
            source_distribution,
            unique_descriptions,
        }
    }
}

fn jaccard_similarity(text1: &str, text2: &str) -> f64 {
    if text1.is_empty() || text2.is_empty() {
        return 0.0;
    }

    let tokens1 = tokenize_for_similarity(text1);
    let tokens2 = tokenize_for_similarity(text2);

    if tokens1.is_empty() && tokens2.is_empty() {
        return 1.0;
    }
    if tokens1.is_empty() || tokens2.is_empty() {
        return 0.0;
    }

    let intersection = tokens1.intersection(&tokens2).count();
    let union = tokens1.union(&tokens2).count();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
