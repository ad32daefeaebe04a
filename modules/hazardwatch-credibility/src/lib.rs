//! Per-report credibility scoring: six weighted features combined into a
//! single `[0,1]` trust score, plus a human-readable explanation for
//! operator display. Pure value object, no I/O.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use hazardwatch_common::SourceKind;
use regex::Regex;

static REPEATED_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.)\1{4,}").unwrap());
static REPEATED_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+)\s+\1\b").unwrap());
static MULTI_BANG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!{3,}").unwrap());
static ALL_CAPS_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]{10,}").unwrap());

static NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").unwrap());
static TIME_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(morning|evening|afternoon|night|am|pm)\b").unwrap());
static LOCATION_PREPOSITIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(near|at|in|around|beside)\b").unwrap());
static MEASUREMENT_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(level|height|depth|speed)\b").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct CredibilityResult {
    pub score: f64,
    pub features: HashMap<&'static str, f64>,
    pub explanation: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CredibilityScorer;

const FEATURE_WEIGHTS: &[(&str, f64)] = &[
    ("source_reliability", 0.40),
    ("has_media", 0.15),
    ("gps_accuracy", 0.15),
    ("text_quality", 0.15),
    ("temporal_consistency", 0.10),
    ("past_accuracy", 0.05),
];

impl CredibilityScorer {
    pub fn new() -> Self {
        Self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn score(
        &self,
        source: &SourceKind,
        text: &str,
        lat: f64,
        lon: f64,
        timestamp: Option<DateTime<Utc>>,
        media_path: Option<&str>,
        gps_accuracy_m: Option<f64>,
        now: DateTime<Utc>,
    ) -> CredibilityResult {
        let mut features = HashMap::new();
        features.insert("source_reliability", score_source_reliability(source));
        features.insert("has_media", score_media_presence(media_path));
        features.insert("gps_accuracy", score_gps_accuracy(lat, lon, gps_accuracy_m));
        features.insert("text_quality", score_text_quality(text));
        features.insert(
            "temporal_consistency",
            score_temporal_consistency(timestamp, now),
        );
        features.insert("past_accuracy", score_past_accuracy());

        let mut total_score = 0.0;
        let mut total_weight = 0.0;
        for &(name, weight) in FEATURE_WEIGHTS {
            total_score += features[name] * weight;
            total_weight += weight;
        }
        let score = if total_weight > 0.0 {
            total_score / total_weight
        } else {
            0.0
        };

        let explanation = build_explanation(&features);

        CredibilityResult {
            score,
            features,
            explanation,
        }
    }
}

fn score_source_reliability(source: &SourceKind) -> f64 {
    match source {
        SourceKind::Incois => 1.0,
        SourceKind::Lora => 0.95,
        SourceKind::Citizen => 0.6,
        SourceKind::Social => 0.4,
        SourceKind::Other(_) => 0.3,
    }
}

fn score_media_presence(media_path: Option<&str>) -> f64 {
    match media_path {
        Some(p) if !p.trim().is_empty() => 0.8,
        _ => 0.2,
    }
}

fn decimal_places(value: f64) -> usize {
    let s = format!("{value}");
    match s.split_once('.') {
        Some((_, frac)) => frac.len(),
        None => 0,
    }
}

fn score_gps_accuracy(lat: f64, lon: f64, gps_accuracy_m: Option<f64>) -> f64 {
    if !hazardwatch_common::geo::in_range(lat, lon) {
        return 0.0;
    }

    let lat_precision = decimal_places(lat);
    let lon_precision = decimal_places(lon);

    if lat_precision > 8 || lon_precision > 8 {
        return 0.3;
    }
    if lat_precision < 2 || lon_precision < 2 {
        return 0.4;
    }

    if let Some(acc) = gps_accuracy_m {
        return if acc <= 20.0 {
            1.0
        } else if acc <= 50.0 {
            0.8
        } else if acc <= 100.0 {
            0.6
        } else {
            0.3
        };
    }

    0.7
}

fn score_text_quality(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let text_length = trimmed.chars().count();
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let word_count = words.len().max(1);

    let mut length_score: f64 = 0.0;
    if text_length >= 30 {
        length_score = 0.5;
    }
    if text_length >= 50 {
        length_score = 0.7;
    }
    if text_length >= 100 {
        length_score = 0.9;
    }
    if text_length > 500 {
        length_score = 0.6;
    }

    let unique_words: std::collections::HashSet<String> =
        words.iter().map(|w| w.to_lowercase()).collect();
    let diversity_score = (unique_words.len() as f64 / word_count as f64).min(1.0);

    let mut spam_penalty = 0.0;
    for re in [&*REPEATED_CHARS, &*REPEATED_WORDS, &*MULTI_BANG, &*ALL_CAPS_RUN] {
        if re.is_match(trimmed) {
            spam_penalty += 0.10;
        }
    }

    let lowered = trimmed.to_lowercase();
    let mut info_bonus = 0.0;
    for re in [&*NUMBERS, &*TIME_WORDS, &*LOCATION_PREPOSITIONS, &*MEASUREMENT_WORDS] {
        if re.is_match(&lowered) {
            info_bonus += 0.05;
        }
    }

    (length_score * 0.6 + diversity_score * 0.4 + info_bonus - spam_penalty).clamp(0.0, 1.0)
}

fn score_temporal_consistency(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(ts) = timestamp else {
        return 0.5;
    };

    if ts > now {
        return 0.1;
    }

    let diff_secs = (now - ts).num_seconds().unsigned_abs();
    if diff_secs <= 3_600 {
        1.0
    } else if diff_secs <= 86_400 {
        0.9
    } else if diff_secs <= 604_800 {
        0.7
    } else if diff_secs <= 2_592_000 {
        0.4
    } else {
        0.2
    }
}

fn score_past_accuracy() -> f64 {
    0.5
}

fn build_explanation(features: &HashMap<&'static str, f64>) -> String {
    let mut parts = Vec::new();

    let source_reliability = features["source_reliability"];
    if source_reliability >= 0.8 {
        parts.push("reliable source");
    } else if source_reliability <= 0.4 {
        parts.push("unreliable source");
    }

    if features["has_media"] >= 0.7 {
        parts.push("has media evidence");
    }

    let gps = features["gps_accuracy"];
    if gps >= 0.8 {
        parts.push("accurate location");
    } else if gps <= 0.4 {
        parts.push("poor location data");
    }

    let text_quality = features["text_quality"];
    if text_quality >= 0.7 {
        parts.push("detailed description");
    } else if text_quality <= 0.4 {
        parts.push("poor description quality");
    }

    let temporal = features["temporal_consistency"];
    if temporal >= 0.8 {
        parts.push("recent report");
    } else if temporal <= 0.4 {
        parts.push("outdated report");
    }

    if parts.is_empty() {
        "average credibility".to_string()
    } else {
        parts.join("; ")
    }
}
