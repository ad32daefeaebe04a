//! Keyword-based hazard classifier.
//!
//! A pure value object: construct once, call [`Classifier::classify`] per
//! report. No I/O, no shared mutable state — safe to share across worker
//! tasks or construct fresh in each test.

use hazardwatch_common::{HazardKind, SourceKind};

const FLOOD_KEYWORDS: &[&str] = &[
    "flood", "flooding", "water level", "overflow", "inundation", "waterlogged", "submerg",
    "drain", "sewage", "rain", "monsoon", "deluge", "torrent", "heavy rain", "downpour",
    "cloudburst", "river overflow", "flash flood", "urban flooding", "street flooding",
    "water rising", "high water", "baarish", "paani", "sel", "jal", "baadh",
];

const TSUNAMI_KEYWORDS: &[&str] = &[
    "tsunami", "tidal wave", "sea surge", "ocean wave", "seismic wave", "underwater earthquake",
    "sea level rise", "giant wave", "wall of water", "abnormal wave", "huge wave", "tidal surge",
    "sea wall", "marine surge", "oceanic wave", "mega wave", "killer wave", "harbor wave",
    "sunami", "samudri lahar", "samudri toofan",
];

const TIDES_KEYWORDS: &[&str] = &[
    "high tide", "low tide", "tidal surge", "tidal flooding", "abnormal tide", "spring tide",
    "neap tide", "tide level", "tidal bore", "tidal wave", "unusual tide", "extreme tide",
    "king tide", "storm tide", "tidal current", "tide height", "tidal inundation",
    "coastal surge", "tidal overflow", "jowar", "bhata", "samudri lehren",
];

const EARTHQUAKE_KEYWORDS: &[&str] = &[
    "earthquake", "tremor", "quake", "seismic", "ground shaking", "earth tremor", "shaking",
    "vibration", "ground movement", "fault", "epicenter", "aftershock", "richter", "magnitude",
    "building shake", "ground shake", "seismic activity", "tectonic", "trembling",
    "earth movement", "foreshock", "mainshock", "bhukamp", "zameen hilna", "kampan",
    "dharti hilna",
];

const LANDSLIDE_KEYWORDS: &[&str] = &[
    "landslide", "landslip", "mudslide", "rockslide", "slope failure", "mass wasting",
    "debris flow", "rock fall", "cliff collapse", "soil erosion", "hill collapse",
    "mountain slide", "embankment failure", "slope instability", "avalanche", "mudflow",
    "earth movement", "ground collapse", "subsidence", "bhooskalan", "pahad girna",
    "mitti ka khisakna", "zameen dhansna",
];

/// Kind/keyword-list pairs in tie-break listing order.
const HAZARD_TABLE: &[(HazardKind, &[&str])] = &[
    (HazardKind::Flood, FLOOD_KEYWORDS),
    (HazardKind::Tsunami, TSUNAMI_KEYWORDS),
    (HazardKind::Tides, TIDES_KEYWORDS),
    (HazardKind::Earthquake, EARTHQUAKE_KEYWORDS),
    (HazardKind::Landslide, LANDSLIDE_KEYWORDS),
];

const HIGH_SEVERITY_KEYWORDS: &[&str] = &[
    "emergency", "urgent", "critical", "severe", "dangerous", "trapped", "injured",
    "casualties", "death", "rescue", "evacuate", "siren",
];

const MEDIUM_SEVERITY_KEYWORDS: &[&str] =
    &["warning", "alert", "caution", "moderate", "rising", "increasing"];

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOutput {
    pub kind: HazardKind,
    pub confidence: f64,
    pub severity_boost: i32,
    pub keywords: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Classifier;

impl Classifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(
        &self,
        text: &str,
        source: &SourceKind,
        has_media: bool,
        media_verified: bool,
    ) -> ClassifierOutput {
        if text.trim().is_empty() {
            return ClassifierOutput {
                kind: HazardKind::Unknown,
                confidence: 0.1,
                severity_boost: 0,
                keywords: Vec::new(),
            };
        }

        let (kind, base_confidence, keywords) = self.extract_hazard_type(text);
        let confidence = apply_progressive_confidence(base_confidence, source);
        let confidence = apply_media_boost(confidence, has_media, media_verified);
        let severity_boost = self.extract_severity_boost(text);

        ClassifierOutput {
            kind,
            confidence,
            severity_boost,
            keywords,
        }
    }

    /// Fixed override used by the emergency-beacon fast path (§4.5); bypasses
    /// keyword scoring entirely.
    pub fn classify_emergency_beacon(&self) -> ClassifierOutput {
        ClassifierOutput {
            kind: HazardKind::Emergency,
            confidence: 0.99,
            severity_boost: 2,
            keywords: vec!["sos".to_string(), "emergency".to_string()],
        }
    }

    fn extract_hazard_type(&self, text: &str) -> (HazardKind, f64, Vec<String>) {
        let preprocessed = hazardwatch_common::text::preprocess(text);

        let mut best: Option<(HazardKind, i64, Vec<String>)> = None;
        for &(kind, keywords) in HAZARD_TABLE {
            let mut score: i64 = 0;
            let mut found = Vec::new();
            for &keyword in keywords {
                let exact_matches = preprocessed.matches(keyword).count() as i64;
                if exact_matches > 0 {
                    score += exact_matches * 2;
                    found.push(keyword.to_string());
                } else if preprocessed.contains(keyword) {
                    score += 1;
                    found.push(keyword.to_string());
                }
            }
            if score > 0 {
                let better = match &best {
                    None => true,
                    Some((_, best_score, _)) => score > *best_score,
                };
                if better {
                    best = Some((kind, score, found));
                }
            }
        }

        match best {
            None => (HazardKind::Unknown, 0.3, Vec::new()),
            Some((kind, score, found)) => {
                let confidence = (0.4 + score as f64 * 0.05).min(0.7);
                (kind, confidence, found)
            }
        }
    }

    fn extract_severity_boost(&self, text: &str) -> i32 {
        let preprocessed = hazardwatch_common::text::preprocess(text);
        let mut boost = 0;

        if HIGH_SEVERITY_KEYWORDS.iter().any(|k| preprocessed.contains(k)) {
            boost += 2;
        }
        if MEDIUM_SEVERITY_KEYWORDS.iter().any(|k| preprocessed.contains(k)) {
            boost += 1;
        }

        boost.min(2)
    }
}

fn apply_progressive_confidence(base_confidence: f64, source: &SourceKind) -> f64 {
    let scaled = match source {
        SourceKind::Incois => base_confidence * 0.80,
        SourceKind::Lora => base_confidence * 0.95,
        SourceKind::Social => base_confidence * 0.20,
        SourceKind::Citizen | SourceKind::Other(_) => base_confidence * 0.25,
    };

    match source {
        SourceKind::Citizen | SourceKind::Social | SourceKind::Other(_) => scaled.clamp(0.08, 0.35),
        SourceKind::Incois => scaled.clamp(0.50, 0.85),
        SourceKind::Lora => scaled.clamp(0.29, 0.95),
    }
}

fn apply_media_boost(confidence: f64, has_media: bool, media_verified: bool) -> f64 {
    if !has_media {
        return confidence;
    }
    if media_verified {
        (confidence + 0.60).min(0.95)
    } else {
        (confidence + 0.15).min(0.70)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new()
    }

    #[test]
    fn empty_text_is_unknown_low_confidence() {
        let out = classifier().classify("", &SourceKind::Citizen, false, false);
        assert_eq!(out.kind, HazardKind::Unknown);
        assert_eq!(out.confidence, 0.1);
        assert_eq!(out.severity_boost, 0);
        assert!(out.keywords.is_empty());
    }

    #[test]
    fn whitespace_only_text_is_unknown() {
        let out = classifier().classify("   \n\t ", &SourceKind::Citizen, false, false);
        assert_eq!(out.kind, HazardKind::Unknown);
        assert_eq!(out.confidence, 0.1);
    }

    #[test]
    fn citizen_flood_report_stays_in_low_band() {
        let out = classifier().classify(
            "flooding near marina, water rising fast",
            &SourceKind::Citizen,
            false,
            false,
        );
        assert_eq!(out.kind, HazardKind::Flood);
        assert!(out.confidence >= 0.08 && out.confidence <= 0.35, "{}", out.confidence);
    }

    #[test]
    fn incois_source_gets_higher_band() {
        let out = classifier().classify(
            "flood warning issued for coastal district",
            &SourceKind::Incois,
            false,
            false,
        );
        assert_eq!(out.kind, HazardKind::Flood);
        assert!(out.confidence >= 0.50 && out.confidence <= 0.85, "{}", out.confidence);
    }

    #[test]
    fn verified_media_boosts_confidence_and_caps_at_095() {
        let unboosted = classifier().classify("earthquake felt strongly", &SourceKind::Citizen, false, false);
        let boosted = classifier().classify("earthquake felt strongly", &SourceKind::Citizen, true, true);
        assert!(boosted.confidence > unboosted.confidence);
        assert!(boosted.confidence <= 0.95);
    }

    #[test]
    fn unverified_media_boosts_less_and_caps_at_070() {
        let out = classifier().classify("earthquake felt strongly", &SourceKind::Citizen, true, false);
        assert!(out.confidence <= 0.70);
    }

    #[test]
    fn severity_boost_caps_at_two() {
        let out = classifier().classify(
            "emergency critical evacuate warning alert",
            &SourceKind::Citizen,
            false,
            false,
        );
        assert_eq!(out.severity_boost, 2);
    }

    #[test]
    fn no_keywords_yields_unknown_baseline() {
        let out = classifier().classify("the weather is nice today", &SourceKind::Citizen, false, false);
        assert_eq!(out.kind, HazardKind::Unknown);
        assert_eq!(out.confidence, (0.3_f64 * 0.25).clamp(0.08, 0.35));
    }

    #[test]
    fn emergency_beacon_override_is_fixed() {
        let out = classifier().classify_emergency_beacon();
        assert_eq!(out.kind, HazardKind::Emergency);
        assert_eq!(out.confidence, 0.99);
        assert_eq!(out.severity_boost, 2);
        assert_eq!(out.keywords, vec!["sos".to_string(), "emergency".to_string()]);
    }

    #[test]
    fn flood_beats_tsunami_on_tie_break_order() {
        // "sea wall" (tsunami) and "flood" (flood) each score once; flood
        // is listed first so wins a tie.
        let out = classifier().classify("flood near the sea wall", &SourceKind::Citizen, false, false);
        assert_eq!(out.kind, HazardKind::Flood);
    }
}
