use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a report originated. Unknown strings are preserved verbatim and
/// treated as the lowest-trust tier everywhere a source weight is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Incois,
    Lora,
    Citizen,
    Social,
    Other(String),
}

impl Serialize for SourceKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SourceKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SourceKind::from_str(&s).expect("SourceKind::from_str is infallible"))
    }
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::Incois => "incois",
            SourceKind::Lora => "lora",
            SourceKind::Citizen => "citizen",
            SourceKind::Social => "social",
            SourceKind::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "incois" => SourceKind::Incois,
            "lora" | "lora_sos" => SourceKind::Lora,
            "citizen" => SourceKind::Citizen,
            "social" | "social_media" => SourceKind::Social,
            other => SourceKind::Other(other.to_string()),
        })
    }
}

/// Closed set of hazard kinds the classifier and fusion engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Flood,
    Tsunami,
    Tides,
    Earthquake,
    Landslide,
    Emergency,
    Unknown,
}

impl HazardKind {
    /// Tie-break priority used by consensus voting: higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            HazardKind::Emergency => 6,
            HazardKind::Tsunami => 5,
            HazardKind::Earthquake => 4,
            HazardKind::Landslide => 3,
            HazardKind::Flood => 2,
            HazardKind::Tides => 1,
            HazardKind::Unknown => 0,
        }
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HazardKind::Flood => "flood",
            HazardKind::Tsunami => "tsunami",
            HazardKind::Tides => "tides",
            HazardKind::Earthquake => "earthquake",
            HazardKind::Landslide => "landslide",
            HazardKind::Emergency => "emergency",
            HazardKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for HazardKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "flood" => HazardKind::Flood,
            "tsunami" => HazardKind::Tsunami,
            "tides" => HazardKind::Tides,
            "earthquake" => HazardKind::Earthquake,
            "landslide" => HazardKind::Landslide,
            "emergency" => HazardKind::Emergency,
            _ => HazardKind::Unknown,
        })
    }
}

/// Lifecycle status of a `HazardEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardStatus {
    Review,
    Pending,
    Confirmed,
    Emergency,
    /// Administrator-confirmed; pinned, automated fuses no longer alter status/confidence.
    Approved,
    /// Administrator-rejected; pinned, automated fuses no longer alter status/confidence.
    Rejected,
}

impl HazardStatus {
    /// Administrator decisions and automated fuses both produce a status, but
    /// only the administrator's decision is pinned.
    pub fn is_pinned(&self) -> bool {
        matches!(self, HazardStatus::Approved | HazardStatus::Rejected)
    }
}

impl fmt::Display for HazardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HazardStatus::Review => "review",
            HazardStatus::Pending => "pending",
            HazardStatus::Confirmed => "confirmed",
            HazardStatus::Emergency => "emergency",
            HazardStatus::Approved => "approved",
            HazardStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

impl FromStr for HazardStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "review" => HazardStatus::Review,
            "pending" => HazardStatus::Pending,
            "confirmed" => HazardStatus::Confirmed,
            "emergency" => HazardStatus::Emergency,
            "approved" => HazardStatus::Approved,
            "rejected" => HazardStatus::Rejected,
            _ => return Err(()),
        })
    }
}

/// Administrator decision applied via the validation hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationDecision {
    Approved,
    Rejected,
}

/// A single geolocated observation from one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
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

    // Derived, written once by the pipeline.
    pub nlp_kind: Option<HazardKind>,
    pub nlp_conf: Option<f64>,
    pub credibility: Option<f64>,
    pub group_id: Option<i64>,
    pub processed: bool,
}

impl Report {
    pub fn description(&self) -> &str {
        self.text.as_str()
    }
}

/// The fused, user-visible representation of a group of reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardEvent {
    pub id: i64,
    pub group_id: i64,
    pub kind: HazardKind,
    pub confidence: f64,
    pub severity: u8,
    pub status: HazardStatus,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub priority_score: f64,
    pub evidence: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only input used only for report-side correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bulletin {
    pub id: i64,
    pub issued_at: DateTime<Utc>,
    pub hazard_kind: HazardKind,
    pub severity: u8,
    pub description: String,
}
