//! Core domain types for Regwatch: monitored sources, their snapshot history,
//! detected changes, and the scored findings derived from them.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegwatchError;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A monitored document. The locator (`url`) is unique across all sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Unique source identifier (UUID v7).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Document locator.
    pub url: String,
    /// Category/type tag (e.g. `scheme_rules`, `regulator`).
    pub kind: String,
    /// Inactive sources keep their history but are skipped by scans.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Outcome recorded for one fetch of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Success,
    Error,
}

impl SnapshotStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for SnapshotStatus {
    type Err = RegwatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(RegwatchError::validation(format!(
                "unknown snapshot status '{other}'"
            ))),
        }
    }
}

/// One immutable capture of a source's normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique snapshot identifier (UUID v7).
    pub id: String,
    /// Owning source.
    pub source_id: String,
    /// Normalized text content (empty for failed fetches).
    pub content: String,
    /// SHA-256 of `content` (empty for failed fetches).
    pub fingerprint: String,
    /// When the fetch completed.
    pub captured_at: DateTime<Utc>,
    pub status: SnapshotStatus,
    /// Human-readable failure detail when `status` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Snapshot {
    pub fn is_success(&self) -> bool {
        self.status == SnapshotStatus::Success
    }
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// A significant difference between two successful snapshots of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Unique change identifier (UUID v7).
    pub id: String,
    pub source_id: String,
    /// `None` only for records created without a baseline.
    pub prior_snapshot_id: Option<String>,
    pub new_snapshot_id: String,
    /// Full, unredacted unified diff.
    pub diff_text: String,
    pub detected_at: DateTime<Utc>,
    /// Flips to `true` exactly once, when a finding is recorded for it.
    pub processed: bool,
}

// ---------------------------------------------------------------------------
// Impact
// ---------------------------------------------------------------------------

/// Impact classification assigned by the extraction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    #[default]
    Medium,
    Low,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Impact {
    type Err = RegwatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(RegwatchError::validation(format!(
                "unknown impact level '{other}': expected high, medium, or low"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// Structured fields returned by the extraction service for one change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFinding {
    pub title: String,
    pub summary: String,
    pub deadline: Option<NaiveDate>,
    pub impact: Impact,
    /// Applicable category codes (e.g. merchant category codes).
    pub categories: Vec<String>,
    pub regions: Vec<String>,
    pub transaction_types: Vec<String>,
    pub technical_requirements: Vec<String>,
    pub keywords: Vec<String>,
}

/// A persisted, scored compliance finding. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Unique finding identifier (UUID v7).
    pub id: String,
    pub change_id: String,
    pub source_id: String,
    pub title: String,
    pub summary: String,
    pub deadline: Option<NaiveDate>,
    pub impact: Impact,
    pub categories: Vec<String>,
    pub regions: Vec<String>,
    pub transaction_types: Vec<String>,
    pub technical_requirements: Vec<String>,
    pub keywords: Vec<String>,
    /// Relevance to the consumer profile, 1–10.
    pub relevance_score: u8,
    pub created_at: DateTime<Utc>,
}

/// A finding joined with its owning source, as exposed to reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingRecord {
    #[serde(flatten)]
    pub finding: Finding,
    pub source_name: String,
    pub source_url: String,
}

// ---------------------------------------------------------------------------
// ConsumerProfile
// ---------------------------------------------------------------------------

/// The consumer a finding is scored against (`[profile]` in the config file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerProfile {
    /// Display name of the consumer.
    #[serde(default)]
    pub name: String,
    /// Category codes the consumer operates under.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Regions the consumer operates in.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Topics of interest.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ConsumerProfile {
    /// A profile with no categories, regions, or keywords can only score on impact.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.regions.is_empty() && self.keywords.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ScanStats
// ---------------------------------------------------------------------------

/// Aggregate counters for one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub sources_scanned: usize,
    /// Successful snapshots written this cycle.
    pub snapshots_saved: usize,
    pub changes_detected: usize,
    pub findings_created: usize,
    /// Fetch failures plus extraction failures.
    pub errors: usize,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

impl ScanStats {
    /// True when the cycle did no observable work.
    pub fn is_zero(&self) -> bool {
        self.sources_scanned == 0
            && self.snapshots_saved == 0
            && self.changes_detected == 0
            && self.findings_created == 0
            && self.errors == 0
    }
}
