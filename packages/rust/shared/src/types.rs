//! Core domain types for the pressgang record pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the record store.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for record identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a new time-sortable record identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Stage / StageStatus
// ---------------------------------------------------------------------------

/// The four flag-owning pipeline stages, in dependency order.
///
/// Discovery is not listed: it creates records rather than advancing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquire,
    Extract,
    Synthesize,
    Package,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [
        Stage::Acquire,
        Stage::Extract,
        Stage::Synthesize,
        Stage::Package,
    ];

    /// Stable identifier used in logs, errors, and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Extract => "extract",
            Self::Synthesize => "synthesize",
            Self::Package => "package",
        }
    }

    /// The stage whose completion gates this one, if any.
    pub fn prerequisite(&self) -> Option<Stage> {
        match self {
            Self::Acquire => None,
            Self::Extract => Some(Self::Acquire),
            Self::Synthesize => Some(Self::Extract),
            Self::Package => Some(Self::Synthesize),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "acquire" => Ok(Self::Acquire),
            "extract" => Ok(Self::Extract),
            "synthesize" => Ok(Self::Synthesize),
            "package" => Ok(Self::Package),
            other => Err(format!(
                "unknown stage {other:?}; expected acquire, extract, synthesize, or package"
            )),
        }
    }
}

/// Three-state completion marker for a single stage.
///
/// `Failed` is terminal: the record is excluded from future batches for
/// that stage until an operator resets it. A `Pending` record with a
/// populated `last_error` has been attempted and hit a transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Done,
    Failed,
}

impl StageStatus {
    /// Integer encoding used in the record store.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Done => 1,
            Self::Failed => 2,
        }
    }

    /// Decode the store's integer encoding.
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::Done),
            2 => Some(Self::Failed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Whether a stage failure should be retried on the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network, timeout, rate limit: record stays eligible.
    Transient,
    /// Malformed input, unparseable output: record is marked terminal.
    Permanent,
}

/// Structured failure stored on the record (`last_error` column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentFacts
// ---------------------------------------------------------------------------

/// Structured payload produced by the extraction stage.
///
/// All fields are optional or defaulted: providers frequently omit keys,
/// and the synthesis stage is required to fill gaps with labeled
/// estimates rather than reject the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ContentFacts {
    /// True when every field is absent or empty.
    pub fn is_empty(&self) -> bool {
        self.application_fee.is_none()
            && self.processing_time.is_none()
            && self.requirements.is_empty()
            && self.steps.is_empty()
            && self.evidence.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The unit of pipeline work.
///
/// Stage flags are independent columns, not one enum: a record can be
/// re-entered at any stage without losing progress elsewhere.
#[derive(Debug, Clone)]
pub struct Record {
    /// Store-assigned identifier, immutable after insert.
    pub id: String,
    /// Unique slug derived from `subject`; the upsert/idempotence key.
    pub key: String,
    /// Free-text topic description.
    pub subject: String,
    /// Classification, inherited from seed context when not derivable.
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub acquire_status: StageStatus,
    pub extract_status: StageStatus,
    pub synthesize_status: StageStatus,
    pub package_status: StageStatus,
    /// Blob-store key of the acquired source document.
    pub raw_artifact_ref: Option<String>,
    /// Structured extraction output.
    pub facts: Option<ContentFacts>,
    /// Synthesized article content.
    pub final_content: Option<String>,
    /// Public URL of the packaged report.
    pub artifact_url: Option<String>,
    /// Most recent failure, overwritten on every failed attempt.
    pub last_error: Option<StageError>,
    /// Used for stale-first ordering and the conditional claim.
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Status of the given stage on this record.
    pub fn status_for(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Acquire => self.acquire_status,
            Stage::Extract => self.extract_status,
            Stage::Synthesize => self.synthesize_status,
            Stage::Package => self.package_status,
        }
    }

    /// Whether the stage's prerequisite chain is satisfied.
    pub fn eligible_for(&self, stage: Stage) -> bool {
        if self.status_for(stage) != StageStatus::Pending {
            return false;
        }
        match stage.prerequisite() {
            Some(prev) => self.status_for(prev) == StageStatus::Done,
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// SeedCandidate
// ---------------------------------------------------------------------------

/// A discovered subject ready to be upserted into the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedCandidate {
    pub subject: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

/// Derive the unique record key from a subject string.
///
/// Lower-cases, collapses every run of non-alphanumeric characters to a
/// single `-`, and trims separators. Pure and deterministic: the same
/// subject always yields the same key, which is what makes repeated
/// discovery runs collapse into a single record.
pub fn slugify(subject: &str) -> String {
    let mut out = String::with_capacity(subject.len());
    let mut pending_sep = false;

    for c in subject.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    out
}
