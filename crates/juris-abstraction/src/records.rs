//! Records exchanged with the document source and the job store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tier::{AnalysisType, Tier};

/// A case document as delivered by the document source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Source-assigned document identifier.
    pub id: String,
    /// Hex digest of the document bytes.
    pub content_hash: String,
    /// Original file size.
    pub size_bytes: u64,
    /// Extracted plain text.
    pub text: String,
}

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, model call not started.
    Queued,
    /// Model call in flight.
    Running,
    /// Finished with a stored version.
    Completed,
    /// Finished without a result.
    Failed,
}

impl JobStatus {
    /// Whether the job can no longer change state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Status name as persisted.
    pub const fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parses a persisted status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Input for creating an analysis job.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Case the job belongs to.
    pub case_id: String,
    /// Requested analysis type.
    pub analysis_type: AnalysisType,
    /// Key the job computes.
    pub analysis_key: String,
    /// Tier selected at job creation.
    pub tier: Tier,
    /// Token of the lock guarding the computation.
    pub lock_token: String,
}

/// One attempt at computing an analysis key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Job identifier.
    pub id: Uuid,
    /// Case the job belongs to.
    pub case_id: String,
    /// Requested analysis type.
    pub analysis_type: AnalysisType,
    /// Key the job computes.
    pub analysis_key: String,
    /// Tier selected at job creation.
    pub tier: Tier,
    /// Current state.
    pub status: JobStatus,
    /// Version produced on completion.
    pub result_version_id: Option<Uuid>,
    /// Token of the lock guarding the computation.
    pub lock_token: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Input for appending an analysis version.
#[derive(Debug, Clone)]
pub struct NewVersion {
    /// Case the version belongs to.
    pub case_id: String,
    /// Analysis type of the result.
    pub analysis_type: AnalysisType,
    /// Key the result was computed for.
    pub analysis_key: String,
    /// Tier that produced the result.
    pub tier: Tier,
    /// Model output.
    pub payload: serde_json::Value,
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
    /// Cost in USD.
    pub cost: f64,
}

/// Immutable, numbered analysis result for a case.
///
/// Versions are append-only; a newer analysis gets a higher `version` rather
/// than replacing an old record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisVersion {
    /// Version identifier.
    pub id: Uuid,
    /// Case the version belongs to.
    pub case_id: String,
    /// Analysis type of the result.
    pub analysis_type: AnalysisType,
    /// Sequence number per case and analysis type, starting at 1.
    pub version: u32,
    /// Key the result was computed for.
    pub analysis_key: String,
    /// Tier that produced the result.
    pub tier: Tier,
    /// Model output.
    pub payload: serde_json::Value,
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
    /// Cost in USD.
    pub cost: f64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl AnalysisVersion {
    /// Builds the version that follows `previous` (or the first one).
    pub fn next(new: NewVersion, previous: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            case_id: new.case_id,
            analysis_type: new.analysis_type,
            version: previous.map_or(1, |v| v + 1),
            analysis_key: new.analysis_key,
            tier: new.tier,
            payload: new.payload,
            input_tokens: new.input_tokens,
            output_tokens: new.output_tokens,
            cost: new.cost,
            created_at: Utc::now(),
        }
    }
}
