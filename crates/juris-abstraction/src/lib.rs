//! Collaborator abstraction layer for Juris.
//!
//! This crate defines the traits the analysis engine is built against: the
//! model executor, the shared key-value store backing the cache and the lock,
//! the job/version store, and the case document source. Concrete
//! implementations live in `juris-models` and `juris-store`.

pub mod error;
pub mod records;
pub mod tier;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub use error::{ErrorClass, ModelError, StoreError};
pub use records::{AnalysisJob, AnalysisVersion, Document, JobStatus, NewJob, NewVersion};
pub use tier::{AnalysisType, ParseNameError, Tier};

/// The output of one successful model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Structured analysis returned by the model.
    pub payload: serde_json::Value,
    /// Tokens billed for the prompt and documents.
    pub input_tokens: u64,
    /// Tokens billed for the response.
    pub output_tokens: u64,
}

/// Executes an analysis prompt against a model tier.
///
/// Implementations have nondeterministic latency and fail with a classified
/// [`ModelError`]. Executors must be `Send + Sync` so a single instance can be
/// shared across concurrent requests.
#[async_trait]
pub trait ModelExecutor: Send + Sync {
    /// Runs `prompt_template` over `text` at `tier`.
    ///
    /// # Errors
    /// Returns a `ModelError` describing why the call failed.
    async fn invoke(
        &self,
        text: &str,
        tier: Tier,
        prompt_template: &str,
    ) -> Result<ModelOutput, ModelError>;

    /// Returns an identifier for logs.
    fn executor_id(&self) -> &str;
}

/// Shared key-value store used for both the cache and the lock.
///
/// Every operation is atomic for a single key. No operation spans keys.
/// Expired keys behave as absent for every method.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a value, replacing any existing one. `ttl = None` never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Deletes a key. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Writes `value` only if `key` holds no live value. Returns whether it wrote.
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Deletes `key` only if it currently holds `expected`. Returns whether it deleted.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

    /// Remaining time to live. `None` if the key is absent or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}

/// Append-only persistence for jobs and analysis versions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a job in [`JobStatus::Queued`].
    async fn create_job(&self, job: NewJob) -> Result<AnalysisJob, StoreError>;

    /// Moves a job to `status`, recording the produced version if any.
    ///
    /// Terminal states stamp `finished_at`.
    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result_version_id: Option<Uuid>,
    ) -> Result<(), StoreError>;

    /// Fetches a job.
    async fn get_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError>;

    /// Appends the next version for the case and analysis type.
    async fn create_version(&self, version: NewVersion) -> Result<AnalysisVersion, StoreError>;

    /// Returns the highest-numbered version for the case and analysis type.
    async fn latest_version(
        &self,
        case_id: &str,
        analysis_type: AnalysisType,
    ) -> Result<Option<AnalysisVersion>, StoreError>;
}

/// Read-only access to case documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Returns every document of the case.
    async fn get_documents(&self, case_id: &str) -> Result<Vec<Document>, StoreError>;

    /// Returns the time of the latest authoritative change to the case
    /// (e.g. a new docket movement), or `None` if none was ever recorded.
    async fn last_mutation_at(&self, case_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
}
