//! In-process implementations of the shared stores.
//!
//! These are the reference semantics for `KeyValueStore` and `JobStore`.
//! Sharing one instance behind an `Arc` between tasks models a set of
//! workers talking to the same external store.

use async_trait::async_trait;
use chrono::Utc;
use juris_abstraction::{
    AnalysisJob, AnalysisType, AnalysisVersion, JobStatus, JobStore, KeyValueStore, NewJob,
    NewVersion, StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Key-value store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    offline: AtomicBool,
}

impl MemoryKvStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with `StoreError::Unavailable`
    /// until called again with `false`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of keys with a live value.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|v| v.is_live(now))
            .count()
    }

    /// Whether no key holds a live value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    /// Runs `f` on the map after dropping the entry for `key` if it has expired.
    fn with_live<T>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, StoredValue>) -> T) -> Result<T, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(|v| !v.is_live(now)) {
            entries.remove(key);
        }
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_live(key, |entries| entries.get(key).map(|v| v.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.with_live(key, |entries| {
            entries.insert(key.to_string(), StoredValue { value, expires_at });
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.with_live(key, |entries| entries.remove(key).is_some())
    }

    async fn set_if_not_exists(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let expires_at = Some(Instant::now() + ttl);
        self.with_live(key, |entries| {
            if entries.contains_key(key) {
                false
            } else {
                entries.insert(key.to_string(), StoredValue { value, expires_at });
                true
            }
        })
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.with_live(key, |entries| {
            if entries.get(key).is_some_and(|v| v.value == expected) {
                entries.remove(key);
                true
            } else {
                false
            }
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        self.with_live(key, |entries| {
            entries
                .get(key)
                .and_then(|v| v.expires_at)
                .map(|at| at.saturating_duration_since(now))
        })
    }
}

/// Job and version store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, AnalysisJob>>,
    versions: Mutex<Vec<AnalysisVersion>>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job, oldest first.
    pub fn jobs(&self) -> Vec<AnalysisJob> {
        let mut jobs: Vec<AnalysisJob> = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Every version, in creation order.
    pub fn versions(&self) -> Vec<AnalysisVersion> {
        self.versions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: NewJob) -> Result<AnalysisJob, StoreError> {
        let record = AnalysisJob {
            id: Uuid::new_v4(),
            case_id: job.case_id,
            analysis_type: job.analysis_type,
            analysis_key: job.analysis_key,
            tier: job.tier,
            status: JobStatus::Queued,
            result_version_id: None,
            lock_token: job.lock_token,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result_version_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        if job.status.is_terminal() {
            return Err(StoreError::InvalidData(format!(
                "job {} is already {}",
                job_id,
                job.status.as_str()
            )));
        }
        job.status = status;
        if result_version_id.is_some() {
            job.result_version_id = result_version_id;
        }
        if status.is_terminal() {
            job.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        Ok(self.jobs.lock().unwrap_or_else(PoisonError::into_inner).get(&job_id).cloned())
    }

    async fn create_version(&self, version: NewVersion) -> Result<AnalysisVersion, StoreError> {
        let mut versions = self.versions.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = versions
            .iter()
            .filter(|v| v.case_id == version.case_id && v.analysis_type == version.analysis_type)
            .map(|v| v.version)
            .max();
        let record = AnalysisVersion::next(version, previous);
        versions.push(record.clone());
        Ok(record)
    }

    async fn latest_version(
        &self,
        case_id: &str,
        analysis_type: AnalysisType,
    ) -> Result<Option<AnalysisVersion>, StoreError> {
        Ok(self
            .versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|v| v.case_id == case_id && v.analysis_type == analysis_type)
            .max_by_key(|v| v.version)
            .cloned())
    }
}
