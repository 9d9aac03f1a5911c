//! Single-flight lock over the shared key-value store.
//!
//! Acquisition is one `set_if_not_exists` with expiry; release is a
//! `compare_and_delete` on the owner token, so a caller whose lock already
//! expired can never remove a lock someone else acquired since. There is no
//! renewal: the TTL must comfortably exceed the longest computation.

use chrono::{DateTime, Utc};
use juris_abstraction::{KeyValueStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every lock key in the shared store.
pub const LOCK_PREFIX: &str = "lock";

/// Lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockConfig {
    /// Seconds before an unreleased lock expires (default: 1800 = 30 minutes).
    ///
    /// Must exceed `max_attempts` times the slowest model call plus the full
    /// backoff budget, otherwise a slow holder loses its lock mid-computation.
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_lock_ttl_secs() -> u64 {
    30 * 60
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { ttl_secs: default_lock_ttl_secs() }
    }
}

/// Errors that can occur during lock configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockConfigError {
    /// Invalid TTL (must be > 0).
    #[error("Invalid lock TTL: must be greater than 0")]
    InvalidTtl,
}

impl LockConfig {
    /// Validate the lock configuration.
    ///
    /// # Errors
    /// Returns `LockConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), LockConfigError> {
        if self.ttl_secs == 0 {
            return Err(LockConfigError::InvalidTtl);
        }
        Ok(())
    }

    /// Get the lock TTL as a Duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Proof of ownership of a held lock.
///
/// Keeps the key and token together so release never has to recover one
/// from the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    /// Analysis key the lock guards.
    pub key: String,
    /// Random owner token stored as the lock value.
    pub token: String,
    /// Acquisition time.
    pub acquired_at: DateTime<Utc>,
    /// TTL the lock was acquired with.
    pub ttl: Duration,
}

/// Outcome of a lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    /// This caller now owns the lock.
    Acquired(LockHandle),
    /// Another caller holds the lock.
    Busy {
        /// Remaining TTL of the current holder, at least 1.
        retry_after_secs: u64,
    },
}

impl LockAttempt {
    /// Whether the lock was acquired.
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockAttempt::Acquired(_))
    }
}

/// Distributed single-flight lock.
#[derive(Clone)]
pub struct DistributedLock {
    kv: Arc<dyn KeyValueStore>,
    config: LockConfig,
}

impl DistributedLock {
    /// Create a lock manager over `kv`.
    ///
    /// # Errors
    /// Returns `LockConfigError` if the configuration is invalid.
    pub fn new(kv: Arc<dyn KeyValueStore>, config: LockConfig) -> Result<Self, LockConfigError> {
        config.validate()?;
        Ok(Self { kv, config })
    }

    /// Key under which the lock for `key` is stored.
    pub fn storage_key(key: &str) -> String {
        format!("{}:{}", LOCK_PREFIX, key)
    }

    /// Configured lock TTL.
    pub fn default_ttl(&self) -> Duration {
        self.config.ttl()
    }

    /// Try to acquire the lock for `key` with the configured TTL.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing store fails.
    pub async fn try_acquire(&self, key: &str) -> Result<LockAttempt, StoreError> {
        self.try_acquire_with_ttl(key, self.config.ttl()).await
    }

    /// Try to acquire the lock for `key`, expiring after `ttl`.
    ///
    /// Among any number of concurrent callers exactly one gets `Acquired`.
    /// The others get `Busy` with the holder's remaining TTL.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing store fails.
    pub async fn try_acquire_with_ttl(&self, key: &str, ttl: Duration) -> Result<LockAttempt, StoreError> {
        let storage_key = Self::storage_key(key);
        let token = Uuid::new_v4().to_string();

        if self
            .kv
            .set_if_not_exists(&storage_key, token.clone().into_bytes(), ttl)
            .await?
        {
            info!(analysis_key = %key, ttl_secs = ttl.as_secs(), "Lock acquired");
            return Ok(LockAttempt::Acquired(LockHandle {
                key: key.to_string(),
                token,
                acquired_at: Utc::now(),
                ttl,
            }));
        }

        // The holder may release between the two calls; a vanished key still
        // means "try again shortly".
        let retry_after_secs = self
            .kv
            .ttl(&storage_key)
            .await?
            .map_or(1, |remaining| remaining.as_millis().div_ceil(1000).max(1) as u64);

        warn!(analysis_key = %key, retry_after_secs, "Lock contention");
        Ok(LockAttempt::Busy { retry_after_secs })
    }

    /// Release a held lock.
    ///
    /// Returns `false` if the lock had already expired or belongs to someone
    /// else; in that case nothing is deleted.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing store fails.
    pub async fn release(&self, handle: &LockHandle) -> Result<bool, StoreError> {
        self.release_token(&handle.key, &handle.token).await
    }

    /// Release the lock for `key` if it is held by `token`.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing store fails.
    pub async fn release_token(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        let released = self
            .kv
            .compare_and_delete(&Self::storage_key(key), token.as_bytes())
            .await?;

        if released {
            debug!(analysis_key = %key, "Lock released");
        } else {
            warn!(analysis_key = %key, "Lock was not held by this token at release");
        }
        Ok(released)
    }

    /// Token of the current holder, if any.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing store fails.
    pub async fn holder(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .kv
            .get(&Self::storage_key(key))
            .await?
            .map(|raw| String::from_utf8_lossy(&raw).into_owned()))
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(MemoryKvStore::new()), LockConfig::default()).unwrap()
    }

    #[test]
    fn test_lock_config() {
        assert_eq!(LockConfig::default().ttl(), Duration::from_secs(1800));
        assert_eq!(LockConfig { ttl_secs: 0 }.validate(), Err(LockConfigError::InvalidTtl));
    }

    #[tokio::test]
    async fn test_second_acquire_is_busy_with_remaining_ttl() {
        let lock = lock();
        let first = lock.try_acquire("key-1").await.unwrap();
        assert!(first.is_acquired());

        match lock.try_acquire("key-1").await.unwrap() {
            LockAttempt::Busy { retry_after_secs } => {
                assert!(retry_after_secs > 1790 && retry_after_secs <= 1800);
            }
            LockAttempt::Acquired(_) => panic!("lock acquired twice"),
        }

        assert!(lock.try_acquire("key-2").await.unwrap().is_acquired());
    }

    #[tokio::test]
    async fn test_release_with_foreign_token_is_noop() {
        let lock = lock();
        let LockAttempt::Acquired(handle) = lock.try_acquire("key-1").await.unwrap() else {
            panic!("expected lock");
        };

        assert!(!lock.release_token("key-1", "someone-else").await.unwrap());
        assert_eq!(lock.holder("key-1").await.unwrap(), Some(handle.token.clone()));

        assert!(lock.release(&handle).await.unwrap());
        assert!(lock.holder("key-1").await.unwrap().is_none());
        assert!(lock.try_acquire("key-1").await.unwrap().is_acquired());
    }

    #[tokio::test]
    async fn test_expired_holder_cannot_release_new_lock() {
        let lock = lock();
        let LockAttempt::Acquired(stale) = lock
            .try_acquire_with_ttl("key-1", Duration::from_millis(20))
            .await
            .unwrap()
        else {
            panic!("expected lock");
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let LockAttempt::Acquired(fresh) = lock.try_acquire("key-1").await.unwrap() else {
            panic!("expired lock should be reacquirable");
        };

        assert!(!lock.release(&stale).await.unwrap());
        assert_eq!(lock.holder("key-1").await.unwrap(), Some(fresh.token));
    }

    #[tokio::test]
    async fn test_lock_keys_use_their_own_prefix() {
        assert_eq!(DistributedLock::storage_key("abc"), "lock:abc");
    }
}
