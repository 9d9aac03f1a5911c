//! CacheStore implementation over the shared key-value store.

use chrono::{DateTime, Utc};
use juris_abstraction::{KeyValueStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheConfigError};
use super::types::{CacheEntry, CacheNamespace, CacheStats};

/// Prefix of every cache key in the shared store.
pub const CACHE_PREFIX: &str = "cache";

/// Prefix of the access-metadata keys kept beside each entry.
pub const CACHE_META_PREFIX: &str = "cache-meta";

/// Read counters of one entry, stored apart from the payload.
///
/// `entry_created_at` ties the record to the entry it counts; a record left
/// over from a replaced or invalidated entry is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessRecord {
    entry_created_at: DateTime<Utc>,
    access_count: u64,
    last_accessed_at: DateTime<Utc>,
}

/// Analysis cache backed by a [`KeyValueStore`].
///
/// Entries are stored as JSON under `cache:<namespace>:<key>`. The store-level
/// TTL matches the entry TTL so unreachable keys age out on their own, and
/// reads additionally check `expires_at` (lazy expiry).
pub struct CacheStore {
    /// Shared backing store.
    kv: Arc<dyn KeyValueStore>,
    /// Cache configuration.
    config: CacheConfig,
    /// Cache statistics.
    stats: RwLock<CacheStats>,
}

impl CacheStore {
    /// Create a cache over `kv`.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(kv: Arc<dyn KeyValueStore>, config: CacheConfig) -> Result<Self, CacheConfigError> {
        config.validate()?;
        Ok(Self { kv, config, stats: RwLock::new(CacheStats::default()) })
    }

    /// Key under which `key` is stored in `namespace`.
    pub fn storage_key(key: &str, namespace: CacheNamespace) -> String {
        format!("{}:{}:{}", CACHE_PREFIX, namespace, key)
    }

    /// Key under which the read counters of `key` in `namespace` are stored.
    pub fn meta_key(key: &str, namespace: CacheNamespace) -> String {
        format!("{}:{}:{}", CACHE_META_PREFIX, namespace, key)
    }

    /// Default entry TTL.
    pub fn default_ttl(&self) -> Duration {
        self.config.ttl()
    }

    /// Look up an entry.
    ///
    /// An expired entry is deleted and reported as a miss. A hit bumps
    /// `access_count` and `last_accessed_at` in the entry's metadata key; the
    /// payload key is only ever written by [`Self::set`]. Entries that fail to
    /// decode are dropped and reported as a miss. Stale entries are removed
    /// with a compare-and-delete, so a concurrent `set` is never undone.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing store fails.
    pub async fn get(&self, key: &str, namespace: CacheNamespace) -> Result<Option<CacheEntry>, StoreError> {
        let storage_key = Self::storage_key(key, namespace);

        let Some(raw) = self.kv.get(&storage_key).await? else {
            self.record(|s| s.misses += 1);
            debug!(analysis_key = %key, namespace = %namespace, "Cache miss");
            return Ok(None);
        };

        let mut entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(analysis_key = %key, namespace = %namespace, error = %e, "Dropping undecodable cache entry");
                self.kv.compare_and_delete(&storage_key, &raw).await?;
                self.record(|s| s.misses += 1);
                return Ok(None);
            }
        };

        let now = Utc::now();
        if entry.is_expired(now) {
            self.kv.compare_and_delete(&storage_key, &raw).await?;
            self.record(|s| {
                s.misses += 1;
                s.expired += 1;
            });
            debug!(analysis_key = %key, namespace = %namespace, "Cache entry expired");
            return Ok(None);
        }

        let access = self.touch(key, namespace, &entry, now).await?;
        entry.access_count = access.access_count;
        entry.last_accessed_at = Some(access.last_accessed_at);

        self.record(|s| s.hits += 1);
        debug!(
            analysis_key = %key,
            namespace = %namespace,
            access_count = entry.access_count,
            "Cache hit"
        );
        Ok(Some(entry))
    }

    /// Bumps the read counters of `entry`. Counts are observability data:
    /// two overlapping hits may record one read.
    async fn touch(
        &self,
        key: &str,
        namespace: CacheNamespace,
        entry: &CacheEntry,
        now: DateTime<Utc>,
    ) -> Result<AccessRecord, StoreError> {
        let meta_key = Self::meta_key(key, namespace);
        let previous = self
            .kv
            .get(&meta_key)
            .await?
            .and_then(|raw| serde_json::from_slice::<AccessRecord>(&raw).ok())
            .filter(|record| record.entry_created_at == entry.created_at)
            .map_or(0, |record| record.access_count);

        let access = AccessRecord {
            entry_created_at: entry.created_at,
            access_count: previous + 1,
            last_accessed_at: now,
        };
        self.kv
            .set(&meta_key, serde_json::to_vec(&access)?, Some(entry.remaining_ttl(now)))
            .await?;
        Ok(access)
    }

    /// Store `payload`, replacing any entry for the key in `namespace`.
    ///
    /// `ttl = None` uses the configured default.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing store fails.
    pub async fn set(
        &self,
        key: &str,
        namespace: CacheNamespace,
        payload: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<CacheEntry, StoreError> {
        let ttl = ttl.unwrap_or_else(|| self.config.ttl());
        let entry = CacheEntry::new(key.to_string(), namespace, payload, ttl, Utc::now());

        self.kv
            .set(&Self::storage_key(key, namespace), serde_json::to_vec(&entry)?, Some(ttl))
            .await?;

        self.record(|s| s.writes += 1);
        info!(analysis_key = %key, namespace = %namespace, ttl_secs = ttl.as_secs(), "Cached analysis");
        Ok(entry)
    }

    /// Remove `key` from every namespace. Returns how many entries were removed.
    ///
    /// # Errors
    /// Returns `StoreError` if the backing store fails.
    pub async fn invalidate(&self, key: &str) -> Result<usize, StoreError> {
        let mut removed = 0;
        for namespace in CacheNamespace::all() {
            if self.kv.delete(&Self::storage_key(key, namespace)).await? {
                removed += 1;
            }
            self.kv.delete(&Self::meta_key(key, namespace)).await?;
        }

        self.record(|s| s.invalidations += removed as u64);
        info!(analysis_key = %key, removed, "Invalidated cache key");
        Ok(removed)
    }

    /// Snapshot of the statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        update(&mut self.stats.write().unwrap_or_else(PoisonError::into_inner));
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
