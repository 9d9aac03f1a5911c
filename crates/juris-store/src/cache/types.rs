//! Core data types for the analysis cache.

use chrono::{DateTime, TimeDelta, Utc};
use juris_abstraction::AnalysisType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Highest strategic bucket; scores are clamped to 0-100.
pub const MAX_STRATEGIC_BUCKET: u8 = 10;

/// Cache partition an entry lives in.
///
/// The namespace qualifies the key; it is not part of it. Strategic results
/// are further split by a coarse complexity bucket so that identical document
/// sets scored into materially different complexity do not share an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheNamespace {
    /// Low-cost results.
    Essential,
    /// Tier-scoped results, bucketed by `floor(score / 10)`.
    Strategic {
        /// Complexity bucket, 0 through [`MAX_STRATEGIC_BUCKET`].
        bucket: u8,
    },
    /// Long-form reports.
    Report,
}

impl CacheNamespace {
    /// Strategic namespace for a complexity score.
    #[must_use]
    pub fn strategic(total_score: f64) -> Self {
        let bucket = if total_score.is_finite() {
            (total_score.clamp(0.0, 100.0) / 10.0).floor() as u8
        } else {
            0
        };
        Self::Strategic { bucket: bucket.min(MAX_STRATEGIC_BUCKET) }
    }

    /// Namespace an analysis type caches under.
    #[must_use]
    pub fn for_analysis(analysis_type: AnalysisType, total_score: f64) -> Self {
        match analysis_type {
            AnalysisType::Essential => Self::Essential,
            AnalysisType::Strategic => Self::strategic(total_score),
            AnalysisType::Report => Self::Report,
        }
    }

    /// Every namespace a key can be stored under.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::Essential, Self::Report]
            .into_iter()
            .chain((0..=MAX_STRATEGIC_BUCKET).map(|bucket| Self::Strategic { bucket }))
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Essential => f.write_str("essential"),
            Self::Strategic { bucket } => write!(f, "strategic:{}", bucket),
            Self::Report => f.write_str("report"),
        }
    }
}

/// A cached analysis with access metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Analysis key.
    pub key: String,
    /// Partition the entry lives in.
    pub namespace: CacheNamespace,
    /// Stored result. Never changed after creation.
    pub payload: serde_json::Value,
    /// Timestamp when the entry was written.
    pub created_at: DateTime<Utc>,
    /// Timestamp after which reads treat the entry as absent.
    pub expires_at: DateTime<Utc>,
    /// Number of successful reads. Kept under the entry's metadata key and
    /// filled in on a hit; the stored entry itself always holds 0.
    pub access_count: u64,
    /// Timestamp of the last successful read.
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create a fresh entry expiring `ttl` after `now`.
    pub fn new(
        key: String,
        namespace: CacheNamespace,
        payload: serde_json::Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        Self {
            key,
            namespace,
            payload,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            access_count: 0,
            last_accessed_at: None,
        }
    }

    /// Whether the entry has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry, zero if already expired.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Record a read.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = Some(now);
    }
}

/// Cache statistics for observability.
///
/// Counted per process; not authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads that returned an entry.
    pub hits: u64,
    /// Reads that returned nothing, including expired entries.
    pub misses: u64,
    /// Entries removed lazily because they had expired.
    pub expired: u64,
    /// Entries written.
    pub writes: u64,
    /// Entries removed by explicit invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of reads that hit, 0.0 when nothing was read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}
