//! Analysis result cache.
//!
//! A namespaced key → result store built on the shared key-value primitives.
//! Entries carry an expiry timestamp checked on read (lazy expiry) and
//! observable access counters; the payload of an entry never changes.

mod config;
mod store;
mod types;

pub use config::{CacheConfig, CacheConfigError};
pub use store::{CACHE_META_PREFIX, CACHE_PREFIX, CacheStore};
pub use types::{CacheEntry, CacheNamespace, CacheStats, MAX_STRATEGIC_BUCKET};
