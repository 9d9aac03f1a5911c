//! Configuration for the analysis cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration for the analysis cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Seconds a cached analysis stays valid (default: 604800 = 7 days).
    ///
    /// Keys are content-addressed, so a long TTL only delays the cleanup of
    /// keys nobody asks for anymore.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

/// Errors that can occur during cache configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheConfigError {
    /// Invalid TTL (must be > 0).
    #[error("Invalid cache TTL: must be greater than 0")]
    InvalidTtl,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: default_ttl_secs() }
    }
}

impl CacheConfig {
    /// Validate the cache configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.ttl_secs == 0 {
            return Err(CacheConfigError::InvalidTtl);
        }
        Ok(())
    }

    /// Get the entry TTL as a Duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
