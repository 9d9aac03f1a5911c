//! Engine configuration.
//!
//! Loaded from a TOML file. Every field has a default, so a partial file (or
//! no file at all) produces a working configuration.

use juris_store::{CacheConfig, LockConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::retry::RetryPolicy;
use crate::routing::{PricingTable, RoutingConfig};

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Model section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model version tag. Part of every analysis key.
    #[serde(default = "default_version_tag")]
    pub version_tag: String,
    /// Base URL of the HTTP model endpoint. Unset runs the offline executor.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the endpoint API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-call timeout in seconds (default: 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_version_tag() -> String {
    "juris-analysis-v1".to_string()
}

fn default_api_key_env() -> String {
    "JURIS_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            version_tag: default_version_tag(),
            endpoint: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelSettings {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Budget section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum estimated cost of one analysis in USD.
    #[serde(default)]
    pub max_cost_per_analysis: Option<f64>,
}

/// Root engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model settings.
    #[serde(default)]
    pub model: ModelSettings,
    /// Tier breakpoints and factor caps.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Tier pricing.
    #[serde(default)]
    pub pricing: PricingTable,
    /// Analysis cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Single-flight lock.
    #[serde(default)]
    pub lock: LockConfig,
    /// Retry and backoff.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Cost ceiling.
    #[serde(default)]
    pub budget: BudgetConfig,
}

impl EngineConfig {
    /// Loads and validates a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    /// Returns `ConfigError` if the text cannot be parsed or validated.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty TOML.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if a value has no TOML form.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// Checks every section.
    ///
    /// A lock TTL shorter than the worst-case computation is accepted but
    /// logged, since it can let a second worker start the same analysis.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.model.version_tag.trim().is_empty() {
            return invalid("model.version_tag must not be empty");
        }
        if self.model.timeout_secs == 0 {
            return invalid("model.timeout_secs must be greater than 0");
        }

        let routing = &self.routing;
        if !(0.0..=100.0).contains(&routing.balanced_min) || !(0.0..=100.0).contains(&routing.pro_min) {
            return invalid("routing breakpoints must be within 0-100");
        }
        if routing.balanced_min >= routing.pro_min {
            return invalid("routing.balanced_min must be below routing.pro_min");
        }
        if routing.chars_per_token == 0 {
            return invalid("routing.chars_per_token must be greater than 0");
        }
        for factor in crate::routing::ComplexityFactor::ALL {
            let cap = routing.caps.cap(factor);
            if !cap.is_finite() || cap < 0.0 {
                return invalid(&format!("routing.caps.{} must be a non-negative number", factor));
            }
        }

        for tier in juris_abstraction::Tier::ALL {
            let price = self.pricing.get(tier);
            if price.input_per_million < 0.0 || price.output_per_million < 0.0 {
                return invalid(&format!("pricing.{} must not be negative", tier));
            }
        }

        self.cache.validate().map_err(|e| ConfigError::Validation(format!("cache: {}", e)))?;
        self.lock.validate().map_err(|e| ConfigError::Validation(format!("lock: {}", e)))?;

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if retry.multiplier < 1.0 {
            return invalid("retry.multiplier must be at least 1.0");
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return invalid("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }

        if let Some(budget) = self.budget.max_cost_per_analysis {
            if !budget.is_finite() || budget <= 0.0 {
                return invalid("budget.max_cost_per_analysis must be a positive number");
            }
        }

        let worst_case = self.worst_case_computation();
        if self.lock.ttl() < worst_case {
            warn!(
                lock_ttl_secs = self.lock.ttl_secs,
                worst_case_secs = worst_case.as_secs(),
                "Lock TTL is shorter than the worst-case computation"
            );
        }

        Ok(())
    }

    /// Longest a computation can take: every attempt timing out plus the
    /// full backoff budget. Downgraded attempts add one call per tier step.
    pub fn worst_case_computation(&self) -> Duration {
        let calls = self.retry.max_attempts + (juris_abstraction::Tier::ALL.len() as u32 - 1);
        self.model.timeout() * calls + self.retry.total_backoff()
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(ConfigError::Validation(message.to_string()))
}
