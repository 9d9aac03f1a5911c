//! CLI configuration discovery.

use anyhow::{Context, Result};
use juris_orchestrator::EngineConfig;
use std::path::Path;
use tracing::debug;

/// Configuration file picked up from the working directory.
pub const LOCAL_CONFIG: &str = "juris.toml";

/// Load the engine configuration.
///
/// Precedence:
/// 1. `--config <path>` (must exist)
/// 2. `./juris.toml`
/// 3. Defaults
pub fn load(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "Loading configuration");
        return EngineConfig::load(path).with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let local = Path::new(LOCAL_CONFIG);
    if local.is_file() {
        debug!(path = LOCAL_CONFIG, "Loading local configuration");
        return EngineConfig::load(local).with_context(|| format!("Failed to load {}", LOCAL_CONFIG));
    }

    Ok(EngineConfig::default())
}
