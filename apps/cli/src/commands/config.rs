//! Effective configuration command.

use anyhow::{Context, Result};
use juris_orchestrator::EngineConfig;

/// Execute config command.
pub fn execute(config: &EngineConfig) -> Result<()> {
    let rendered = config.to_toml_string().context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
