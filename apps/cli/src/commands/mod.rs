//! Command implementations for the Juris CLI.

pub mod analyze;
pub mod config;
pub mod estimate;
pub mod invalidate;
pub mod key;
pub mod score;

use anyhow::{Context, Result};
use juris_abstraction::ModelExecutor;
use juris_models::{HttpExecutor, MockExecutor};
use juris_orchestrator::{AnalysisEngine, EngineConfig};
use juris_store::{Database, FsDocumentSource, SqliteJobStore, SqliteKvStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Picks the model executor: the HTTP endpoint when configured, otherwise
/// the offline mock.
pub fn build_executor(config: &EngineConfig) -> Result<Arc<dyn ModelExecutor>> {
    let model = &config.model;
    let Some(endpoint) = &model.endpoint else {
        debug!("No model endpoint configured, using the offline executor");
        return Ok(Arc::new(MockExecutor::new(model.version_tag.clone())));
    };

    let mut executor = HttpExecutor::new(model.version_tag.clone(), endpoint.clone(), model.timeout())
        .context("Failed to create HTTP executor")?;
    match std::env::var(&model.api_key_env) {
        Ok(key) if !key.is_empty() => executor = executor.with_api_key(key),
        _ => warn!(env = %model.api_key_env, "No API key set; calling the endpoint unauthenticated"),
    }
    Ok(Arc::new(executor))
}

/// Opens the shared database and builds an engine over the documents in `root`.
pub fn build_engine(config: &EngineConfig, db_path: &Path, root: &Path) -> Result<AnalysisEngine> {
    let db = Database::open(db_path).with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let engine = AnalysisEngine::new(
        config,
        build_executor(config)?,
        Arc::new(SqliteKvStore::new(db.clone())),
        Arc::new(SqliteJobStore::new(db)),
        Arc::new(FsDocumentSource::new(root)),
    )
    .context("Failed to create analysis engine")?;
    Ok(engine)
}

/// Reads a document for the single-file commands. Returns the text and its
/// size in megabytes.
pub async fn read_document(path: &Path) -> Result<(String, f64)> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("Failed to read {}", path.display()))?;
    let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
    Ok((String::from_utf8_lossy(&bytes).into_owned(), size_mb))
}
