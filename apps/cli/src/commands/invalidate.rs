//! Cache invalidation command.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use juris_abstraction::KeyValueStore;
use juris_orchestrator::EngineConfig;
use juris_store::{CacheStore, Database, SqliteKvStore};
use std::path::Path;
use std::sync::Arc;

/// Execute invalidate command.
pub async fn execute(config: &EngineConfig, db_path: &Path, key: &str) -> Result<()> {
    if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("'{}' is not an analysis key (expected 64 hex characters)", key);
    }

    let db = Database::open(db_path).with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let kv = Arc::new(SqliteKvStore::new(db));
    let cache = CacheStore::new(Arc::clone(&kv) as Arc<dyn KeyValueStore>, config.cache.clone())
        .context("Invalid cache configuration")?;

    let removed = cache.invalidate(key).await.context("Failed to invalidate cache entries")?;
    if removed == 0 {
        println!("{} No cached entries for {}", "ℹ".cyan(), key);
    } else {
        println!("{} Removed {} cached {} for {}", "✓".green(), removed, entries(removed), key);
    }

    // Expired rows are invisible to reads but still occupy the shared file.
    let purged = kv.purge_expired().await.context("Failed to purge expired entries")?;
    if purged > 0 {
        println!("{} Purged {} expired {}", "✓".green(), purged, entries(purged));
    }
    Ok(())
}

fn entries(count: usize) -> &'static str {
    if count == 1 { "entry" } else { "entries" }
}
