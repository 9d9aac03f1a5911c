//! SQLite persistence.
//!
//! A single database file holds the key-value table behind the cache and the
//! lock, plus the job and version tables. Separate processes opening the same
//! file share one lock namespace.

mod database;
mod jobs;
mod kv;

pub use database::Database;
pub use jobs::SqliteJobStore;
pub use kv::SqliteKvStore;

use juris_abstraction::StoreError;

/// Maps a driver error onto the store taxonomy.
pub(crate) fn sql_error(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(format!("sqlite: {}", err))
}
