//! Shared-store implementations for Juris.
//!
//! This crate provides the concrete collaborators behind the abstraction
//! traits and the two engine components built purely on the key-value
//! primitives.
//!
//! # Components
//!
//! - **CacheStore**: namespaced analysis cache with lazy expiry
//! - **DistributedLock**: single-flight lock with owner tokens
//!
//! # Backends
//!
//! - **Memory**: in-process stores for tests and single-process runs
//! - **SQLite**: one database file shared by every process on the host
//! - **Filesystem**: case documents read from a directory tree

pub mod cache;
pub mod documents;
pub mod lock;
pub mod memory;
pub mod sqlite;

pub use cache::{CacheConfig, CacheConfigError, CacheEntry, CacheNamespace, CacheStats, CacheStore};
pub use documents::{FsDocumentSource, content_hash};
pub use lock::{DistributedLock, LockAttempt, LockConfig, LockConfigError, LockHandle};
pub use memory::{MemoryJobStore, MemoryKvStore};
pub use sqlite::{Database, SqliteJobStore, SqliteKvStore};
