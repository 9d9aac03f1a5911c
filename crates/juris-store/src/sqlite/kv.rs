//! `KeyValueStore` over a SQLite table.
//!
//! Expiry is stored as an absolute wall-clock timestamp in milliseconds, so
//! every process sharing the file agrees on which keys are live. Compound
//! operations run inside `BEGIN IMMEDIATE` transactions, which SQLite
//! serializes across processes.

use async_trait::async_trait;
use chrono::Utc;
use juris_abstraction::{KeyValueStore, StoreError};
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use std::time::Duration;

use super::{Database, sql_error};

/// Live-row predicate shared by every query.
const LIVE: &str = "(expires_at_ms IS NULL OR expires_at_ms > ?2)";

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// SQLite-backed key-value store.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    db: Database,
}

impl SqliteKvStore {
    /// Wraps an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Deletes every expired row. Returns how many were removed.
    ///
    /// Reads already ignore expired rows; this only reclaims space.
    ///
    /// # Errors
    /// Returns `StoreError` if the database fails.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.db
            .call(|conn| {
                conn.execute(
                    "DELETE FROM kv_entries WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
                    params![now_ms()],
                )
                .map_err(sql_error)
            })
            .await
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT value FROM kv_entries WHERE key = ?1 AND {LIVE}"),
                    params![key, now_ms()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sql_error)
            })
            .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        let key = key.to_string();
        self.db
            .call(move |conn| {
                let expires = ttl.map(|ttl| expiry_ms(now_ms(), ttl));
                conn.execute(
                    "INSERT OR REPLACE INTO kv_entries (key, value, expires_at_ms) VALUES (?1, ?2, ?3)",
                    params![key, value, expires],
                )
                .map_err(sql_error)?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.db
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(sql_error)?;
                let removed = tx
                    .execute(
                        &format!("DELETE FROM kv_entries WHERE key = ?1 AND {LIVE}"),
                        params![key, now_ms()],
                    )
                    .map_err(sql_error)?;
                tx.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                    .map_err(sql_error)?;
                tx.commit().map_err(sql_error)?;
                Ok(removed > 0)
            })
            .await
    }

    async fn set_if_not_exists(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.db
            .call(move |conn| {
                let now = now_ms();
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(sql_error)?;
                tx.execute(
                    "DELETE FROM kv_entries WHERE key = ?1 AND expires_at_ms IS NOT NULL AND expires_at_ms <= ?2",
                    params![key, now],
                )
                .map_err(sql_error)?;
                let inserted = tx
                    .execute(
                        "INSERT OR IGNORE INTO kv_entries (key, value, expires_at_ms) VALUES (?1, ?2, ?3)",
                        params![key, value, expiry_ms(now, ttl)],
                    )
                    .map_err(sql_error)?;
                tx.commit().map_err(sql_error)?;
                Ok(inserted == 1)
            })
            .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        let key = key.to_string();
        let expected = expected.to_vec();
        self.db
            .call(move |conn| {
                let removed = conn
                    .execute(
                        &format!("DELETE FROM kv_entries WHERE key = ?1 AND {LIVE} AND value = ?3"),
                        params![key, now_ms(), expected],
                    )
                    .map_err(sql_error)?;
                Ok(removed == 1)
            })
            .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let key = key.to_string();
        self.db
            .call(move |conn| {
                let now = now_ms();
                let expires: Option<Option<i64>> = conn
                    .query_row(
                        &format!("SELECT expires_at_ms FROM kv_entries WHERE key = ?1 AND {LIVE}"),
                        params![key, now],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(sql_error)?;
                Ok(expires
                    .flatten()
                    .map(|at| Duration::from_millis(u64::try_from(at - now).unwrap_or(0))))
            })
            .await
    }
}
