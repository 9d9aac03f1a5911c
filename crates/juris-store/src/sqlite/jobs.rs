//! `JobStore` over SQLite tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use juris_abstraction::{
    AnalysisJob, AnalysisType, AnalysisVersion, JobStatus, JobStore, NewJob, NewVersion, StoreError,
    Tier,
};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use std::str::FromStr;
use uuid::Uuid;

use super::{Database, sql_error};

const JOB_COLUMNS: &str = "id, case_id, analysis_type, analysis_key, tier, status, \
     result_version_id, lock_token, created_at, finished_at";

const VERSION_COLUMNS: &str = "id, case_id, analysis_type, version, analysis_key, tier, \
     payload_json, input_tokens, output_tokens, cost, created_at";

/// SQLite-backed job and version store.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    /// Wraps an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_named<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisJob> {
    let status: String = row.get(5)?;
    let result_version_id: Option<String> = row.get(6)?;
    let finished_at: Option<String> = row.get(9)?;

    Ok(AnalysisJob {
        id: parse_uuid(row, 0)?,
        case_id: row.get(1)?,
        analysis_type: parse_named(row, 2)?,
        analysis_key: row.get(3)?,
        tier: parse_named(row, 4)?,
        status: JobStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(5, status.clone(), rusqlite::types::Type::Text)
        })?,
        result_version_id: result_version_id
            .map(|raw| Uuid::parse_str(&raw).map_err(|e| conversion_error(6, e)))
            .transpose()?,
        lock_token: row.get(7)?,
        created_at: parse_time(row, 8)?,
        finished_at: match finished_at {
            Some(_) => Some(parse_time(row, 9)?),
            None => None,
        },
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisVersion> {
    let payload: String = row.get(6)?;
    let input_tokens: i64 = row.get(7)?;
    let output_tokens: i64 = row.get(8)?;

    Ok(AnalysisVersion {
        id: parse_uuid(row, 0)?,
        case_id: row.get(1)?,
        analysis_type: parse_named::<AnalysisType>(row, 2)?,
        version: row.get(3)?,
        analysis_key: row.get(4)?,
        tier: parse_named::<Tier>(row, 5)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(6, e))?,
        input_tokens: u64::try_from(input_tokens).unwrap_or(0),
        output_tokens: u64::try_from(output_tokens).unwrap_or(0),
        cost: row.get(9)?,
        created_at: parse_time(row, 10)?,
    })
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, job: NewJob) -> Result<AnalysisJob, StoreError> {
        let record = AnalysisJob {
            id: Uuid::new_v4(),
            case_id: job.case_id,
            analysis_type: job.analysis_type,
            analysis_key: job.analysis_key,
            tier: job.tier,
            status: JobStatus::Queued,
            result_version_id: None,
            lock_token: job.lock_token,
            created_at: Utc::now(),
            finished_at: None,
        };

        let row = record.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO analysis_jobs ({JOB_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, NULL)"
                    ),
                    params![
                        row.id.to_string(),
                        row.case_id,
                        row.analysis_type.as_str(),
                        row.analysis_key,
                        row.tier.as_str(),
                        row.status.as_str(),
                        row.lock_token,
                        row.created_at.to_rfc3339(),
                    ],
                )
                .map_err(sql_error)?;
                Ok(())
            })
            .await?;

        Ok(record)
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result_version_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.db
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(sql_error)?;

                let current: Option<String> = tx
                    .query_row(
                        "SELECT status FROM analysis_jobs WHERE id = ?1",
                        params![job_id.to_string()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(sql_error)?;
                let current = current.ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
                if JobStatus::parse(&current).is_some_and(JobStatus::is_terminal) {
                    return Err(StoreError::InvalidData(format!(
                        "job {} is already {}",
                        job_id, current
                    )));
                }

                let finished_at = status.is_terminal().then(|| Utc::now().to_rfc3339());
                tx.execute(
                    "UPDATE analysis_jobs
                     SET status = ?2,
                         result_version_id = COALESCE(?3, result_version_id),
                         finished_at = COALESCE(?4, finished_at)
                     WHERE id = ?1",
                    params![
                        job_id.to_string(),
                        status.as_str(),
                        result_version_id.map(|id| id.to_string()),
                        finished_at,
                    ],
                )
                .map_err(sql_error)?;
                tx.commit().map_err(sql_error)?;
                Ok(())
            })
            .await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = ?1"),
                    params![job_id.to_string()],
                    job_from_row,
                )
                .optional()
                .map_err(sql_error)
            })
            .await
    }

    async fn create_version(&self, version: NewVersion) -> Result<AnalysisVersion, StoreError> {
        let payload = serde_json::to_string(&version.payload)?;
        self.db
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(sql_error)?;

                let previous: Option<u32> = tx
                    .query_row(
                        "SELECT MAX(version) FROM analysis_versions WHERE case_id = ?1 AND analysis_type = ?2",
                        params![version.case_id, version.analysis_type.as_str()],
                        |row| row.get(0),
                    )
                    .map_err(sql_error)?;

                let record = AnalysisVersion::next(version, previous);
                tx.execute(
                    &format!(
                        "INSERT INTO analysis_versions ({VERSION_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                    ),
                    params![
                        record.id.to_string(),
                        record.case_id,
                        record.analysis_type.as_str(),
                        record.version,
                        record.analysis_key,
                        record.tier.as_str(),
                        payload,
                        to_sql_count(record.input_tokens),
                        to_sql_count(record.output_tokens),
                        record.cost,
                        record.created_at.to_rfc3339(),
                    ],
                )
                .map_err(sql_error)?;
                tx.commit().map_err(sql_error)?;
                Ok(record)
            })
            .await
    }

    async fn latest_version(
        &self,
        case_id: &str,
        analysis_type: AnalysisType,
    ) -> Result<Option<AnalysisVersion>, StoreError> {
        let case_id = case_id.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {VERSION_COLUMNS} FROM analysis_versions
                         WHERE case_id = ?1 AND analysis_type = ?2
                         ORDER BY version DESC LIMIT 1"
                    ),
                    params![case_id, analysis_type.as_str()],
                    version_from_row,
                )
                .optional()
                .map_err(sql_error)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteJobStore {
        SqliteJobStore::new(Database::open_in_memory().unwrap())
    }

    fn new_version(case_id: &str, analysis_type: AnalysisType) -> NewVersion {
        NewVersion {
            case_id: case_id.to_string(),
            analysis_type,
            analysis_key: "key".to_string(),
            tier: Tier::Pro,
            payload: json!({"summary": "ready for trial"}),
            input_tokens: 1200,
            output_tokens: 800,
            cost: 0.011,
        }
    }

    #[tokio::test]
    async fn test_job_lifecycle_persists() {
        let store = store();
        let job = store
            .create_job(NewJob {
                case_id: "case-9".to_string(),
                analysis_type: AnalysisType::Report,
                analysis_key: "abc".to_string(),
                tier: Tier::Balanced,
                lock_token: "token".to_string(),
            })
            .await
            .unwrap();

        store.update_job_status(job.id, JobStatus::Running, None).await.unwrap();
        let version = store.create_version(new_version("case-9", AnalysisType::Report)).await.unwrap();
        store
            .update_job_status(job.id, JobStatus::Completed, Some(version.id))
            .await
            .unwrap();

        let loaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.result_version_id, Some(version.id));
        assert_eq!(loaded.tier, Tier::Balanced);
        assert!(loaded.finished_at.is_some());

        let err = store.update_job_status(job.id, JobStatus::Failed, None).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = store();
        assert!(store.get_job(Uuid::new_v4()).await.unwrap().is_none());
        let err = store
            .update_job_status(Uuid::new_v4(), JobStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_versions_append_per_case_and_type() {
        let store = store();
        let first = store.create_version(new_version("case-1", AnalysisType::Strategic)).await.unwrap();
        let second = store.create_version(new_version("case-1", AnalysisType::Strategic)).await.unwrap();
        let other = store.create_version(new_version("case-1", AnalysisType::Essential)).await.unwrap();

        assert_eq!((first.version, second.version, other.version), (1, 2, 1));

        let latest = store
            .latest_version("case-1", AnalysisType::Strategic)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.payload["summary"], "ready for trial");
        assert_eq!(latest.input_tokens, 1200);
        assert!(store.latest_version("case-2", AnalysisType::Strategic).await.unwrap().is_none());
    }
}
