//! End-to-end analysis scenarios over in-memory and SQLite stores.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use juris_abstraction::{
    AnalysisJob, AnalysisType, AnalysisVersion, JobStatus, JobStore, KeyValueStore, ModelError, ModelOutput, NewJob,
    NewVersion, StoreError, Tier,
};
use juris_models::ScriptedExecutor;
use juris_orchestrator::{AnalysisEngine, AnalysisOutcome, AnalysisRequest, EngineConfig, EngineError};
use juris_store::{
    CacheNamespace, Database, DistributedLock, FsDocumentSource, MemoryJobStore, MemoryKvStore, SqliteJobStore,
    SqliteKvStore,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const CASE: &str = "case-1042";

struct Fixture {
    _dir: tempfile::TempDir,
    documents: Arc<FsDocumentSource>,
    kv: Arc<MemoryKvStore>,
    jobs: Arc<MemoryJobStore>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let case = dir.path().join(CASE);
        std::fs::create_dir(&case).unwrap();
        std::fs::write(
            case.join("h1-complaint.txt"),
            "Complaint. The plaintiff alleges breach of the supply agreement by the defendant.",
        )
        .unwrap();
        std::fs::write(
            case.join("h2-answer.txt"),
            "Answer. The defendant denies liability and asserts a counterclaim for unpaid invoices.",
        )
        .unwrap();

        Self {
            documents: Arc::new(FsDocumentSource::new(dir.path())),
            _dir: dir,
            kv: Arc::new(MemoryKvStore::new()),
            jobs: Arc::new(MemoryJobStore::new()),
        }
    }

    fn engine(&self, config: &EngineConfig, executor: &Arc<ScriptedExecutor>) -> AnalysisEngine {
        AnalysisEngine::new(config, executor.clone(), self.kv.clone(), self.jobs.clone(), self.documents.clone())
            .unwrap()
    }
}

/// Every non-trivial text routes to `tier`.
fn config_routing_to(tier: Tier, max_attempts: u32) -> EngineConfig {
    let mut config = EngineConfig::default();
    match tier {
        Tier::Lite => {
            config.routing.balanced_min = 99.0;
            config.routing.pro_min = 100.0;
        }
        Tier::Balanced => {
            config.routing.balanced_min = 0.0;
            config.routing.pro_min = 99.0;
        }
        Tier::Pro => {
            config.routing.balanced_min = 0.0;
            config.routing.pro_min = 0.01;
        }
    }
    config.retry.max_attempts = max_attempts;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

fn completed(outcome: AnalysisOutcome) -> juris_orchestrator::AnalysisReport {
    match outcome {
        AnalysisOutcome::Completed(report) => report,
        AnalysisOutcome::Busy { retry_after_secs, .. } => panic!("unexpected busy ({retry_after_secs}s)"),
    }
}

#[tokio::test]
async fn test_miss_then_hit_without_reinvoking_model() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted"));
    let engine = fixture.engine(&config_routing_to(Tier::Balanced, 3), &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Strategic);
    let cancel = CancellationToken::new();

    let first = completed(engine.analyze(&request, &cancel).await.unwrap());
    assert!(!first.cached);
    assert_eq!(first.tier, Tier::Balanced);
    assert_eq!(first.version, 1);
    assert!(first.cost_estimate > 0.0);
    assert!(matches!(first.namespace, CacheNamespace::Strategic { .. }));
    assert_eq!(executor.calls(), vec![Tier::Balanced]);

    let second = completed(engine.analyze(&request, &cancel).await.unwrap());
    assert!(second.cached);
    assert_eq!(second.analysis_key, first.analysis_key);
    assert_eq!(second.result, first.result);
    assert_eq!(second.tier, Tier::Balanced);
    assert!(second.cost_estimate.abs() < f64::EPSILON);
    assert!(second.telemetry.is_none());
    assert_eq!(executor.call_count(), 1);

    let stats = engine.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.computations, 1);

    let jobs = fixture.jobs.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].result_version_id, Some(fixture.jobs.versions()[0].id));
}

#[tokio::test]
async fn test_mutation_changes_key_and_forces_recomputation() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted"));
    let engine = fixture.engine(&config_routing_to(Tier::Balanced, 3), &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Strategic);
    let cancel = CancellationToken::new();

    let before = completed(engine.analyze(&request, &cancel).await.unwrap());

    fixture.documents.record_mutation(CASE, Utc::now() + ChronoDuration::seconds(1)).await.unwrap();

    let after = completed(engine.analyze(&request, &cancel).await.unwrap());
    assert_ne!(after.analysis_key, before.analysis_key);
    assert!(!after.cached);
    assert_eq!(after.version, 2);
    assert_eq!(executor.call_count(), 2);
}

#[tokio::test]
async fn test_rate_limits_fall_back_to_balanced() {
    let fixture = Fixture::new();
    let executor = Arc::new(
        ScriptedExecutor::new("scripted")
            .then_fail_times(&ModelError::RateLimited { retry_after_secs: None }, 4)
            .then_succeed(ModelOutput { payload: json!({"summary": "fallback"}), input_tokens: 40, output_tokens: 80 }),
    );
    let engine = fixture.engine(&config_routing_to(Tier::Pro, 4), &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Report);

    let report = completed(engine.analyze(&request, &CancellationToken::new()).await.unwrap());

    assert_eq!(report.routing.tier, Tier::Pro);
    assert_eq!(report.tier, Tier::Balanced);
    assert_eq!(report.result, json!({"summary": "fallback"}));
    let telemetry = report.telemetry.unwrap();
    assert_eq!(telemetry.tiers_attempted(), vec![Tier::Pro, Tier::Pro, Tier::Pro, Tier::Pro, Tier::Balanced]);
    assert_eq!(telemetry.final_tier, Some(Tier::Balanced));

    let metrics = engine.cost_metrics();
    assert_eq!(metrics.request_count(), 1);
    assert_eq!(metrics.tiers[&Tier::Balanced].input_tokens, 40);
    assert_eq!(fixture.jobs.versions()[0].tier, Tier::Balanced);
}

#[tokio::test]
async fn test_concurrent_workers_single_flight() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted").with_latency(Duration::from_millis(300)));
    let config = config_routing_to(Tier::Balanced, 3);
    let worker_a = fixture.engine(&config, &executor);
    let worker_b = fixture.engine(&config, &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Strategic);
    let cancel = CancellationToken::new();

    let (a, b) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(worker_a.analyze(&request, &cancel), worker_b.analyze(&request, &cancel)) },
    )
    .await
    .unwrap();

    let outcomes = [a.unwrap(), b.unwrap()];
    let busy: Vec<_> = outcomes.iter().filter(|o| o.is_busy()).collect();
    assert_eq!(busy.len(), 1);
    assert_eq!(outcomes.iter().filter_map(AnalysisOutcome::report).count(), 1);

    let AnalysisOutcome::Busy { retry_after_secs, stale } = busy[0] else { unreachable!() };
    assert!((1_795..=1_800).contains(retry_after_secs));
    assert!(stale.is_none());
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn test_polling_picks_up_the_other_workers_result() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted").with_latency(Duration::from_millis(200)));
    let config = config_routing_to(Tier::Balanced, 3);
    let worker_a = fixture.engine(&config, &executor);
    let worker_b = fixture.engine(&config, &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Strategic);
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(worker_a.analyze(&request, &cancel), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker_b.analyze_until_ready(&request, Duration::from_secs(10), &cancel).await
    });

    let a = completed(a.unwrap());
    let b = completed(b.unwrap());
    assert!(!a.cached);
    assert!(b.cached);
    assert_eq!(a.analysis_key, b.analysis_key);
    assert_eq!(executor.call_count(), 1);
    assert!(worker_b.stats().busy >= 1);
}

#[tokio::test]
async fn test_busy_offers_stale_version() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted"));
    let config = config_routing_to(Tier::Balanced, 3);
    let worker_a = fixture.engine(&config, &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Strategic);
    let cancel = CancellationToken::new();

    let first = completed(worker_a.analyze(&request, &cancel).await.unwrap());

    let plan = worker_a.plan(&request, &cancel).await.unwrap();
    let lock = DistributedLock::new(fixture.kv.clone(), config.lock.clone()).unwrap();
    assert!(lock.try_acquire(plan.analysis_key.as_str()).await.unwrap().is_acquired());

    let refresh = request.clone().with_force_refresh(true);
    match worker_a.analyze(&refresh, &cancel).await.unwrap() {
        AnalysisOutcome::Busy { stale: Some(stale), .. } => {
            assert_eq!(stale.version, first.version);
            assert_eq!(stale.payload, first.result);
        }
        other => panic!("expected busy with a stale version, got {other:?}"),
    }
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn test_force_refresh_recomputes_and_overwrites() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted"));
    let engine = fixture.engine(&config_routing_to(Tier::Lite, 3), &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Report);
    let cancel = CancellationToken::new();

    completed(engine.analyze(&request, &cancel).await.unwrap());
    let refreshed =
        completed(engine.analyze(&request.clone().with_force_refresh(true), &cancel).await.unwrap());
    assert!(!refreshed.cached);
    assert_eq!(refreshed.version, 2);

    let cached = completed(engine.analyze(&request, &cancel).await.unwrap());
    assert!(cached.cached);
    assert_eq!(cached.version, 2);
    assert_eq!(executor.call_count(), 2);
}

#[tokio::test]
async fn test_fatal_error_releases_lock_and_fails_job() {
    let fixture = Fixture::new();
    let executor =
        Arc::new(ScriptedExecutor::new("scripted").then_fail(ModelError::BadRequest("prompt too long".to_string())));
    let engine = fixture.engine(&config_routing_to(Tier::Pro, 3), &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Strategic);
    let cancel = CancellationToken::new();

    let err = engine.analyze(&request, &cancel).await.unwrap_err();
    assert!(matches!(err, EngineError::Model { error: ModelError::BadRequest(_), .. }));
    assert!(!err.is_retryable());
    assert!(err.reason().contains("prompt too long"));
    assert_eq!(executor.call_count(), 1);

    let plan = engine.plan(&request, &cancel).await.unwrap();
    let lock_key = DistributedLock::storage_key(plan.analysis_key.as_str());
    assert_eq!(fixture.kv.get(&lock_key).await.unwrap(), None);

    let jobs = fixture.jobs.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(fixture.jobs.versions().is_empty());
    assert_eq!(engine.stats().failures, 1);

    // Nothing was cached, so the next request computes again.
    let retry = completed(engine.analyze(&request, &cancel).await.unwrap());
    assert!(!retry.cached);
}

#[tokio::test]
async fn test_cancellation_during_model_call() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted").with_latency(Duration::from_secs(30)));
    let engine = fixture.engine(&config_routing_to(Tier::Balanced, 3), &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Strategic);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), engine.analyze(&request, &cancel))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    let plan = engine.plan(&request, &CancellationToken::new()).await.unwrap();
    let lock_key = DistributedLock::storage_key(plan.analysis_key.as_str());
    assert_eq!(fixture.kv.get(&lock_key).await.unwrap(), None);
    assert_eq!(fixture.jobs.jobs()[0].status, JobStatus::Failed);
}

#[tokio::test]
async fn test_invalidate_drops_cached_result() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted"));
    let engine = fixture.engine(&config_routing_to(Tier::Lite, 3), &executor);
    let request = AnalysisRequest::new(CASE, AnalysisType::Essential);
    let cancel = CancellationToken::new();

    let first = completed(engine.analyze(&request, &cancel).await.unwrap());
    assert_eq!(engine.invalidate(first.analysis_key.as_str()).await.unwrap(), 1);

    let second = completed(engine.analyze(&request, &cancel).await.unwrap());
    assert!(!second.cached);
    assert_eq!(executor.call_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_on_separate_sqlite_handles() {
    let fixture = Fixture::new();
    let db_dir = tempfile::tempdir().unwrap();
    let path = db_dir.path().join("juris.db");
    let executor = Arc::new(ScriptedExecutor::new("scripted").with_latency(Duration::from_millis(300)));
    let config = config_routing_to(Tier::Balanced, 3);

    let worker = |db: Database| {
        AnalysisEngine::new(
            &config,
            executor.clone(),
            Arc::new(SqliteKvStore::new(db.clone())),
            Arc::new(SqliteJobStore::new(db)),
            fixture.documents.clone(),
        )
        .unwrap()
    };
    let worker_a = worker(Database::open(&path).unwrap());
    let worker_b = worker(Database::open(&path).unwrap());
    let request = AnalysisRequest::new(CASE, AnalysisType::Strategic);
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(worker_a.analyze(&request, &cancel), worker_b.analyze(&request, &cancel));
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(outcomes.iter().filter(|o| o.is_busy()).count(), 1);
    assert_eq!(executor.call_count(), 1);

    // A third worker on its own handle sees the cached result.
    let worker_c = worker(Database::open(&path).unwrap());
    let report = completed(worker_c.analyze(&request, &cancel).await.unwrap());
    assert!(report.cached);
    assert_eq!(executor.call_count(), 1);
}

/// Job store that fires a cancellation token while the version is written.
struct CancelOnVersion {
    inner: Arc<MemoryJobStore>,
    cancel: CancellationToken,
}

#[async_trait]
impl JobStore for CancelOnVersion {
    async fn create_job(&self, job: NewJob) -> Result<AnalysisJob, StoreError> {
        self.inner.create_job(job).await
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result_version_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.inner.update_job_status(job_id, status, result_version_id).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        self.inner.get_job(job_id).await
    }

    async fn create_version(&self, version: NewVersion) -> Result<AnalysisVersion, StoreError> {
        self.cancel.cancel();
        self.inner.create_version(version).await
    }

    async fn latest_version(
        &self,
        case_id: &str,
        analysis_type: AnalysisType,
    ) -> Result<Option<AnalysisVersion>, StoreError> {
        self.inner.latest_version(case_id, analysis_type).await
    }
}

#[tokio::test]
async fn test_cancellation_after_model_answer_keeps_result() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new("scripted"));
    let cancel = CancellationToken::new();
    let jobs = Arc::new(CancelOnVersion { inner: fixture.jobs.clone(), cancel: cancel.clone() });
    let engine = AnalysisEngine::new(
        &config_routing_to(Tier::Balanced, 3),
        executor.clone(),
        fixture.kv.clone(),
        jobs,
        fixture.documents.clone(),
    )
    .unwrap();
    let request = AnalysisRequest::new(CASE, AnalysisType::Report);

    let report = completed(engine.analyze(&request, &cancel).await.unwrap());
    assert!(cancel.is_cancelled());
    assert!(!report.cached);
    assert_eq!(report.version, 1);

    let versions = fixture.jobs.versions();
    assert_eq!(versions.len(), 1);
    let stored = fixture.jobs.jobs();
    assert_eq!(stored[0].status, JobStatus::Completed);
    assert_eq!(stored[0].result_version_id, Some(versions[0].id));

    let lock_key = DistributedLock::storage_key(report.analysis_key.as_str());
    assert_eq!(fixture.kv.get(&lock_key).await.unwrap(), None);

    let again = completed(engine.analyze(&request, &CancellationToken::new()).await.unwrap());
    assert!(again.cached);
    assert_eq!(again.version, 1);
    assert_eq!(executor.call_count(), 1);
}
