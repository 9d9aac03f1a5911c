//! Analysis engine: the per-request state machine.
//!
//! `NEW → SCORED → KEYED → CACHE_CHECKED → {hit: DONE}`
//! `| {LOCK_WAIT → busy} | {LOCKED → COMPUTING → {CACHED + DONE | DONE(error)}}`
//!
//! Workers coordinate only through the shared key-value store (cache and
//! lock) and the job store. Within one analysis key no two computations run
//! at once; distinct keys proceed in parallel. Every store call up to the
//! model call, the model call itself and every backoff sleep observe the
//! caller's cancellation token. Once the model has answered, the version,
//! cache entry and job completion are written regardless of cancellation.
//! The lock is released on every exit path once acquired.

mod error;
mod stats;

pub use error::{EngineError, Result};
pub use stats::{EngineStats, EngineStatsSnapshot};

use chrono::{DateTime, Utc};
use juris_abstraction::{
    AnalysisJob, AnalysisType, AnalysisVersion, DocumentSource, JobStatus, JobStore, KeyValueStore,
    ModelExecutor, NewJob, NewVersion, StoreError, Tier,
};
use juris_store::{CacheNamespace, CacheStats, CacheStore, DistributedLock, LockAttempt, LockHandle};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::keys::{AnalysisKey, AnalysisKeyGenerator, prompt_signature};
use crate::prompts::template_for;
use crate::retry::{RetryOrchestrator, RetryTelemetry};
use crate::routing::{ComplexityScore, CostMetrics, ModelRouter, RoutingDecision};

/// Longest single sleep of [`AnalysisEngine::analyze_until_ready`].
///
/// A busy response reports the holder's remaining lock TTL, which is an
/// upper bound; the holder usually finishes much sooner.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Caller-facing analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Case to analyse.
    pub case_id: String,
    /// Kind of analysis.
    pub analysis_type: AnalysisType,
    /// Skip the cache read. The existing entry is overwritten, not deleted.
    #[serde(default)]
    pub force_refresh: bool,
}

impl AnalysisRequest {
    /// Creates a request that reads the cache.
    pub fn new(case_id: impl Into<String>, analysis_type: AnalysisType) -> Self {
        Self { case_id: case_id.into(), analysis_type, force_refresh: false }
    }

    /// Sets `force_refresh`.
    #[must_use]
    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}

/// Everything decided before the cache is consulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisPlan {
    /// Case analysed.
    pub case_id: String,
    /// Kind of analysis.
    pub analysis_type: AnalysisType,
    /// Content-addressed key.
    pub analysis_key: AnalysisKey,
    /// Cache partition.
    pub namespace: CacheNamespace,
    /// Complexity of the joined document text.
    pub complexity: ComplexityScore,
    /// Tier and cost estimate.
    pub routing: RoutingDecision,
    /// Number of documents keyed.
    pub document_count: usize,
    /// Case mutation time the key was derived at.
    pub last_mutation_at: Option<DateTime<Utc>>,
}

/// A finished analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Case analysed.
    pub case_id: String,
    /// Kind of analysis.
    pub analysis_type: AnalysisType,
    /// Model output.
    pub result: serde_json::Value,
    /// Whether the result came from the cache.
    pub cached: bool,
    /// Tier that produced the result.
    pub tier: Tier,
    /// USD spent by this request; 0.0 for cache hits.
    pub cost_estimate: f64,
    /// Input tokens of the producing call.
    pub input_tokens: u64,
    /// Output tokens of the producing call.
    pub output_tokens: u64,
    /// Wall time of this request.
    pub processing_time_ms: u64,
    /// Content-addressed key.
    pub analysis_key: AnalysisKey,
    /// Cache partition.
    pub namespace: CacheNamespace,
    /// Stored version number.
    pub version: u32,
    /// Total complexity score.
    pub complexity_score: f64,
    /// Routing decision for this request.
    pub routing: RoutingDecision,
    /// Attempt telemetry; absent for cache hits.
    pub telemetry: Option<RetryTelemetry>,
}

/// Result of [`AnalysisEngine::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// The analysis is available.
    Completed(AnalysisReport),
    /// Another worker is computing the same key.
    Busy {
        /// Seconds until the other worker's lock expires.
        retry_after_secs: u64,
        /// Latest stored version for the case and analysis type, if any.
        stale: Option<AnalysisVersion>,
    },
}

impl AnalysisOutcome {
    /// The report, if completed.
    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisOutcome::Completed(report) => Some(report),
            AnalysisOutcome::Busy { .. } => None,
        }
    }

    /// Whether another worker holds the key.
    pub fn is_busy(&self) -> bool {
        matches!(self, AnalysisOutcome::Busy { .. })
    }
}

/// Cache payload. Carries the producing tier and usage so a hit can report them.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAnalysis {
    result: serde_json::Value,
    tier: Tier,
    input_tokens: u64,
    output_tokens: u64,
    cost: f64,
    version: u32,
    computed_at: DateTime<Utc>,
}

/// Analysis engine.
///
/// Constructed explicitly and shared by reference (or `Arc`); there is no
/// process-wide instance.
pub struct AnalysisEngine {
    documents: Arc<dyn DocumentSource>,
    jobs: Arc<dyn JobStore>,
    cache: CacheStore,
    lock: DistributedLock,
    router: ModelRouter,
    retry: RetryOrchestrator,
    model_version: String,
    stats: EngineStats,
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("model_version", &self.model_version)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl AnalysisEngine {
    /// Builds an engine from its collaborators.
    ///
    /// # Errors
    /// Returns `EngineError::Config` if `config` does not validate.
    pub fn new(
        config: &EngineConfig,
        executor: Arc<dyn ModelExecutor>,
        kv: Arc<dyn KeyValueStore>,
        jobs: Arc<dyn JobStore>,
        documents: Arc<dyn DocumentSource>,
    ) -> Result<Self> {
        config.validate().map_err(|e| EngineError::Config(e.to_string()))?;

        let cache = CacheStore::new(Arc::clone(&kv), config.cache.clone())?;
        let lock = DistributedLock::new(kv, config.lock.clone())?;
        let router = ModelRouter::new(config.routing.clone(), config.pricing.clone())
            .with_budget(config.budget.max_cost_per_analysis);
        let retry = RetryOrchestrator::new(executor, config.retry.clone());

        Ok(Self {
            documents,
            jobs,
            cache,
            lock,
            router,
            retry,
            model_version: config.model.version_tag.clone(),
            stats: EngineStats::default(),
        })
    }

    /// Scores, routes and keys a request without touching the cache.
    ///
    /// # Errors
    /// Returns `EngineError` if the documents cannot be read or keyed.
    pub async fn plan(&self, request: &AnalysisRequest, cancel: &CancellationToken) -> Result<AnalysisPlan> {
        self.prepare(request, cancel).await.map(|(plan, _)| plan)
    }

    /// Runs one analysis request.
    ///
    /// Returns `Completed` from the cache or a fresh computation, or `Busy`
    /// when another worker holds the key's lock.
    ///
    /// # Errors
    /// Returns `EngineError` on key derivation failure, store failure,
    /// unrecovered model failure or cancellation.
    pub async fn analyze(&self, request: &AnalysisRequest, cancel: &CancellationToken) -> Result<AnalysisOutcome> {
        let started = Instant::now();
        let result = self.run(request, cancel, started).await;
        if let Err(err) = &result {
            self.stats.record_failure();
            error!(
                case_id = %request.case_id,
                analysis_type = %request.analysis_type,
                retryable = err.is_retryable(),
                error = %err,
                "Analysis failed"
            );
        }
        result
    }

    /// Runs `request`, re-submitting while the key is busy.
    ///
    /// Sleeps between polls for the reported retry delay, capped by
    /// [`MAX_POLL_INTERVAL`] and by what is left of `max_wait`. Re-polls
    /// always read the cache, so the other worker's result is picked up as
    /// soon as it is stored. Returns the last `Busy` once `max_wait` is spent.
    ///
    /// # Errors
    /// Returns `EngineError` as [`Self::analyze`] does.
    pub async fn analyze_until_ready(
        &self,
        request: &AnalysisRequest,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome> {
        let deadline = Instant::now() + max_wait;
        let mut request = request.clone();

        loop {
            let outcome = self.analyze(&request, cancel).await?;
            let retry_after_secs = match &outcome {
                AnalysisOutcome::Busy { retry_after_secs, .. } => *retry_after_secs,
                AnalysisOutcome::Completed(_) => return Ok(outcome),
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(outcome);
            }
            let wait = Duration::from_secs(retry_after_secs).min(MAX_POLL_INTERVAL).min(remaining);
            debug!(case_id = %request.case_id, wait_ms = wait.as_millis() as u64, "Key busy, polling");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(EngineError::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
            request.force_refresh = false;
        }
    }

    /// Deletes every cached entry for `key`. Returns the number removed.
    ///
    /// # Errors
    /// Returns `EngineError::Store` if the cache store fails.
    pub async fn invalidate(&self, key: &str) -> Result<usize> {
        Ok(self.cache.invalidate(key).await?)
    }

    /// Request counters of this worker.
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Cache counters of this worker.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Per-tier usage and cost of this worker.
    pub fn cost_metrics(&self) -> CostMetrics {
        self.router.cost_tracker().metrics()
    }

    /// Router in use.
    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    async fn prepare(&self, request: &AnalysisRequest, cancel: &CancellationToken) -> Result<(AnalysisPlan, String)> {
        let case_id = request.case_id.as_str();
        let documents = until_cancelled(cancel, self.documents.get_documents(case_id)).await?;

        let text = documents.iter().map(|d| d.text.as_str()).collect::<Vec<_>>().join("\n\n");
        let size_mb = documents.iter().map(|d| d.size_bytes).sum::<u64>() as f64 / (1024.0 * 1024.0);

        let complexity = self.router.score(&text, size_mb);
        let routing = self.router.route(request.analysis_type, &complexity, &text);

        let last_mutation_at = until_cancelled(cancel, self.documents.last_mutation_at(case_id)).await?;
        let hashes: Vec<&str> = documents.iter().map(|d| d.content_hash.as_str()).collect();
        let analysis_key = AnalysisKeyGenerator::derive_key(
            &hashes,
            &self.model_version,
            &prompt_signature(template_for(request.analysis_type)),
            last_mutation_at,
        )?;
        let namespace = CacheNamespace::for_analysis(request.analysis_type, complexity.total_score);

        debug!(
            case_id,
            analysis_key = %analysis_key,
            namespace = %namespace,
            documents = documents.len(),
            complexity_score = complexity.total_score,
            "Keyed analysis"
        );

        let plan = AnalysisPlan {
            case_id: request.case_id.clone(),
            analysis_type: request.analysis_type,
            analysis_key,
            namespace,
            complexity,
            routing,
            document_count: documents.len(),
            last_mutation_at,
        };
        Ok((plan, text))
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<AnalysisOutcome> {
        let (plan, text) = self.prepare(request, cancel).await?;

        if !request.force_refresh
            && let Some(report) = self.cached_report(&plan, cancel, started).await?
        {
            return Ok(AnalysisOutcome::Completed(report));
        }
        self.stats.record_miss();

        let handle = match until_cancelled(cancel, self.lock.try_acquire(plan.analysis_key.as_str())).await? {
            LockAttempt::Acquired(handle) => handle,
            LockAttempt::Busy { retry_after_secs } => {
                self.stats.record_busy();
                warn!(
                    analysis_key = %plan.analysis_key,
                    retry_after_secs,
                    "Analysis key busy in another worker"
                );
                let stale =
                    until_cancelled(cancel, self.jobs.latest_version(&plan.case_id, plan.analysis_type)).await?;
                return Ok(AnalysisOutcome::Busy { retry_after_secs, stale });
            }
        };

        let result = self.compute_locked(request, &plan, &text, &handle, cancel, started).await;

        // Not cancellable: a held lock is released even after cancellation.
        if let Err(err) = self.lock.release(&handle).await {
            error!(
                analysis_key = %plan.analysis_key,
                error = %err,
                "Lock release failed; it will expire with its TTL"
            );
        }

        result.map(AnalysisOutcome::Completed)
    }

    async fn cached_report(
        &self,
        plan: &AnalysisPlan,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<Option<AnalysisReport>> {
        let Some(entry) = until_cancelled(cancel, self.cache.get(plan.analysis_key.as_str(), plan.namespace)).await?
        else {
            return Ok(None);
        };

        let cached: CachedAnalysis = match serde_json::from_value(entry.payload) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(analysis_key = %plan.analysis_key, error = %err, "Cached analysis unreadable, recomputing");
                return Ok(None);
            }
        };

        self.stats.record_hit();
        info!(
            analysis_key = %plan.analysis_key,
            namespace = %plan.namespace,
            tier = %cached.tier,
            version = cached.version,
            "Served analysis from cache"
        );

        Ok(Some(AnalysisReport {
            case_id: plan.case_id.clone(),
            analysis_type: plan.analysis_type,
            result: cached.result,
            cached: true,
            tier: cached.tier,
            cost_estimate: 0.0,
            input_tokens: cached.input_tokens,
            output_tokens: cached.output_tokens,
            processing_time_ms: elapsed_ms(started),
            analysis_key: plan.analysis_key.clone(),
            namespace: plan.namespace,
            version: cached.version,
            complexity_score: plan.complexity.total_score,
            routing: plan.routing.clone(),
            telemetry: None,
        }))
    }

    async fn compute_locked(
        &self,
        request: &AnalysisRequest,
        plan: &AnalysisPlan,
        text: &str,
        handle: &LockHandle,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<AnalysisReport> {
        // Another worker may have stored the result between our miss and the lock.
        if !request.force_refresh
            && let Some(report) = self.cached_report(plan, cancel, started).await?
        {
            return Ok(report);
        }

        let job = until_cancelled(
            cancel,
            self.jobs.create_job(NewJob {
                case_id: plan.case_id.clone(),
                analysis_type: plan.analysis_type,
                analysis_key: plan.analysis_key.to_string(),
                tier: plan.routing.tier,
                lock_token: handle.token.clone(),
            }),
        )
        .await?;

        let result = self.compute_job(&job, plan, text, cancel, started).await;
        if result.is_err()
            && let Err(err) = self.jobs.update_job_status(job.id, JobStatus::Failed, None).await
        {
            error!(job_id = %job.id, error = %err, "Failed to mark job failed");
        }
        result
    }

    async fn compute_job(
        &self,
        job: &AnalysisJob,
        plan: &AnalysisPlan,
        text: &str,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<AnalysisReport> {
        until_cancelled(cancel, self.jobs.update_job_status(job.id, JobStatus::Running, None)).await?;

        let outcome = self
            .retry
            .run_with_fallback(text, plan.routing.tier, template_for(plan.analysis_type), cancel)
            .await?;

        let cost = self.router.track_usage(outcome.tier, outcome.output.input_tokens, outcome.output.output_tokens);

        // The result is paid for: persist it even if `cancel` fires from here on.
        let version = self
            .jobs
            .create_version(NewVersion {
                case_id: plan.case_id.clone(),
                analysis_type: plan.analysis_type,
                analysis_key: plan.analysis_key.to_string(),
                tier: outcome.tier,
                payload: outcome.output.payload.clone(),
                input_tokens: outcome.output.input_tokens,
                output_tokens: outcome.output.output_tokens,
                cost,
            })
            .await?;
        info!(case_id = %plan.case_id, version = version.version, tier = %outcome.tier, "Version created");

        let cached = CachedAnalysis {
            result: outcome.output.payload.clone(),
            tier: outcome.tier,
            input_tokens: outcome.output.input_tokens,
            output_tokens: outcome.output.output_tokens,
            cost,
            version: version.version,
            computed_at: version.created_at,
        };
        let payload = serde_json::to_value(&cached).map_err(StoreError::from)?;
        self.cache.set(plan.analysis_key.as_str(), plan.namespace, payload, None).await?;
        self.jobs.update_job_status(job.id, JobStatus::Completed, Some(version.id)).await?;
        self.stats.record_computation();
        info!(
            analysis_key = %plan.analysis_key,
            namespace = %plan.namespace,
            tier = %outcome.tier,
            cost,
            attempts = outcome.telemetry.attempt_count(),
            "Analysis computed and cached"
        );

        Ok(AnalysisReport {
            case_id: plan.case_id.clone(),
            analysis_type: plan.analysis_type,
            result: outcome.output.payload,
            cached: false,
            tier: outcome.tier,
            cost_estimate: cost,
            input_tokens: outcome.output.input_tokens,
            output_tokens: outcome.output.output_tokens,
            processing_time_ms: elapsed_ms(started),
            analysis_key: plan.analysis_key.clone(),
            namespace: plan.namespace,
            version: version.version,
            complexity_score: plan.complexity.total_score,
            routing: plan.routing.clone(),
            telemetry: Some(outcome.telemetry),
        })
    }
}

/// Awaits a store call unless `cancel` fires first.
async fn until_cancelled<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(EngineError::Cancelled),
        result = future => result.map_err(EngineError::from),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
