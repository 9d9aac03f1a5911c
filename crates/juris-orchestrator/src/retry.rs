//! Retry and tier-fallback orchestration around the model call.
//!
//! Per attempt: success returns; a fatal error aborts; a quota error moves
//! straight to the next cheaper tier; a retryable error backs off and
//! retries the same tier until `max_attempts` is spent, then moves to the
//! next cheaper tier. Every attempt after the first downgrade is a single
//! shot, so the worst case is `max_attempts` attempts plus one per tier step.
//! Tiers are tried strictly in sequence, never in parallel.

use juris_abstraction::{ErrorClass, ModelError, ModelExecutor, ModelOutput, Tier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Retry policy for model invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts at the initial tier, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff multiplier (default: 2.0).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay for a given retry.
    ///
    /// Uses exponential backoff: base_delay * multiplier^retry_count, capped at max_delay.
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let delay_ms = (self.base_delay_ms as f64 * self.multiplier.powi(exponent))
            .min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }

    /// Upper bound on the total time spent sleeping between attempts.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1)).map(|n| self.calculate_delay(n)).sum()
    }
}

/// One model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Tier invoked.
    pub tier: Tier,
    /// Failure, if the attempt failed.
    pub error: Option<ModelError>,
    /// Wall time of the call.
    pub latency_ms: u64,
}

/// Telemetry for a whole fallback run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryTelemetry {
    /// Every attempt, in order.
    pub attempts: Vec<AttemptRecord>,
    /// Tier that produced the result, if any.
    pub final_tier: Option<Tier>,
    /// Wall time including backoff.
    pub total_latency_ms: u64,
}

impl RetryTelemetry {
    /// Tier of every attempt, in order.
    pub fn tiers_attempted(&self) -> Vec<Tier> {
        self.attempts.iter().map(|a| a.tier).collect()
    }

    /// Number of attempts made.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

/// A successful fallback run.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// Model output.
    pub output: ModelOutput,
    /// Tier that produced it.
    pub tier: Tier,
    /// Attempt telemetry.
    pub telemetry: RetryTelemetry,
}

/// A failed fallback run.
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// The last model error, after the budget was spent or on a fatal error.
    #[error("Model invocation failed after {} attempt(s): {error}", .telemetry.attempt_count())]
    Exhausted {
        /// Final unrecovered error.
        error: ModelError,
        /// Attempt telemetry.
        telemetry: RetryTelemetry,
    },

    /// The caller cancelled the run.
    #[error("Model invocation cancelled after {} attempt(s)", .telemetry.attempt_count())]
    Cancelled {
        /// Attempt telemetry.
        telemetry: RetryTelemetry,
    },
}

impl RetryError {
    /// Attempt telemetry.
    pub fn telemetry(&self) -> &RetryTelemetry {
        match self {
            RetryError::Exhausted { telemetry, .. } | RetryError::Cancelled { telemetry } => telemetry,
        }
    }

    /// Final model error, if the run was not cancelled.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            RetryError::Exhausted { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Drives the model call with backoff and tier fallback.
pub struct RetryOrchestrator {
    executor: Arc<dyn ModelExecutor>,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(executor: Arc<dyn ModelExecutor>, policy: RetryPolicy) -> Self {
        Self { executor, policy }
    }

    /// Retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `prompt_template` over `text` starting at `initial_tier`.
    ///
    /// # Errors
    /// Returns `RetryError::Exhausted` with the last error when no attempt
    /// succeeded, or `RetryError::Cancelled` when `cancel` fires.
    pub async fn run_with_fallback(
        &self,
        text: &str,
        initial_tier: Tier,
        prompt_template: &str,
        cancel: &CancellationToken,
    ) -> Result<RetryOutcome, RetryError> {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut telemetry = RetryTelemetry::default();
        let mut tier = initial_tier;
        let mut tier_attempts: u32 = 0;
        let mut downgraded = false;

        loop {
            if cancel.is_cancelled() {
                telemetry.total_latency_ms = elapsed_ms(started);
                return Err(RetryError::Cancelled { telemetry });
            }

            tier_attempts += 1;
            debug!(
                executor_id = %self.executor.executor_id(),
                tier = %tier,
                attempt = telemetry.attempt_count() + 1,
                "Invoking model"
            );

            let call_started = Instant::now();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    telemetry.total_latency_ms = elapsed_ms(started);
                    return Err(RetryError::Cancelled { telemetry });
                }
                result = self.executor.invoke(text, tier, prompt_template) => result,
            };
            let latency_ms = elapsed_ms(call_started);

            let error = match result {
                Ok(output) => {
                    telemetry.attempts.push(AttemptRecord { tier, error: None, latency_ms });
                    telemetry.final_tier = Some(tier);
                    telemetry.total_latency_ms = elapsed_ms(started);
                    info!(
                        tier = %tier,
                        attempts = telemetry.attempt_count(),
                        total_latency_ms = telemetry.total_latency_ms,
                        "Model invocation succeeded"
                    );
                    return Ok(RetryOutcome { output, tier, telemetry });
                }
                Err(error) => error,
            };

            telemetry.attempts.push(AttemptRecord { tier, error: Some(error.clone()), latency_ms });

            let next_tier = match error.class() {
                ErrorClass::Fatal => None,
                ErrorClass::TierExhausted => tier.downgrade(),
                ErrorClass::Retryable if !downgraded && tier_attempts < max_attempts => {
                    let delay = self.backoff(tier_attempts - 1, &error);
                    warn!(
                        tier = %tier,
                        attempt = tier_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retryable model error, backing off"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            telemetry.total_latency_ms = elapsed_ms(started);
                            return Err(RetryError::Cancelled { telemetry });
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
                ErrorClass::Retryable => tier.downgrade(),
            };

            match next_tier {
                Some(lower) => {
                    warn!(from = %tier, to = %lower, error = %error, "Falling back to cheaper tier");
                    tier = lower;
                    tier_attempts = 0;
                    downgraded = true;
                }
                None => {
                    telemetry.total_latency_ms = elapsed_ms(started);
                    error!(
                        tier = %tier,
                        attempts = telemetry.attempt_count(),
                        error = %error,
                        "Model invocation failed"
                    );
                    return Err(RetryError::Exhausted { error, telemetry });
                }
            }
        }
    }

    /// Backoff before retry `retry_count`, honouring a server's Retry-After
    /// up to the maximum delay.
    fn backoff(&self, retry_count: u32, error: &ModelError) -> Duration {
        let delay = self.policy.calculate_delay(retry_count);
        match error {
            ModelError::RateLimited { retry_after_secs: Some(secs) } => delay
                .max(Duration::from_secs(*secs))
                .min(Duration::from_millis(self.policy.max_delay_ms)),
            _ => delay,
        }
    }
}

impl std::fmt::Debug for RetryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOrchestrator")
            .field("executor_id", &self.executor.executor_id())
            .field("policy", &self.policy)
            .finish()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
