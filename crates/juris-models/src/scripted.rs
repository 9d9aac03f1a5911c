//! Executor that replays a queue of predetermined outcomes.

use async_trait::async_trait;
use juris_abstraction::{ModelError, ModelExecutor, ModelOutput, Tier};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Replays queued results in order, then succeeds with a default payload.
///
/// Every invocation is recorded so callers can assert which tiers were tried.
#[derive(Debug)]
pub struct ScriptedExecutor {
    id: String,
    script: Mutex<VecDeque<Result<ModelOutput, ModelError>>>,
    calls: Mutex<Vec<Tier>>,
    latency: Duration,
}

impl ScriptedExecutor {
    /// Creates an executor with an empty script.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Sleeps this long inside every invocation.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn then_fail(self, error: ModelError) -> Self {
        self.push(Err(error));
        self
    }

    /// Queues `count` copies of a failure.
    #[must_use]
    pub fn then_fail_times(self, error: &ModelError, count: usize) -> Self {
        for _ in 0..count {
            self.push(Err(error.clone()));
        }
        self
    }

    /// Queues a success.
    #[must_use]
    pub fn then_succeed(self, output: ModelOutput) -> Self {
        self.push(Ok(output));
        self
    }

    /// Appends an outcome to the script.
    pub fn push(&self, outcome: Result<ModelOutput, ModelError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Tiers of every invocation so far, in call order.
    pub fn calls(&self) -> Vec<Tier> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn default_output(tier: Tier, text: &str) -> ModelOutput {
        ModelOutput {
            payload: json!({ "summary": format!("{tier} analysis"), "characters": text.len() }),
            input_tokens: crate::count_tokens(text),
            output_tokens: 500,
        }
    }
}

#[async_trait]
impl ModelExecutor for ScriptedExecutor {
    async fn invoke(
        &self,
        text: &str,
        tier: Tier,
        _prompt_template: &str,
    ) -> Result<ModelOutput, ModelError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(tier);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        debug!(executor_id = %self.id, tier = %tier, scripted = next.is_some(), "ScriptedExecutor invoked");

        next.unwrap_or_else(|| Ok(Self::default_output(tier, text)))
    }

    fn executor_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_script_then_defaults() {
        let executor = ScriptedExecutor::new("scripted")
            .then_fail(ModelError::Timeout(100))
            .then_succeed(ModelOutput {
                payload: json!({"answer": 42}),
                input_tokens: 1,
                output_tokens: 2,
            });

        assert!(matches!(
            executor.invoke("text", Tier::Pro, "t").await,
            Err(ModelError::Timeout(100))
        ));
        let second = executor.invoke("text", Tier::Balanced, "t").await.unwrap();
        assert_eq!(second.payload["answer"], 42);
        let third = executor.invoke("text", Tier::Lite, "t").await.unwrap();
        assert_eq!(third.output_tokens, 500);

        assert_eq!(executor.calls(), vec![Tier::Pro, Tier::Balanced, Tier::Lite]);
    }

    #[tokio::test]
    async fn test_fail_times_queues_copies() {
        let executor = ScriptedExecutor::new("scripted")
            .then_fail_times(&ModelError::RateLimited { retry_after_secs: None }, 3);
        for _ in 0..3 {
            assert!(executor.invoke("x", Tier::Pro, "t").await.is_err());
        }
        assert!(executor.invoke("x", Tier::Pro, "t").await.is_ok());
        assert_eq!(executor.call_count(), 4);
    }
}
