//! Model executor implementations for Juris.
//!
//! This crate provides concrete implementations of the `ModelExecutor` trait.
//!
//! # Executors
//!
//! - **Mock**: deterministic offline analysis for development
//! - **Scripted**: replays queued outcomes, used to exercise retry and fallback
//! - **Http**: any JSON endpoint speaking the `/analyze` contract

pub mod http;
pub mod scripted;

use async_trait::async_trait;
use juris_abstraction::{ModelError, ModelExecutor, ModelOutput, Tier};
use serde_json::json;
use tracing::debug;

pub use http::HttpExecutor;
pub use scripted::ScriptedExecutor;

/// Approximate token count (~4 characters per token).
#[must_use]
pub fn count_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// A mock implementation of the `ModelExecutor` trait for testing and demonstration.
///
/// The payload is a pure function of the input, so repeated calls agree.
#[derive(Debug, Default)]
pub struct MockExecutor {
    id: String,
}

impl MockExecutor {
    /// Creates a new `MockExecutor` with the given ID.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id }
    }
}

#[async_trait]
impl ModelExecutor for MockExecutor {
    async fn invoke(
        &self,
        text: &str,
        tier: Tier,
        prompt_template: &str,
    ) -> Result<ModelOutput, ModelError> {
        debug!(
            executor_id = %self.id,
            tier = %tier,
            text_len = text.len(),
            "MockExecutor analyzing text"
        );

        if text.trim().is_empty() {
            return Err(ModelError::BadRequest("no document text to analyze".to_string()));
        }

        let excerpt: String = text.chars().take(160).collect();
        let payload = json!({
            "summary": format!("Mock {} analysis of {} characters", tier, text.chars().count()),
            "excerpt": excerpt,
            "template": prompt_template.lines().next().unwrap_or_default(),
            "executor": self.id,
        });

        let input_tokens = count_tokens(prompt_template) + count_tokens(text);
        let output_tokens = count_tokens(&payload.to_string());

        Ok(ModelOutput { payload, input_tokens, output_tokens })
    }

    fn executor_id(&self) -> &str {
        &self.id
    }
}
