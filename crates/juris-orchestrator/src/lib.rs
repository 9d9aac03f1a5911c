//! Analysis orchestration for Juris.
//!
//! Ties the pieces of a cached, cost-aware case analysis together:
//!
//! - **Routing**: complexity scoring, tier selection, cost estimation and
//!   per-tier usage tracking
//! - **Keys**: content-addressed analysis keys
//! - **Retry**: backoff and tier fallback around the model call
//! - **Engine**: the per-request state machine over cache, lock and job store
//!
//! # Example
//!
//! ```rust,no_run
//! use juris_abstraction::AnalysisType;
//! use juris_orchestrator::{AnalysisEngine, AnalysisRequest, EngineConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(engine: AnalysisEngine) -> Result<(), Box<dyn std::error::Error>> {
//! let request = AnalysisRequest::new("case-1042", AnalysisType::Strategic);
//! let outcome = engine.analyze(&request, &CancellationToken::new()).await?;
//! if let Some(report) = outcome.report() {
//!     println!("{} (cached: {})", report.tier, report.cached);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod keys;
pub mod prompts;
pub mod retry;
pub mod routing;

pub use config::{BudgetConfig, ConfigError, EngineConfig, ModelSettings};
pub use engine::{
    AnalysisEngine, AnalysisOutcome, AnalysisPlan, AnalysisReport, AnalysisRequest, EngineError,
    EngineStats, EngineStatsSnapshot, MAX_POLL_INTERVAL,
};
pub use keys::{AnalysisKey, AnalysisKeyGenerator, KeyError, NO_MUTATION, prompt_signature};
pub use prompts::template_for;
pub use retry::{
    AttemptRecord, RetryError, RetryOrchestrator, RetryOutcome, RetryPolicy, RetryTelemetry,
};
pub use routing::{
    ComplexityFactor, ComplexityScore, ComplexityScorer, CostEstimate, CostMetrics, CostTracker,
    DecisionType, FactorCaps, ModelRouter, PricingTable, RoutingConfig, RoutingDecision,
    TierMetrics, TierPricing, round_cost,
};
