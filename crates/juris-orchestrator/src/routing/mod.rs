//! Complexity scoring, tier selection and cost estimation.

pub mod complexity;
pub mod cost_tracker;
pub mod router;
pub mod types;

pub use complexity::ComplexityScorer;
pub use cost_tracker::{CostMetrics, CostTracker, TierMetrics};
pub use router::{ModelRouter, round_cost};
pub use types::{
    ComplexityFactor, ComplexityScore, CostEstimate, DecisionType, FactorCaps, PricingTable,
    RoutingConfig, RoutingDecision, TierPricing,
};
