//! Model router for tier selection and cost estimation.

use juris_abstraction::{AnalysisType, Tier};
use std::sync::Arc;
use tracing::{debug, info};

use super::complexity::ComplexityScorer;
use super::cost_tracker::CostTracker;
use super::types::{
    ComplexityScore, CostEstimate, DecisionType, PricingTable, RoutingConfig, RoutingDecision,
};

/// Rounds a USD amount to 4 decimal places.
pub fn round_cost(cost: f64) -> f64 {
    (cost * 10_000.0).round() / 10_000.0
}

/// Model router for selecting a tier and estimating its cost.
///
/// Constructed explicitly and shared by reference; there is no process-wide
/// router instance.
#[derive(Debug)]
pub struct ModelRouter {
    /// Routing configuration.
    config: RoutingConfig,
    /// Tier pricing.
    pricing: PricingTable,
    /// Maximum estimated cost per analysis, if any.
    budget: Option<f64>,
    /// Complexity scorer sharing the breakpoints.
    scorer: ComplexityScorer,
    /// Per-tier usage tracking.
    cost_tracker: Arc<CostTracker>,
}

impl ModelRouter {
    /// Creates a router without a budget.
    #[must_use]
    pub fn new(config: RoutingConfig, pricing: PricingTable) -> Self {
        let scorer = ComplexityScorer::new(&config);
        let cost_tracker = Arc::new(CostTracker::new(pricing.clone()));
        Self { config, pricing, budget: None, scorer, cost_tracker }
    }

    /// Caps the estimated cost of a single analysis.
    #[must_use]
    pub fn with_budget(mut self, max_cost_per_analysis: Option<f64>) -> Self {
        self.budget = max_cost_per_analysis;
        self
    }

    /// Scores a text. See [`ComplexityScorer::score`].
    pub fn score(&self, text: &str, file_size_mb: f64) -> ComplexityScore {
        self.scorer.score(text, file_size_mb)
    }

    /// Maps a complexity score to a tier.
    pub fn select_tier(&self, score: f64) -> Tier {
        self.scorer.tier_for(score)
    }

    /// Estimated input tokens for `text`.
    pub fn estimate_tokens(&self, text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(self.config.chars_per_token.max(1))
    }

    /// Estimates tokens and cost for running `text` at `tier`.
    pub fn estimate_cost(&self, text: &str, tier: Tier) -> CostEstimate {
        let input_tokens = self.estimate_tokens(text);
        let output_tokens = self.config.expected_output_tokens;
        CostEstimate {
            tier,
            input_tokens,
            output_tokens,
            cost_estimate: round_cost(self.pricing.get(tier).cost(input_tokens, output_tokens)),
        }
    }

    /// Estimates for every tier, cheapest first.
    pub fn estimate_all(&self, text: &str) -> Vec<CostEstimate> {
        Tier::ALL.iter().map(|tier| self.estimate_cost(text, *tier)).collect()
    }

    /// Chooses the tier for an analysis.
    ///
    /// Essential analyses always run at Lite. Other types follow the
    /// complexity score, then step down while the estimate exceeds the
    /// budget. Lite is the floor even when it is over budget.
    pub fn route(&self, analysis_type: AnalysisType, score: &ComplexityScore, text: &str) -> RoutingDecision {
        if analysis_type == AnalysisType::Essential {
            return RoutingDecision {
                tier: Tier::Lite,
                requested_tier: Tier::Lite,
                decision_type: DecisionType::Fixed,
                estimate: self.estimate_cost(text, Tier::Lite),
                reason: "essential analyses always run at lite".to_string(),
            };
        }

        let requested_tier = self.select_tier(score.total_score);
        let mut tier = requested_tier;
        let mut estimate = self.estimate_cost(text, tier);

        if let Some(budget) = self.budget {
            while estimate.cost_estimate > budget {
                let Some(lower) = tier.downgrade() else { break };
                debug!(
                    from = %tier,
                    to = %lower,
                    cost = estimate.cost_estimate,
                    budget,
                    "Estimate over budget, stepping down"
                );
                tier = lower;
                estimate = self.estimate_cost(text, tier);
            }
        }

        let decision = if tier == requested_tier {
            RoutingDecision {
                tier,
                requested_tier,
                decision_type: DecisionType::Complexity,
                estimate,
                reason: score.reasoning.clone(),
            }
        } else {
            RoutingDecision {
                tier,
                requested_tier,
                decision_type: DecisionType::BudgetDowngrade,
                estimate,
                reason: format!(
                    "{} estimate exceeds budget of ${:.4}; using {} at ${:.4}",
                    requested_tier,
                    self.budget.unwrap_or_default(),
                    tier,
                    estimate.cost_estimate
                ),
            }
        };

        info!(
            tier = %decision.tier,
            requested_tier = %decision.requested_tier,
            complexity_score = score.total_score,
            cost_estimate = decision.estimate.cost_estimate,
            "Routing decision"
        );
        decision
    }

    /// Records a completed model call. Returns its cost, rounded.
    pub fn track_usage(&self, tier: Tier, input_tokens: u64, output_tokens: u64) -> f64 {
        round_cost(self.cost_tracker.track(tier, input_tokens, output_tokens))
    }

    /// Per-tier usage tracker.
    pub fn cost_tracker(&self) -> &CostTracker {
        &self.cost_tracker
    }

    /// Routing configuration.
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Tier pricing.
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(RoutingConfig::default(), PricingTable::default())
    }
}
