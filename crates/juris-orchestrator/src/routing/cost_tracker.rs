//! Cost tracker for per-tier token and cost tracking.
//!
//! Per-worker observability only; lost on restart without consequence.

use juris_abstraction::Tier;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use super::types::PricingTable;

/// Metrics for a single tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierMetrics {
    /// Number of requests.
    pub request_count: u64,
    /// Total input tokens.
    pub input_tokens: u64,
    /// Total output tokens.
    pub output_tokens: u64,
    /// Cost in USD.
    pub cost: f64,
}

/// Overall cost metrics across all tiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostMetrics {
    /// Metrics per tier that saw traffic.
    pub tiers: BTreeMap<Tier, TierMetrics>,
    /// Total cost across all tiers.
    pub total_cost: f64,
    /// Total tokens across all tiers.
    pub total_tokens: u64,
}

impl CostMetrics {
    /// Requests across all tiers.
    pub fn request_count(&self) -> u64 {
        self.tiers.values().map(|m| m.request_count).sum()
    }

    /// Estimated savings versus running every request at Pro.
    ///
    /// Positive means money saved.
    pub fn savings_vs_pro(&self, pricing: &PricingTable) -> f64 {
        let input: u64 = self.tiers.values().map(|m| m.input_tokens).sum();
        let output: u64 = self.tiers.values().map(|m| m.output_tokens).sum();
        pricing.get(Tier::Pro).cost(input, output) - self.total_cost
    }
}

/// Cost tracker for per-tier usage and cost metrics.
#[derive(Debug)]
pub struct CostTracker {
    /// Internal metrics storage.
    metrics: RwLock<HashMap<Tier, TierMetrics>>,
    /// Pricing used to cost each call.
    pricing: PricingTable,
}

impl CostTracker {
    /// Creates a tracker using `pricing`.
    #[must_use]
    pub fn new(pricing: PricingTable) -> Self {
        Self { metrics: RwLock::new(HashMap::new()), pricing }
    }

    /// Records one model call. Returns its unrounded cost.
    pub fn track(&self, tier: Tier, input_tokens: u64, output_tokens: u64) -> f64 {
        let cost = self.pricing.get(tier).cost(input_tokens, output_tokens);

        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        let tier_metrics = metrics.entry(tier).or_default();
        tier_metrics.request_count += 1;
        tier_metrics.input_tokens += input_tokens;
        tier_metrics.output_tokens += output_tokens;
        tier_metrics.cost += cost;

        debug!(
            tier = %tier,
            input_tokens,
            output_tokens,
            cost,
            total_cost = tier_metrics.cost,
            "Tracked usage"
        );

        cost
    }

    /// Current metrics across all tiers.
    pub fn metrics(&self) -> CostMetrics {
        let metrics = self.metrics.read().unwrap_or_else(PoisonError::into_inner);
        let tiers: BTreeMap<Tier, TierMetrics> =
            metrics.iter().map(|(tier, m)| (*tier, m.clone())).collect();

        CostMetrics {
            total_cost: tiers.values().map(|m| m.cost).sum(),
            total_tokens: tiers.values().map(|m| m.input_tokens + m.output_tokens).sum(),
            tiers,
        }
    }

    /// Pricing used by this tracker.
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Resets all metrics to zero.
    pub fn reset(&self) {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner).clear();
        debug!("Reset cost tracking metrics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_per_tier() {
        let tracker = CostTracker::new(PricingTable::default());
        tracker.track(Tier::Lite, 1_000, 2_000);
        tracker.track(Tier::Lite, 1_000, 2_000);
        tracker.track(Tier::Pro, 500, 100);

        let metrics = tracker.metrics();
        assert_eq!(metrics.request_count(), 3);
        assert_eq!(metrics.tiers[&Tier::Lite].request_count, 2);
        assert_eq!(metrics.tiers[&Tier::Lite].input_tokens, 2_000);
        assert!(!metrics.tiers.contains_key(&Tier::Balanced));
        assert_eq!(metrics.total_tokens, 6_600);
    }

    #[test]
    fn test_savings_against_pro_baseline() {
        let pricing = PricingTable::default();
        let tracker = CostTracker::new(pricing.clone());
        tracker.track(Tier::Lite, 1_000_000, 0);

        let metrics = tracker.metrics();
        assert!((metrics.total_cost - 0.10).abs() < 1e-12);
        assert!((metrics.savings_vs_pro(&pricing) - 2.40).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let tracker = CostTracker::new(PricingTable::default());
        tracker.track(Tier::Balanced, 10, 10);
        tracker.reset();
        assert_eq!(tracker.metrics().request_count(), 0);
        assert!(tracker.metrics().total_cost.abs() < f64::EPSILON);
    }
}
