//! Types for the routing system.

use juris_abstraction::Tier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Independent additive factor of a complexity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityFactor {
    /// Amount of text.
    Length,
    /// Size of the original files.
    FileSize,
    /// Density of legal terminology.
    LegalTerms,
    /// Distinct parties, companies and cited cases.
    Entities,
    /// Density of monetary amounts.
    Monetary,
}

impl ComplexityFactor {
    /// Every factor.
    pub const ALL: [ComplexityFactor; 5] = [
        ComplexityFactor::Length,
        ComplexityFactor::FileSize,
        ComplexityFactor::LegalTerms,
        ComplexityFactor::Entities,
        ComplexityFactor::Monetary,
    ];

    /// Factor name for reports and telemetry.
    pub const fn as_str(self) -> &'static str {
        match self {
            ComplexityFactor::Length => "length",
            ComplexityFactor::FileSize => "file_size",
            ComplexityFactor::LegalTerms => "legal_terms",
            ComplexityFactor::Entities => "entities",
            ComplexityFactor::Monetary => "monetary",
        }
    }
}

impl fmt::Display for ComplexityFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complexity score with breakdown of scoring factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityScore {
    /// Sum of the factors (0-100).
    pub total_score: f64,
    /// Points contributed by each factor, already capped.
    pub factors: BTreeMap<ComplexityFactor, f64>,
    /// Tier the breakpoints map the total to.
    pub recommended_tier: Tier,
    /// Human-readable explanation.
    pub reasoning: String,
}

impl ComplexityScore {
    /// The `n` largest factors.
    ///
    /// Sorted by value descending; equal values are ordered by factor name so
    /// the report is stable.
    pub fn top_factors(&self, n: usize) -> Vec<(ComplexityFactor, f64)> {
        let mut factors: Vec<(ComplexityFactor, f64)> =
            self.factors.iter().map(|(factor, value)| (*factor, *value)).collect();
        factors.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        factors.truncate(n);
        factors
    }

    /// Points for one factor, 0.0 if absent.
    pub fn factor(&self, factor: ComplexityFactor) -> f64 {
        self.factors.get(&factor).copied().unwrap_or(0.0)
    }
}

/// Maximum points per factor.
///
/// Part of the routing configuration; every worker must use the same values
/// or two workers may score one document set differently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorCaps {
    /// Cap for the length factor.
    #[serde(default = "default_length_cap")]
    pub length: f64,
    /// Cap for the file size factor.
    #[serde(default = "default_file_size_cap")]
    pub file_size: f64,
    /// Cap for the legal-term density factor.
    #[serde(default = "default_legal_terms_cap")]
    pub legal_terms: f64,
    /// Cap for the entity factor.
    #[serde(default = "default_entities_cap")]
    pub entities: f64,
    /// Cap for the monetary density factor.
    #[serde(default = "default_monetary_cap")]
    pub monetary: f64,
}

fn default_length_cap() -> f64 {
    30.0
}

fn default_file_size_cap() -> f64 {
    15.0
}

fn default_legal_terms_cap() -> f64 {
    25.0
}

fn default_entities_cap() -> f64 {
    15.0
}

fn default_monetary_cap() -> f64 {
    15.0
}

impl Default for FactorCaps {
    fn default() -> Self {
        Self {
            length: default_length_cap(),
            file_size: default_file_size_cap(),
            legal_terms: default_legal_terms_cap(),
            entities: default_entities_cap(),
            monetary: default_monetary_cap(),
        }
    }
}

impl FactorCaps {
    /// Cap for `factor`.
    pub fn cap(&self, factor: ComplexityFactor) -> f64 {
        match factor {
            ComplexityFactor::Length => self.length,
            ComplexityFactor::FileSize => self.file_size,
            ComplexityFactor::LegalTerms => self.legal_terms,
            ComplexityFactor::Entities => self.entities,
            ComplexityFactor::Monetary => self.monetary,
        }
    }
}

/// Routing configuration: breakpoints, caps and token estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Lowest score routed to Balanced (default: 35).
    #[serde(default = "default_balanced_min")]
    pub balanced_min: f64,
    /// Lowest score routed to Pro (default: 65).
    #[serde(default = "default_pro_min")]
    pub pro_min: f64,
    /// Per-factor caps.
    #[serde(default)]
    pub caps: FactorCaps,
    /// Characters per estimated token (default: 4).
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u64,
    /// Output tokens assumed for every estimate (default: 2000).
    #[serde(default = "default_expected_output_tokens")]
    pub expected_output_tokens: u64,
}

fn default_balanced_min() -> f64 {
    35.0
}

fn default_pro_min() -> f64 {
    65.0
}

fn default_chars_per_token() -> u64 {
    4
}

fn default_expected_output_tokens() -> u64 {
    2000
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            balanced_min: default_balanced_min(),
            pro_min: default_pro_min(),
            caps: FactorCaps::default(),
            chars_per_token: default_chars_per_token(),
            expected_output_tokens: default_expected_output_tokens(),
        }
    }
}

/// Price of one tier in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierPricing {
    /// Input price per 1M tokens.
    pub input_per_million: f64,
    /// Output price per 1M tokens.
    pub output_per_million: f64,
}

impl TierPricing {
    /// Unrounded cost of a call.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// Pricing for every tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    /// Lite tier pricing.
    #[serde(default = "default_lite_pricing")]
    pub lite: TierPricing,
    /// Balanced tier pricing.
    #[serde(default = "default_balanced_pricing")]
    pub balanced: TierPricing,
    /// Pro tier pricing.
    #[serde(default = "default_pro_pricing")]
    pub pro: TierPricing,
}

fn default_lite_pricing() -> TierPricing {
    TierPricing { input_per_million: 0.10, output_per_million: 0.40 }
}

fn default_balanced_pricing() -> TierPricing {
    TierPricing { input_per_million: 0.50, output_per_million: 2.00 }
}

fn default_pro_pricing() -> TierPricing {
    TierPricing { input_per_million: 2.50, output_per_million: 10.00 }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            lite: default_lite_pricing(),
            balanced: default_balanced_pricing(),
            pro: default_pro_pricing(),
        }
    }
}

impl PricingTable {
    /// Pricing for `tier`.
    pub fn get(&self, tier: Tier) -> TierPricing {
        match tier {
            Tier::Lite => self.lite,
            Tier::Balanced => self.balanced,
            Tier::Pro => self.pro,
        }
    }
}

/// Token and cost estimate for running a text at a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Tier the estimate is for.
    pub tier: Tier,
    /// Estimated input tokens.
    pub input_tokens: u64,
    /// Assumed output tokens.
    pub output_tokens: u64,
    /// Estimated cost in USD, rounded to 4 decimal places.
    pub cost_estimate: f64,
}

/// How the router arrived at a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// Breakpoint lookup on the complexity score.
    Complexity,
    /// Tier fixed by the analysis type.
    Fixed,
    /// Stepped down because the selected tier exceeded the budget.
    BudgetDowngrade,
}

/// Routing decision metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Tier to run at.
    pub tier: Tier,
    /// Tier chosen before any budget adjustment.
    pub requested_tier: Tier,
    /// Type of decision made.
    pub decision_type: DecisionType,
    /// Estimate at `tier`.
    pub estimate: CostEstimate,
    /// Why this tier was chosen.
    pub reason: String,
}
