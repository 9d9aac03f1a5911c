//! Complexity scoring for tier selection.
//!
//! Pure and deterministic: the same text and file size always produce the
//! same score on every worker. Each factor is clamped to its cap and the
//! rounded factors are summed.

use juris_abstraction::Tier;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::types::{ComplexityFactor, ComplexityScore, FactorCaps, RoutingConfig};

/// Characters of text that earn one length point.
const CHARS_PER_LENGTH_POINT: f64 = 2_000.0;

/// Points per megabyte of original file size.
const POINTS_PER_MB: f64 = 3.0;

/// Points per legal term per 1,000 words.
const POINTS_PER_LEGAL_TERM_DENSITY: f64 = 2.5;

/// Points per distinct entity.
const POINTS_PER_ENTITY: f64 = 1.5;

/// Points per monetary amount per 1,000 words.
const POINTS_PER_MONETARY_DENSITY: f64 = 3.0;

/// Smallest word count densities are computed against, so a one-line
/// snippet with a single dollar amount is not "dense".
const DENSITY_WORD_FLOOR: usize = 250;

static LEGAL_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(plaintiffs?|defendants?|appellants?|appellees?|petitioners?|respondents?|motions?|injunctions?|subpoenas?|affidavits?|depositions?|discovery|jurisdiction|statutes?|precedents?|torts?|liability|indemnif\w*|breach(?:es|ed)?|damages|settlements?|arbitration|appeals?|verdicts?|judgments?|counterclaims?|estoppel|negligen(?:ce|t)|fiduciary|habeas\s+corpus|class\s+action|pleadings?|complaints?|dockets?|testimony|witness(?:es)?|exhibits?|remand(?:ed)?|certiorari|stipulations?|liens?|covenants?|warrant(?:y|ies))\b",
    )
    .unwrap_or_else(|e| unreachable!("legal term pattern is valid: {e}"))
});

static ENTITIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:[A-Z][A-Za-z&'-]+\s+){0,3}[A-Z][A-Za-z&'-]+,?\s+(?:Inc|LLC|Ltd|Corp|Co|LLP|LP|PLC|GmbH|S\.A)\b\.?|\b[A-Z][A-Za-z'-]+\s+v\.?\s+[A-Z][A-Za-z'-]+",
    )
    .unwrap_or_else(|e| unreachable!("entity pattern is valid: {e}"))
});

static MONETARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:[$€£]\s?\d[\d,]*(?:\.\d+)?|\b(?:usd|eur|gbp)\s?\d[\d,]*(?:\.\d+)?)(?:\s?(?:thousand|million|billion|k|m|bn)\b)?",
    )
    .unwrap_or_else(|e| unreachable!("monetary pattern is valid: {e}"))
});

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Complexity scorer for routing decisions.
#[derive(Debug, Clone)]
pub struct ComplexityScorer {
    /// Per-factor caps.
    caps: FactorCaps,
    /// Lowest score routed to Balanced.
    balanced_min: f64,
    /// Lowest score routed to Pro.
    pro_min: f64,
}

impl ComplexityScorer {
    /// Creates a scorer from routing configuration.
    #[must_use]
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            caps: config.caps.clone(),
            balanced_min: config.balanced_min,
            pro_min: config.pro_min,
        }
    }

    /// Maps a total score to a tier through the breakpoints.
    ///
    /// Non-decreasing in `score`. NaN maps to Lite.
    pub fn tier_for(&self, score: f64) -> Tier {
        if score >= self.pro_min {
            Tier::Pro
        } else if score >= self.balanced_min {
            Tier::Balanced
        } else {
            Tier::Lite
        }
    }

    /// Scores `text` extracted from files totalling `file_size_mb`.
    ///
    /// Never fails; empty or garbled input scores as minimal complexity.
    pub fn score(&self, text: &str, file_size_mb: f64) -> ComplexityScore {
        let words = text.split_whitespace().count();
        let density_base = words.max(DENSITY_WORD_FLOOR) as f64 / 1_000.0;

        let raw = [
            (ComplexityFactor::Length, text.chars().count() as f64 / CHARS_PER_LENGTH_POINT),
            (ComplexityFactor::FileSize, file_size_mb * POINTS_PER_MB),
            (
                ComplexityFactor::LegalTerms,
                LEGAL_TERMS.find_iter(text).count() as f64 / density_base * POINTS_PER_LEGAL_TERM_DENSITY,
            ),
            (ComplexityFactor::Entities, Self::distinct_entities(text) as f64 * POINTS_PER_ENTITY),
            (
                ComplexityFactor::Monetary,
                MONETARY.find_iter(text).count() as f64 / density_base * POINTS_PER_MONETARY_DENSITY,
            ),
        ];

        let factors: BTreeMap<ComplexityFactor, f64> = raw
            .into_iter()
            .map(|(factor, points)| {
                let points = if points.is_finite() { points } else { 0.0 };
                (factor, round2(points.clamp(0.0, self.caps.cap(factor).max(0.0))))
            })
            .collect();

        let total_score = round2(factors.values().sum::<f64>().clamp(0.0, 100.0));
        let recommended_tier = self.tier_for(total_score);

        let mut score = ComplexityScore {
            total_score,
            factors,
            recommended_tier,
            reasoning: String::new(),
        };
        score.reasoning = self.explain(&score);

        debug!(
            total_score = score.total_score,
            tier = %score.recommended_tier,
            words,
            "Scored document complexity"
        );

        score
    }

    fn distinct_entities(text: &str) -> usize {
        ENTITIES
            .find_iter(text)
            .map(|m| {
                m.as_str()
                    .trim_end_matches('.')
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase()
            })
            .collect::<HashSet<_>>()
            .len()
    }

    fn explain(&self, score: &ComplexityScore) -> String {
        let band = match score.recommended_tier {
            Tier::Pro => format!("at or above {}", self.pro_min),
            Tier::Balanced => format!("between {} and {}", self.balanced_min, self.pro_min),
            Tier::Lite => format!("below {}", self.balanced_min),
        };

        let drivers: Vec<String> = score
            .top_factors(2)
            .into_iter()
            .filter(|(_, value)| *value > 0.0)
            .map(|(factor, value)| format!("{} {:.2}", factor, value))
            .collect();

        if drivers.is_empty() {
            format!("score {:.2} is {}; no complexity signals found", score.total_score, band)
        } else {
            format!(
                "score {:.2} is {} ({}); driven by {}",
                score.total_score,
                band,
                score.recommended_tier,
                drivers.join(", ")
            )
        }
    }
}

impl Default for ComplexityScorer {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn litigation_brief() -> String {
        let paragraph = "The plaintiff Acme Holdings Inc. alleges breach of contract and negligence \
             against the defendant Beta Logistics LLC, seeking damages of $2,500,000 plus \
             an injunction. See Smith v. Jones and Doe v. Roe. The motion for summary \
             judgment cites the indemnification covenant and the arbitration clause. \
             Gamma Partners LLP filed an affidavit and a counterclaim for USD 750,000. ";
        paragraph.repeat(40)
    }

    #[test]
    fn test_empty_text_is_minimal() {
        let scorer = ComplexityScorer::default();
        let score = scorer.score("", 0.0);
        assert!(score.total_score.abs() < f64::EPSILON);
        assert_eq!(score.recommended_tier, Tier::Lite);
        assert!(score.reasoning.contains("no complexity signals"));
    }

    #[test]
    fn test_garbled_inputs_do_not_fail() {
        let scorer = ComplexityScorer::default();
        let score = scorer.score("\u{0}\u{fffd}###", f64::NAN);
        assert_eq!(score.recommended_tier, Tier::Lite);
        let negative = scorer.score("short", -10.0);
        assert!(negative.factor(ComplexityFactor::FileSize).abs() < f64::EPSILON);
    }

    #[test]
    fn test_routine_letter_routes_to_lite() {
        let scorer = ComplexityScorer::default();
        let score = scorer.score("Please find attached the scheduling notice for next week.", 0.01);
        assert_eq!(score.recommended_tier, Tier::Lite);
    }

    #[test]
    fn test_dense_litigation_routes_to_pro() {
        let scorer = ComplexityScorer::default();
        let text = litigation_brief();
        let score = scorer.score(&text, 4.0);

        assert!(score.total_score >= 65.0, "expected Pro-level score, got {}", score.total_score);
        assert_eq!(score.recommended_tier, Tier::Pro);
        assert!(score.factor(ComplexityFactor::Entities) > 0.0);
        assert!(score.factor(ComplexityFactor::Monetary) > 0.0);
        assert!((score.factor(ComplexityFactor::LegalTerms) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_factors_are_capped() {
        let scorer = ComplexityScorer::default();
        let score = scorer.score(&"x".repeat(1_000_000), 500.0);
        assert!((score.factor(ComplexityFactor::Length) - 30.0).abs() < f64::EPSILON);
        assert!((score.factor(ComplexityFactor::FileSize) - 15.0).abs() < f64::EPSILON);
        assert!(score.total_score <= 100.0);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let scorer = ComplexityScorer::default();
        let text = litigation_brief();
        assert_eq!(scorer.score(&text, 1.5), scorer.score(&text, 1.5));
    }

    #[test]
    fn test_entities_are_counted_once() {
        let once = ComplexityScorer::distinct_entities("Acme Holdings Inc. signed. Acme Holdings Inc. paid.");
        assert_eq!(once, 1);
        let cases = ComplexityScorer::distinct_entities("Smith v. Jones, then Doe v Roe");
        assert_eq!(cases, 2);
    }

    #[test]
    fn test_tier_is_monotonic_in_score() {
        let scorer = ComplexityScorer::default();
        let mut previous = Tier::Lite;
        for step in 0..=1000 {
            let tier = scorer.tier_for(f64::from(step) / 10.0);
            assert!(tier >= previous, "tier decreased at score {}", f64::from(step) / 10.0);
            previous = tier;
        }
        assert_eq!(scorer.tier_for(34.99), Tier::Lite);
        assert_eq!(scorer.tier_for(35.0), Tier::Balanced);
        assert_eq!(scorer.tier_for(64.99), Tier::Balanced);
        assert_eq!(scorer.tier_for(65.0), Tier::Pro);
    }
}
