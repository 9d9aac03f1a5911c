//! Model tiers and analysis types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model quality/cost tier.
///
/// Variants are declared cheapest first so the derived `Ord` matches cost:
/// `Lite < Balanced < Pro`. Fallback walks this order downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Cheapest, fastest tier for routine documents.
    Lite,
    /// Mid-priced tier for typical case files.
    Balanced,
    /// Highest-capability tier for complex litigation.
    Pro,
}

impl Tier {
    /// Every tier, cheapest first.
    pub const ALL: [Tier; 3] = [Tier::Lite, Tier::Balanced, Tier::Pro];

    /// Returns the next cheaper tier, if any.
    #[must_use]
    pub const fn downgrade(self) -> Option<Tier> {
        match self {
            Tier::Pro => Some(Tier::Balanced),
            Tier::Balanced => Some(Tier::Lite),
            Tier::Lite => None,
        }
    }

    /// Tier name as used in config files, cache payloads and telemetry.
    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Lite => "lite",
            Tier::Balanced => "balanced",
            Tier::Pro => "pro",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tier or analysis type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseNameError {
    kind: &'static str,
    value: String,
}

impl FromStr for Tier {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lite" => Ok(Tier::Lite),
            "balanced" => Ok(Tier::Balanced),
            "pro" => Ok(Tier::Pro),
            _ => Err(ParseNameError { kind: "tier", value: s.to_string() }),
        }
    }
}

/// Kind of analysis requested for a case.
///
/// The type picks the prompt template and the cache namespace the result is
/// stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// Low-cost summary, always computed at [`Tier::Lite`].
    Essential,
    /// Full strategic assessment, routed by document complexity.
    Strategic,
    /// Long-form report, routed by document complexity.
    Report,
}

impl AnalysisType {
    /// Analysis type name as stored in job and version records.
    pub const fn as_str(self) -> &'static str {
        match self {
            AnalysisType::Essential => "essential",
            AnalysisType::Strategic => "strategic",
            AnalysisType::Report => "report",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "essential" => Ok(AnalysisType::Essential),
            "strategic" => Ok(AnalysisType::Strategic),
            "report" => Ok(AnalysisType::Report),
            _ => Err(ParseNameError { kind: "analysis type", value: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_matches_cost() {
        assert!(Tier::Lite < Tier::Balanced);
        assert!(Tier::Balanced < Tier::Pro);
        let mut tiers = vec![Tier::Pro, Tier::Lite, Tier::Balanced];
        tiers.sort();
        assert_eq!(tiers, Tier::ALL.to_vec());
    }

    #[test]
    fn test_downgrade_chain() {
        assert_eq!(Tier::Pro.downgrade(), Some(Tier::Balanced));
        assert_eq!(Tier::Balanced.downgrade(), Some(Tier::Lite));
        assert_eq!(Tier::Lite.downgrade(), None);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("PRO".parse::<Tier>().unwrap(), Tier::Pro);
        assert_eq!(" balanced ".parse::<Tier>().unwrap(), Tier::Balanced);
        assert!("gold".parse::<Tier>().is_err());
        assert_eq!("report".parse::<AnalysisType>().unwrap(), AnalysisType::Report);
        let err = "summary".parse::<AnalysisType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown analysis type 'summary'");
    }

    #[test]
    fn test_tier_serde_lowercase() {
        let json = serde_json::to_string(&Tier::Balanced).unwrap();
        assert_eq!(json, "\"balanced\"");
        let tier: Tier = serde_json::from_str("\"pro\"").unwrap();
        assert_eq!(tier, Tier::Pro);
    }
}
