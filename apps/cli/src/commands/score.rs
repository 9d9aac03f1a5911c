//! Complexity scoring command.

use anyhow::Result;
use colored::Colorize;
use juris_orchestrator::{ComplexityScore, EngineConfig, ModelRouter};
use std::path::Path;

/// Execute score command.
pub async fn execute(config: &EngineConfig, file: &Path, json: bool) -> Result<()> {
    let (text, size_mb) = super::read_document(file).await?;
    let router = ModelRouter::new(config.routing.clone(), config.pricing.clone());
    let score = router.score(&text, size_mb);

    if json {
        println!("{}", serde_json::to_string_pretty(&score)?);
    } else {
        print_score(&file.display().to_string(), &score);
    }
    Ok(())
}

fn print_score(name: &str, score: &ComplexityScore) {
    println!("{}", "juris score".bold().cyan());
    println!();
    println!("  File:             {}", name);
    println!("  Complexity score: {:.2}", score.total_score);
    println!("  Recommended tier: {}", score.recommended_tier.to_string().green());
    println!();
    println!("  {}", "Factors".bold());
    for (factor, value) in score.top_factors(score.factors.len()) {
        println!("    {:<12} {:>6.2}", factor.as_str(), value);
    }
    println!();
    println!("  {}", score.reasoning.dimmed());
}
