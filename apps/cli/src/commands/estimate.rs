//! Cost estimation command.

use anyhow::Result;
use colored::Colorize;
use juris_abstraction::AnalysisType;
use juris_orchestrator::{EngineConfig, ModelRouter};
use serde_json::json;
use std::path::Path;

/// Execute estimate command.
pub async fn execute(config: &EngineConfig, file: &Path, analysis_type: AnalysisType, json: bool) -> Result<()> {
    let (text, size_mb) = super::read_document(file).await?;
    let router = ModelRouter::new(config.routing.clone(), config.pricing.clone())
        .with_budget(config.budget.max_cost_per_analysis);

    let score = router.score(&text, size_mb);
    let decision = router.route(analysis_type, &score, &text);
    let estimates = router.estimate_all(&text);

    if json {
        let body = json!({
            "analysis_type": analysis_type,
            "complexity_score": score.total_score,
            "estimates": estimates,
            "routing": decision,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("{}", "juris estimate".bold().cyan());
    println!();
    println!("  {:<10} {:>14} {:>14} {:>12}", "Tier", "Input tokens", "Output tokens", "Cost (USD)");
    for estimate in &estimates {
        let line = format!(
            "  {:<10} {:>14} {:>14} {:>12.4}",
            estimate.tier.as_str(),
            estimate.input_tokens,
            estimate.output_tokens,
            estimate.cost_estimate
        );
        if estimate.tier == decision.tier {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    println!();
    println!("  {} analysis routes to {} (${:.4})", analysis_type, decision.tier.to_string().bold(), decision.estimate.cost_estimate);
    println!("  {}", decision.reason.dimmed());
    Ok(())
}
