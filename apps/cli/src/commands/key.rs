//! Analysis key derivation command.

use anyhow::{Context, Result};
use colored::Colorize;
use juris_abstraction::AnalysisType;
use juris_orchestrator::{AnalysisRequest, EngineConfig, NO_MUTATION};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Execute key command.
pub async fn execute(
    config: &EngineConfig,
    db_path: &Path,
    root: &Path,
    case_id: &str,
    analysis_type: AnalysisType,
    json: bool,
) -> Result<()> {
    let engine = super::build_engine(config, db_path, root)?;
    let request = AnalysisRequest::new(case_id, analysis_type);
    let plan = engine
        .plan(&request, &CancellationToken::new())
        .await
        .with_context(|| format!("Failed to key case '{}'", case_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let mutation = plan
        .last_mutation_at
        .map_or_else(|| NO_MUTATION.to_string(), |at| at.to_rfc3339());

    println!("{}", plan.analysis_key);
    println!("  case:      {}", plan.case_id);
    println!("  type:      {}", plan.analysis_type);
    println!("  namespace: {}", plan.namespace);
    println!("  documents: {}", plan.document_count);
    println!("  mutation:  {}", mutation);
    println!("  tier:      {}", plan.routing.tier.to_string().green());
    println!("  {}", plan.routing.reason.dimmed());
    Ok(())
}
