//! Analysis command.

use anyhow::{Result, anyhow};
use colored::Colorize;
use juris_abstraction::AnalysisType;
use juris_orchestrator::{AnalysisOutcome, AnalysisReport, AnalysisRequest, EngineConfig};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Flags of the analyze command.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    /// Analysis type.
    pub analysis_type: AnalysisType,
    /// Skip the cache read.
    pub force: bool,
    /// Seconds to poll while the key is busy.
    pub wait: u64,
    /// Print JSON.
    pub json: bool,
}

/// Execute analyze command.
pub async fn execute(
    config: &EngineConfig,
    db_path: &Path,
    root: &Path,
    case_id: &str,
    options: AnalyzeOptions,
) -> Result<()> {
    let engine = super::build_engine(config, db_path, root)?;
    let request = AnalysisRequest::new(case_id, options.analysis_type).with_force_refresh(options.force);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling analysis");
            on_interrupt.cancel();
        }
    });

    let result = if options.wait > 0 {
        engine.analyze_until_ready(&request, Duration::from_secs(options.wait), &cancel).await
    } else {
        engine.analyze(&request, &cancel).await
    };

    let outcome = result.map_err(|err| anyhow!("{} (retryable: {})", err.reason(), err.is_retryable()))?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        AnalysisOutcome::Completed(report) => print_report(&report)?,
        AnalysisOutcome::Busy { retry_after_secs, stale } => {
            println!(
                "{} Case '{}' is being analysed by another process; retry in {}s",
                "…".yellow(),
                case_id,
                retry_after_secs
            );
            if let Some(version) = stale {
                println!(
                    "  Latest stored version: v{} ({} tier, {})",
                    version.version,
                    version.tier,
                    version.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                println!("{}", serde_json::to_string_pretty(&version.payload)?);
            }
        }
    }
    Ok(())
}

fn print_report(report: &AnalysisReport) -> Result<()> {
    let source = if report.cached { "cache".green() } else { "model".cyan() };

    println!("{}", "juris analyze".bold().cyan());
    println!();
    println!("  Case:       {} ({})", report.case_id, report.analysis_type);
    println!("  Source:     {}", source);
    println!("  Tier:       {}", report.tier);
    println!("  Version:    v{}", report.version);
    println!("  Cost:       ${:.4}", report.cost_estimate);
    println!("  Tokens:     {} in / {} out", report.input_tokens, report.output_tokens);
    println!("  Time:       {} ms", report.processing_time_ms);
    println!("  Key:        {}", report.analysis_key.as_str().dimmed());
    if let Some(telemetry) = &report.telemetry {
        if telemetry.attempt_count() > 1 {
            let tiers: Vec<&str> = telemetry.tiers_attempted().iter().map(|t| t.as_str()).collect();
            println!("  Attempts:   {}", tiers.join(" → "));
        }
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&report.result)?);
    Ok(())
}
