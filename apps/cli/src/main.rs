//! Juris CLI - command-line interface for the Juris analysis engine
//!
//! This CLI provides a `juris` command for scoring case documents, estimating
//! analysis cost, deriving analysis keys and running cached analyses against
//! a SQLite store shared by every process on the host.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use juris_abstraction::AnalysisType;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{analyze, config as config_cmd, estimate, invalidate, key, score};

/// Juris - cached, cost-aware legal case analysis
#[derive(Parser, Debug)]
#[command(
    name = "juris",
    author,
    version,
    about = "Juris - cached, cost-aware legal case analysis",
    long_about = "Juris scores case documents, routes them to a model tier by complexity and budget,\nand caches results under content-addressed keys so each analysis runs once."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (defaults to ./juris.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database shared by every juris process on this host
    #[arg(long, default_value = "juris.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score the complexity of a document
    Score {
        /// Text file to score
        file: PathBuf,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Estimate tokens and cost of a document at every tier
    Estimate {
        /// Text file to estimate
        file: PathBuf,

        /// Analysis type used for the routing decision
        #[arg(short = 't', long = "type", default_value = "strategic")]
        analysis_type: AnalysisType,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Derive the analysis key of a case without running it
    Key {
        /// Directory holding one sub-directory per case
        #[arg(long)]
        root: PathBuf,

        /// Case identifier
        #[arg(long = "case")]
        case_id: String,

        /// Analysis type
        #[arg(short = 't', long = "type", default_value = "strategic")]
        analysis_type: AnalysisType,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyse a case, reusing a cached result when one exists
    Analyze {
        /// Directory holding one sub-directory per case
        #[arg(long)]
        root: PathBuf,

        /// Case identifier
        #[arg(long = "case")]
        case_id: String,

        /// Analysis type
        #[arg(short = 't', long = "type", default_value = "strategic")]
        analysis_type: AnalysisType,

        /// Skip the cache read and recompute
        #[arg(long)]
        force: bool,

        /// Poll up to this many seconds while another process computes the same key
        #[arg(long, default_value_t = 0)]
        wait: u64,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every cached entry of an analysis key
    Invalidate {
        /// Analysis key (64 hex characters)
        key: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level, args.log_json)?;

    let engine_config = config::load(args.config.as_deref())?;

    match args.command {
        Command::Score { file, json } => {
            score::execute(&engine_config, &file, json).await?;
        }
        Command::Estimate { file, analysis_type, json } => {
            estimate::execute(&engine_config, &file, analysis_type, json).await?;
        }
        Command::Key { root, case_id, analysis_type, json } => {
            key::execute(&engine_config, &args.db, &root, &case_id, analysis_type, json).await?;
        }
        Command::Analyze { root, case_id, analysis_type, force, wait, json } => {
            let options = analyze::AnalyzeOptions { analysis_type, force, wait, json };
            analyze::execute(&engine_config, &args.db, &root, &case_id, options).await?;
        }
        Command::Invalidate { key } => {
            invalidate::execute(&engine_config, &args.db, &key).await?;
        }
        Command::Config => {
            config_cmd::execute(&engine_config)?;
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str, json: bool) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())?;
    }
    Ok(())
}
