//! Delve CLI — run one deep-research session from the terminal.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use delve_core::research::EvidenceReportWriter;
use delve_core::{
    BreakerRegistry, DelveConfig, DuckDuckGoSearch, HeuristicEvaluator, HeuristicPlanner,
    InMemoryIndex, ResearchOrchestrator, RunOptions,
};

/// Delve: iterative deep research from the command line
#[derive(Parser, Debug)]
#[command(name = "delve", version, about, long_about = None)]
struct Cli {
    /// Research query to run
    query: String,

    /// Maximum research iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Completion score threshold in [0, 1]
    #[arg(long)]
    min_score: Option<f64>,

    /// Maximum external calls for the session
    #[arg(long)]
    budget: Option<usize>,

    /// Print the full outcome as JSON instead of the report
    #[arg(long)]
    json: bool,

    /// Mirror collected evidence into an in-memory similarity index
    #[arg(long)]
    index: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = DelveConfig::load(cli.config.as_deref())?;
    if let Some(n) = cli.max_iterations {
        config.research.max_iterations = n;
    }
    if let Some(score) = cli.min_score {
        config.research.min_completion_score = score;
    }
    if let Some(n) = cli.budget {
        config.research.call_budget = n;
    }
    config.validate()?;

    let mut orchestrator = ResearchOrchestrator::new(
        Arc::new(HeuristicPlanner::new()),
        Arc::new(DuckDuckGoSearch::new(config.search.clone())?),
        Arc::new(EvidenceReportWriter::new()),
        Arc::new(HeuristicEvaluator::new(
            config.research.coverage_areas.clone(),
        )),
        Arc::new(BreakerRegistry::new(config.breaker.clone())),
        config.research.clone(),
    );
    if cli.index {
        orchestrator = orchestrator.with_index(Arc::new(InMemoryIndex::default()));
    }

    let outcome = orchestrator
        .run(&cli.query, RunOptions::from_config(&config.research))
        .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.final_report);
        eprintln!(
            "status: {:?} | level: {:?} | score: {:.2} | evidence: {} | {:.1}s",
            outcome.status,
            outcome.completion_level,
            outcome.quality_score,
            outcome.total_evidence_count,
            outcome.execution_time_seconds,
        );
    }

    Ok(())
}
