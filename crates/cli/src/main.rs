//! nbvisual - Main Entry Point
//!
//! Runs every notebook through conversion, frozen-clock execution and
//! baseline comparison, then prints and records the results.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use nbvisual_harness::{Harness, HarnessConfig, HarnessError, Mode, VERSION};

mod output;

/// Visual regression tests for rendering notebooks
#[derive(Parser)]
#[command(name = "nbvisual")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pass `thumbs` to run against the reduced-resolution baselines
    mode: Option<String>,

    /// Configuration file; defaults apply when it does not exist
    #[arg(long, default_value = "nbvisual.toml")]
    config: PathBuf,

    /// Override the comparison tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Record image mismatches and carry on instead of stopping
    #[arg(long)]
    keep_going: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<HarnessError>()
                .map(HarnessError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let root = std::env::current_dir().context("resolving working directory")?;

    let mut config = HarnessConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }
    if cli.keep_going {
        config.fail_fast = false;
    }

    let mode = Mode::from_arg(cli.mode.as_deref());
    let harness = Harness::new(root, config, mode)?;

    info!("nbvisual v{}", VERSION);
    info!(
        "Interpreter: {}, exporter: {}, runner: {}",
        harness.config().clock.interpreter,
        harness.exporter_name(),
        harness.runner().program.display()
    );

    // Written even when the run aborts, so finished documents are kept
    let mut suite = harness.start_suite();
    let outcome = harness.run_into(&mut suite).await;
    harness.write_report(&suite)?;

    output::print_suite(&suite, cli.format);
    outcome?;
    Ok(suite.success())
}
