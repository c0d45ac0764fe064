//! clock-freezer - runs one script with the wall clock pinned
//!
//! Invoked by `nbvisual` for every generated script. Exits with the
//! script's status, or 2 when no script is given.

use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use tracing::error;

use nbvisual_harness::config::default_frozen_at;
use nbvisual_harness::freezer::require_script;
use nbvisual_harness::{ClockFreezer, HarnessError, RenderSettings};

#[derive(Parser)]
#[command(name = "clock-freezer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Script to execute
    script: Option<PathBuf>,

    /// Instant every clock read returns
    #[arg(long)]
    frozen_at: Option<DateTime<Utc>>,

    /// Interpreter used to run the script
    #[arg(long, default_value = "python")]
    interpreter: String,

    /// Module whose `settings` receive the test mode flag (empty to skip)
    #[arg(long, default_value = "lavavu")]
    render_library: String,

    /// Leave the rendering library's test mode off
    #[arg(long)]
    no_test_mode: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let script = match require_script(args.script) {
        Ok(script) => script,
        Err(e @ HarnessError::Usage(_)) => {
            println!("{}", e);
            std::process::exit(e.exit_code());
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    let freezer = ClockFreezer::new(
        args.interpreter,
        args.frozen_at.unwrap_or_else(default_frozen_at),
        RenderSettings {
            library: args.render_library,
            test_mode: !args.no_test_mode,
        },
    );

    match freezer.run(&script).await {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}
