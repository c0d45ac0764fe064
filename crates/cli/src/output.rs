//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use nbvisual_harness::{DocumentResult, DocumentStatus, SuiteResult};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

fn headers() -> Vec<&'static str> {
    vec!["Notebook", "Status", "Images", "Duration", "Detail"]
}

fn row(result: &DocumentResult) -> Vec<String> {
    vec![
        result.name.clone(),
        result.status.as_str().to_string(),
        result.images.len().to_string(),
        format!("{} ms", result.duration_ms),
        result.error.clone().unwrap_or_default(),
    ]
}

fn status_badge(status: DocumentStatus) -> String {
    match status {
        DocumentStatus::Passed => "✓ passed".green().to_string(),
        DocumentStatus::Bootstrapped => "✓ bootstrapped".cyan().to_string(),
        DocumentStatus::Failed => "✗ failed".red().to_string(),
        DocumentStatus::Skipped => "- skipped".yellow().to_string(),
    }
}

/// Print the suite outcome
pub fn print_suite(suite: &SuiteResult, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if suite.results.is_empty() {
                println!("No notebooks found.");
            } else {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic);

                table.set_header(headers());
                for result in &suite.results {
                    let mut cells = row(result);
                    cells[1] = status_badge(result.status);
                    table.add_row(cells);
                }

                println!("{table}");
            }
            print_summary(suite);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(suite).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, result) in suite.results.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                for (header, value) in headers().iter().zip(row(result).iter()) {
                    println!("{}: {}", header, value);
                }
            }
            println!(
                "{} total, {} passed, {} bootstrapped, {} failed, {} skipped",
                suite.total, suite.passed, suite.bootstrapped, suite.failed, suite.skipped
            );
            if let Some(reason) = &suite.aborted {
                println!("aborted: {}", reason);
            }
        }
    }
}

fn print_summary(suite: &SuiteResult) {
    let line = format!(
        "{} mode: {} passed, {} bootstrapped, {} failed, {} skipped ({} ms)",
        suite.mode, suite.passed, suite.bootstrapped, suite.failed, suite.skipped, suite.duration_ms
    );
    if suite.success() {
        println!("{} {}", "✓".green(), line);
    } else {
        println!("{} {}", "✗".red(), line.bold());
    }
    if let Some(reason) = &suite.aborted {
        println!("{} {}", "aborted:".red().bold(), reason);
    }
}
