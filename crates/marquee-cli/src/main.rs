//! Marquee CLI - Headless playback orchestration runner
//!
//! Features:
//! - Scenario and configuration validation
//! - Next-up preload point calculation
//! - Scripted playback scenarios against simulated providers

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;
mod scenario;

/// Marquee CLI - Playback orchestration toolkit
#[derive(Parser)]
#[command(name = "marquee-cli")]
#[command(author = "Marquee Developers")]
#[command(version)]
#[command(about = "Run and inspect playback orchestration scenarios", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit structured JSON logs
    #[arg(long)]
    json_logs: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a scenario: provider choice and next-up point per item
    Validate {
        /// Path to the scenario JSON
        scenario: PathBuf,

        /// Configuration overriding the scenario's own
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show where next-item preloading starts
    Nextup {
        /// Item duration in seconds
        #[arg(short, long)]
        duration: f64,

        /// Offset in seconds, negative from the end, or a percentage like "85%"
        #[arg(short, long)]
        offset: Option<String>,
    },

    /// Run a scripted scenario and print the facade events
    Simulate {
        /// Path to the scenario JSON
        scenario: PathBuf,

        /// Configuration overriding the scenario's own
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the event log to a file as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    marquee_core::init();

    match cli.command {
        Commands::Validate { scenario, config } => {
            commands::validate(&scenario, config.as_deref(), &cli.format)?;
        }
        Commands::Nextup { duration, offset } => {
            commands::nextup(duration, offset.as_deref(), &cli.format)?;
        }
        Commands::Simulate { scenario, config, output } => {
            commands::simulate(&scenario, config.as_deref(), output, &cli.format).await?;
        }
    }

    Ok(())
}
