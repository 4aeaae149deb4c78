//! ATNA Collector - Audit message receiver
//!
//! # Usage
//!
//! ```bash
//! # Run the collector (default)
//! atna-collector
//! atna-collector --config /etc/atna/collector.toml --log-level debug
//!
//! # Validate a configuration and exit
//! atna-collector check --config /etc/atna/collector.toml
//! ```

mod cmd;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use atna_config::LogLevel;
use clap::{Parser, Subcommand};

/// ATNA Collector - Audit message receiver
#[derive(Parser, Debug)]
#[command(name = "atna-collector")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/atna/collector.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides [log] level
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the collector (default)
    Serve,

    /// Validate the configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Check) => cmd::check::run(&cli.config),
        // No subcommand = run collector
        Some(Command::Serve) | None => cmd::serve::run(&cli.config, cli.log_level).await,
    }
}
