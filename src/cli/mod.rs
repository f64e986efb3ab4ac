//! CLI subcommand definitions and handlers.
//!
//! - `portwatch run` - Scan now, or on a schedule
//! - `portwatch show` - Print the stored port state

mod run;
mod show;

pub use run::RunCommand;
pub use show::ShowCommand;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// portwatch - watch networks for open-port changes.
///
/// Runs masscan against the configured targets, compares the open ports
/// with the last scan, stores the new state and reports what changed.
#[derive(Parser, Debug)]
#[command(name = "portwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scheduled masscan runs with change alerts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH", env = "PORTWATCH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the configured targets
    #[command(alias = "r")]
    Run(RunCommand),

    /// Show stored open ports
    #[command(alias = "s")]
    Show(ShowCommand),
}
