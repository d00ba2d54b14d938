//! CLI command definitions.
//!
//! Each subcommand maps to one operation of the launcher.

use clap::{Parser, Subcommand};
use launchpad_core::FailureKind;
use thiserror::Error;

pub mod choose_dir;
pub mod doctor;
pub mod open;
pub mod start;

/// Launchpad - run a frontend and its server locally with one command
#[derive(Parser)]
#[command(name = "launchpad")]
#[command(version, about = "Launchpad - clone, prepare and run a web project locally")]
#[command(long_about = r#"
Launchpad clones or updates a frontend repository and an optional server
repository, installs what they need and keeps both dev servers running.

COMMANDS:
  start       → Sync, install and run the configured repositories
  doctor      → Check the tools a profile needs
  open        → Open a link in the default browser
  choose-dir  → Pick a workspace directory

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Required tool missing
  4 - Repository sync, install or build failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress relayed process output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit diagnostics as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync, install and run the configured repositories
    Start(start::StartArgs),

    /// Check the tools a profile needs
    Doctor(doctor::DoctorArgs),

    /// Open an http(s) link in the default browser
    Open(open::OpenArgs),

    /// Pick a workspace directory
    #[command(name = "choose-dir")]
    ChooseDir(choose_dir::ChooseDirArgs),
}

/// A launch that ended in the `error` step.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LaunchFailed {
    pub kind: FailureKind,
    pub message: String,
}
