//! Launchpad CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Required tool missing
//! - 4: Repository sync, install or build failure

use std::process::ExitCode;

use clap::Parser;
use launchpad_core::{CoreError, FailureKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod render;
mod shell;

use commands::{Cli, Commands, LaunchFailed};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const TOOL_MISSING: u8 = 3;
    pub const WORKFLOW_FAILURE: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive(if cli.verbose {
            tracing::Level::DEBUG.into()
        } else {
            "launchpad=info".parse().unwrap_or_else(|_| tracing::Level::INFO.into())
        })
        .add_directive(tracing::Level::WARN.into());

    let log_result = if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(false))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Start(args) => commands::start::execute(args, cli.quiet).await,
        Commands::Doctor(args) => commands::doctor::execute(args, cli.quiet).await,
        Commands::Open(args) => commands::open::execute(args).await,
        Commands::ChooseDir(args) => commands::choose_dir::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map an error to its exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    let kind = if let Some(failed) = e.downcast_ref::<LaunchFailed>() {
        failed.kind
    } else if let Some(core) = e.downcast_ref::<CoreError>() {
        core.kind()
    } else {
        FailureKind::Other
    };
    exit_code_for(kind)
}

fn exit_code_for(kind: FailureKind) -> u8 {
    match kind {
        FailureKind::Config => ExitCodes::INVALID_ARGS,
        FailureKind::ToolMissing => ExitCodes::TOOL_MISSING,
        FailureKind::Sync | FailureKind::Install | FailureKind::Build => {
            ExitCodes::WORKFLOW_FAILURE
        }
        FailureKind::Database | FailureKind::Spawn | FailureKind::Other => {
            ExitCodes::GENERAL_ERROR
        }
    }
}
