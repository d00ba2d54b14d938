//! # launchpad_core
//!
//! Provisioning and process orchestration for Launchpad.
//!
//! This crate takes a pair of repositories (a frontend and an optional
//! server), makes sure the host has the tools to run them, syncs and prepares
//! both checkouts and keeps their dev servers running until stopped.
//!
//! # Architecture
//!
//! - **Launcher**: drives a run through the pipeline and owns its processes
//! - **Profiles**: per-stack strategy for tools, env layout and commands
//! - **StatusHub**: the single observable [`LaunchStatus`] record
//! - **Supervisor**: spawns, watches and stops the dev servers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use launchpad_core::{FrontendRepo, Launcher, LauncherOptions, RepoConfig, ServerRepo};
//! use launchpad_runner::ProcessRunner;
//!
//! #[tokio::main]
//! async fn main() {
//!     let launcher = Launcher::new(Arc::new(ProcessRunner::default()), LauncherOptions::default());
//!     let _updates = launcher.on_status_update(|status| println!("{}", status.step));
//!
//!     let config = RepoConfig::new(FrontendRepo::new("https://example.com/acme/web.git"))
//!         .with_server(ServerRepo::new("https://example.com/acme/api.git"));
//!     let outcome = launcher.start(config).await;
//!     if !outcome.ok {
//!         eprintln!("{}", outcome.error.unwrap_or_default());
//!     }
//! }
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod database;
pub mod dotenv;
pub mod env;
pub mod error;
pub mod git;
pub mod install;
pub mod launcher;
pub mod materialize;
pub mod profile;
pub mod remediation;
pub mod status;
pub mod supervisor;
pub mod tools;

// Re-export main types for convenience
pub use api::{LauncherApi, LauncherService, Shell, StatusCallback};
pub use config::{default_workspace_dir, FrontendRepo, ProfileKind, RepoConfig, ServerRepo};
pub use context::{ExecContext, LaunchContext, RunToken};
pub use database::{DatabaseProvisioner, ReadinessPolicy};
pub use dotenv::DotEnv;
pub use env::{DbConnection, EnvContext, FRONTEND_KEYS, SERVER_KEYS};
pub use error::{CoreError, CoreResult, FailureKind};
pub use git::{RepoSync, SyncAction};
pub use install::{DependencyInstaller, InstallPlan};
pub use launcher::{LaunchOutcome, Launcher, LauncherOptions, StopReport};
pub use materialize::{write_env_files, EnvFileSpec, WriteMode};
pub use profile::{for_kind, TargetProfile};
pub use remediation::{classify, Remediation, RemediationCategory};
pub use status::{LaunchStatus, Role, StatusHub, Step, SubStatus, Subscription, TargetStep};
pub use supervisor::{resolve_frontend_command, KillOutcome, Supervisor};
pub use tools::{JsPackageManager, ToolProber, ToolReport, ToolRequirements};
