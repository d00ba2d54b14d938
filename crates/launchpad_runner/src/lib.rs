//! # launchpad_runner
//!
//! Host process execution for Launchpad.
//!
//! This crate runs the external tools the launcher depends on (git, package
//! managers, build tools, database clients) and supervises the long-running
//! dev servers it starts.
//!
//! # Features
//!
//! - **Streaming output**: every line is tagged with its source and relayed
//! - **Augmented PATH**: freshly installed tools are found without a restart
//! - **Process trees**: children are stopped together with their descendants
//! - **Elevation**: administrative installs on Windows
//! - **Mock Runner**: for testing without touching the host
//!
//! # Example
//!
//! ```rust,no_run
//! use launchpad_runner::{discard_logs, CommandRunner, Invocation, OutputMode, ProcessRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::default();
//!
//!     let probe = runner.capture(&Invocation::new("git").arg("--version")).await?;
//!     println!("{}", probe.stdout.trim());
//!
//!     let pull = Invocation::new("git").arg("pull").cwd("/work/frontend").tag("frontend");
//!     runner.run(&pull, OutputMode::Streaming, &discard_logs()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod log;
pub mod mock;
pub mod opener;
pub mod platform;
pub mod process;
pub mod runner;

pub use config::{Invocation, OutputMode, EXEC_TAG};
pub use error::{RunnerError, RunnerResult};
pub use log::{discard_logs, looks_like_error, split_lines, ErrorLines, LogHandler, LogLine, LogStream};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use opener::{open_external_link, validate_link};
pub use platform::{compose_path, Platform};
pub use process::{ProcessRunner, ProcessRunnerOptions};
pub use runner::{CapturedOutput, CommandRunner, ExitInfo, SpawnedChild};
