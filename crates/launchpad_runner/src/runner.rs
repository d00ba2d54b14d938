//! Command runner trait and types.

use std::fmt;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::config::{Invocation, OutputMode};
use crate::error::RunnerResult;
use crate::log::{ErrorLines, LogHandler};

/// Captured output of a probe-style invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// How a long-running child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Exit status could not be observed.
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    #[cfg(unix)]
    pub(crate) fn from_status(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }

    #[cfg(not(unix))]
    pub(crate) fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: None,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        let signal = self
            .signal
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        write!(f, "code {}, signal {}", code, signal)
    }
}

/// A spawned long-running child process.
///
/// Output lines are relayed to the log handler given at spawn time; `exit`
/// resolves once the process has ended and its output has been drained.
#[derive(Debug)]
pub struct SpawnedChild {
    pub pid: u32,
    pub exit: oneshot::Receiver<ExitInfo>,
    /// Error-looking output lines, filled while the child runs
    pub errors: Arc<Mutex<ErrorLines>>,
}

impl SpawnedChild {
    /// Most recent error lines seen so far.
    pub fn error_lines(&self) -> Vec<String> {
        self.errors.lock().clone().into_vec()
    }
}

/// Runs external programs on behalf of the launcher.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a program to completion.
    ///
    /// In streaming mode the invocation itself and every non-empty output line
    /// are sent to `log`. A non-zero exit fails with `RunnerError::Exit`.
    async fn run(
        &self,
        invocation: &Invocation,
        mode: OutputMode,
        log: &LogHandler,
    ) -> RunnerResult<()>;

    /// Run a program and capture its output without logging it.
    async fn capture(&self, invocation: &Invocation) -> RunnerResult<CapturedOutput>;

    /// Start a long-running program and return immediately.
    async fn spawn(&self, invocation: &Invocation, log: &LogHandler) -> RunnerResult<SpawnedChild>;

    /// Terminate a process tree. `force` escalates to an unconditional kill.
    async fn terminate(&self, pid: u32, force: bool) -> RunnerResult<()>;

    /// Run a program with administrative rights and wait for its exit code.
    async fn run_elevated(&self, program: &str, args: &[String]) -> RunnerResult<i32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_info_display() {
        assert_eq!(ExitInfo::code(137).to_string(), "code 137, signal none");
        assert_eq!(ExitInfo::signal(2).to_string(), "code none, signal 2");
        assert!(ExitInfo::code(0).success());
        assert!(!ExitInfo::unknown().success());
    }

    #[test]
    fn test_combined_output() {
        let out = CapturedOutput {
            code: Some(0),
            stdout: "a".into(),
            stderr: "b".into(),
        };
        assert_eq!(out.combined_output(), "a\nb");
        assert!(out.success());
    }
}
