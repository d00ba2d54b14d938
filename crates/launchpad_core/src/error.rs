//! Error types for the core module.

use std::path::PathBuf;

use launchpad_runner::RunnerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::Role;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Required tool `{tool}` is not available. {remediation}")]
    ToolMissing {
        tool: String,
        remediation: String,
        url: Option<String>,
    },

    #[error("Failed to sync {url}: {source}")]
    GitSync {
        url: String,
        #[source]
        source: RunnerError,
    },

    #[error("Dependency install failed for {target}: {source}")]
    Install {
        target: Role,
        #[source]
        source: RunnerError,
    },

    #[error("Build failed for {target}: {source}")]
    Build {
        target: Role,
        #[source]
        source: RunnerError,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to start {role}: {source}")]
    ProcessSpawn {
        role: Role,
        #[source]
        source: RunnerError,
    },

    #[error("Failed to write {}: {source}", path.display())]
    EnvWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("A launch is already in progress")]
    AlreadyRunning,

    #[error("Launch was cancelled")]
    Cancelled,

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a failed launch, used for exit codes and UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ToolMissing,
    Sync,
    Install,
    Build,
    Database,
    Spawn,
    Config,
    Other,
}

impl CoreError {
    pub fn tool_missing(
        tool: impl Into<String>,
        remediation: impl Into<String>,
        url: Option<&str>,
    ) -> Self {
        let mut remediation = remediation.into();
        if let Some(url) = url {
            remediation.push_str(&format!(" Download: {}", url));
        }
        Self::ToolMissing {
            tool: tool.into(),
            remediation,
            url: url.map(str::to_string),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ToolMissing { .. } => FailureKind::ToolMissing,
            Self::GitSync { .. } => FailureKind::Sync,
            Self::Install { .. } => FailureKind::Install,
            Self::Build { .. } => FailureKind::Build,
            Self::Database(_) => FailureKind::Database,
            Self::ProcessSpawn { .. } => FailureKind::Spawn,
            Self::Config(_) | Self::EnvWrite { .. } => FailureKind::Config,
            _ => FailureKind::Other,
        }
    }

    /// Error lines captured from the failing command, if any.
    pub fn error_lines(&self) -> &[String] {
        match self {
            Self::GitSync { source, .. }
            | Self::Install { source, .. }
            | Self::Build { source, .. }
            | Self::ProcessSpawn { source, .. }
            | Self::Runner(source) => source.error_lines(),
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_missing_names_url() {
        let err = CoreError::tool_missing("git", "Install Git.", Some("https://git-scm.com/downloads"));
        assert_eq!(
            err.to_string(),
            "Required tool `git` is not available. Install Git. Download: https://git-scm.com/downloads"
        );
        assert_eq!(err.kind(), FailureKind::ToolMissing);
    }

    #[test]
    fn test_error_lines_from_runner() {
        let err = CoreError::Install {
            target: Role::Frontend,
            source: RunnerError::Exit {
                program: "npm".into(),
                code: 1,
                error_lines: vec!["npm ERR! code E404".into()],
            },
        };
        assert_eq!(err.error_lines(), &["npm ERR! code E404".to_string()]);
        assert_eq!(err.to_string(), "Dependency install failed for frontend: `npm` exited with code 1");
        assert!(CoreError::Cancelled.error_lines().is_empty());
    }
}
