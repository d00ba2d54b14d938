//! Error types for the runner module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur during runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with code {code}")]
    Exit {
        program: String,
        code: i32,
        /// Most recent output lines that looked like errors.
        error_lines: Vec<String>,
    },

    #[error("Working directory does not exist: {0}")]
    MissingWorkdir(PathBuf),

    #[error("Not supported on this platform: {0}")]
    Unsupported(String),

    #[error("Refusing to open link: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// True when the program itself could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }

    /// Captured error lines, empty for anything but a non-zero exit.
    pub fn error_lines(&self) -> &[String] {
        match self {
            Self::Exit { error_lines, .. } => error_lines,
            _ => &[],
        }
    }

    /// Exit code for [`RunnerError::Exit`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = RunnerError::Spawn {
            program: "git".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.is_not_found());
        assert!(err.error_lines().is_empty());

        let denied = RunnerError::Spawn {
            program: "git".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!denied.is_not_found());
    }

    #[test]
    fn test_exit_error_display() {
        let err = RunnerError::Exit {
            program: "yarn".into(),
            code: 1,
            error_lines: vec!["error Command failed".into()],
        };
        assert_eq!(err.to_string(), "`yarn` exited with code 1");
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.error_lines().len(), 1);
    }
}
