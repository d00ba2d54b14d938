//! Output lines relayed from child processes.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::EXEC_TAG;

/// Maximum number of error-looking lines kept for an [`crate::RunnerError::Exit`].
pub const ERROR_LINE_LIMIT: usize = 12;

const ERROR_KEYWORDS: &[&str] = &[
    "error",
    "err!",
    "failed",
    "fatal",
    "exception",
    "cannot",
    "not found",
    "denied",
];

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// A single line of output from an invocation.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub tag: String,
    pub message: String,
}

impl LogLine {
    pub fn new(tag: impl Into<String>, stream: LogStream, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// The `[exec] $ ...` line announcing an invocation.
    pub fn exec(message: impl Into<String>) -> Self {
        Self::new(EXEC_TAG, LogStream::Stdout, message)
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream {
            LogStream::Stdout => write!(f, "[{}] {}", self.tag, self.message),
            LogStream::Stderr => write!(f, "[{}:err] {}", self.tag, self.message),
        }
    }
}

/// Log handler callback type.
pub type LogHandler = Arc<dyn Fn(LogLine) + Send + Sync>;

/// Handler that drops every line.
pub fn discard_logs() -> LogHandler {
    Arc::new(|_| {})
}

/// Split a raw chunk into display lines.
///
/// Carriage returns count as line breaks so progress output from package
/// managers does not collapse into a single line. Empty lines are dropped.
pub fn split_lines(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split(['\n', '\r'])
        .map(|line| line.trim_end())
        .filter(|line| !line.trim().is_empty())
}

/// Whether a line looks like it reports an error.
pub fn looks_like_error(line: &str) -> bool {
    let lower = line.to_lowercase();
    ERROR_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Rolling window of the most recent error-looking lines.
#[derive(Debug, Default, Clone)]
pub struct ErrorLines {
    lines: VecDeque<String>,
}

impl ErrorLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a line if it looks like an error.
    pub fn observe(&mut self, line: &str) {
        if !looks_like_error(line) {
            return;
        }
        self.lines.push_back(line.trim().to_string());
        while self.lines.len() > ERROR_LINE_LIMIT {
            self.lines.pop_front();
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.lines.into_iter().collect()
    }
}
