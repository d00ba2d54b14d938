//! Invocation configuration types.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tag used for the invocation line logged before a command starts.
pub const EXEC_TAG: &str = "exec";

/// How a command's output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Output is discarded; only the exit code matters.
    Checked,
    /// Every output line is forwarded to the log handler.
    Streaming,
}

/// A single external program invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory (must exist)
    pub cwd: Option<PathBuf>,
    /// Environment variables set on top of the inherited environment
    pub env: HashMap<String, String>,
    /// Directories placed in front of PATH for this invocation
    pub path_prepend: Vec<PathBuf>,
    /// Source tag attached to every output line
    pub tag: String,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            path_prepend: Vec::new(),
            tag: EXEC_TAG.to_string(),
        }
    }

    /// Build from an already split command line. Returns `None` when empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    pub fn prepend_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_prepend.push(dir.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Program followed by its arguments, space separated.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(' ') {
                line.push_str(&format!("\"{}\"", arg));
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Human readable form used for the invocation log line.
    pub fn display(&self) -> String {
        match self.cwd.as_deref().and_then(dir_label) {
            Some(dir) => format!("{} (in {})", self.command_line(), dir),
            None => self.command_line(),
        }
    }
}

fn dir_label(dir: &Path) -> Option<String> {
    dir.file_name().map(|name| name.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("git")
            .args(["clone", "-b", "main"])
            .arg("https://example.com/app.git")
            .arg(".")
            .cwd("/work/frontend")
            .env("GIT_TERMINAL_PROMPT", "0")
            .tag("frontend");

        assert_eq!(inv.args.len(), 5);
        assert_eq!(inv.tag, "frontend");
        assert_eq!(inv.env.get("GIT_TERMINAL_PROMPT"), Some(&"0".to_string()));
        assert_eq!(
            inv.display(),
            "git clone -b main https://example.com/app.git . (in frontend)"
        );
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let inv = Invocation::new("mysql").args(["-e", "SELECT 1"]);
        assert_eq!(inv.command_line(), "mysql -e \"SELECT 1\"");
    }

    #[test]
    fn test_from_argv() {
        let argv = vec!["yarn".to_string(), "dev".to_string()];
        let inv = Invocation::from_argv(&argv).unwrap();
        assert_eq!(inv.program, "yarn");
        assert_eq!(inv.args, vec!["dev".to_string()]);
        assert!(Invocation::from_argv(&[]).is_none());
    }
}
