//! Terminal implementation of the host shell.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use launchpad_core::Shell;

/// Asks for directories on the terminal.
pub struct PromptShell {
    default_dir: PathBuf,
}

impl PromptShell {
    pub fn new(default_dir: PathBuf) -> Self {
        Self { default_dir }
    }

    /// Interpret one answer. Empty picks the default; `None` means cancelled.
    pub fn parse_answer(&self, answer: &str) -> Option<PathBuf> {
        match answer.trim() {
            "" => Some(self.default_dir.clone()),
            "q" | "quit" => None,
            path => Some(PathBuf::from(path)),
        }
    }
}

impl Shell for PromptShell {
    fn choose_directory(&self) -> Option<PathBuf> {
        print!("Workspace directory [{}] (q to cancel): ", self.default_dir.display());
        std::io::stdout().flush().ok()?;

        let mut answer = String::new();
        let read = std::io::stdin().lock().read_line(&mut answer).ok()?;
        if read == 0 {
            return None;
        }
        self.parse_answer(&answer)
    }
}
