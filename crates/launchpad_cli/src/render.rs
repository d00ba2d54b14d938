//! Terminal rendering of status snapshots.

use launchpad_core::{LaunchStatus, Remediation, Step};
use parking_lot::Mutex;

#[derive(Default)]
struct Seen {
    step: Option<Step>,
    message: Option<String>,
    logs: usize,
}

/// Prints what changed between consecutive snapshots.
pub struct StatusPrinter {
    quiet: bool,
    seen: Mutex<Seen>,
}

impl StatusPrinter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            seen: Mutex::new(Seen::default()),
        }
    }

    pub fn print(&self, status: &LaunchStatus) {
        for line in self.changes(status) {
            println!("{}", line);
        }
    }

    /// Lines to print for `status`.
    pub fn changes(&self, status: &LaunchStatus) -> Vec<String> {
        let mut seen = self.seen.lock();
        let mut out = Vec::new();

        if seen.step != Some(status.step) || seen.message != status.message {
            if status.step != Step::Idle {
                out.push(format!(
                    "{} {}: {}",
                    step_icon(status.step),
                    status.step,
                    status.message.as_deref().unwrap_or_default()
                ));
            }
            seen.step = Some(status.step);
            seen.message = status.message.clone();
        }

        // Logs are cleared on stop and on a new run.
        if status.logs.len() < seen.logs {
            seen.logs = 0;
        }
        if !self.quiet {
            out.extend(status.logs[seen.logs..].iter().map(|l| format!("   {}", l)));
        }
        seen.logs = status.logs.len();
        out
    }
}

fn step_icon(step: Step) -> &'static str {
    match step {
        Step::Running => "✅",
        Step::Error => "❌",
        _ => "▶",
    }
}

pub fn print_remediation(remediation: &Remediation) {
    println!();
    println!("💡 {}", remediation.title);
    for step in &remediation.steps {
        println!("   - {}", step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(step: Step, logs: &[&str]) -> LaunchStatus {
        LaunchStatus {
            step,
            message: Some(step.to_string()),
            logs: logs.iter().map(|l| l.to_string()).collect(),
            ..LaunchStatus::default()
        }
    }

    #[test]
    fn test_prints_only_new_lines() {
        let printer = StatusPrinter::new(false);
        let first = printer.changes(&status(Step::Cloning, &["[exec] $ git pull"]));
        assert_eq!(first, vec!["▶ cloning: cloning", "   [exec] $ git pull"]);

        let second = printer.changes(&status(Step::Cloning, &["[exec] $ git pull", "[frontend] Already up to date."]));
        assert_eq!(second, vec!["   [frontend] Already up to date."]);
    }

    #[test]
    fn test_reset_logs_and_quiet() {
        let printer = StatusPrinter::new(true);
        printer.changes(&status(Step::Running, &["a", "b"]));
        let after_stop = printer.changes(&LaunchStatus::default());
        assert!(after_stop.is_empty());
        let next = printer.changes(&status(Step::Error, &["c"]));
        assert_eq!(next, vec!["❌ error: error"]);
    }
}
