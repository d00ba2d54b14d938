//! Mock command runner for testing.
//!
//! Provides a scriptable implementation of the CommandRunner trait for use in
//! unit tests without touching real tools on the host.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;

use crate::config::{Invocation, OutputMode};
use crate::error::{RunnerError, RunnerResult};
use crate::log::{split_lines, ErrorLines, LogHandler, LogLine, LogStream};
use crate::runner::{CapturedOutput, CommandRunner, ExitInfo, SpawnedChild};

const FIRST_MOCK_PID: u32 = 1000;
const SIGINT: i32 = 2;
const SIGKILL: i32 = 9;

/// Predefined outcome for a matching invocation.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Behave as if the program is not installed
    pub not_found: bool,
    /// For spawned children: exit right after start instead of staying alive
    pub exits_immediately: bool,
}

impl MockResponse {
    pub fn success() -> Self {
        Self {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
            not_found: false,
            exits_immediately: false,
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stderr: stderr.into(),
            ..Self::success()
        }
    }

    pub fn not_found() -> Self {
        Self {
            code: -1,
            not_found: true,
            ..Self::success()
        }
    }

    pub fn exits_immediately(mut self) -> Self {
        self.exits_immediately = true;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub path_prepend: Vec<PathBuf>,
    pub tag: String,
}

impl CapturedCall {
    fn from_invocation(method: &str, invocation: &Invocation) -> Self {
        Self {
            method: method.to_string(),
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            cwd: invocation.cwd.clone(),
            env: invocation.env.clone(),
            path_prepend: invocation.path_prepend.clone(),
            tag: invocation.tag.clone(),
        }
    }

    /// Program and arguments joined by single spaces.
    pub fn line(&self) -> String {
        plain_line(&self.program, &self.args)
    }
}

fn plain_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    response: MockResponse,
    once: bool,
}

/// Mock command runner for testing.
///
/// Responses are matched by command-line prefix. Single-use responses win
/// over repeating ones; within each kind the first registered match is used.
/// Anything unmatched succeeds with no output.
#[derive(Clone)]
pub struct MockRunner {
    rules: Arc<RwLock<Vec<Rule>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    next_pid: Arc<AtomicU32>,
    children: Arc<Mutex<HashMap<u32, oneshot::Sender<ExitInfo>>>>,
    /// Command prefixes of children that survive a polite interrupt.
    stubborn: Arc<RwLock<Vec<String>>>,
    stubborn_pids: Arc<RwLock<HashSet<u32>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(Vec::new())),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            next_pid: Arc::new(AtomicU32::new(FIRST_MOCK_PID)),
            children: Arc::new(Mutex::new(HashMap::new())),
            stubborn: Arc::new(RwLock::new(Vec::new())),
            stubborn_pids: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Answer every invocation starting with `prefix`.
    pub fn respond(self, prefix: impl Into<String>, response: MockResponse) -> Self {
        self.add_rule(prefix.into(), response, false);
        self
    }

    /// Answer the next invocation starting with `prefix` only.
    pub fn respond_once(self, prefix: impl Into<String>, response: MockResponse) -> Self {
        self.add_rule(prefix.into(), response, true);
        self
    }

    /// Spawned children whose command starts with `prefix` ignore SIGINT.
    pub fn ignore_interrupts(self, prefix: impl Into<String>) -> Self {
        self.stubborn.write().push(prefix.into());
        self
    }

    /// Add a response after construction.
    pub fn add_rule(&self, prefix: String, response: MockResponse, once: bool) {
        self.rules.write().push(Rule {
            prefix,
            response,
            once,
        });
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a call with the given command-line prefix was made.
    pub fn was_called(&self, prefix: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.line().starts_with(prefix))
    }

    /// Get calls whose command line starts with `prefix`.
    pub fn calls_matching(&self, prefix: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.line().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Get calls to a specific trait method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Pids of spawned children that have not exited.
    pub fn alive_children(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.children.lock().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Make a spawned child exit. Returns false if it was not alive.
    pub fn exit_child(&self, pid: u32, info: ExitInfo) -> bool {
        match self.children.lock().remove(&pid) {
            Some(tx) => {
                let _ = tx.send(info);
                true
            }
            None => false,
        }
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn next_response(&self, line: &str) -> MockResponse {
        let mut rules = self.rules.write();
        let position = rules
            .iter()
            .position(|r| r.once && line.starts_with(&r.prefix))
            .or_else(|| {
                rules
                    .iter()
                    .position(|r| !r.once && line.starts_with(&r.prefix))
            });

        match position {
            Some(index) if rules[index].once => rules.remove(index).response,
            Some(index) => rules[index].response.clone(),
            None => MockResponse::success(),
        }
    }

    fn check_invocation(invocation: &Invocation) -> RunnerResult<()> {
        if let Some(dir) = &invocation.cwd {
            if !dir.is_dir() {
                return Err(RunnerError::MissingWorkdir(dir.clone()));
            }
        }
        Ok(())
    }

    fn not_found_error(program: &str) -> RunnerError {
        RunnerError::Spawn {
            program: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
        }
    }

    fn emit(invocation: &Invocation, response: &MockResponse, log: &LogHandler) {
        for line in split_lines(&response.stdout) {
            log(LogLine::new(invocation.tag.clone(), LogStream::Stdout, line));
        }
        for line in split_lines(&response.stderr) {
            log(LogLine::new(invocation.tag.clone(), LogStream::Stderr, line));
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        mode: OutputMode,
        log: &LogHandler,
    ) -> RunnerResult<()> {
        self.record_call(CapturedCall::from_invocation("run", invocation));
        Self::check_invocation(invocation)?;

        let response = self.next_response(&plain_line(&invocation.program, &invocation.args));
        if response.not_found {
            return Err(Self::not_found_error(&invocation.program));
        }

        if mode == OutputMode::Streaming {
            log(LogLine::exec(format!("$ {}", invocation.display())));
            Self::emit(invocation, &response, log);
        }

        if response.code == 0 {
            return Ok(());
        }

        let mut errors = ErrorLines::new();
        for line in split_lines(&response.stdout).chain(split_lines(&response.stderr)) {
            errors.observe(line);
        }
        Err(RunnerError::Exit {
            program: invocation.program.clone(),
            code: response.code,
            error_lines: errors.into_vec(),
        })
    }

    async fn capture(&self, invocation: &Invocation) -> RunnerResult<CapturedOutput> {
        self.record_call(CapturedCall::from_invocation("capture", invocation));
        Self::check_invocation(invocation)?;

        let response = self.next_response(&plain_line(&invocation.program, &invocation.args));
        if response.not_found {
            return Err(Self::not_found_error(&invocation.program));
        }

        Ok(CapturedOutput {
            code: Some(response.code),
            stdout: response.stdout,
            stderr: response.stderr,
        })
    }

    async fn spawn(&self, invocation: &Invocation, log: &LogHandler) -> RunnerResult<SpawnedChild> {
        self.record_call(CapturedCall::from_invocation("spawn", invocation));
        Self::check_invocation(invocation)?;

        let response = self.next_response(&plain_line(&invocation.program, &invocation.args));
        if response.not_found {
            return Err(Self::not_found_error(&invocation.program));
        }

        log(LogLine::exec(format!("$ {}", invocation.display())));
        Self::emit(invocation, &response, log);
        let mut errors = ErrorLines::new();
        for line in split_lines(&response.stdout).chain(split_lines(&response.stderr)) {
            errors.observe(line);
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        if response.exits_immediately {
            let _ = tx.send(ExitInfo::code(response.code));
        } else {
            let line = plain_line(&invocation.program, &invocation.args);
            if self.stubborn.read().iter().any(|p| line.starts_with(p)) {
                self.stubborn_pids.write().insert(pid);
            }
            self.children.lock().insert(pid, tx);
        }

        Ok(SpawnedChild {
            pid,
            exit: rx,
            errors: Arc::new(Mutex::new(errors)),
        })
    }

    async fn terminate(&self, pid: u32, force: bool) -> RunnerResult<()> {
        self.record_call(CapturedCall {
            method: "terminate".to_string(),
            program: "terminate".to_string(),
            args: vec![pid.to_string(), if force { "force" } else { "interrupt" }.to_string()],
            cwd: None,
            env: HashMap::new(),
            path_prepend: Vec::new(),
            tag: String::new(),
        });

        if !force && self.stubborn_pids.read().contains(&pid) {
            return Ok(());
        }

        let signal = if force { SIGKILL } else { SIGINT };
        self.exit_child(pid, ExitInfo::signal(signal));
        Ok(())
    }

    async fn run_elevated(&self, program: &str, args: &[String]) -> RunnerResult<i32> {
        self.record_call(CapturedCall {
            method: "run_elevated".to_string(),
            program: program.to_string(),
            args: args.to_vec(),
            cwd: None,
            env: HashMap::new(),
            path_prepend: Vec::new(),
            tag: String::new(),
        });

        let response = self.next_response(&plain_line(program, args));
        if response.not_found {
            return Err(Self::not_found_error(program));
        }
        Ok(response.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::discard_logs;

    fn collecting() -> (LogHandler, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let handler: LogHandler = Arc::new(move |line: LogLine| sink.lock().push(line.to_string()));
        (handler, lines)
    }

    #[tokio::test]
    async fn test_unmatched_invocation_succeeds() {
        let runner = MockRunner::new();
        runner
            .run(&Invocation::new("git").arg("pull"), OutputMode::Checked, &discard_logs())
            .await
            .unwrap();
        assert!(runner.was_called("git pull"));
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_once_rules_take_priority_and_are_consumed() {
        let runner = MockRunner::new()
            .respond("node --version", MockResponse::success().with_stdout("v20.11.0"))
            .respond_once("node --version", MockResponse::not_found());

        let first = runner.capture(&Invocation::new("node").arg("--version")).await;
        assert!(first.unwrap_err().is_not_found());

        let second = runner
            .capture(&Invocation::new("node").arg("--version"))
            .await
            .unwrap();
        assert_eq!(second.stdout, "v20.11.0");
    }

    #[tokio::test]
    async fn test_streaming_failure_reports_lines() {
        let runner = MockRunner::new().respond(
            "yarn install",
            MockResponse::failure(1, "warning something\nerror Couldn't find package"),
        );
        let (handler, lines) = collecting();

        let err = runner
            .run(
                &Invocation::new("yarn").arg("install").tag("frontend"),
                OutputMode::Streaming,
                &handler,
            )
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.error_lines(), &["error Couldn't find package".to_string()]);
        let lines = lines.lock();
        assert_eq!(lines[0], "[exec] $ yarn install");
        assert_eq!(lines[2], "[frontend:err] error Couldn't find package");
    }

    #[tokio::test]
    async fn test_spawned_children_live_until_terminated() {
        let runner = MockRunner::new();
        let child = runner
            .spawn(&Invocation::new("yarn").arg("dev"), &discard_logs())
            .await
            .unwrap();
        assert_eq!(child.pid, FIRST_MOCK_PID);
        assert_eq!(runner.alive_children(), vec![FIRST_MOCK_PID]);

        runner.terminate(child.pid, false).await.unwrap();
        assert_eq!(child.exit.await.unwrap(), ExitInfo::signal(SIGINT));
        assert!(runner.alive_children().is_empty());
    }

    #[tokio::test]
    async fn test_stubborn_child_needs_force() {
        let runner = MockRunner::new().ignore_interrupts("java");
        let child = runner
            .spawn(&Invocation::new("java").arg("-jar"), &discard_logs())
            .await
            .unwrap();

        runner.terminate(child.pid, false).await.unwrap();
        assert_eq!(runner.alive_children(), vec![child.pid]);

        runner.terminate(child.pid, true).await.unwrap();
        assert_eq!(child.exit.await.unwrap(), ExitInfo::signal(SIGKILL));
    }

    #[tokio::test]
    async fn test_child_that_exits_immediately() {
        let runner = MockRunner::new()
            .respond(
                "yarn dev",
                MockResponse::failure(1, "starting\nError: listen EADDRINUSE :::5173").exits_immediately(),
            );
        let child = runner
            .spawn(&Invocation::new("yarn").arg("dev"), &discard_logs())
            .await
            .unwrap();
        assert_eq!(child.error_lines(), vec!["Error: listen EADDRINUSE :::5173"]);
        assert_eq!(child.exit.await.unwrap(), ExitInfo::code(1));
        assert!(runner.alive_children().is_empty());
    }

    #[tokio::test]
    async fn test_elevated_code_is_scripted() {
        let runner = MockRunner::new().respond("net start MySQL80", MockResponse::failure(2, ""));
        let code = runner
            .run_elevated("net", &["start".to_string(), "MySQL80".to_string()])
            .await
            .unwrap();
        assert_eq!(code, 2);
        assert_eq!(runner.get_method_calls("run_elevated").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_workdir() {
        let runner = MockRunner::new();
        let err = runner
            .capture(&Invocation::new("git").cwd("/no/such/launchpad/dir"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::MissingWorkdir(_)));
    }
}
