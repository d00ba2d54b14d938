//! Integration tests for the process execution layer.
//!
//! Most tests drive the runner through the `CommandRunner` trait object the
//! launcher uses; the host tests only rely on a POSIX shell.

use std::sync::Arc;

use parking_lot::Mutex;

use launchpad_runner::{
    discard_logs, CommandRunner, ExitInfo, Invocation, LogHandler, LogLine, MockResponse,
    MockRunner, OutputMode, RunnerError,
};

fn collecting() -> (LogHandler, Arc<Mutex<Vec<LogLine>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let handler: LogHandler = Arc::new(move |line: LogLine| sink.lock().push(line));
    (handler, lines)
}

/// Test the mock through a trait object, as the launcher holds it.
#[tokio::test]
async fn test_mock_runner_behind_trait_object() {
    let mock = MockRunner::new()
        .respond("git --version", MockResponse::success().with_stdout("git version 2.44.0"));
    let runner: Arc<dyn CommandRunner> = Arc::new(mock.clone());

    let out = runner
        .capture(&Invocation::new("git").arg("--version"))
        .await
        .unwrap();

    assert!(out.success());
    assert!(out.stdout.contains("2.44.0"));
    assert_eq!(mock.get_method_calls("capture").len(), 1);
}

/// Test that env, tag and PATH entries are passed through to the call record.
#[tokio::test]
async fn test_mock_runner_records_invocation_details() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockRunner::new();

    let inv = Invocation::new("mvn")
        .args(["spring-boot:run"])
        .cwd(dir.path())
        .env("SERVER_PORT", "8080")
        .prepend_path("/opt/jdk-21/bin")
        .tag("server");
    mock.run(&inv, OutputMode::Streaming, &discard_logs())
        .await
        .unwrap();

    let call = &mock.calls_matching("mvn spring-boot:run")[0];
    assert_eq!(call.tag, "server");
    assert_eq!(call.cwd.as_deref(), Some(dir.path()));
    assert_eq!(call.env.get("SERVER_PORT"), Some(&"8080".to_string()));
    assert_eq!(call.path_prepend.len(), 1);
}

/// Test the lifecycle of a supervised child: start, exit, observe.
#[tokio::test]
async fn test_mock_child_exit_is_observed() {
    let mock = MockRunner::new();
    let (handler, lines) = collecting();

    let child = mock
        .spawn(&Invocation::new("yarn").arg("dev").tag("frontend"), &handler)
        .await
        .unwrap();
    assert!(mock.exit_child(child.pid, ExitInfo::code(1)));
    assert!(!mock.exit_child(child.pid, ExitInfo::code(1)));

    let info = child.exit.await.unwrap();
    assert_eq!(info.to_string(), "code 1, signal none");
    assert_eq!(lines.lock()[0].to_string(), "[exec] $ yarn dev");
}

#[cfg(unix)]
mod host {
    use super::*;
    use launchpad_runner::{ProcessRunner, ProcessRunnerOptions};

    /// Test that the working directory and env reach the child.
    #[tokio::test]
    async fn test_cwd_and_env_reach_child() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(ProcessRunnerOptions::new().no_extra_path());

        let inv = Invocation::new("sh")
            .args(["-c", "pwd; echo $DB_NAME"])
            .cwd(dir.path())
            .env("DB_NAME", "launchpad");
        let out = runner.capture(&inv).await.unwrap();

        assert!(out.success());
        let canonical = dir.path().canonicalize().unwrap();
        assert!(out.stdout.contains(&canonical.to_string_lossy().to_string()));
        assert!(out.stdout.contains("launchpad"));
    }

    /// Test that per-invocation PATH entries come first.
    #[tokio::test]
    async fn test_prepended_path_is_first() {
        let runner = ProcessRunner::default();
        let inv = Invocation::new("sh")
            .args(["-c", "echo $PATH"])
            .prepend_path("/opt/launchpad-test/bin");
        let out = runner.capture(&inv).await.unwrap();
        assert!(out.stdout.starts_with("/opt/launchpad-test/bin"));
    }

    /// Test that checked mode reports the exit code without output.
    #[tokio::test]
    async fn test_checked_failure() {
        let runner = ProcessRunner::default();
        let (handler, lines) = collecting();
        let err = runner
            .run(
                &Invocation::new("sh").args(["-c", "echo error; exit 4"]),
                OutputMode::Checked,
                &handler,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::Exit { code: 4, .. }));
        assert!(lines.lock().is_empty());
    }
}
