//! Tokio-based command runner for host processes.
//!
//! Runs programs directly on the host with an augmented PATH, relays their
//! output line by line, and knows how to take down whole process trees.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{Invocation, OutputMode};
use crate::error::{RunnerError, RunnerResult};
use crate::log::{split_lines, ErrorLines, LogHandler, LogLine, LogStream};
use crate::platform::{compose_path, Platform};
use crate::runner::{CapturedOutput, CommandRunner, ExitInfo, SpawnedChild};

/// Programs that are batch shims on Windows and must go through `cmd /C`.
const WINDOWS_SHIMS: &[&str] = &["npm", "npx", "yarn", "pnpm", "corepack", "mvn", "mvnw"];

/// How long to keep draining output after a spawned child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Windows CREATE_NO_WINDOW flag to prevent console windows from appearing
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Options for [`ProcessRunner`].
#[derive(Debug, Clone)]
pub struct ProcessRunnerOptions {
    /// Platform used for shell-mode decisions
    pub platform: Platform,
    /// Directories placed between per-invocation entries and the inherited PATH
    pub extra_path: Vec<PathBuf>,
}

impl Default for ProcessRunnerOptions {
    fn default() -> Self {
        let platform = Platform::current();
        Self {
            platform,
            extra_path: platform.extra_search_dirs(),
        }
    }
}

impl ProcessRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extra_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.extra_path = dirs;
        self
    }

    pub fn no_extra_path(mut self) -> Self {
        self.extra_path.clear();
        self
    }
}

/// Runs programs as child processes of the launcher.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    options: ProcessRunnerOptions,
}

impl ProcessRunner {
    pub fn new(options: ProcessRunnerOptions) -> Self {
        Self { options }
    }

    /// Whether `program` has to be started through the command interpreter.
    pub fn needs_shell(platform: Platform, program: &str) -> bool {
        if !platform.is_windows() {
            return false;
        }
        let lower = program.to_lowercase();
        if lower.ends_with(".cmd") || lower.ends_with(".bat") {
            return true;
        }
        let path = Path::new(&lower);
        if path.extension().is_some() {
            return false;
        }
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| WINDOWS_SHIMS.contains(&name))
            .unwrap_or(false)
    }

    fn build_command(&self, invocation: &Invocation) -> RunnerResult<Command> {
        if let Some(dir) = &invocation.cwd {
            if !dir.is_dir() {
                return Err(RunnerError::MissingWorkdir(dir.clone()));
            }
        }

        let mut cmd = if Self::needs_shell(self.options.platform, &invocation.program) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&invocation.program);
            cmd
        } else {
            Command::new(&invocation.program)
        };
        cmd.args(&invocation.args);

        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let inherited = invocation
            .env
            .get("PATH")
            .map(OsString::from)
            .or_else(|| std::env::var_os("PATH"));
        for (key, value) in &invocation.env {
            if key != "PATH" {
                cmd.env(key, value);
            }
        }
        cmd.env(
            "PATH",
            compose_path(
                &invocation.path_prepend,
                &self.options.extra_path,
                inherited.as_deref(),
            ),
        );
        cmd.stdin(Stdio::null());

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        Ok(cmd)
    }
}

fn spawn_error(invocation: &Invocation, source: std::io::Error) -> RunnerError {
    RunnerError::Spawn {
        program: invocation.program.clone(),
        source,
    }
}

/// Forward every line of `reader` to `log`, remembering error-looking lines.
async fn pump<R>(
    reader: R,
    stream: LogStream,
    tag: String,
    log: LogHandler,
    errors: Arc<Mutex<ErrorLines>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                for line in split_lines(&text) {
                    errors.lock().observe(line);
                    log(LogLine::new(tag.clone(), stream, line));
                }
            }
            Err(e) => {
                debug!("Stopped reading {} of [{}]: {}", stream, tag, e);
                break;
            }
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        mode: OutputMode,
        log: &LogHandler,
    ) -> RunnerResult<()> {
        let mut cmd = self.build_command(invocation)?;

        match mode {
            OutputMode::Checked => {
                debug!("Executing: {}", invocation.display());
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
                let status = cmd
                    .status()
                    .await
                    .map_err(|e| spawn_error(invocation, e))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(RunnerError::Exit {
                        program: invocation.program.clone(),
                        code: status.code().unwrap_or(-1),
                        error_lines: Vec::new(),
                    })
                }
            }
            OutputMode::Streaming => {
                log(LogLine::exec(format!("$ {}", invocation.display())));
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

                let mut child = cmd.spawn().map_err(|e| spawn_error(invocation, e))?;
                let errors = Arc::new(Mutex::new(ErrorLines::new()));

                let stdout = child.stdout.take();
                let stderr = child.stderr.take();
                let out_task = {
                    let (tag, log, errors) = (invocation.tag.clone(), log.clone(), errors.clone());
                    async move {
                        if let Some(stdout) = stdout {
                            pump(stdout, LogStream::Stdout, tag, log, errors).await;
                        }
                    }
                };
                let err_task = {
                    let (tag, log, errors) = (invocation.tag.clone(), log.clone(), errors.clone());
                    async move {
                        if let Some(stderr) = stderr {
                            pump(stderr, LogStream::Stderr, tag, log, errors).await;
                        }
                    }
                };

                let (_, _, status) = tokio::join!(out_task, err_task, child.wait());
                let status = status?;

                if status.success() {
                    return Ok(());
                }

                let error_lines = errors.lock().clone().into_vec();
                Err(RunnerError::Exit {
                    program: invocation.program.clone(),
                    code: status.code().unwrap_or(-1),
                    error_lines,
                })
            }
        }
    }

    async fn capture(&self, invocation: &Invocation) -> RunnerResult<CapturedOutput> {
        let mut cmd = self.build_command(invocation)?;
        debug!("Capturing: {}", invocation.display());

        let output = cmd
            .output()
            .await
            .map_err(|e| spawn_error(invocation, e))?;

        Ok(CapturedOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn spawn(&self, invocation: &Invocation, log: &LogHandler) -> RunnerResult<SpawnedChild> {
        let mut cmd = self.build_command(invocation)?;
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        // Own process group so an interrupt reaches the whole dev-server tree.
        #[cfg(unix)]
        cmd.process_group(0);

        log(LogLine::exec(format!("$ {}", invocation.display())));
        let mut child = cmd.spawn().map_err(|e| spawn_error(invocation, e))?;
        let pid = child.id().ok_or_else(|| {
            RunnerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} exited before its pid was read", invocation.program),
            ))
        })?;
        info!("Spawned {} as pid {}", invocation.program, pid);

        let (tx, rx) = oneshot::channel();
        let tag = invocation.tag.clone();
        let log = log.clone();
        let errors = Arc::new(Mutex::new(ErrorLines::new()));
        let shared_errors = errors.clone();

        tokio::spawn(async move {
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();

            let pumps = tokio::spawn({
                let (tag, log, errors) = (tag.clone(), log.clone(), errors.clone());
                async move {
                    let out = async {
                        if let Some(stdout) = stdout {
                            pump(stdout, LogStream::Stdout, tag.clone(), log.clone(), errors.clone())
                                .await;
                        }
                    };
                    let err = async {
                        if let Some(stderr) = stderr {
                            pump(stderr, LogStream::Stderr, tag.clone(), log.clone(), errors.clone())
                                .await;
                        }
                    };
                    tokio::join!(out, err);
                }
            });

            let info = match child.wait().await {
                Ok(status) => ExitInfo::from_status(status),
                Err(e) => {
                    warn!("Lost track of [{}]: {}", tag, e);
                    ExitInfo::unknown()
                }
            };

            // Grandchildren may keep the pipes open; do not wait on them forever.
            let _ = tokio::time::timeout(DRAIN_GRACE, pumps).await;
            let _ = tx.send(info);
        });

        Ok(SpawnedChild {
            pid,
            exit: rx,
            errors: shared_errors,
        })
    }

    async fn terminate(&self, pid: u32, force: bool) -> RunnerResult<()> {
        info!("Terminating process tree {} (force: {})", pid, force);
        terminate_tree(pid, force).await
    }

    async fn run_elevated(&self, program: &str, args: &[String]) -> RunnerResult<i32> {
        run_elevated_impl(program, args).await
    }
}

#[cfg(windows)]
async fn terminate_tree(pid: u32, _force: bool) -> RunnerResult<()> {
    // taskkill /T /F already takes down the whole tree unconditionally.
    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .creation_flags(CREATE_NO_WINDOW)
        .output()
        .await
        .map_err(|source| RunnerError::Spawn {
            program: "taskkill".to_string(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }
    Err(RunnerError::Exit {
        program: "taskkill".to_string(),
        code: output.status.code().unwrap_or(-1),
        error_lines: split_lines(&String::from_utf8_lossy(&output.stderr))
            .map(str::to_string)
            .collect(),
    })
}

#[cfg(unix)]
async fn terminate_tree(pid: u32, force: bool) -> RunnerResult<()> {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| {
        RunnerError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("pid {} out of range", pid),
        ))
    })?;
    let target = Pid::from_raw(raw);
    let signal = if force { Signal::SIGKILL } else { Signal::SIGINT };

    match killpg(target, signal) {
        Ok(()) => Ok(()),
        Err(group_err) => {
            debug!("killpg({}) failed: {}, signalling the process only", pid, group_err);
            kill(target, signal).map_err(|errno| RunnerError::Io(std::io::Error::from(errno)))
        }
    }
}

/// PowerShell snippet that runs `program` elevated and exits with its code.
pub fn elevation_script(program: &str, args: &[String]) -> String {
    let mut script = format!("$p = Start-Process -FilePath {}", ps_quote(program));
    if !args.is_empty() {
        let list: Vec<String> = args
            .iter()
            .map(|arg| {
                if arg.contains(' ') {
                    ps_quote(&format!("\"{}\"", arg))
                } else {
                    ps_quote(arg)
                }
            })
            .collect();
        script.push_str(&format!(" -ArgumentList {}", list.join(",")));
    }
    script.push_str(" -Verb RunAs -Wait -PassThru; exit $p.ExitCode");
    script
}

fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(windows)]
async fn run_elevated_impl(program: &str, args: &[String]) -> RunnerResult<i32> {
    info!("Requesting elevation for {}", program);
    let script = elevation_script(program, args);
    let status = Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command"])
        .arg(&script)
        .creation_flags(CREATE_NO_WINDOW)
        .status()
        .await
        .map_err(|source| RunnerError::Spawn {
            program: "powershell".to_string(),
            source,
        })?;
    Ok(status.code().unwrap_or(-1))
}

#[cfg(not(windows))]
async fn run_elevated_impl(program: &str, _args: &[String]) -> RunnerResult<i32> {
    Err(RunnerError::Unsupported(format!(
        "elevated execution of {}",
        program
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_shell_only_on_windows() {
        assert!(ProcessRunner::needs_shell(Platform::Windows, "yarn"));
        assert!(ProcessRunner::needs_shell(Platform::Windows, "C:\\app\\mvnw.cmd"));
        assert!(ProcessRunner::needs_shell(Platform::Windows, "corepack"));
        assert!(!ProcessRunner::needs_shell(Platform::Windows, "git"));
        assert!(!ProcessRunner::needs_shell(Platform::Windows, "java.exe"));
        assert!(!ProcessRunner::needs_shell(Platform::Linux, "yarn"));
        assert!(!ProcessRunner::needs_shell(Platform::MacOs, "mvnw"));
    }

    #[test]
    fn test_elevation_script_quotes_arguments() {
        let script = elevation_script(
            "winget",
            &[
                "install".to_string(),
                "--id".to_string(),
                "Git.Git".to_string(),
                "C:\\Program Files".to_string(),
            ],
        );
        assert!(script.starts_with("$p = Start-Process -FilePath 'winget'"));
        assert!(script.contains("-ArgumentList 'install','--id','Git.Git','\"C:\\Program Files\"'"));
        assert!(script.ends_with("-Verb RunAs -Wait -PassThru; exit $p.ExitCode"));
    }

    #[test]
    fn test_ps_quote_escapes_single_quotes() {
        assert_eq!(ps_quote("it's"), "'it''s'");
    }

    #[tokio::test]
    async fn test_missing_workdir_is_rejected() {
        let runner = ProcessRunner::default();
        let inv = Invocation::new("git")
            .arg("--version")
            .cwd("/definitely/not/a/real/dir");
        let err = runner.capture(&inv).await.unwrap_err();
        assert!(matches!(err, RunnerError::MissingWorkdir(_)));
    }

    #[tokio::test]
    async fn test_unknown_program_is_spawn_error() {
        let runner = ProcessRunner::default();
        let inv = Invocation::new("launchpad-no-such-program-xyz");
        let err = runner
            .run(&inv, OutputMode::Checked, &crate::log::discard_logs())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streaming_relays_lines_and_errors() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink: LogHandler = {
            let lines = lines.clone();
            Arc::new(move |line: LogLine| lines.lock().push(line.to_string()))
        };

        let runner = ProcessRunner::default();
        let inv = Invocation::new("sh")
            .args(["-c", "echo hello; echo 'error: boom' 1>&2; exit 3"])
            .tag("test");
        let err = runner.run(&inv, OutputMode::Streaming, &sink).await.unwrap_err();

        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(err.error_lines(), &["error: boom".to_string()]);

        let lines = lines.lock();
        assert!(lines[0].starts_with("[exec] $ sh -c"));
        assert!(lines.contains(&"[test] hello".to_string()));
        assert!(lines.contains(&"[test:err] error: boom".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_child_reports_exit() {
        let runner = ProcessRunner::default();
        let inv = Invocation::new("sh")
            .args(["-c", "echo 'Error: listen EADDRINUSE' 1>&2; exit 7"])
            .tag("frontend");
        let mut child = runner
            .spawn(&inv, &crate::log::discard_logs())
            .await
            .unwrap();
        assert!(child.pid > 0);
        let info = (&mut child.exit).await.unwrap();
        assert_eq!(info.code, Some(7));
        assert_eq!(child.error_lines(), vec!["Error: listen EADDRINUSE"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_interrupts_process_group() {
        let runner = ProcessRunner::default();
        let inv = Invocation::new("sleep").arg("30");
        let child = runner
            .spawn(&inv, &crate::log::discard_logs())
            .await
            .unwrap();
        runner.terminate(child.pid, false).await.unwrap();
        let info = child.exit.await.unwrap();
        assert!(!info.success());
    }
}
