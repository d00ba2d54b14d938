//! Execution and launch contexts shared by the workflow steps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use launchpad_runner::{
    CapturedOutput, CommandRunner, Invocation, LogHandler, LogLine, OutputMode, Platform,
    RunnerResult,
};
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ProfileKind, RepoConfig};
use crate::env::EnvContext;
use crate::remediation::Remediation;
use crate::status::{Role, StatusHub};
use crate::tools::JsPackageManager;

#[derive(Debug, Default, Clone)]
struct Overrides {
    env: HashMap<String, String>,
    path: Vec<PathBuf>,
}

/// Marks one run. Becomes stale once another run starts or `stop` is called.
#[derive(Debug, Clone)]
pub struct RunToken {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl RunToken {
    pub fn new(counter: Arc<AtomicU64>) -> Self {
        let generation = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, generation }
    }

    /// A token that never goes stale.
    pub fn detached() -> Self {
        Self::new(Arc::new(AtomicU64::new(0)))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }
}

/// Runs commands for one launch, logging into the status hub.
///
/// Environment overrides discovered during the run (such as `JAVA_HOME`) are
/// applied to every later invocation.
#[derive(Clone)]
pub struct ExecContext {
    runner: Arc<dyn CommandRunner>,
    hub: StatusHub,
    platform: Platform,
    token: RunToken,
    overrides: Arc<RwLock<Overrides>>,
    log: LogHandler,
}

impl ExecContext {
    pub fn new(runner: Arc<dyn CommandRunner>, hub: StatusHub, platform: Platform, token: RunToken) -> Self {
        let log: LogHandler = {
            let hub = hub.clone();
            let token = token.clone();
            Arc::new(move |line: LogLine| {
                // Output from an abandoned run must not leak into the next one.
                hub.append_log_for(&token, line.to_string());
            })
        };

        Self {
            runner,
            hub,
            platform,
            token,
            overrides: Arc::new(RwLock::new(Overrides::default())),
            log,
        }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn hub(&self) -> &StatusHub {
        &self.hub
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn token(&self) -> &RunToken {
        &self.token
    }

    pub fn log_handler(&self) -> LogHandler {
        self.log.clone()
    }

    /// Apply the run's overrides to an invocation. Explicit values win.
    pub fn prepare(&self, mut invocation: Invocation) -> Invocation {
        let overrides = self.overrides.read();
        for (key, value) in &overrides.env {
            invocation.env.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if !overrides.path.is_empty() {
            let mut path = overrides.path.clone();
            path.append(&mut invocation.path_prepend);
            invocation.path_prepend = path;
        }
        invocation
    }

    /// Run with every output line relayed to the log.
    pub async fn stream(&self, invocation: Invocation) -> RunnerResult<()> {
        let invocation = self.prepare(invocation);
        self.runner
            .run(&invocation, OutputMode::Streaming, &self.log)
            .await
    }

    /// Run for the exit code only.
    pub async fn checked(&self, invocation: Invocation) -> RunnerResult<()> {
        let invocation = self.prepare(invocation);
        self.runner
            .run(&invocation, OutputMode::Checked, &self.log)
            .await
    }

    pub async fn capture(&self, invocation: Invocation) -> RunnerResult<CapturedOutput> {
        let invocation = self.prepare(invocation);
        self.runner.capture(&invocation).await
    }

    /// First output line of a successful `program args`, `None` if it is
    /// missing or fails.
    pub async fn probe(&self, program: &str, args: &[&str]) -> Option<String> {
        let invocation = Invocation::new(program).args(args.iter().copied());
        match self.capture(invocation).await {
            Ok(output) if output.success() => {
                let combined = output.combined_output();
                let first = combined
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .unwrap_or_default()
                    .to_string();
                Some(first)
            }
            Ok(output) => {
                debug!("{} exited with {:?}", program, output.code);
                None
            }
            Err(e) => {
                debug!("{} unavailable: {}", program, e);
                None
            }
        }
    }

    pub async fn elevated(&self, program: &str, args: &[&str]) -> RunnerResult<i32> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.note("exec", format!("$ {} {} (elevated)", program, args.join(" ")));
        self.runner.run_elevated(program, &args).await
    }

    /// Append a `[tag] message` line to the log.
    pub fn note(&self, tag: &str, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("[{}] {}", tag, message);
        self.hub
            .append_log_for(&self.token, format!("[{}] {}", tag, message));
    }

    /// Append the `[hint]` lines of a remediation recipe.
    pub fn hint(&self, remediation: &Remediation) {
        info!("[hint] {}", remediation.title);
        self.hub.append_logs_for(&self.token, remediation.hint_lines());
    }

    /// Use the JVM at `root` for every later child process.
    pub fn set_java_home(&self, root: &Path) {
        let mut overrides = self.overrides.write();
        overrides
            .env
            .insert("JAVA_HOME".to_string(), root.to_string_lossy().to_string());
        let bin = root.join("bin");
        if !overrides.path.contains(&bin) {
            overrides.path.insert(0, bin);
        }
    }

    pub fn java_home(&self) -> Option<PathBuf> {
        self.overrides.read().env.get("JAVA_HOME").map(PathBuf::from)
    }
}

/// Resolved inputs of one launch.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub run_id: Uuid,
    pub config: RepoConfig,
    pub profile: ProfileKind,
    pub workspace: PathBuf,
    pub env: EnvContext,
    pub package_manager: JsPackageManager,
}

impl LaunchContext {
    pub fn repo_dir(&self, role: Role) -> PathBuf {
        self.workspace.join(self.config.dir_name(role))
    }

    pub fn start_command(&self, role: Role) -> Option<&str> {
        match role {
            Role::Server => self.config.server.as_ref()?.start_command.as_deref(),
            Role::Frontend => self.config.frontend.start_command.as_deref(),
        }
    }

    pub fn install_command(&self, role: Role) -> Option<&str> {
        match role {
            Role::Server => self.config.server.as_ref()?.install_command.as_deref(),
            Role::Frontend => self.config.frontend.install_command.as_deref(),
        }
    }
}
