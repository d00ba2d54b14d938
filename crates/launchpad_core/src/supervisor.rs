//! Long-running dev server supervision.
//!
//! The supervisor owns the handles of the spawned server and frontend
//! processes, mirrors their lifecycle into the status hub and tears them down
//! on request. Exited processes are never restarted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use launchpad_runner::{CommandRunner, ExitInfo, Invocation, LogHandler, Platform, SpawnedChild};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::context::{ExecContext, RunToken};
use crate::remediation::classify;
use crate::error::{CoreError, CoreResult};
use crate::install::{normalize_explicit, resolve_maven, split_command};
use crate::status::{Role, StatusHub, TargetStep};
use crate::tools::JsPackageManager;

/// Default wait between the interrupt and the forced kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Framework CLIs tried when a project has no usable script, with the
/// arguments that start their dev server.
const FRAMEWORK_CLIS: &[(&str, &[&str])] = &[
    ("next", &["dev"]),
    ("react-scripts", &["start"]),
    ("vite", &[]),
];

/// How the server repository is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStack {
    Js,
    Jvm,
}

/// Command that starts a JavaScript project's dev server.
///
/// An explicit command wins. Otherwise the `dev` script, then `start`, then
/// the framework CLI found in the dependencies (vite when none is declared).
pub fn resolve_frontend_command(
    dir: &Path,
    explicit: Option<&str>,
    package_manager: JsPackageManager,
    platform: Platform,
) -> CoreResult<Invocation> {
    if let Some(command) = explicit.filter(|c| !c.trim().is_empty()) {
        let argv = normalize_explicit(split_command(command)?);
        return Invocation::from_argv(&argv)
            .ok_or_else(|| CoreError::Config("Start command is empty".to_string()));
    }

    let manifest_path = dir.join("package.json");
    if !manifest_path.is_file() {
        return Err(CoreError::Config(format!(
            "No start command configured and {} does not exist",
            manifest_path.display()
        )));
    }
    let manifest: Value = serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;

    for script in ["dev", "start"] {
        if manifest["scripts"][script].is_string() {
            return Ok(Invocation::new(package_manager.program()).args(["run", script]));
        }
    }

    let declared = |name: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| manifest[*section].get(name).is_some())
    };
    let (cli, args) = FRAMEWORK_CLIS
        .iter()
        .find(|(name, _)| declared(name))
        .copied()
        .unwrap_or(("vite", &[]));

    let bin_name = if platform.is_windows() {
        format!("{}.cmd", cli)
    } else {
        cli.to_string()
    };
    let local = dir.join("node_modules").join(".bin").join(bin_name);
    let invocation = if local.is_file() {
        Invocation::new(local.to_string_lossy())
    } else {
        Invocation::new("npx").arg(cli)
    };
    Ok(invocation.args(args.iter().copied()))
}

/// Command that starts the server.
pub async fn resolve_server_command(
    exec: &ExecContext,
    dir: &Path,
    stack: ServerStack,
    explicit: Option<&str>,
    package_manager: JsPackageManager,
) -> CoreResult<Invocation> {
    match stack {
        ServerStack::Jvm if explicit.map_or(true, |c| c.trim().is_empty()) => {
            Ok(Invocation::new(resolve_maven(exec, dir).await?).arg("spring-boot:run"))
        }
        _ => resolve_frontend_command(dir, explicit, package_manager, exec.platform()),
    }
}

/// Result of stopping one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KillOutcome {
    pub role: Role,
    pub pid: u32,
    pub ok: bool,
    /// The process had to be killed unconditionally.
    pub forced: bool,
    pub detail: Option<String>,
}

struct Tracked {
    pid: u32,
    exited: watch::Receiver<Option<ExitInfo>>,
}

/// Tracks at most one process per role.
#[derive(Clone)]
pub struct Supervisor {
    runner: Arc<dyn CommandRunner>,
    hub: StatusHub,
    platform: Platform,
    grace: Duration,
    procs: Arc<Mutex<HashMap<Role, Tracked>>>,
}

impl Supervisor {
    pub fn new(runner: Arc<dyn CommandRunner>, hub: StatusHub, platform: Platform) -> Self {
        Self {
            runner,
            hub,
            platform,
            grace: DEFAULT_STOP_GRACE,
            procs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Start `invocation` as the process for `role` and return its pid.
    ///
    /// The child is only tracked while `token` is current. One that comes up
    /// after its run was abandoned is killed straight away.
    pub async fn spawn(
        &self,
        role: Role,
        invocation: &Invocation,
        log: &LogHandler,
        token: &RunToken,
    ) -> CoreResult<u32> {
        let child = self
            .runner
            .spawn(invocation, log)
            .await
            .map_err(|source| CoreError::ProcessSpawn { role, source })?;
        let SpawnedChild { pid, exit, errors } = child;

        let (tx, rx) = watch::channel(None);
        let tracked = {
            let mut procs = self.procs.lock();
            let current = token.is_current();
            if current {
                procs.insert(role, Tracked { pid, exited: rx });
                // Published under the lock: the exit watcher below can only
                // run after this, and `stop` cannot interleave.
                self.hub.set_pid(role, Some(pid));
                self.hub
                    .set_target(role, TargetStep::Running, Some(format!("pid {}", pid)));
            }
            current
        };
        if !tracked {
            info!("{} (pid {}) started after its run was abandoned, killing it", role, pid);
            if let Err(e) = self.runner.terminate(pid, true).await {
                warn!("Could not kill {} (pid {}): {}", role, pid, e);
            }
            return Err(CoreError::Cancelled);
        }
        info!("Started {} (pid {})", role, pid);

        let procs = self.procs.clone();
        let hub = self.hub.clone();
        tokio::spawn(async move {
            let info = exit.await.unwrap_or_else(|_| ExitInfo::unknown());
            let _ = tx.send(Some(info));

            let remediation = if info.success() {
                None
            } else {
                let error_lines = errors.lock().clone().into_vec();
                classify(&format!("{} exited ({})", role, info), &error_lines)
            };

            let mut procs = procs.lock();
            match procs.get(&role) {
                Some(tracked) if tracked.pid == pid => {
                    procs.remove(&role);
                }
                // A stopped process was already accounted for by `stop`.
                _ => {
                    debug!("{} (pid {}) exited after stop: {}", role, pid, info);
                    return;
                }
            }

            warn!("{} (pid {}) exited: {}", role, pid, info);
            hub.append_log(format!("[{}] process exited ({})", role.tag(), info));
            let mut message = format!("Process exited ({})", info);
            if let Some(hint) = &remediation {
                hub.append_logs(hint.hint_lines());
                message = format!("{}. {}", message, hint.title);
            }
            let step = if info.success() {
                TargetStep::Idle
            } else {
                TargetStep::Error
            };
            hub.set_target(role, step, Some(message));
            hub.set_pid(role, None);
        });

        Ok(pid)
    }

    /// Roles and pids currently tracked.
    pub fn tracked(&self) -> Vec<(Role, u32)> {
        let mut tracked: Vec<(Role, u32)> = self
            .procs
            .lock()
            .iter()
            .map(|(role, t)| (*role, t.pid))
            .collect();
        tracked.sort_by_key(|(role, _)| role.tag());
        tracked
    }

    pub fn is_idle(&self) -> bool {
        self.procs.lock().is_empty()
    }

    /// Stop the process for `role`, if any.
    pub async fn stop(&self, role: Role) -> Option<KillOutcome> {
        let tracked = {
            let mut procs = self.procs.lock();
            let tracked = procs.remove(&role)?;
            self.hub.set_pid(role, None);
            self.hub.set_target(role, TargetStep::Idle, None);
            tracked
        };
        let pid = tracked.pid;
        info!("Stopping {} (pid {})", role, pid);

        let outcome = if self.platform.is_windows() {
            let result = self.runner.terminate(pid, true).await;
            KillOutcome {
                role,
                pid,
                ok: result.is_ok(),
                forced: true,
                detail: result.err().map(|e| e.to_string()),
            }
        } else {
            self.interrupt_then_kill(role, tracked).await
        };

        if let Some(detail) = &outcome.detail {
            warn!("Stopping {} (pid {}): {}", role, pid, detail);
        }
        Some(outcome)
    }

    async fn interrupt_then_kill(&self, role: Role, tracked: Tracked) -> KillOutcome {
        let pid = tracked.pid;
        let mut exited = tracked.exited;

        if let Err(e) = self.runner.terminate(pid, false).await {
            debug!("Interrupt of pid {} failed: {}", pid, e);
        }

        let graceful = tokio::time::timeout(self.grace, exited.wait_for(Option::is_some))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        if graceful {
            return KillOutcome {
                role,
                pid,
                ok: true,
                forced: false,
                detail: None,
            };
        }

        let result = self.runner.terminate(pid, true).await;
        KillOutcome {
            role,
            pid,
            ok: result.is_ok(),
            forced: true,
            detail: Some(match result {
                Ok(()) => format!("did not exit within {:?}, killed", self.grace),
                Err(e) => e.to_string(),
            }),
        }
    }

    /// Stop the frontend, then the server.
    pub async fn stop_all(&self) -> Vec<KillOutcome> {
        let mut outcomes = Vec::new();
        for role in [Role::Frontend, Role::Server] {
            if let Some(outcome) = self.stop(role).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}
