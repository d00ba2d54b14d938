//! Launch orchestration.
//!
//! [`Launcher`] drives one run through the pipeline:
//!
//! 1. `checking-tools`: git, Node and the profile's extra tools
//! 2. `preparing`: workspace directory and env resolution
//! 3. `cloning`: server first, then frontend
//! 4. env files written into both repositories
//! 5. `installing`: dependencies, then the database
//! 6. `building`: only for profiles that compile the server
//! 7. `starting`: server, then frontend
//!
//! Any failure moves the status to `error`. Processes already started stay up
//! until [`Launcher::stop`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use launchpad_runner::{CommandRunner, Invocation, Platform};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{ProfileKind, RepoConfig};
use crate::context::{ExecContext, LaunchContext, RunToken};
use crate::database::{DatabaseProvisioner, ReadinessPolicy};
use crate::env::EnvContext;
use crate::error::{CoreError, CoreResult, FailureKind};
use crate::git::{RepoSync, SyncAction};
use crate::install::DependencyInstaller;
use crate::materialize::write_env_files;
use crate::profile::{for_kind, TargetProfile};
use crate::remediation::{classify, Remediation};
use crate::status::{LaunchStatus, Role, StatusHub, Step, Subscription, TargetStep};
use crate::supervisor::{resolve_frontend_command, KillOutcome, Supervisor, DEFAULT_STOP_GRACE};
use crate::tools::{ToolProber, ToolReport};

/// Launcher settings.
#[derive(Debug, Clone)]
pub struct LauncherOptions {
    pub platform: Platform,
    /// Wait between interrupt and forced kill on stop
    pub stop_grace: Duration,
    pub readiness: ReadinessPolicy,
    /// Root `.env` file; defaults to `.env` in the working directory
    pub env_file: Option<PathBuf>,
    /// Process environment snapshot; defaults to the current process
    pub base_env: Option<Vec<(String, String)>>,
}

impl Default for LauncherOptions {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            stop_grace: DEFAULT_STOP_GRACE,
            readiness: ReadinessPolicy::default(),
            env_file: None,
            base_env: None,
        }
    }
}

impl LauncherOptions {
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn base_env<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.base_env = Some(vars.into_iter().collect());
        self
    }
}

/// Result of [`Launcher::start`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOutcome {
    pub ok: bool,
    /// Where the frontend dev server listens, once running
    pub url: Option<String>,
    pub error: Option<String>,
    pub category: Option<FailureKind>,
    pub remediation: Option<Remediation>,
}

impl LaunchOutcome {
    fn success(url: String, remediation: Option<Remediation>) -> Self {
        Self {
            ok: true,
            url: Some(url),
            error: None,
            category: None,
            remediation,
        }
    }

    fn failure(err: &CoreError, remediation: Option<Remediation>) -> Self {
        Self {
            ok: false,
            url: None,
            error: Some(err.to_string()),
            category: Some(err.kind()),
            remediation,
        }
    }
}

/// Result of [`Launcher::stop`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub ok: bool,
    pub kills: Vec<KillOutcome>,
}

/// Runs launches and owns the processes they start.
#[derive(Clone)]
pub struct Launcher {
    runner: Arc<dyn CommandRunner>,
    hub: StatusHub,
    supervisor: Supervisor,
    options: LauncherOptions,
    generation: Arc<AtomicU64>,
    active: Arc<AtomicBool>,
}

/// Clears the active flag when a run ends, however it ends.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Launcher {
    pub fn new(runner: Arc<dyn CommandRunner>, options: LauncherOptions) -> Self {
        let hub = StatusHub::new();
        let supervisor = Supervisor::new(runner.clone(), hub.clone(), options.platform)
            .grace(options.stop_grace);
        Self {
            runner,
            hub,
            supervisor,
            options,
            generation: Arc::new(AtomicU64::new(0)),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self) -> LaunchStatus {
        self.hub.snapshot()
    }

    pub fn hub(&self) -> &StatusHub {
        &self.hub
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LaunchStatus> {
        self.hub.subscribe()
    }

    pub fn on_status_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(LaunchStatus) + Send + Sync + 'static,
    {
        self.hub.on_update(callback)
    }

    /// Pids of the processes started by the current run.
    pub fn tracked(&self) -> Vec<(Role, u32)> {
        self.supervisor.tracked()
    }

    /// Run only the tool checks for `kind`.
    pub async fn check_tools(&self, kind: ProfileKind) -> CoreResult<ToolReport> {
        let _guard = self.acquire()?;
        let exec = ExecContext::new(
            self.runner.clone(),
            self.hub.clone(),
            self.options.platform,
            RunToken::detached(),
        );
        ToolProber::new(&exec)
            .ensure_tools(&for_kind(kind).requirements())
            .await
    }

    fn acquire(&self) -> CoreResult<ActiveGuard> {
        if !self.supervisor.is_idle() {
            return Err(CoreError::AlreadyRunning);
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::AlreadyRunning);
        }
        Ok(ActiveGuard(self.active.clone()))
    }

    /// Launch `config`. Never panics on workflow errors; they are reported in
    /// the outcome and the status.
    pub async fn start(&self, config: RepoConfig) -> LaunchOutcome {
        let _guard = match self.acquire() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Start refused: {}", e);
                return LaunchOutcome::failure(&e, None);
            }
        };

        let token = RunToken::new(self.generation.clone());
        let run_id = Uuid::new_v4();
        self.hub.begin_run(run_id);

        let mut focus = None;
        let result = self
            .run(config, &token, run_id, &mut focus)
            .instrument(info_span!("launch", run_id = %run_id))
            .await;

        match result {
            Ok((url, remediation)) => {
                info!("Launch {} is running at {}", run_id, url);
                LaunchOutcome::success(url, remediation)
            }
            Err(CoreError::Cancelled) => Self::abandoned(run_id),
            Err(e) => self.fail(e, focus, &token, run_id),
        }
    }

    fn abandoned(run_id: Uuid) -> LaunchOutcome {
        info!("Launch {} abandoned", run_id);
        LaunchOutcome::failure(&CoreError::Cancelled, None)
    }

    fn fail(&self, err: CoreError, focus: Option<Role>, token: &RunToken, run_id: Uuid) -> LaunchOutcome {
        let message = err.to_string();
        if !self.hub.advance_for(token, Step::Error, message.clone()) {
            return Self::abandoned(run_id);
        }
        error!("Launch failed: {}", err);
        if let Some(role) = focus {
            self.hub
                .set_target_for(token, role, TargetStep::Error, Some(message.clone()));
        }

        let remediation = classify(&message, err.error_lines());
        if let Some(hint) = &remediation {
            self.hub.append_logs_for(token, hint.hint_lines());
        }
        LaunchOutcome::failure(&err, remediation)
    }

    async fn run(
        &self,
        config: RepoConfig,
        token: &RunToken,
        run_id: Uuid,
        focus: &mut Option<Role>,
    ) -> CoreResult<(String, Option<Remediation>)> {
        let exec = ExecContext::new(
            self.runner.clone(),
            self.hub.clone(),
            self.options.platform,
            token.clone(),
        );

        config.validate()?;
        let profile = for_kind(config.resolved_profile());
        info!("Starting {} launch", profile.kind());

        self.step(token, Step::CheckingTools, "Checking required tools")?;
        let report = ToolProber::new(&exec)
            .ensure_tools(&profile.requirements())
            .await?;

        self.step(token, Step::Preparing, "Preparing workspace")?;
        let launch = self.prepare(config, profile.as_ref(), &report, run_id)?;
        exec.note("workspace", launch.workspace.display().to_string());

        self.step(token, Step::Cloning, "Syncing repositories")?;
        self.sync_repos(&exec, &launch, focus).await?;
        self.write_env(&exec, &launch, profile.as_ref(), focus)?;

        self.step(token, Step::Installing, "Installing dependencies")?;
        let remediation = self.install(&exec, &launch, profile.as_ref(), focus).await?;

        if profile.has_build_step() {
            self.step(token, Step::Building, "Building server")?;
            *focus = Some(Role::Server);
            self.hub
                .set_target_for(token, Role::Server, TargetStep::Building, None);
            profile.build_server(&exec, &launch).await?;
        }

        self.step(token, Step::Starting, "Starting dev servers")?;
        self.start_processes(&exec, &launch, profile.as_ref(), token, focus)
            .await?;

        *focus = None;
        let url = launch.env.app_url().to_string();
        self.step(token, Step::Running, format!("Running at {}", url))?;
        Ok((url, remediation))
    }

    /// Advance the status unless the run has been abandoned.
    fn step(&self, token: &RunToken, step: Step, message: impl Into<String>) -> CoreResult<()> {
        if !token.is_current() || !self.hub.advance_for(token, step, message) {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }

    fn prepare(
        &self,
        config: RepoConfig,
        profile: &dyn TargetProfile,
        report: &ToolReport,
        run_id: Uuid,
    ) -> CoreResult<LaunchContext> {
        let workspace = config.resolve_workspace(self.options.platform);
        std::fs::create_dir_all(&workspace)?;

        let env_file = match &self.options.env_file {
            Some(path) => path.clone(),
            None => std::env::current_dir()?.join(".env"),
        };
        let base_env = match &self.options.base_env {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };
        let env = EnvContext::resolve(Some(&env_file), base_env, &config)?;

        Ok(LaunchContext {
            run_id,
            config,
            profile: profile.kind(),
            workspace,
            env,
            package_manager: report.package_manager.unwrap_or_default(),
        })
    }

    fn roles(launch: &LaunchContext) -> Vec<Role> {
        if launch.profile.has_server() && launch.config.server.is_some() {
            vec![Role::Server, Role::Frontend]
        } else {
            vec![Role::Frontend]
        }
    }

    async fn sync_repos(
        &self,
        exec: &ExecContext,
        launch: &LaunchContext,
        focus: &mut Option<Role>,
    ) -> CoreResult<()> {
        let sync = RepoSync::new(exec);
        for role in Self::roles(launch) {
            let (url, branch) = match role {
                Role::Server => match &launch.config.server {
                    Some(server) => (server.url.as_str(), server.branch.as_deref()),
                    None => continue,
                },
                Role::Frontend => (
                    launch.config.frontend.url.as_str(),
                    launch.config.frontend.branch.as_deref(),
                ),
            };

            *focus = Some(role);
            self.hub.set_target_for(
                exec.token(),
                role,
                TargetStep::Cloning,
                Some(url.to_string()),
            );
            let action = sync.sync(role, &launch.repo_dir(role), url, branch).await?;
            let done = match action {
                SyncAction::Cloned => "Cloned",
                SyncAction::Pulled => "Pulled latest changes",
            };
            exec.note(role.tag(), format!("{} {}", done, url));
        }
        Ok(())
    }

    fn write_env(
        &self,
        exec: &ExecContext,
        launch: &LaunchContext,
        profile: &dyn TargetProfile,
        focus: &mut Option<Role>,
    ) -> CoreResult<()> {
        let roles = Self::roles(launch);
        for (role, spec) in profile.env_files() {
            if !roles.contains(&role) {
                continue;
            }
            *focus = Some(role);
            let written = write_env_files(&launch.repo_dir(role), &[spec], &launch.env)?;
            for path in written {
                exec.note("env", format!("Wrote {}", path.display()));
            }
        }
        Ok(())
    }

    async fn install(
        &self,
        exec: &ExecContext,
        launch: &LaunchContext,
        profile: &dyn TargetProfile,
        focus: &mut Option<Role>,
    ) -> CoreResult<Option<Remediation>> {
        let roles = Self::roles(launch);
        let token = exec.token();

        if roles.contains(&Role::Server) {
            *focus = Some(Role::Server);
            self.hub
                .set_target_for(token, Role::Server, TargetStep::Installing, None);
            profile.install_server(exec, launch).await?;
        }

        *focus = Some(Role::Frontend);
        self.hub
            .set_target_for(token, Role::Frontend, TargetStep::Installing, None);
        DependencyInstaller::new(exec)
            .install(
                Role::Frontend,
                &launch.repo_dir(Role::Frontend),
                launch.install_command(Role::Frontend),
            )
            .await?;

        if profile.uses_database() && roles.contains(&Role::Server) {
            *focus = Some(Role::Server);
            let conn = launch.env.db_connection()?;
            let provisioner = DatabaseProvisioner::new(exec).readiness(self.options.readiness);
            provisioner.ensure_engine_installed(&conn).await;
            return provisioner.ensure_database(&conn).await;
        }
        Ok(None)
    }

    async fn start_processes(
        &self,
        exec: &ExecContext,
        launch: &LaunchContext,
        profile: &dyn TargetProfile,
        token: &RunToken,
        focus: &mut Option<Role>,
    ) -> CoreResult<()> {
        if Self::roles(launch).contains(&Role::Server) {
            *focus = Some(Role::Server);
            if let Some(invocation) = profile.server_invocation(exec, launch).await? {
                self.spawn(exec, Role::Server, invocation, token).await?;
            }
        }

        *focus = Some(Role::Frontend);
        let dir = launch.repo_dir(Role::Frontend);
        let invocation = resolve_frontend_command(
            &dir,
            launch.start_command(Role::Frontend),
            launch.package_manager,
            self.options.platform,
        )?
        .cwd(&dir)
        .tag(Role::Frontend.tag());
        self.spawn(exec, Role::Frontend, invocation, token).await?;
        Ok(())
    }

    async fn spawn(
        &self,
        exec: &ExecContext,
        role: Role,
        invocation: Invocation,
        token: &RunToken,
    ) -> CoreResult<u32> {
        if !self
            .hub
            .set_target_for(token, role, TargetStep::Starting, None)
        {
            return Err(CoreError::Cancelled);
        }

        // The supervisor marks the target running, or kills the child when a
        // stop landed while it was spawning.
        let invocation = exec.prepare(invocation);
        self.supervisor
            .spawn(role, &invocation, &exec.log_handler(), token)
            .await
    }

    /// Stop every process, abandon any run in progress and reset the status.
    pub async fn stop(&self) -> StopReport {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let kills = self.supervisor.stop_all().await;
        self.hub.reset();

        let ok = kills.iter().all(|k| k.ok);
        info!("Stopped {} process(es)", kills.len());
        StopReport { ok, kills }
    }
}
