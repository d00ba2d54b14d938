//! Invocation surface exposed to front ends.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::RepoConfig;
use crate::error::{CoreError, CoreResult};
use crate::launcher::{LaunchOutcome, Launcher, StopReport};
use crate::status::{LaunchStatus, Subscription};

/// Callback receiving every status snapshot.
pub type StatusCallback = Box<dyn Fn(LaunchStatus) + Send + Sync>;

/// Operations a front end can invoke.
#[async_trait]
pub trait LauncherApi: Send + Sync {
    /// Ask the user for a workspace directory. `None` when cancelled.
    async fn choose_directory(&self) -> Option<PathBuf>;

    async fn start(&self, config: RepoConfig) -> LaunchOutcome;

    async fn stop(&self) -> StopReport;

    /// Open an http(s) URL in the default browser.
    fn open_external_link(&self, url: &str) -> CoreResult<()>;

    fn on_status_update(&self, callback: StatusCallback) -> Subscription;
}

/// Host integration the launcher cannot provide itself.
pub trait Shell: Send + Sync {
    fn choose_directory(&self) -> Option<PathBuf>;

    fn open_url(&self, url: &str) -> CoreResult<()> {
        launchpad_runner::open_external_link(url).map_err(CoreError::from)
    }
}

/// [`LauncherApi`] backed by a [`Launcher`] and a host [`Shell`].
pub struct LauncherService<S: Shell> {
    launcher: Launcher,
    shell: S,
}

impl<S: Shell> LauncherService<S> {
    pub fn new(launcher: Launcher, shell: S) -> Self {
        Self { launcher, shell }
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }
}

#[async_trait]
impl<S: Shell> LauncherApi for LauncherService<S> {
    async fn choose_directory(&self) -> Option<PathBuf> {
        self.shell.choose_directory()
    }

    async fn start(&self, config: RepoConfig) -> LaunchOutcome {
        self.launcher.start(config).await
    }

    async fn stop(&self) -> StopReport {
        self.launcher.stop().await
    }

    fn open_external_link(&self, url: &str) -> CoreResult<()> {
        launchpad_runner::validate_link(url)?;
        self.shell.open_url(url)
    }

    fn on_status_update(&self, callback: StatusCallback) -> Subscription {
        self.launcher.on_status_update(callback)
    }
}
