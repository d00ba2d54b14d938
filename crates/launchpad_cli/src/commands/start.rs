//! Start command - Sync, install and run the configured repositories.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use launchpad_core::{
    default_workspace_dir, FrontendRepo, LauncherApi, Launcher, LauncherOptions, LauncherService,
    ProfileKind, RepoConfig, ServerRepo, StopReport,
};
use launchpad_runner::{Platform, ProcessRunner};

use super::LaunchFailed;
use crate::render::{print_remediation, StatusPrinter};
use crate::shell::PromptShell;

#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Repository configuration file (.toml, .yaml or .yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frontend repository URL
    #[arg(long)]
    frontend_url: Option<String>,

    /// Frontend branch to clone
    #[arg(long)]
    frontend_branch: Option<String>,

    /// Command that starts the frontend dev server
    #[arg(long)]
    frontend_start: Option<String>,

    /// Command that installs the frontend dependencies
    #[arg(long)]
    frontend_install: Option<String>,

    /// URL the frontend dev server is served at
    #[arg(long)]
    dev_url: Option<String>,

    /// Server repository URL
    #[arg(long)]
    server_url: Option<String>,

    /// Server branch to clone
    #[arg(long)]
    server_branch: Option<String>,

    /// Command that starts the server
    #[arg(long)]
    server_start: Option<String>,

    /// Command that installs the server dependencies
    #[arg(long)]
    server_install: Option<String>,

    /// Password of the local database user
    #[arg(long, env = "LAUNCHPAD_DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Directory the repositories are cloned into
    #[arg(short, long, env = "LAUNCHPAD_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Target profile: frontend-only, js-full-stack or jvm-full-stack
    #[arg(short, long)]
    profile: Option<ProfileKind>,

    /// Open the frontend in the browser once it runs
    #[arg(long)]
    open: bool,
}

impl StartArgs {
    /// Build the run configuration: the config file if given, with flags on
    /// top.
    pub fn to_config(&self) -> Result<RepoConfig> {
        let mut config = match (&self.config, &self.frontend_url) {
            (Some(path), _) => RepoConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            (None, Some(url)) => RepoConfig::new(FrontendRepo::new(url)),
            (None, None) => {
                return Err(launchpad_core::CoreError::Config(
                    "Either --config or --frontend-url is required".to_string(),
                )
                .into())
            }
        };

        let frontend = &mut config.frontend;
        if let Some(url) = &self.frontend_url {
            frontend.url = url.clone();
        }
        override_opt(&mut frontend.branch, &self.frontend_branch);
        override_opt(&mut frontend.start_command, &self.frontend_start);
        override_opt(&mut frontend.install_command, &self.frontend_install);
        override_opt(&mut frontend.dev_url, &self.dev_url);

        if let Some(url) = &self.server_url {
            match &mut config.server {
                Some(server) => server.url = url.clone(),
                None => config.server = Some(ServerRepo::new(url)),
            }
        }
        if let Some(server) = &mut config.server {
            override_opt(&mut server.branch, &self.server_branch);
            override_opt(&mut server.start_command, &self.server_start);
            override_opt(&mut server.install_command, &self.server_install);
            override_opt(&mut server.db_password, &self.db_password);
        }

        if let Some(dir) = &self.workspace {
            config.workspace_dir = Some(dir.clone());
        }
        if let Some(profile) = self.profile {
            config.profile = Some(profile);
        }

        config.validate()?;
        Ok(config)
    }
}

fn override_opt(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

pub async fn execute(args: StartArgs, quiet: bool) -> Result<()> {
    let config = args.to_config()?;
    info!(
        "Launching {} into {}",
        config.resolved_profile(),
        config.resolve_workspace(Platform::current()).display()
    );

    let service = LauncherService::new(
        Launcher::new(Arc::new(ProcessRunner::default()), LauncherOptions::default()),
        PromptShell::new(default_workspace_dir(Platform::current())),
    );

    let printer = Arc::new(StatusPrinter::new(quiet));
    let _updates = service.on_status_update({
        let printer = printer.clone();
        Box::new(move |status| printer.print(&status))
    });

    let outcome = tokio::select! {
        outcome = service.start(config) => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("⏹  Interrupted, stopping...");
            print_stop(&service.stop().await);
            return Ok(());
        }
    };

    if !outcome.ok {
        if let Some(remediation) = &outcome.remediation {
            print_remediation(remediation);
        }
        // Whatever started before the failure is not left behind.
        service.stop().await;
        return Err(LaunchFailed {
            kind: outcome.category.unwrap_or(launchpad_core::FailureKind::Other),
            message: outcome.error.unwrap_or_else(|| "Launch failed".to_string()),
        }
        .into());
    }

    // Soft failures, e.g. database provisioning, still come with a hint.
    if let Some(remediation) = &outcome.remediation {
        print_remediation(remediation);
    }

    if let Some(url) = &outcome.url {
        println!();
        println!("🚀 Frontend running at {}", url);
        if args.open {
            if let Err(e) = service.open_external_link(url) {
                warn!("Could not open {}: {}", url, e);
            }
        }
    }
    println!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!();
    println!("⏹  Stopping...");
    print_stop(&service.stop().await);
    Ok(())
}

fn print_stop(report: &StopReport) {
    for kill in &report.kills {
        let how = if kill.forced { "killed" } else { "stopped" };
        match &kill.detail {
            Some(detail) if !kill.ok => println!("   ⚠️  {} (pid {}): {}", kill.role, kill.pid, detail),
            _ => println!("   {} {} (pid {})", how, kill.role, kill.pid),
        }
    }
    if report.ok {
        println!("✅ Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_build_config() {
        let args = StartArgs {
            frontend_url: Some("https://example.com/app.git".into()),
            frontend_start: Some("yarn dev".into()),
            server_url: Some("https://example.com/api.git".into()),
            db_password: Some("pw".into()),
            profile: Some(ProfileKind::JvmFullStack),
            ..StartArgs::default()
        };
        let config = args.to_config().unwrap();

        assert_eq!(config.frontend.start_command.as_deref(), Some("yarn dev"));
        let server = config.server.as_ref().unwrap();
        assert_eq!(server.url, "https://example.com/api.git");
        assert_eq!(server.db_password.as_deref(), Some("pw"));
        assert_eq!(config.resolved_profile(), ProfileKind::JvmFullStack);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launchpad.toml");
        std::fs::write(
            &path,
            r#"
[frontend]
url = "https://example.com/app.git"
branch = "main"

[server]
url = "https://example.com/api.git"
"#,
        )
        .unwrap();

        let args = StartArgs {
            config: Some(path),
            frontend_branch: Some("develop".into()),
            workspace: Some(dir.path().join("ws")),
            ..StartArgs::default()
        };
        let config = args.to_config().unwrap();

        assert_eq!(config.frontend.branch.as_deref(), Some("develop"));
        assert_eq!(config.workspace_dir, Some(dir.path().join("ws")));
        assert_eq!(config.resolved_profile(), ProfileKind::JsFullStack);
    }

    #[test]
    fn test_missing_frontend_is_config_error() {
        let err = StartArgs::default().to_config().unwrap_err();
        assert!(err.downcast_ref::<launchpad_core::CoreError>().is_some());
    }
}
