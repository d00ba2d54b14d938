//! Open command - Open a link in the default browser.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use launchpad_core::{default_workspace_dir, Launcher, LauncherApi, LauncherOptions, LauncherService};
use launchpad_runner::{Platform, ProcessRunner};

use crate::shell::PromptShell;

#[derive(Args, Debug)]
pub struct OpenArgs {
    /// http or https URL to open
    url: String,
}

pub async fn execute(args: OpenArgs) -> Result<()> {
    let service = LauncherService::new(
        Launcher::new(Arc::new(ProcessRunner::default()), LauncherOptions::default()),
        PromptShell::new(default_workspace_dir(Platform::current())),
    );
    service.open_external_link(&args.url)?;
    println!("🌐 Opened {}", args.url);
    Ok(())
}
