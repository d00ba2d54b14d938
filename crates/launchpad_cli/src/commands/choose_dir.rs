//! Choose-dir command - Pick a workspace directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;

use launchpad_core::{default_workspace_dir, Launcher, LauncherApi, LauncherOptions, LauncherService};
use launchpad_runner::{Platform, ProcessRunner};

use crate::shell::PromptShell;

#[derive(Args, Debug)]
pub struct ChooseDirArgs {
    /// Directory offered when the answer is empty
    #[arg(long)]
    default: Option<PathBuf>,
}

pub async fn execute(args: ChooseDirArgs) -> Result<()> {
    let default = args
        .default
        .unwrap_or_else(|| default_workspace_dir(Platform::current()));
    let service = LauncherService::new(
        Launcher::new(Arc::new(ProcessRunner::default()), LauncherOptions::default()),
        PromptShell::new(default),
    );

    match service.choose_directory().await {
        Some(dir) => {
            println!("{}", dir.display());
            Ok(())
        }
        None => bail!("No directory chosen"),
    }
}
