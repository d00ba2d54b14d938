//! Repository synchronization.
//!
//! Clones a repository into its target directory on first use and pulls on
//! every later run.

use std::path::Path;

use launchpad_runner::Invocation;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ExecContext;
use crate::error::{CoreError, CoreResult};
use crate::status::Role;

/// What a sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Cloned,
    Pulled,
}

/// Git operations for the managed repositories.
pub struct RepoSync<'a> {
    exec: &'a ExecContext,
}

impl<'a> RepoSync<'a> {
    pub fn new(exec: &'a ExecContext) -> Self {
        Self { exec }
    }

    /// Check if `dir` already holds a working tree.
    pub fn is_initialized(dir: &Path) -> bool {
        dir.join(".git").exists()
    }

    /// Pull when `target_dir` is a working tree, clone into it otherwise.
    pub async fn sync(
        &self,
        role: Role,
        target_dir: &Path,
        url: &str,
        branch: Option<&str>,
    ) -> CoreResult<SyncAction> {
        let (invocation, action) = if Self::is_initialized(target_dir) {
            info!("Pulling {} in {}", url, target_dir.display());
            (Invocation::new("git").arg("pull"), SyncAction::Pulled)
        } else {
            std::fs::create_dir_all(target_dir)?;
            info!("Cloning {} into {}", url, target_dir.display());
            let mut clone = Invocation::new("git").arg("clone");
            if let Some(branch) = branch.filter(|b| !b.trim().is_empty()) {
                clone = clone.args(["-b", branch]);
            }
            (clone.args([url, "."]), SyncAction::Cloned)
        };

        let invocation = invocation
            .cwd(target_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .tag(role.tag());

        self.exec
            .stream(invocation)
            .await
            .map_err(|source| CoreError::GitSync {
                url: url.to_string(),
                source,
            })?;

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::context::RunToken;
    use crate::status::StatusHub;
    use launchpad_runner::{MockResponse, MockRunner, Platform};

    fn exec(mock: &MockRunner) -> ExecContext {
        ExecContext::new(Arc::new(mock.clone()), StatusHub::new(), Platform::Linux, RunToken::detached())
    }

    #[tokio::test]
    async fn test_clone_into_directory_itself() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("frontend");
        let mock = MockRunner::new();
        let ctx = exec(&mock);

        let action = RepoSync::new(&ctx)
            .sync(Role::Frontend, &target, "https://example.com/app.git", Some("main"))
            .await
            .unwrap();

        assert_eq!(action, SyncAction::Cloned);
        assert!(target.is_dir());
        let call = &mock.calls_matching("git clone")[0];
        assert_eq!(call.args, vec!["clone", "-b", "main", "https://example.com/app.git", "."]);
        assert_eq!(call.cwd.as_deref(), Some(target.as_path()));
        assert_eq!(call.tag, "frontend");
    }

    #[tokio::test]
    async fn test_existing_checkout_pulls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        let mock = MockRunner::new();
        let ctx = exec(&mock);

        let action = RepoSync::new(&ctx)
            .sync(Role::Server, dir.path(), "https://example.com/api.git", Some("main"))
            .await
            .unwrap();

        assert_eq!(action, SyncAction::Pulled);
        assert!(mock.was_called("git pull"));
        assert!(!mock.was_called("git clone"));
    }

    #[tokio::test]
    async fn test_failure_is_git_sync_error() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockRunner::new().respond(
            "git clone",
            MockResponse::failure(128, "fatal: repository 'https://example.com/nope.git/' not found"),
        );
        let ctx = exec(&mock);

        let err = RepoSync::new(&ctx)
            .sync(Role::Frontend, dir.path(), "https://example.com/nope.git", None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::GitSync { .. }));
        assert_eq!(err.error_lines().len(), 1);
        assert!(ctx.hub().snapshot().logs.iter().any(|l| l.starts_with("[frontend:err] fatal:")));
    }
}
