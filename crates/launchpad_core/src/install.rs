//! Dependency installation.

use std::path::{Path, PathBuf};

use launchpad_runner::{Invocation, Platform};
use tracing::{info, warn};

use crate::context::ExecContext;
use crate::error::{CoreError, CoreResult};
use crate::status::Role;
use crate::tools::JsPackageManager;

const MAVEN_URL: &str = "https://maven.apache.org/download.cgi";

/// The command an install runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallPlan {
    /// Caller supplied command line, already split.
    Explicit(Vec<String>),
    /// Maven build descriptor found.
    Maven,
    /// JavaScript package manager chosen from the lockfile.
    Js(JsPackageManager),
}

impl InstallPlan {
    /// Choose how to install `dir`.
    pub fn detect(dir: &Path, explicit: Option<&str>) -> CoreResult<Self> {
        if let Some(command) = explicit.filter(|c| !c.trim().is_empty()) {
            return Ok(Self::Explicit(normalize_explicit(split_command(command)?)));
        }
        if dir.join("pom.xml").is_file() {
            return Ok(Self::Maven);
        }
        Ok(Self::Js(JsPackageManager::detect(dir)))
    }

    fn clears_node_modules(&self) -> bool {
        !matches!(self, Self::Maven)
    }
}

/// Split a configured command line.
pub fn split_command(command: &str) -> CoreResult<Vec<String>> {
    let argv = shell_words::split(command)
        .map_err(|e| CoreError::Config(format!("Cannot parse command `{}`: {}", command, e)))?;
    if argv.is_empty() {
        return Err(CoreError::Config("Command is empty".to_string()));
    }
    Ok(argv)
}

/// Route a bare `yarn` through corepack so the project's pinned version runs.
pub fn normalize_explicit(argv: Vec<String>) -> Vec<String> {
    match argv.first().map(String::as_str) {
        Some("yarn") => std::iter::once("corepack".to_string())
            .chain(argv)
            .collect(),
        _ => argv,
    }
}

/// Maven wrapper script in `dir` for this platform, if the project has one.
pub fn maven_wrapper(dir: &Path, platform: Platform) -> Option<PathBuf> {
    let name = if platform.is_windows() { "mvnw.cmd" } else { "mvnw" };
    let wrapper = dir.join(name);
    wrapper.is_file().then_some(wrapper)
}

/// The Maven program for `dir`: its wrapper, else a global `mvn`.
pub async fn resolve_maven(exec: &ExecContext, dir: &Path) -> CoreResult<String> {
    if let Some(wrapper) = maven_wrapper(dir, exec.platform()) {
        return Ok(wrapper.to_string_lossy().to_string());
    }
    if exec.probe("mvn", &["-v"]).await.is_some() {
        return Ok("mvn".to_string());
    }
    Err(CoreError::tool_missing(
        "maven",
        "The project has no Maven wrapper and `mvn` is not on PATH. Install Maven.",
        Some(MAVEN_URL),
    ))
}

/// Installs a target's dependencies.
pub struct DependencyInstaller<'a> {
    exec: &'a ExecContext,
}

impl<'a> DependencyInstaller<'a> {
    pub fn new(exec: &'a ExecContext) -> Self {
        Self { exec }
    }

    pub async fn install(&self, role: Role, dir: &Path, explicit: Option<&str>) -> CoreResult<()> {
        let plan = InstallPlan::detect(dir, explicit)?;

        if plan.clears_node_modules() {
            self.clear_node_modules(dir).await;
        }

        let invocation = match &plan {
            InstallPlan::Explicit(argv) => Invocation::from_argv(argv)
                .ok_or_else(|| CoreError::Config("Install command is empty".to_string()))?,
            InstallPlan::Maven => Invocation::new(resolve_maven(self.exec, dir).await?)
                .args(["-B", "clean", "install", "-DskipTests"]),
            InstallPlan::Js(manager) => Invocation::new(manager.program()).arg("install"),
        };

        info!("Installing {} dependencies with {:?}", role, plan);
        self.exec
            .stream(invocation.cwd(dir).tag(role.tag()))
            .await
            .map_err(|source| CoreError::Install {
                target: role,
                source,
            })
    }

    async fn clear_node_modules(&self, dir: &Path) {
        let modules = dir.join("node_modules");
        if !modules.exists() {
            return;
        }
        self.exec
            .note("install", format!("Removing {}", modules.display()));
        if let Err(e) = tokio::fs::remove_dir_all(&modules).await {
            // The package manager reconciles what is left.
            warn!("Could not remove {}: {}", modules.display(), e);
            self.exec
                .note("install", format!("Could not remove node_modules: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::context::RunToken;
    use crate::status::StatusHub;
    use launchpad_runner::{MockResponse, MockRunner};

    fn exec(mock: &MockRunner) -> ExecContext {
        ExecContext::new(Arc::new(mock.clone()), StatusHub::new(), Platform::Linux, RunToken::detached())
    }

    #[test]
    fn test_detect_plan() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            InstallPlan::detect(dir.path(), None).unwrap(),
            InstallPlan::Js(JsPackageManager::Npm)
        );

        std::fs::write(dir.path().join("yarn.lock"), "").unwrap();
        assert_eq!(
            InstallPlan::detect(dir.path(), None).unwrap(),
            InstallPlan::Js(JsPackageManager::Yarn)
        );

        std::fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();
        assert_eq!(InstallPlan::detect(dir.path(), None).unwrap(), InstallPlan::Maven);

        assert_eq!(
            InstallPlan::detect(dir.path(), Some("yarn install --frozen-lockfile")).unwrap(),
            InstallPlan::Explicit(vec![
                "corepack".into(),
                "yarn".into(),
                "install".into(),
                "--frozen-lockfile".into()
            ])
        );
        assert!(InstallPlan::detect(dir.path(), Some("npm ci \"unterminated")).is_err());
    }

    #[test]
    fn test_normalize_leaves_other_commands() {
        let argv = vec!["pnpm".to_string(), "install".to_string()];
        assert_eq!(normalize_explicit(argv.clone()), argv);
    }

    #[tokio::test]
    async fn test_js_install_clears_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules").join("left-pad")).unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        let mock = MockRunner::new();
        let ctx = exec(&mock);

        DependencyInstaller::new(&ctx)
            .install(Role::Frontend, dir.path(), None)
            .await
            .unwrap();

        assert!(!dir.path().join("node_modules").exists());
        let call = &mock.calls_matching("npm install")[0];
        assert_eq!(call.tag, "frontend");
        assert_eq!(call.cwd.as_deref(), Some(dir.path()));
    }

    #[tokio::test]
    async fn test_maven_prefers_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();
        std::fs::write(dir.path().join("mvnw"), "#!/bin/sh").unwrap();
        let mock = MockRunner::new();
        let ctx = exec(&mock);

        DependencyInstaller::new(&ctx)
            .install(Role::Server, dir.path(), None)
            .await
            .unwrap();

        let wrapper = dir.path().join("mvnw").to_string_lossy().to_string();
        let call = &mock.calls_matching(&wrapper)[0];
        assert_eq!(call.args, vec!["-B", "clean", "install", "-DskipTests"]);
        assert!(!mock.was_called("mvn -v"));
    }

    #[tokio::test]
    async fn test_maven_missing_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();
        let mock = MockRunner::new().respond("mvn", MockResponse::not_found());
        let ctx = exec(&mock);

        let err = DependencyInstaller::new(&ctx)
            .install(Role::Server, dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolMissing { ref tool, .. } if tool == "maven"));
    }

    #[tokio::test]
    async fn test_install_failure_keeps_exit_details() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockRunner::new().respond(
            "npm install",
            MockResponse::failure(1, "npm ERR! code ERESOLVE\nnpm ERR! ERESOLVE unable to resolve dependency tree"),
        );
        let ctx = exec(&mock);

        let err = DependencyInstaller::new(&ctx)
            .install(Role::Frontend, dir.path(), None)
            .await
            .unwrap_err();

        match &err {
            CoreError::Install { target, source } => {
                assert_eq!(*target, Role::Frontend);
                assert_eq!(source.exit_code(), Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.error_lines().len(), 2);
    }
}
