//! Target profiles.
//!
//! A profile decides which tools a launch needs, where env files go and how
//! the server is installed, built and started. The frontend is handled the
//! same way for every profile.

use async_trait::async_trait;
use launchpad_runner::Invocation;
use tracing::info;

use crate::config::ProfileKind;
use crate::context::{ExecContext, LaunchContext};
use crate::env::{FRONTEND_KEYS, SERVER_KEYS};
use crate::error::{CoreError, CoreResult};
use crate::install::{resolve_maven, DependencyInstaller};
use crate::materialize::EnvFileSpec;
use crate::status::Role;
use crate::supervisor::{resolve_server_command, ServerStack};
use crate::tools::ToolRequirements;

/// Strategy for one supported stack.
#[async_trait]
pub trait TargetProfile: Send + Sync {
    fn kind(&self) -> ProfileKind;

    fn requirements(&self) -> ToolRequirements {
        ToolRequirements::default()
    }

    /// Env files to write, per repository.
    fn env_files(&self) -> Vec<(Role, EnvFileSpec)>;

    fn uses_database(&self) -> bool {
        false
    }

    /// Install the server's dependencies.
    async fn install_server(&self, _exec: &ExecContext, _launch: &LaunchContext) -> CoreResult<()> {
        Ok(())
    }

    /// The server is compiled before it starts.
    fn has_build_step(&self) -> bool {
        false
    }

    /// Compile the server before it is started.
    async fn build_server(&self, _exec: &ExecContext, _launch: &LaunchContext) -> CoreResult<()> {
        Ok(())
    }

    /// Command that starts the server, `None` when the profile has no server.
    async fn server_invocation(
        &self,
        _exec: &ExecContext,
        _launch: &LaunchContext,
    ) -> CoreResult<Option<Invocation>> {
        Ok(None)
    }
}

/// Profile implementation for `kind`.
pub fn for_kind(kind: ProfileKind) -> Box<dyn TargetProfile> {
    match kind {
        ProfileKind::FrontendOnly => Box::new(FrontendOnly),
        ProfileKind::JsFullStack => Box::new(JsFullStack),
        ProfileKind::JvmFullStack => Box::new(JvmFullStack),
    }
}

fn full_stack_env_files() -> Vec<(Role, EnvFileSpec)> {
    vec![
        (Role::Frontend, EnvFileSpec::overwrite(".env", FRONTEND_KEYS)),
        (
            Role::Frontend,
            EnvFileSpec::overwrite(".env.development.local", FRONTEND_KEYS),
        ),
        (Role::Server, EnvFileSpec::merge(".env", SERVER_KEYS)),
    ]
}

/// Finish a server invocation: run it in the server repo with the resolved
/// server env.
fn server_process(invocation: Invocation, launch: &LaunchContext) -> Invocation {
    let env = launch.env.select(SERVER_KEYS);
    invocation
        .cwd(launch.repo_dir(Role::Server))
        .tag(Role::Server.tag())
        .envs(env.iter())
}

/// Only a frontend repository.
pub struct FrontendOnly;

#[async_trait]
impl TargetProfile for FrontendOnly {
    fn kind(&self) -> ProfileKind {
        ProfileKind::FrontendOnly
    }

    fn env_files(&self) -> Vec<(Role, EnvFileSpec)> {
        vec![(Role::Frontend, EnvFileSpec::overwrite(".env", FRONTEND_KEYS))]
    }
}

/// Node server with a MySQL database.
pub struct JsFullStack;

#[async_trait]
impl TargetProfile for JsFullStack {
    fn kind(&self) -> ProfileKind {
        ProfileKind::JsFullStack
    }

    fn env_files(&self) -> Vec<(Role, EnvFileSpec)> {
        full_stack_env_files()
    }

    fn uses_database(&self) -> bool {
        true
    }

    async fn install_server(&self, exec: &ExecContext, launch: &LaunchContext) -> CoreResult<()> {
        let dir = launch.repo_dir(Role::Server);
        DependencyInstaller::new(exec)
            .install(Role::Server, &dir, launch.install_command(Role::Server))
            .await?;

        if dir.join("prisma").join("schema.prisma").is_file() {
            info!("Generating Prisma client in {}", dir.display());
            let generate = Invocation::new("npx")
                .args(["prisma", "generate"])
                .cwd(&dir)
                .tag(Role::Server.tag());
            exec.stream(generate)
                .await
                .map_err(|source| CoreError::Install {
                    target: Role::Server,
                    source,
                })?;
        }
        Ok(())
    }

    async fn server_invocation(
        &self,
        exec: &ExecContext,
        launch: &LaunchContext,
    ) -> CoreResult<Option<Invocation>> {
        let invocation = resolve_server_command(
            exec,
            &launch.repo_dir(Role::Server),
            ServerStack::Js,
            launch.start_command(Role::Server),
            launch.package_manager,
        )
        .await?;
        Ok(Some(server_process(invocation, launch)))
    }
}

/// Spring Boot server built with Maven, with a MySQL database.
pub struct JvmFullStack;

#[async_trait]
impl TargetProfile for JvmFullStack {
    fn kind(&self) -> ProfileKind {
        ProfileKind::JvmFullStack
    }

    fn requirements(&self) -> ToolRequirements {
        ToolRequirements {
            jvm: true,
            build_tool: true,
        }
    }

    fn env_files(&self) -> Vec<(Role, EnvFileSpec)> {
        full_stack_env_files()
    }

    fn uses_database(&self) -> bool {
        true
    }

    fn has_build_step(&self) -> bool {
        true
    }

    /// The build step compiles the server; only an explicit install command
    /// runs here.
    async fn install_server(&self, exec: &ExecContext, launch: &LaunchContext) -> CoreResult<()> {
        match launch.install_command(Role::Server) {
            Some(command) if !command.trim().is_empty() => {
                DependencyInstaller::new(exec)
                    .install(Role::Server, &launch.repo_dir(Role::Server), Some(command))
                    .await
            }
            _ => {
                exec.note("install", "Skipping server install, the Maven build resolves dependencies");
                Ok(())
            }
        }
    }

    async fn build_server(&self, exec: &ExecContext, launch: &LaunchContext) -> CoreResult<()> {
        let dir = launch.repo_dir(Role::Server);
        let maven = resolve_maven(exec, &dir).await?;
        let build = Invocation::new(maven)
            .args(["-B", "-e", "clean", "package", "-DskipTests"])
            .cwd(&dir)
            .tag(Role::Server.tag());
        exec.stream(build).await.map_err(|source| CoreError::Build {
            target: Role::Server,
            source,
        })
    }

    async fn server_invocation(
        &self,
        exec: &ExecContext,
        launch: &LaunchContext,
    ) -> CoreResult<Option<Invocation>> {
        let invocation = resolve_server_command(
            exec,
            &launch.repo_dir(Role::Server),
            ServerStack::Jvm,
            launch.start_command(Role::Server),
            launch.package_manager,
        )
        .await?;
        Ok(Some(server_process(invocation, launch)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use crate::config::{FrontendRepo, RepoConfig, ServerRepo};
    use crate::context::RunToken;
    use crate::env::EnvContext;
    use crate::status::StatusHub;
    use crate::tools::JsPackageManager;
    use launchpad_runner::{MockResponse, MockRunner, Platform};
    use uuid::Uuid;

    fn launch(workspace: &Path, kind: ProfileKind, server: ServerRepo) -> LaunchContext {
        let config = RepoConfig::new(FrontendRepo::new("https://example.com/app.git"))
            .with_server(server)
            .profile(kind);
        std::fs::create_dir_all(workspace.join("server")).unwrap();
        LaunchContext {
            run_id: Uuid::new_v4(),
            config,
            profile: kind,
            workspace: workspace.to_path_buf(),
            env: EnvContext::defaults().with("DB_PASSWORD", "pw"),
            package_manager: JsPackageManager::Npm,
        }
    }

    fn exec(mock: &MockRunner) -> ExecContext {
        ExecContext::new(Arc::new(mock.clone()), StatusHub::new(), Platform::Linux, RunToken::detached())
    }

    #[test]
    fn test_env_layouts() {
        let frontend: Vec<_> = FrontendOnly.env_files().into_iter().map(|(r, s)| (r, s.path)).collect();
        assert_eq!(frontend, vec![(Role::Frontend, ".env".into())]);

        let files = JvmFullStack.env_files();
        assert_eq!(files.len(), 3);
        assert_eq!(files[2].0, Role::Server);
        assert_eq!(files[2].1.mode, crate::materialize::WriteMode::Merge);
        assert!(files[1].1.path.ends_with(".env.development.local"));
    }

    #[test]
    fn test_requirements_and_kinds() {
        for kind in [ProfileKind::FrontendOnly, ProfileKind::JsFullStack, ProfileKind::JvmFullStack] {
            assert_eq!(for_kind(kind).kind(), kind);
        }
        assert!(for_kind(ProfileKind::JvmFullStack).requirements().jvm);
        assert!(!for_kind(ProfileKind::JsFullStack).requirements().jvm);
        assert!(!for_kind(ProfileKind::FrontendOnly).uses_database());
    }

    #[tokio::test]
    async fn test_js_install_generates_prisma_client() {
        let dir = tempfile::tempdir().unwrap();
        let launch = launch(dir.path(), ProfileKind::JsFullStack, ServerRepo::new("https://example.com/api.git"));
        let server = launch.repo_dir(Role::Server);
        std::fs::create_dir_all(server.join("prisma")).unwrap();
        std::fs::write(server.join("prisma").join("schema.prisma"), "").unwrap();
        let mock = MockRunner::new();

        JsFullStack.install_server(&exec(&mock), &launch).await.unwrap();

        let lines: Vec<String> = mock.get_calls().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec!["npm install", "npx prisma generate"]);
    }

    #[tokio::test]
    async fn test_js_server_gets_env() {
        let dir = tempfile::tempdir().unwrap();
        let launch = launch(
            dir.path(),
            ProfileKind::JsFullStack,
            ServerRepo::new("https://example.com/api.git").start_command("node index.js"),
        );
        let mock = MockRunner::new();

        let inv = JsFullStack
            .server_invocation(&exec(&mock), &launch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inv.command_line(), "node index.js");
        assert_eq!(inv.tag, "server");
        assert_eq!(inv.env.get("DB_PASSWORD").map(String::as_str), Some("pw"));
        assert_eq!(inv.env.get("SERVER_PORT").map(String::as_str), Some("8080"));
    }

    #[tokio::test]
    async fn test_jvm_skips_install_and_builds() {
        let dir = tempfile::tempdir().unwrap();
        let launch = launch(dir.path(), ProfileKind::JvmFullStack, ServerRepo::new("https://example.com/api.git"));
        let mock = MockRunner::new()
            .respond("mvn -B -e clean package", MockResponse::failure(1, "[ERROR] BUILD FAILURE"));
        let ctx = exec(&mock);

        JvmFullStack.install_server(&ctx, &launch).await.unwrap();
        assert!(!mock.was_called("mvn -B clean install"));

        let err = JvmFullStack.build_server(&ctx, &launch).await.unwrap_err();
        assert!(matches!(err, CoreError::Build { target: Role::Server, .. }));
        assert_eq!(err.error_lines(), &["[ERROR] BUILD FAILURE".to_string()]);

        let inv = JvmFullStack.server_invocation(&ctx, &launch).await.unwrap().unwrap();
        assert_eq!(inv.command_line(), "mvn spring-boot:run");
    }
}
