//! Per-run repository configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use launchpad_runner::Platform;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::status::Role;

/// Supported target stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    FrontendOnly,
    JsFullStack,
    JvmFullStack,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontendOnly => "frontend-only",
            Self::JsFullStack => "js-full-stack",
            Self::JvmFullStack => "jvm-full-stack",
        }
    }

    pub fn has_server(&self) -> bool {
        !matches!(self, Self::FrontendOnly)
    }
}

impl FromStr for ProfileKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "frontend-only" | "frontend" => Ok(Self::FrontendOnly),
            "js-full-stack" | "js" => Ok(Self::JsFullStack),
            "jvm-full-stack" | "jvm" => Ok(Self::JvmFullStack),
            other => Err(CoreError::Config(format!("Unknown profile: {}", other))),
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_server_dir() -> String {
    Role::Server.tag().to_string()
}

fn default_frontend_dir() -> String {
    Role::Frontend.tag().to_string()
}

/// Server repository settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRepo {
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub start_command: Option<String>,
    #[serde(default)]
    pub install_command: Option<String>,
    #[serde(default = "default_server_dir")]
    pub dir_name: String,
    #[serde(default)]
    pub db_password: Option<String>,
}

impl ServerRepo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: None,
            start_command: None,
            install_command: None,
            dir_name: default_server_dir(),
            db_password: None,
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn start_command(mut self, command: impl Into<String>) -> Self {
        self.start_command = Some(command.into());
        self
    }

    pub fn install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = Some(command.into());
        self
    }

    pub fn db_password(mut self, password: impl Into<String>) -> Self {
        self.db_password = Some(password.into());
        self
    }
}

/// Frontend repository settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendRepo {
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub start_command: Option<String>,
    #[serde(default)]
    pub install_command: Option<String>,
    #[serde(default = "default_frontend_dir")]
    pub dir_name: String,
    /// URL the dev server is reachable at
    #[serde(default)]
    pub dev_url: Option<String>,
}

impl FrontendRepo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: None,
            start_command: None,
            install_command: None,
            dir_name: default_frontend_dir(),
            dev_url: None,
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn start_command(mut self, command: impl Into<String>) -> Self {
        self.start_command = Some(command.into());
        self
    }

    pub fn install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = Some(command.into());
        self
    }

    pub fn dev_url(mut self, url: impl Into<String>) -> Self {
        self.dev_url = Some(url.into());
        self
    }
}

/// Everything `start` needs to know about the repositories to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub server: Option<ServerRepo>,
    pub frontend: FrontendRepo,
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
    #[serde(default)]
    pub profile: Option<ProfileKind>,
}

impl RepoConfig {
    pub fn new(frontend: FrontendRepo) -> Self {
        Self {
            server: None,
            frontend,
            workspace_dir: None,
            profile: None,
        }
    }

    pub fn with_server(mut self, server: ServerRepo) -> Self {
        self.server = Some(server);
        self
    }

    pub fn workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }

    pub fn profile(mut self, profile: ProfileKind) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "toml" => toml::from_str(&content)
                .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e))),
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e))),
            "json" => Ok(serde_json::from_str(&content)?),
            _ => Err(CoreError::Config(format!(
                "Unsupported config format: {} (expected .toml, .yaml or .yml)",
                path.display()
            ))),
        }
    }

    /// Explicit profile, or inferred from whether a server is configured.
    pub fn resolved_profile(&self) -> ProfileKind {
        match (self.profile, &self.server) {
            (Some(profile), _) => profile,
            (None, Some(_)) => ProfileKind::JsFullStack,
            (None, None) => ProfileKind::FrontendOnly,
        }
    }

    pub fn resolve_workspace(&self, platform: Platform) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(|| default_workspace_dir(platform))
    }

    pub fn dir_name(&self, role: Role) -> &str {
        match role {
            Role::Server => self
                .server
                .as_ref()
                .map(|s| s.dir_name.as_str())
                .unwrap_or("server"),
            Role::Frontend => &self.frontend.dir_name,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        check_url("frontend", &self.frontend.url)?;
        check_dir_name(&self.frontend.dir_name)?;

        let profile = self.resolved_profile();
        match (&self.server, profile.has_server()) {
            (Some(server), _) => {
                check_url("server", &server.url)?;
                check_dir_name(&server.dir_name)?;
                if server.dir_name == self.frontend.dir_name {
                    return Err(CoreError::Config(format!(
                        "Server and frontend cannot share the directory `{}`",
                        server.dir_name
                    )));
                }
            }
            (None, true) => {
                return Err(CoreError::Config(format!(
                    "Profile {} needs a server repository",
                    profile
                )));
            }
            (None, false) => {}
        }
        Ok(())
    }
}

fn check_url(what: &str, url: &str) -> CoreResult<()> {
    if url.trim().is_empty() {
        return Err(CoreError::Config(format!("The {} repository URL is empty", what)));
    }
    Ok(())
}

fn check_dir_name(name: &str) -> CoreResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\']);
    if !valid {
        return Err(CoreError::Config(format!("Invalid directory name: `{}`", name)));
    }
    Ok(())
}

/// Default workspace root: a fixed path on Windows, the user data dir elsewhere.
pub fn default_workspace_dir(platform: Platform) -> PathBuf {
    if platform.is_windows() {
        return PathBuf::from(r"C:\Launchpad");
    }
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("launchpad")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_inference() {
        let frontend_only = RepoConfig::new(FrontendRepo::new("https://example.com/app.git"));
        assert_eq!(frontend_only.resolved_profile(), ProfileKind::FrontendOnly);

        let full = frontend_only
            .clone()
            .with_server(ServerRepo::new("https://example.com/api.git"));
        assert_eq!(full.resolved_profile(), ProfileKind::JsFullStack);
        assert_eq!(
            full.profile(ProfileKind::JvmFullStack).resolved_profile(),
            ProfileKind::JvmFullStack
        );
    }

    #[test]
    fn test_validate() {
        let ok = RepoConfig::new(FrontendRepo::new("https://example.com/app.git"));
        assert!(ok.validate().is_ok());

        let missing_server = ok.clone().profile(ProfileKind::JvmFullStack);
        assert!(matches!(missing_server.validate(), Err(CoreError::Config(_))));

        let mut clash = ok.clone().with_server(ServerRepo::new("https://example.com/api.git"));
        if let Some(server) = clash.server.as_mut() {
            server.dir_name = "frontend".into();
        }
        assert!(clash.validate().is_err());

        let empty = RepoConfig::new(FrontendRepo::new("  "));
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_load_toml_and_yaml() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("launch.toml");
        std::fs::write(
            &toml_path,
            r#"
profile = "jvm-full-stack"

[frontend]
url = "https://example.com/app.git"
branch = "main"

[server]
url = "https://example.com/api.git"
db_password = "secret"
"#,
        )
        .unwrap();
        let config = RepoConfig::load(&toml_path).unwrap();
        assert_eq!(config.resolved_profile(), ProfileKind::JvmFullStack);
        assert_eq!(config.frontend.dir_name, "frontend");
        assert_eq!(config.server.as_ref().unwrap().dir_name, "server");
        assert_eq!(config.server.unwrap().db_password.as_deref(), Some("secret"));

        let yaml_path = dir.path().join("launch.yaml");
        std::fs::write(
            &yaml_path,
            "frontend:\n  url: https://example.com/app.git\n  dev_url: http://localhost:3000\n",
        )
        .unwrap();
        let config = RepoConfig::load(&yaml_path).unwrap();
        assert_eq!(config.frontend.dev_url.as_deref(), Some("http://localhost:3000"));
        assert!(config.server.is_none());

        let bad = dir.path().join("launch.ini");
        std::fs::write(&bad, "").unwrap();
        assert!(RepoConfig::load(&bad).is_err());
    }

    #[test]
    fn test_default_workspace() {
        assert_eq!(
            default_workspace_dir(Platform::Windows),
            PathBuf::from(r"C:\Launchpad")
        );
        assert!(default_workspace_dir(Platform::Linux).ends_with("launchpad"));
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("JVM-FULL-STACK".parse::<ProfileKind>().unwrap(), ProfileKind::JvmFullStack);
        assert!("rails".parse::<ProfileKind>().is_err());
    }
}
