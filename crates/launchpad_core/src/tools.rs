//! Tool availability checks and best-effort installation.

use std::fmt;
use std::path::{Path, PathBuf};

use launchpad_runner::{Invocation, Platform};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::ExecContext;
use crate::error::{CoreError, CoreResult};

const TAG: &str = "tools";

/// JavaScript package managers the launcher knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsPackageManager {
    #[default]
    Npm,
    Yarn,
    Pnpm,
}

impl JsPackageManager {
    pub fn program(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }

    /// Detect from the lockfile in `dir`; npm when there is none.
    pub fn detect(dir: &Path) -> Self {
        if dir.join("pnpm-lock.yaml").is_file() {
            Self::Pnpm
        } else if dir.join("yarn.lock").is_file() {
            Self::Yarn
        } else {
            Self::Npm
        }
    }
}

impl fmt::Display for JsPackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program())
    }
}

/// Which checks a profile needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolRequirements {
    /// A JVM runtime is required
    pub jvm: bool,
    /// Maven is wanted (missing only warns)
    pub build_tool: bool,
}

/// Outcome of a successful check.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolReport {
    pub git: String,
    pub node: String,
    pub package_manager: Option<JsPackageManager>,
    pub java: Option<String>,
    pub java_home: Option<PathBuf>,
    pub maven: Option<String>,
}

/// Installation hints for a required tool.
#[derive(Debug, Clone, Copy)]
struct ToolSpec {
    name: &'static str,
    winget_id: &'static str,
    choco_id: &'static str,
    url: &'static str,
    hint: &'static str,
}

const GIT: ToolSpec = ToolSpec {
    name: "git",
    winget_id: "Git.Git",
    choco_id: "git",
    url: "https://git-scm.com/downloads",
    hint: "Install Git and make sure `git` is on your PATH.",
};

const NODE: ToolSpec = ToolSpec {
    name: "node",
    winget_id: "OpenJS.NodeJS.LTS",
    choco_id: "nodejs-lts",
    url: "https://nodejs.org/en/download",
    hint: "Install the Node.js LTS release, which includes npm.",
};

const JAVA: ToolSpec = ToolSpec {
    name: "java",
    winget_id: "EclipseAdoptium.Temurin.21.JDK",
    choco_id: "temurin21",
    url: "https://adoptium.net/temurin/releases/",
    hint: "Install a JDK (21 or newer) and set JAVA_HOME.",
};

/// Checks the host for the tools a launch needs.
pub struct ToolProber<'a> {
    exec: &'a ExecContext,
}

impl<'a> ToolProber<'a> {
    pub fn new(exec: &'a ExecContext) -> Self {
        Self { exec }
    }

    /// Check git, Node with a package manager, then the JVM tools when
    /// required. Stops at the first required tool that cannot be provided.
    pub async fn ensure_tools(&self, requirements: &ToolRequirements) -> CoreResult<ToolReport> {
        let mut report = ToolReport {
            git: self.ensure(GIT, &["--version"]).await?,
            ..ToolReport::default()
        };

        report.node = self.ensure(NODE, &["--version"]).await?;
        report.package_manager = Some(self.ensure_package_manager().await);

        if requirements.jvm {
            let (version, home) = self.ensure_java().await?;
            report.java = Some(version);
            report.java_home = home;
        }

        if requirements.build_tool {
            report.maven = self.exec.probe("mvn", &["-v"]).await;
            match &report.maven {
                Some(version) => self.exec.note(TAG, format!("maven: {}", version)),
                None => {
                    warn!("Maven not found on PATH");
                    self.exec
                        .note(TAG, "maven: not found, the project's wrapper will be used if present");
                }
            }
        }

        Ok(report)
    }

    async fn ensure(&self, spec: ToolSpec, args: &[&str]) -> CoreResult<String> {
        if let Some(version) = self.exec.probe(spec.name, args).await {
            self.exec.note(TAG, format!("{}: {}", spec.name, version));
            return Ok(version);
        }

        self.exec.note(TAG, format!("{}: not found", spec.name));
        self.install(spec).await?;

        match self.exec.probe(spec.name, args).await {
            Some(version) => {
                self.exec.note(TAG, format!("{}: {} (installed)", spec.name, version));
                Ok(version)
            }
            None => Err(CoreError::tool_missing(
                spec.name,
                format!("{} was installed but is not reachable yet. Restart Launchpad.", spec.name),
                Some(spec.url),
            )),
        }
    }

    /// Silent install through winget, then Chocolatey. Windows only.
    async fn install(&self, spec: ToolSpec) -> CoreResult<()> {
        if !self.exec.platform().is_windows() {
            return Err(CoreError::tool_missing(spec.name, spec.hint, Some(spec.url)));
        }

        self.exec.note(TAG, format!("Installing {} with winget", spec.name));
        let winget = self
            .exec
            .elevated(
                "winget",
                &[
                    "install",
                    "--id",
                    spec.winget_id,
                    "-e",
                    "--silent",
                    "--accept-package-agreements",
                    "--accept-source-agreements",
                ],
            )
            .await;
        match winget {
            Ok(0) => return Ok(()),
            Ok(code) => self.exec.note(TAG, format!("winget exited with code {}", code)),
            Err(e) => self.exec.note(TAG, format!("winget unavailable: {}", e)),
        }

        self.exec.note(TAG, format!("Installing {} with Chocolatey", spec.name));
        match self
            .exec
            .elevated("choco", &["install", spec.choco_id, "-y"])
            .await
        {
            Ok(0) => Ok(()),
            Ok(code) => {
                self.exec.note(TAG, format!("choco exited with code {}", code));
                Err(CoreError::tool_missing(spec.name, spec.hint, Some(spec.url)))
            }
            Err(e) => {
                self.exec.note(TAG, format!("choco unavailable: {}", e));
                Err(CoreError::tool_missing(spec.name, spec.hint, Some(spec.url)))
            }
        }
    }

    /// Prefer yarn; try a global install through npm, else settle for npm.
    async fn ensure_package_manager(&self) -> JsPackageManager {
        if let Some(version) = self.exec.probe("yarn", &["--version"]).await {
            self.exec.note(TAG, format!("yarn: {}", version));
            return JsPackageManager::Yarn;
        }

        self.exec.note(TAG, "yarn: not found, installing it globally with npm");
        let install = Invocation::new("npm").args(["install", "-g", "yarn"]).tag(TAG);
        match self.exec.stream(install).await {
            Ok(()) => {
                self.exec.note(TAG, "yarn: installed");
                JsPackageManager::Yarn
            }
            Err(e) => {
                warn!("Global yarn install failed: {}", e);
                self.exec
                    .note(TAG, format!("yarn could not be installed ({}), falling back to npm", e));
                JsPackageManager::Npm
            }
        }
    }

    async fn ensure_java(&self) -> CoreResult<(String, Option<PathBuf>)> {
        if let Some(version) = self.exec.probe("java", &["-version"]).await {
            self.exec.note(TAG, format!("java: {}", version));
            return Ok((version, None));
        }

        if let Some(home) = self.discover_java().await {
            self.exec.set_java_home(&home);
            if let Some(version) = self.exec.probe("java", &["-version"]).await {
                self.exec
                    .note(TAG, format!("java: {} (found at {})", version, home.display()));
                return Ok((version, Some(home)));
            }
        }

        self.exec.note(TAG, "java: not found");
        self.install(JAVA).await?;

        // A fresh install is not on the inherited PATH yet.
        let home = self.discover_java().await;
        if let Some(home) = &home {
            self.exec.set_java_home(home);
        }
        match self.exec.probe("java", &["-version"]).await {
            Some(version) => {
                self.exec.note(TAG, format!("java: {} (installed)", version));
                Ok((version, home))
            }
            None => Err(CoreError::tool_missing("java", JAVA.hint, Some(JAVA.url))),
        }
    }

    /// Look for a JVM on disk. Returns its installation root.
    pub async fn discover_java(&self) -> Option<PathBuf> {
        let platform = self.exec.platform();
        let search = match platform {
            Platform::Windows => {
                Invocation::new("where").args(["/R", r"C:\Program Files", "java.exe"])
            }
            Platform::MacOs => Invocation::new("/usr/libexec/java_home"),
            Platform::Linux => Invocation::new("find").args([
                "/usr/lib/jvm",
                "-maxdepth",
                "3",
                "-path",
                "*/bin/java",
            ]),
        };

        match self.exec.capture(search).await {
            Ok(output) if output.success() => java_home_from_search(platform, &output.stdout),
            Ok(_) => None,
            Err(e) => {
                debug!("JVM search failed: {}", e);
                None
            }
        }
    }
}

/// Installation root from the output of the platform JVM search.
pub fn java_home_from_search(platform: Platform, output: &str) -> Option<PathBuf> {
    let first = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    let path = PathBuf::from(first);
    match platform {
        Platform::MacOs => Some(path),
        // <root>/bin/java[.exe]
        Platform::Windows | Platform::Linux => path.parent()?.parent().map(Path::to_path_buf),
    }
}
