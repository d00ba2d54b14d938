//! Host platform detection and executable search path.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        }
    }

    /// Install locations of common tools that may not be on the inherited PATH
    /// yet, e.g. right after a package manager installed them.
    pub fn extra_search_dirs(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        match self {
            Self::Windows => {
                found.push(PathBuf::from(r"C:\Program Files\Git\cmd"));
                found.push(PathBuf::from(r"C:\Program Files\nodejs"));
                if let Some(roaming) = dirs::data_dir() {
                    found.push(roaming.join("npm"));
                }
                if let Some(local) = dirs::data_local_dir() {
                    found.push(local.join("Microsoft").join("WindowsApps"));
                }
                found.push(PathBuf::from(r"C:\ProgramData\chocolatey\bin"));
                found.push(PathBuf::from(r"C:\Program Files\MySQL\MySQL Server 8.0\bin"));
            }
            Self::MacOs => {
                found.push(PathBuf::from("/opt/homebrew/bin"));
                found.push(PathBuf::from("/opt/homebrew/opt/openjdk/bin"));
                found.push(PathBuf::from("/usr/local/bin"));
                found.push(PathBuf::from("/usr/local/mysql/bin"));
            }
            Self::Linux => {
                found.push(PathBuf::from("/usr/local/bin"));
                if let Some(home) = dirs::home_dir() {
                    found.push(home.join(".local").join("bin"));
                    found.push(home.join(".npm-global").join("bin"));
                    found.push(home.join(".yarn").join("bin"));
                }
            }
        }
        found
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build a PATH value: `prepend`, then `extra`, then the inherited entries.
///
/// Duplicates keep their first position.
pub fn compose_path(prepend: &[PathBuf], extra: &[PathBuf], inherited: Option<&OsStr>) -> OsString {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    let inherited_entries: Vec<PathBuf> = inherited
        .map(|value| std::env::split_paths(value).collect())
        .unwrap_or_default();

    for entry in prepend
        .iter()
        .chain(extra.iter())
        .chain(inherited_entries.iter())
    {
        if entry.as_os_str().is_empty() {
            continue;
        }
        if seen.insert(entry.clone()) {
            entries.push(entry.clone());
        }
    }

    std::env::join_paths(entries)
        .unwrap_or_else(|_| inherited.map(OsStr::to_os_string).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_path_order_and_dedup() {
        let inherited = std::env::join_paths([PathBuf::from("/usr/bin"), PathBuf::from("/bin")]).unwrap();
        let composed = compose_path(
            &[PathBuf::from("/opt/jdk/bin")],
            &[PathBuf::from("/usr/local/bin"), PathBuf::from("/usr/bin")],
            Some(inherited.as_os_str()),
        );
        let entries: Vec<PathBuf> = std::env::split_paths(&composed).collect();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/opt/jdk/bin"),
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
            ]
        );
    }

    #[test]
    fn test_compose_path_without_inherited() {
        let composed = compose_path(&[], &[PathBuf::from("/usr/local/bin")], None);
        assert_eq!(composed, OsString::from("/usr/local/bin"));
    }

    #[test]
    fn test_platform_dirs() {
        assert!(Platform::Windows
            .extra_search_dirs()
            .contains(&PathBuf::from(r"C:\Program Files\nodejs")));
        assert!(Platform::MacOs
            .extra_search_dirs()
            .contains(&PathBuf::from("/opt/homebrew/bin")));
        assert_eq!(Platform::Linux.to_string(), "linux");
    }
}
