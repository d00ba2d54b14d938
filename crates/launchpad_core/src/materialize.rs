//! Writing env files into cloned repositories.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::dotenv::DotEnv;
use crate::env::EnvContext;
use crate::error::{CoreError, CoreResult};

/// How an env file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the file.
    Overwrite,
    /// Keep existing keys that are not in the patch.
    Merge,
}

/// One env file inside a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFileSpec {
    /// Path relative to the repository root
    pub path: PathBuf,
    pub keys: Vec<&'static str>,
    pub mode: WriteMode,
}

impl EnvFileSpec {
    pub fn overwrite(path: impl Into<PathBuf>, keys: &[&'static str]) -> Self {
        Self {
            path: path.into(),
            keys: keys.to_vec(),
            mode: WriteMode::Overwrite,
        }
    }

    pub fn merge(path: impl Into<PathBuf>, keys: &[&'static str]) -> Self {
        Self {
            path: path.into(),
            keys: keys.to_vec(),
            mode: WriteMode::Merge,
        }
    }

    /// The values this file receives.
    pub fn values(&self, ctx: &EnvContext) -> DotEnv {
        ctx.select(&self.keys)
    }
}

/// Write every spec under `target_dir`. Returns the written paths.
///
/// Stops at the first file that cannot be written.
pub fn write_env_files(
    target_dir: &Path,
    specs: &[EnvFileSpec],
    ctx: &EnvContext,
) -> CoreResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(specs.len());

    for spec in specs {
        let path = target_dir.join(&spec.path);
        let env_write = |source: std::io::Error| CoreError::EnvWrite {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(env_write)?;
        }

        let patch = spec.values(ctx);
        let content = match spec.mode {
            WriteMode::Overwrite => patch,
            WriteMode::Merge => {
                let mut existing = match std::fs::read_to_string(&path) {
                    Ok(text) => DotEnv::parse(&text),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => DotEnv::new(),
                    Err(e) => return Err(env_write(e)),
                };
                debug!("Merging {} keys into {}", patch.len(), path.display());
                existing.merge(&patch);
                existing
            }
        };

        std::fs::write(&path, content.to_string()).map_err(env_write)?;
        info!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}
