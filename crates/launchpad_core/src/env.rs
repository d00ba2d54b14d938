//! Environment value resolution.
//!
//! All configuration values written into the cloned repositories come from an
//! [`EnvContext`] built once per run, never from ambient process state.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::RepoConfig;
use crate::dotenv::DotEnv;
use crate::error::{CoreError, CoreResult};

/// Recognized keys and their fallback values.
pub const DEFAULTS: &[(&str, &str)] = &[
    ("VITE_API_URL", "http://localhost:8080/api"),
    ("VITE_APP_URL", "http://localhost:5173"),
    ("VITE_COOKIE_DOMAIN", "localhost"),
    ("VITE_ENABLE_SIGNUP", "true"),
    ("VITE_ENABLE_ANALYTICS", "false"),
    ("DB_HOST", "127.0.0.1"),
    ("DB_PORT", "3306"),
    ("DB_USER", "root"),
    ("DB_PASSWORD", ""),
    ("DB_NAME", "launchpad"),
    ("SERVER_PORT", "8080"),
    ("CLIENT_URL", "http://localhost:5173"),
    ("COOKIE_DOMAIN", "localhost"),
    ("SESSION_SECRET", "change-me-in-class"),
];

/// Keys written to the frontend's env files.
pub const FRONTEND_KEYS: &[&str] = &[
    "VITE_API_URL",
    "VITE_APP_URL",
    "VITE_COOKIE_DOMAIN",
    "VITE_ENABLE_SIGNUP",
    "VITE_ENABLE_ANALYTICS",
];

/// Keys written to the server's `.env`.
pub const SERVER_KEYS: &[&str] = &[
    "DB_HOST",
    "DB_PORT",
    "DB_USER",
    "DB_PASSWORD",
    "DB_NAME",
    "SERVER_PORT",
    "CLIENT_URL",
    "COOKIE_DOMAIN",
    "SESSION_SECRET",
];

pub fn is_recognized(key: &str) -> bool {
    DEFAULTS.iter().any(|(k, _)| *k == key)
}

/// Resolved values for every recognized key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvContext {
    values: BTreeMap<String, String>,
}

impl Default for EnvContext {
    fn default() -> Self {
        Self::defaults()
    }
}

impl EnvContext {
    pub fn defaults() -> Self {
        Self {
            values: DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Layer the sources, lowest precedence first: defaults, `root_env_file`,
    /// `process_env`, then the run config.
    pub fn resolve<I>(
        root_env_file: Option<&Path>,
        process_env: I,
        config: &RepoConfig,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut ctx = Self::defaults();

        if let Some(path) = root_env_file {
            let file = DotEnv::load(path)?;
            for (key, value) in file.iter() {
                ctx.apply(key, value);
            }
        }

        for (key, value) in process_env {
            ctx.apply(&key, &value);
        }

        if let Some(password) = config.server.as_ref().and_then(|s| s.db_password.as_ref()) {
            ctx.values.insert("DB_PASSWORD".to_string(), password.clone());
        }
        if let Some(url) = &config.frontend.dev_url {
            ctx.values.insert("VITE_APP_URL".to_string(), url.clone());
            ctx.values.insert("CLIENT_URL".to_string(), url.clone());
        }

        Ok(ctx)
    }

    fn apply(&mut self, key: &str, value: &str) {
        if is_recognized(key) {
            self.values.insert(key.to_string(), value.to_string());
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Entries for `keys`, in that order. Unknown keys resolve to empty.
    pub fn select(&self, keys: &[&str]) -> DotEnv {
        keys.iter()
            .map(|key| (key.to_string(), self.get(key).unwrap_or_default().to_string()))
            .collect()
    }

    pub fn db_connection(&self) -> CoreResult<DbConnection> {
        let port_text = self.get("DB_PORT").unwrap_or("3306");
        let port = port_text
            .parse::<u16>()
            .map_err(|_| CoreError::Config(format!("DB_PORT is not a port number: {}", port_text)))?;

        Ok(DbConnection {
            host: self.get("DB_HOST").unwrap_or("127.0.0.1").to_string(),
            port,
            user: self.get("DB_USER").unwrap_or("root").to_string(),
            password: self.get("DB_PASSWORD").unwrap_or_default().to_string(),
            name: self.get("DB_NAME").unwrap_or("launchpad").to_string(),
        })
    }

    /// Where the frontend dev server is expected to listen.
    pub fn app_url(&self) -> &str {
        self.get("VITE_APP_URL").unwrap_or("http://localhost:5173")
    }
}

/// Connection settings for the local database.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("name", &self.name)
            .finish()
    }
}
