//! Local MySQL provisioning.
//!
//! Engine installation and service start are best effort. Only a missing
//! client binary stops the launch.

use std::time::Duration;

use launchpad_runner::Invocation;
use regex::Regex;
use tracing::{debug, warn};

use crate::context::ExecContext;
use crate::env::DbConnection;
use crate::error::{CoreError, CoreResult};
use crate::remediation::{classify, Remediation};

const TAG: &str = "db";
const SERVICE_NAME: &str = "MySQL80";

/// Bounded wait for a freshly started database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

impl ReadinessPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl DbConnection {
    /// Idempotent schema creation statement.
    pub fn create_statement(&self) -> CoreResult<String> {
        let valid = Regex::new(r"^[A-Za-z0-9_]+$")
            .map(|re| re.is_match(&self.name))
            .unwrap_or(false);
        if !valid {
            return Err(CoreError::Config(format!(
                "Database name `{}` may only contain letters, digits and underscores",
                self.name
            )));
        }
        Ok(format!("CREATE DATABASE IF NOT EXISTS `{}`", self.name))
    }

    /// Client invocation over TCP; the password travels in `MYSQL_PWD`.
    fn client(&self, program: &str) -> Invocation {
        let mut invocation = Invocation::new(program)
            .arg("--protocol=TCP")
            .args(["-h", &self.host])
            .args(["-P", &self.port.to_string()])
            .args(["-u", &self.user])
            .tag(TAG);
        if !self.password.is_empty() {
            invocation = invocation.env("MYSQL_PWD", self.password.clone());
        }
        invocation
    }
}

/// Makes sure the database engine runs and the schema exists.
pub struct DatabaseProvisioner<'a> {
    exec: &'a ExecContext,
    readiness: ReadinessPolicy,
}

impl<'a> DatabaseProvisioner<'a> {
    pub fn new(exec: &'a ExecContext) -> Self {
        Self {
            exec,
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Install and start MySQL on Windows. Never fails the launch.
    pub async fn ensure_engine_installed(&self, conn: &DbConnection) {
        if !self.exec.platform().is_windows() {
            debug!("Skipping database engine install on {}", self.exec.platform());
            return;
        }

        match self.exec.probe("mysql", &["--version"]).await {
            Some(version) => self.exec.note(TAG, format!("mysql: {}", version)),
            None => self.install_engine().await,
        }

        match self.exec.elevated("net", &["start", SERVICE_NAME]).await {
            Ok(0) => self.exec.note(TAG, format!("Started service {}", SERVICE_NAME)),
            // net start exits with 2 when the service is already running.
            Ok(2) => self.exec.note(TAG, format!("Service {} is already running", SERVICE_NAME)),
            Ok(code) => self.exec.note(
                TAG,
                format!("Could not start {} (exit code {}), continuing", SERVICE_NAME, code),
            ),
            Err(e) => self
                .exec
                .note(TAG, format!("Could not start {}: {}, continuing", SERVICE_NAME, e)),
        }

        if !self.wait_ready(conn).await {
            self.exec.note(
                TAG,
                format!(
                    "MySQL did not answer after {} attempts, continuing",
                    self.readiness.attempts
                ),
            );
        }
    }

    async fn install_engine(&self) {
        self.exec.note(TAG, "mysql: not found, installing MySQL with winget");
        let winget = self
            .exec
            .elevated(
                "winget",
                &[
                    "install",
                    "--id",
                    "Oracle.MySQL",
                    "-e",
                    "--silent",
                    "--accept-package-agreements",
                    "--accept-source-agreements",
                ],
            )
            .await;
        if matches!(winget, Ok(0)) {
            return;
        }
        warn!("winget could not install MySQL: {:?}", winget);

        self.exec.note(TAG, "Installing MySQL with Chocolatey");
        match self.exec.elevated("choco", &["install", "mysql", "-y"]).await {
            Ok(0) => {}
            other => {
                warn!("choco could not install MySQL: {:?}", other);
                self.exec
                    .note(TAG, "Automatic MySQL install failed, continuing without it");
            }
        }
    }

    /// Ping until the server answers or the attempts run out.
    pub async fn wait_ready(&self, conn: &DbConnection) -> bool {
        for attempt in 1..=self.readiness.attempts {
            let ping = conn.client("mysqladmin").arg("ping");
            match self.exec.capture(ping).await {
                Ok(output) if output.success() => {
                    self.exec.note(TAG, "MySQL is accepting connections");
                    return true;
                }
                Ok(_) => debug!("MySQL not ready (attempt {})", attempt),
                Err(e) => debug!("mysqladmin failed (attempt {}): {}", attempt, e),
            }
            if attempt < self.readiness.attempts {
                tokio::time::sleep(self.readiness.delay).await;
            }
        }
        false
    }

    /// Create the schema if needed.
    ///
    /// A missing `mysql` client is fatal. Any other failure is logged together
    /// with a matching recipe, which is returned, and the launch continues.
    pub async fn ensure_database(&self, conn: &DbConnection) -> CoreResult<Option<Remediation>> {
        let statement = conn.create_statement()?;
        let invocation = conn.client("mysql").args(["-e", statement.as_str()]);

        match self.exec.stream(invocation).await {
            Ok(()) => {
                self.exec
                    .note(TAG, format!("Database `{}` is ready", conn.name));
                Ok(None)
            }
            Err(e) if e.is_not_found() => Err(CoreError::Database(
                "The `mysql` command was not found. Install the MySQL client and add its bin \
                 directory (for example C:\\Program Files\\MySQL\\MySQL Server 8.0\\bin) to PATH, \
                 then restart Launchpad."
                    .to_string(),
            )),
            Err(e) => {
                warn!("Schema creation failed: {}", e);
                self.exec.note(
                    TAG,
                    format!("Could not create database `{}`: {}, continuing", conn.name, e),
                );
                let remediation = classify(&e.to_string(), e.error_lines());
                if let Some(hint) = &remediation {
                    self.exec.hint(hint);
                }
                Ok(remediation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::context::RunToken;
    use crate::env::EnvContext;
    use crate::remediation::RemediationCategory;
    use crate::status::StatusHub;
    use launchpad_runner::{MockResponse, MockRunner, Platform};

    fn exec(mock: &MockRunner, platform: Platform) -> ExecContext {
        ExecContext::new(Arc::new(mock.clone()), StatusHub::new(), platform, RunToken::detached())
    }

    fn conn() -> DbConnection {
        EnvContext::defaults()
            .with("DB_PASSWORD", "s3cret")
            .db_connection()
            .unwrap()
    }

    fn quick() -> ReadinessPolicy {
        ReadinessPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_create_statement_validates_name() {
        assert_eq!(
            conn().create_statement().unwrap(),
            "CREATE DATABASE IF NOT EXISTS `launchpad`"
        );
        let mut bad = conn();
        bad.name = "x`; DROP DATABASE y".into();
        assert!(bad.create_statement().is_err());
    }

    #[tokio::test]
    async fn test_schema_uses_tcp_and_env_password() {
        let mock = MockRunner::new();
        let ctx = exec(&mock, Platform::Linux);

        DatabaseProvisioner::new(&ctx)
            .ensure_database(&conn())
            .await
            .unwrap();

        let call = &mock.calls_matching("mysql --protocol=TCP")[0];
        assert_eq!(
            call.args,
            vec![
                "--protocol=TCP",
                "-h",
                "127.0.0.1",
                "-P",
                "3306",
                "-u",
                "root",
                "-e",
                "CREATE DATABASE IF NOT EXISTS `launchpad`"
            ]
        );
        assert_eq!(call.env.get("MYSQL_PWD"), Some(&"s3cret".to_string()));
        assert!(!call.args.iter().any(|a| a.contains("s3cret")));
    }

    #[tokio::test]
    async fn test_missing_client_is_fatal() {
        let mock = MockRunner::new().respond("mysql", MockResponse::not_found());
        let ctx = exec(&mock, Platform::Linux);

        let err = DatabaseProvisioner::new(&ctx)
            .ensure_database(&conn())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, CoreError::Database(_)));
        assert!(message.contains("`mysql`"));
        assert!(message.contains("PATH"));
    }

    #[tokio::test]
    async fn test_other_failures_are_soft() {
        let mock = MockRunner::new().respond(
            "mysql",
            MockResponse::failure(1, "ERROR 1045 (28000): Access denied for user 'root'@'localhost'"),
        );
        let ctx = exec(&mock, Platform::Linux);

        let remediation = DatabaseProvisioner::new(&ctx)
            .ensure_database(&conn())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(remediation.category, RemediationCategory::DatabaseAuth);

        let logs = ctx.hub().snapshot().logs;
        assert!(logs.iter().any(|l| l.starts_with("[db] Could not create database")));
        assert!(logs.contains(&"[hint] The database rejected the credentials".to_string()));
    }

    #[tokio::test]
    async fn test_engine_install_skipped_off_windows() {
        let mock = MockRunner::new();
        let ctx = exec(&mock, Platform::MacOs);
        DatabaseProvisioner::new(&ctx).ensure_engine_installed(&conn()).await;
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_windows_engine_install_sequence() {
        let mock = MockRunner::new()
            .respond("mysql --version", MockResponse::not_found())
            .respond("winget", MockResponse::failure(1, ""))
            .respond("choco", MockResponse::failure(1, ""))
            .respond("net start", MockResponse::failure(2, ""))
            .respond("mysqladmin", MockResponse::failure(1, "connect failed"));
        let ctx = exec(&mock, Platform::Windows);

        DatabaseProvisioner::new(&ctx)
            .readiness(quick())
            .ensure_engine_installed(&conn())
            .await;

        let elevated: Vec<String> = mock
            .get_method_calls("run_elevated")
            .iter()
            .map(|c| c.line())
            .collect();
        assert!(elevated[0].starts_with("winget install --id Oracle.MySQL"));
        assert_eq!(elevated[1], "choco install mysql -y");
        assert_eq!(elevated[2], "net start MySQL80");
        assert_eq!(mock.calls_matching("mysqladmin").len(), 3);
    }

    #[tokio::test]
    async fn test_wait_ready_stops_on_first_pong() {
        let mock = MockRunner::new()
            .respond_once("mysqladmin", MockResponse::failure(1, ""))
            .respond("mysqladmin", MockResponse::success().with_stdout("mysqld is alive"));
        let ctx = exec(&mock, Platform::Windows);

        let ready = DatabaseProvisioner::new(&ctx)
            .readiness(quick())
            .wait_ready(&conn())
            .await;
        assert!(ready);
        assert_eq!(mock.calls_matching("mysqladmin").len(), 2);
    }
}
