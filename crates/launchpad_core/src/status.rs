//! Shared launch status and its broadcast hub.
//!
//! [`LaunchStatus`] is the single record the UI renders. Every mutation goes
//! through [`StatusHub`], which publishes a full snapshot to subscribers.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::RunToken;

/// Snapshots buffered per subscriber. A subscriber that falls further behind
/// skips ahead to the newest snapshot.
const CHANNEL_CAPACITY: usize = 1024;

/// Overall workflow phase. Ordering follows the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    #[default]
    Idle,
    CheckingTools,
    Preparing,
    Cloning,
    Installing,
    Building,
    Starting,
    Running,
    Error,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingTools => "checking-tools",
            Self::Preparing => "preparing",
            Self::Cloning => "cloning",
            Self::Installing => "installing",
            Self::Building => "building",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-target phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetStep {
    #[default]
    Idle,
    Preparing,
    Cloning,
    Installing,
    Building,
    Starting,
    Running,
    Error,
}

/// A managed repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Frontend,
}

impl Role {
    /// Tag used on relayed output lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Frontend => "frontend",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStatus {
    pub step: TargetStep,
    pub message: Option<String>,
}

/// Snapshot of the launcher state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchStatus {
    pub step: Step,
    pub message: Option<String>,
    pub logs: Vec<String>,
    pub server_pid: Option<u32>,
    pub frontend_pid: Option<u32>,
    pub server: SubStatus,
    pub client: SubStatus,
    pub run_id: Option<Uuid>,
}

impl LaunchStatus {
    pub fn target(&self, role: Role) -> &SubStatus {
        match role {
            Role::Server => &self.server,
            Role::Frontend => &self.client,
        }
    }

    fn target_mut(&mut self, role: Role) -> &mut SubStatus {
        match role {
            Role::Server => &mut self.server,
            Role::Frontend => &mut self.client,
        }
    }

    pub fn pid(&self, role: Role) -> Option<u32> {
        match role {
            Role::Server => self.server_pid,
            Role::Frontend => self.frontend_pid,
        }
    }
}

struct HubInner {
    status: Mutex<LaunchStatus>,
    tx: broadcast::Sender<LaunchStatus>,
}

/// Serializes status mutations and broadcasts a snapshot after each one.
///
/// Snapshots are sent while the lock is held, so subscribers observe them in
/// mutation order.
#[derive(Clone)]
pub struct StatusHub {
    inner: Arc<HubInner>,
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(HubInner {
                status: Mutex::new(LaunchStatus::default()),
                tx,
            }),
        }
    }

    /// Current status.
    pub fn snapshot(&self) -> LaunchStatus {
        self.inner.status.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LaunchStatus> {
        self.inner.tx.subscribe()
    }

    /// Forward snapshots to `callback` on a background task.
    ///
    /// Every snapshot is complete, so a callback that falls more than
    /// [`CHANNEL_CAPACITY`] snapshots behind misses the intermediate ones and
    /// continues with the newest. Must be called from within a Tokio runtime.
    /// Dropping the returned [`Subscription`] stops delivery.
    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(LaunchStatus) + Send + Sync + 'static,
    {
        let mut rx = self.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(status) => callback(status),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Status subscriber lagged, skipped {} snapshots", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription {
            handle: Some(handle),
        }
    }

    fn mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut LaunchStatus) -> bool,
    {
        let mut status = self.inner.status.lock();
        let changed = f(&mut status);
        if changed {
            // No receivers is fine.
            let _ = self.inner.tx.send(status.clone());
        }
        changed
    }

    /// Apply `f` only while `token` is current. The check runs under the
    /// status lock, so nothing from an abandoned run lands after a reset.
    fn mutate_for<F>(&self, token: &RunToken, f: F) -> bool
    where
        F: FnOnce(&mut LaunchStatus) -> bool,
    {
        self.mutate(|status| token.is_current() && f(status))
    }

    /// Move to `step`. Refuses to go backwards; `Error` is always allowed and
    /// only a new run leaves it.
    pub fn advance(&self, step: Step, message: impl Into<String>) -> bool {
        let message = message.into();
        self.mutate(|status| move_to(status, step, message))
    }

    /// [`advance`](Self::advance) on behalf of the run holding `token`.
    pub fn advance_for(&self, token: &RunToken, step: Step, message: impl Into<String>) -> bool {
        let message = message.into();
        self.mutate_for(token, |status| move_to(status, step, message))
    }

    pub fn append_log(&self, line: impl Into<String>) {
        let line = line.into();
        self.mutate(|status| {
            status.logs.push(line);
            true
        });
    }

    pub fn append_logs<I>(&self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        let lines: Vec<String> = lines.into_iter().collect();
        if lines.is_empty() {
            return;
        }
        self.mutate(|status| {
            status.logs.extend(lines);
            true
        });
    }

    /// Append a line unless the run holding `token` was abandoned.
    pub fn append_log_for(&self, token: &RunToken, line: impl Into<String>) {
        let line = line.into();
        self.mutate_for(token, |status| {
            status.logs.push(line);
            true
        });
    }

    pub fn append_logs_for<I>(&self, token: &RunToken, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        let lines: Vec<String> = lines.into_iter().collect();
        if lines.is_empty() {
            return;
        }
        self.mutate_for(token, |status| {
            status.logs.extend(lines);
            true
        });
    }

    /// Update a sub-status unless the run holding `token` was abandoned.
    pub fn set_target_for(
        &self,
        token: &RunToken,
        role: Role,
        step: TargetStep,
        message: Option<String>,
    ) -> bool {
        self.mutate_for(token, |status| {
            let target = status.target_mut(role);
            target.step = step;
            target.message = message;
            true
        })
    }

    pub fn set_target(&self, role: Role, step: TargetStep, message: Option<String>) {
        self.mutate(|status| {
            let target = status.target_mut(role);
            target.step = step;
            target.message = message;
            true
        });
    }

    pub fn set_pid(&self, role: Role, pid: Option<u32>) {
        self.mutate(|status| {
            match role {
                Role::Server => status.server_pid = pid,
                Role::Frontend => status.frontend_pid = pid,
            }
            true
        });
    }

    /// Fresh `idle` status tagged with a new run id.
    pub fn begin_run(&self, run_id: Uuid) {
        self.mutate(|status| {
            *status = LaunchStatus {
                run_id: Some(run_id),
                ..LaunchStatus::default()
            };
            true
        });
    }

    /// Back to a fresh `idle` status with no logs.
    pub fn reset(&self) {
        self.mutate(|status| {
            *status = LaunchStatus::default();
            true
        });
    }
}

fn move_to(status: &mut LaunchStatus, step: Step, message: String) -> bool {
    let allowed = step == Step::Error || (status.step != Step::Error && step >= status.step);
    if !allowed {
        debug!("Ignoring step change {} -> {}", status.step, step);
        return false;
    }
    status.step = step;
    status.message = Some(message);
    true
}

/// Handle for a status callback registered with [`StatusHub::on_update`].
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_serialization() {
        assert_eq!(serde_json::to_string(&Step::CheckingTools).unwrap(), "\"checking-tools\"");
        assert!(Step::Cloning < Step::Installing);
        assert!(Step::Running < Step::Error);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = LaunchStatus {
            frontend_pid: Some(42),
            ..LaunchStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["frontendPid"], 42);
        assert_eq!(json["client"]["step"], "idle");
        assert!(json["serverPid"].is_null());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let hub = StatusHub::new();
        assert!(hub.advance(Step::Cloning, "cloning"));
        assert!(hub.advance(Step::Cloning, "still cloning"));
        assert!(!hub.advance(Step::Preparing, "back"));
        assert_eq!(hub.snapshot().step, Step::Cloning);

        hub.advance(Step::Error, "boom");
        assert!(!hub.advance(Step::Running, "after error"));
        assert_eq!(hub.snapshot().step, Step::Error);
        assert_eq!(hub.snapshot().message.as_deref(), Some("boom"));

        hub.begin_run(Uuid::new_v4());
        assert!(hub.advance(Step::CheckingTools, "again"));
    }

    #[test]
    fn test_snapshots_follow_mutation_order() {
        let hub = StatusHub::new();
        let mut rx = hub.subscribe();

        hub.append_log("[exec] $ git pull");
        hub.set_pid(Role::Frontend, Some(7));
        hub.set_target(Role::Frontend, TargetStep::Running, None);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.logs.len(), 1);
        assert_eq!(first.frontend_pid, None);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.frontend_pid, Some(7));
        let third = rx.try_recv().unwrap();
        assert_eq!(third.client.step, TargetStep::Running);
    }

    #[test]
    fn test_reset_clears_logs() {
        let hub = StatusHub::new();
        hub.append_log("line");
        hub.advance(Step::Running, "up");
        hub.reset();
        assert_eq!(hub.snapshot(), LaunchStatus::default());
    }

    #[test]
    fn test_abandoned_run_cannot_write_after_reset() {
        let hub = StatusHub::new();
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let token = RunToken::new(counter.clone());

        assert!(hub.advance_for(&token, Step::Installing, "installing"));
        hub.append_log_for(&token, "[frontend] added 12 packages");
        assert_eq!(hub.snapshot().logs.len(), 1);

        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        hub.reset();

        assert!(!hub.advance_for(&token, Step::Starting, "starting"));
        assert!(!hub.set_target_for(&token, Role::Server, TargetStep::Running, None));
        hub.append_log_for(&token, "late line");
        hub.append_logs_for(&token, vec!["[hint] late".to_string()]);
        assert_eq!(hub.snapshot(), LaunchStatus::default());
    }

    #[tokio::test]
    async fn test_on_update_delivers_until_dropped() {
        let hub = StatusHub::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let subscription = hub.on_update(move |status| {
            let _ = tx.send(status.logs.len());
        });

        hub.append_log("one");
        assert_eq!(rx.recv().await, Some(1));

        subscription.unsubscribe();
        hub.append_log("two");
        assert_eq!(rx.recv().await, None);
    }
}
