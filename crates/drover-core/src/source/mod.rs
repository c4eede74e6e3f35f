//! The capability records the engine consumes.
//!
//! [`TaskSource`] is the ground truth for tasks: the engine rescans it
//! rather than caching state, and every status mutation goes through it so
//! it can persist. [`WorkerSource`] manages worker lifecycle and exposes
//! the single `run(name, prompt) -> output` execution contract.
//!
//! Both traits are intentionally object-safe so implementations can be
//! stored as `Arc<dyn TaskSource>` / `Arc<dyn WorkerSource>`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Priority, Task, TaskStatus};

/// Errors surfaced by task and worker sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("task {0:?} not found")]
    TaskNotFound(String),

    #[error("worker {0:?} not found")]
    WorkerNotFound(String),

    #[error("cannot {action} task {id:?}: status is {status}")]
    InvalidState {
        id: String,
        action: &'static str,
        status: TaskStatus,
    },

    #[error("worker {worker:?} failed: {message}")]
    WorkerFailed { worker: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Aggregate counts over a task set.
///
/// Carries both the by-role and by-workstream breakdowns; consumers ignore
/// the one they don't need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub by_status: HashMap<TaskStatus, usize>,
    pub by_role: HashMap<String, usize>,
    pub by_priority: HashMap<Priority, usize>,
    pub by_workstream: HashMap<String, usize>,
}

impl TaskStats {
    /// Tally stats over a task snapshot.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            *stats.by_status.entry(task.status).or_default() += 1;
            *stats.by_role.entry(task.role.clone()).or_default() += 1;
            *stats.by_priority.entry(task.priority).or_default() += 1;
            *stats
                .by_workstream
                .entry(task.effective_workstream().to_owned())
                .or_default() += 1;
        }
        stats
    }
}

/// Ground truth for the task set.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Full rediscovery of the task set.
    async fn scan(&self) -> Result<Vec<Task>, SourceError>;

    async fn get(&self, id: &str) -> Result<Task, SourceError>;

    async fn get_by_role(&self, role: &str) -> Result<Vec<Task>, SourceError>;

    async fn get_by_workstream(&self, workstream: &str) -> Result<Vec<Task>, SourceError>;

    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, SourceError>;

    /// Pending tasks ordered by priority (critical first).
    async fn get_pending(&self) -> Result<Vec<Task>, SourceError>;

    /// Set a task's status and persist it. Maintains `started_at` /
    /// `completed_at` timestamps as a side effect.
    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), SourceError>;

    /// Record a failure message and optional log path.
    async fn update_failure(
        &self,
        id: &str,
        message: &str,
        log_path: Option<&str>,
    ) -> Result<(), SourceError>;

    /// Assign a task to a worker. Only legal from `pending` or `blocked`.
    async fn assign(&self, id: &str, worker: &str) -> Result<(), SourceError>;

    /// Clear a task's worker. Reverts the status to `pending` when the
    /// task is still `assigned` or `in_progress`.
    async fn unassign(&self, id: &str) -> Result<(), SourceError>;

    /// Whether any dependency of the task is unknown or not `complete`.
    async fn is_blocked(&self, id: &str) -> Result<bool, SourceError>;

    async fn stats(&self) -> Result<TaskStats, SourceError>;
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Observed status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    Stopped,
    Error,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkerStatus {
    type Err = WorkerStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "working" => Ok(Self::Working),
            "stopped" => Ok(Self::Stopped),
            "error" => Ok(Self::Error),
            other => Err(WorkerStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`WorkerStatus`] string.
#[derive(Debug, Clone)]
pub struct WorkerStatusParseError(pub String);

impl fmt::Display for WorkerStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid worker status: {:?}", self.0)
    }
}

impl std::error::Error for WorkerStatusParseError {}

/// A registered worker as reported by a [`WorkerSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub name: String,
    pub role: String,
    pub status: WorkerStatus,
}

/// Options for spawning a worker.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub role: String,
    /// Command line to execute for each `run` call; source-specific
    /// default when absent.
    pub command: Option<String>,
}

/// Worker lifecycle and execution.
#[async_trait]
pub trait WorkerSource: Send + Sync {
    async fn spawn(&self, name: &str, opts: SpawnOptions) -> Result<WorkerInfo, SourceError>;

    async fn get(&self, name: &str) -> Result<WorkerInfo, SourceError>;

    async fn list(&self) -> Result<Vec<WorkerInfo>, SourceError>;

    async fn start(&self, name: &str) -> Result<(), SourceError>;

    async fn stop(&self, name: &str) -> Result<(), SourceError>;

    async fn remove(&self, name: &str, force: bool) -> Result<(), SourceError>;

    /// Execute one prompt on the named worker, blocking until it returns
    /// its full textual output.
    async fn run(&self, name: &str, prompt: &str) -> Result<String, SourceError>;
}

// Compile-time assertions: both traits must stay object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TaskSource, _: &dyn WorkerSource) {}
};
