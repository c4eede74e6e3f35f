//! Shared data model: tasks, priorities, statuses, completion criteria.

mod event;

pub use event::{Event, EventType, StatusChange};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default iteration cap for tasks run in iterative mode.
pub const DEFAULT_MAX_ITERATIONS: u32 = 30;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Scheduling priority of a task. Lower order dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Numeric order used by heap comparators and the readiness score.
    /// `critical = 0`, `low = 3`.
    pub fn order(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            // An absent priority on a descriptor reads as medium.
            "medium" | "" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(PriorityParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Priority`] string.
#[derive(Debug, Clone)]
pub struct PriorityParseError(pub String);

impl fmt::Display for PriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid priority: {:?}", self.0)
    }
}

impl std::error::Error for PriorityParseError {}

// ---------------------------------------------------------------------------

/// Status of a task. Only `complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Blocked,
    Assigned,
    InProgress,
    Review,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        self == Self::Complete
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "blocked" => Ok(Self::Blocked),
            "assigned" => Ok(Self::Assigned),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------
// Completion criteria
// ---------------------------------------------------------------------------

/// Machine-checkable completion criteria for a task.
///
/// At least one of `verify` / `signal` should be set when present on a
/// task; a `Completion` with neither falls back to single-shot execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Shell command whose zero exit status is the completion predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
    /// Literal substring the worker is instructed to emit when done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    /// Iteration cap for iterative mode. `0` or absent means the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl Completion {
    /// Whether any machine-checkable criterion is present.
    pub fn has_criteria(&self) -> bool {
        self.verify.is_some() || self.signal.is_some()
    }

    /// The effective iteration cap, treating `0` and absent as the default.
    pub fn effective_max_iterations(&self, default: u32) -> u32 {
        match self.max_iterations {
            Some(0) | None => default,
            Some(n) => n,
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work.
///
/// Semantically immutable except for the execution fields (`status`,
/// `assigned_worker`, `started_at`, `completed_at`, `failure_message`,
/// `log_path`), which only the orchestrator mutates through the task
/// source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Short stable identifier, unique across the task set.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Free-form Markdown body; becomes the worker prompt.
    #[serde(default)]
    pub content: String,
    /// Skill specialization; partitions worker concurrency.
    pub role: String,
    /// Serial execution lane. Empty means the task is its own lane.
    #[serde(default)]
    pub workstream: String,
    /// Grouping label; does not affect scheduling.
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    /// IDs of tasks that must be `complete` before this one may run.
    /// May reference unknown IDs, which block forever.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    /// Opaque labels; ignored by the scheduler.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
}

impl Task {
    /// Build a task with the required fields and defaults everywhere else.
    pub fn new(id: impl Into<String>, title: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            role: role.into(),
            workstream: String::new(),
            project: String::new(),
            priority: Priority::default(),
            status: TaskStatus::default(),
            depends_on: Vec::new(),
            completion: None,
            tags: Vec::new(),
            assigned_worker: None,
            started_at: None,
            completed_at: None,
            failure_message: None,
            log_path: None,
        }
    }

    /// The task's effective workstream: its own ID when none is declared.
    pub fn effective_workstream(&self) -> &str {
        if self.workstream.is_empty() {
            &self.id
        } else {
            &self.workstream
        }
    }

    /// The `(role, workstream)` pair this task belongs to.
    pub fn workstream_key(&self) -> WorkstreamKey {
        WorkstreamKey {
            role: self.role.clone(),
            workstream: self.effective_workstream().to_owned(),
        }
    }

    /// Whether iterative (re-run until verified) execution applies.
    pub fn is_iterative(&self) -> bool {
        self.completion.as_ref().is_some_and(Completion::has_criteria)
    }
}

// ---------------------------------------------------------------------------
// Workstream key
// ---------------------------------------------------------------------------

/// A `(role, workstream)` pair. Its string form is used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkstreamKey {
    pub role: String,
    pub workstream: String,
}

impl WorkstreamKey {
    pub fn new(role: impl Into<String>, workstream: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            workstream: workstream.into(),
        }
    }
}

impl fmt::Display for WorkstreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.workstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_monotonic() {
        assert!(Priority::Critical.order() < Priority::High.order());
        assert!(Priority::High.order() < Priority::Medium.order());
        assert!(Priority::Medium.order() < Priority::Low.order());
    }

    #[test]
    fn empty_priority_parses_as_medium() {
        assert_eq!("".parse::<Priority>().unwrap(), Priority::Medium);
    }

    #[test]
    fn unknown_priority_is_rejected() {
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn status_roundtrips_through_display() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Blocked,
            TaskStatus::Assigned,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Complete,
            TaskStatus::Failed,
        ] {
            let parsed: TaskStatus = status.to_string().parse().expect("should parse");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn only_complete_is_terminal() {
        assert!(TaskStatus::Complete.is_terminal());
        assert!(!TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Review.is_terminal());
    }

    #[test]
    fn effective_workstream_falls_back_to_id() {
        let task = Task::new("t-1", "Solo task", "be");
        assert_eq!(task.effective_workstream(), "t-1");

        let mut task = task;
        task.workstream = "auth".to_owned();
        assert_eq!(task.effective_workstream(), "auth");
    }

    #[test]
    fn max_iterations_zero_means_default() {
        let completion = Completion {
            verify: Some("true".to_owned()),
            signal: None,
            max_iterations: Some(0),
        };
        assert_eq!(completion.effective_max_iterations(30), 30);

        let completion = Completion {
            max_iterations: Some(5),
            ..completion
        };
        assert_eq!(completion.effective_max_iterations(30), 5);
    }
}
