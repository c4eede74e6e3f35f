//! Orchestration events and status-change records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskStatus;

/// Kind of orchestration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Assigned,
    Started,
    Completed,
    Failed,
    Blocked,
    Unblocked,
    StatusChanged,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Unblocked => "unblocked",
            Self::StatusChanged => "status_changed",
        };
        f.write_str(s)
    }
}

impl FromStr for EventType {
    type Err = EventTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "assigned" => Ok(Self::Assigned),
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            "unblocked" => Ok(Self::Unblocked),
            "status_changed" => Ok(Self::StatusChanged),
            other => Err(EventTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`EventType`] string.
#[derive(Debug, Clone)]
pub struct EventTypeParseError(pub String);

impl fmt::Display for EventTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid event type: {:?}", self.0)
    }
}

impl std::error::Error for EventTypeParseError {}

/// A fire-and-forget record emitted on the orchestrator's event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub task_id: String,
    pub title: String,
    /// Worker involved, when one is.
    #[serde(default)]
    pub worker: String,
    /// Free-form detail (failure text, unblock reason, ...).
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, task_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            event_type,
            task_id: task_id.into(),
            title: title.into(),
            worker: String::new(),
            message: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = worker.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// One entry in a task's status history.
///
/// `from` is `None` only for the synthetic initial record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub task_id: String,
    pub from: Option<TaskStatus>,
    pub to: TaskStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
