//! Append-only task status history with transition validation.
//!
//! Enforces the allowed transition graph:
//!
//! ```text
//! pending     -> assigned | blocked
//! blocked     -> pending
//! assigned    -> in_progress | pending
//! in_progress -> complete | review | failed | pending
//! review      -> complete | in_progress | failed
//! failed      -> pending | in_progress
//! complete    -> (terminal)
//! ```
//!
//! Listeners run after the record is appended and outside the lock; a
//! panicking listener is isolated and cannot corrupt tracker state.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::{StatusChange, TaskStatus};

/// Callback invoked for every recorded change.
pub type ChangeListener = Box<dyn Fn(&StatusChange) + Send + Sync>;

/// Errors from the status tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid status transition {from} -> {to} for task {id:?}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Validated, append-only per-task status history.
#[derive(Default)]
pub struct StatusTracker {
    history: RwLock<HashMap<String, Vec<StatusChange>>>,
    listeners: RwLock<Vec<ChangeListener>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `from -> to` is an edge of the transition graph.
    pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (from, to),
            (Pending, Assigned)
                | (Pending, Blocked)
                | (Blocked, Pending)
                | (Assigned, InProgress)
                | (Assigned, Pending)
                | (InProgress, Complete)
                | (InProgress, Review)
                | (InProgress, Failed)
                | (InProgress, Pending)
                | (Review, Complete)
                | (Review, InProgress)
                | (Review, Failed)
                | (Failed, Pending)
                | (Failed, InProgress)
        )
    }

    /// Record a validated status change.
    ///
    /// A `None` `from` is the synthetic initial record and is always
    /// accepted. Listeners are notified after the record is appended,
    /// outside the tracker lock.
    pub fn record_change(
        &self,
        task_id: &str,
        from: Option<TaskStatus>,
        to: TaskStatus,
        worker: Option<&str>,
        message: Option<&str>,
    ) -> Result<StatusChange, TrackerError> {
        if let Some(from) = from {
            if !Self::is_valid_transition(from, to) {
                return Err(TrackerError::InvalidTransition {
                    id: task_id.to_owned(),
                    from,
                    to,
                });
            }
        }

        let change = StatusChange {
            task_id: task_id.to_owned(),
            from,
            to,
            timestamp: Utc::now(),
            worker: worker.map(str::to_owned),
            message: message.map(str::to_owned),
        };

        {
            let mut history = self.history.write().expect("tracker lock poisoned");
            history
                .entry(task_id.to_owned())
                .or_default()
                .push(change.clone());
        }

        self.notify(&change);
        Ok(change)
    }

    fn notify(&self, change: &StatusChange) {
        let listeners = self.listeners.read().expect("listener lock poisoned");
        for listener in listeners.iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(change);
            }));
            if result.is_err() {
                tracing::warn!(
                    task_id = %change.task_id,
                    "status listener panicked; continuing"
                );
            }
        }
    }

    pub fn add_listener(&self, listener: ChangeListener) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }

    pub fn history(&self, task_id: &str) -> Vec<StatusChange> {
        let history = self.history.read().expect("tracker lock poisoned");
        history.get(task_id).cloned().unwrap_or_default()
    }

    pub fn last_change(&self, task_id: &str) -> Option<StatusChange> {
        let history = self.history.read().expect("tracker lock poisoned");
        history.get(task_id).and_then(|h| h.last().cloned())
    }

    /// IDs of tasks that reached `complete` today (UTC).
    pub fn completed_today(&self) -> Vec<String> {
        let today = Utc::now().date_naive();
        let history = self.history.read().expect("tracker lock poisoned");
        let mut ids: Vec<String> = history
            .iter()
            .filter(|(_, changes)| {
                changes.iter().any(|c| {
                    c.to == TaskStatus::Complete && c.timestamp.date_naive() == today
                })
            })
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Wall time a task spent in each status: the interval between
    /// consecutive changes, with the final interval ending now.
    pub fn time_in_status(&self, task_id: &str) -> HashMap<TaskStatus, Duration> {
        let history = self.history.read().expect("tracker lock poisoned");
        let Some(changes) = history.get(task_id) else {
            return HashMap::new();
        };

        let mut spent: HashMap<TaskStatus, Duration> = HashMap::new();
        for pair in changes.windows(2) {
            let interval = pair[1].timestamp - pair[0].timestamp;
            let entry = spent.entry(pair[0].to).or_insert_with(Duration::zero);
            *entry = *entry + interval;
        }
        if let Some(last) = changes.last() {
            let entry = spent.entry(last.to).or_insert_with(Duration::zero);
            *entry = *entry + (Utc::now() - last.timestamp);
        }
        spent
    }

    /// Mean wall time from `assigned` to `complete` across all tasks that
    /// have both records. `None` when no task does.
    pub fn average_completion_time(&self) -> Option<Duration> {
        let history = self.history.read().expect("tracker lock poisoned");

        let mut total = Duration::zero();
        let mut count: i32 = 0;
        for changes in history.values() {
            let assigned: Option<DateTime<Utc>> = changes
                .iter()
                .find(|c| c.to == TaskStatus::Assigned)
                .map(|c| c.timestamp);
            let completed: Option<DateTime<Utc>> = changes
                .iter()
                .find(|c| c.to == TaskStatus::Complete)
                .map(|c| c.timestamp);
            if let (Some(assigned), Some(completed)) = (assigned, completed) {
                total = total + (completed - assigned);
                count += 1;
            }
        }
        (count > 0).then(|| total / count)
    }
}
