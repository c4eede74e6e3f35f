//! Per-workstream execution state.
//!
//! Tracks which lane is running where, and enforces that a lane's tasks
//! run one at a time in priority-then-declaration order. A lane that fails
//! stays failed; its remaining tasks are not retried here.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Task, TaskStatus, WorkstreamKey};

use super::SchedulerError;

/// Execution status of a workstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkstreamStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl fmt::Display for WorkstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Runtime state of one workstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkstreamState {
    pub role: String,
    pub workstream: String,
    pub assigned_worker: Option<String>,
    pub status: WorkstreamStatus,
    /// Task IDs in execution order.
    pub tasks: Vec<String>,
    pub completed: BTreeSet<String>,
    pub current_task: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkstreamState {
    pub fn key(&self) -> WorkstreamKey {
        WorkstreamKey::new(self.role.clone(), self.workstream.clone())
    }

    /// The next task to run: the first in order not yet completed.
    pub fn next_task(&self) -> Option<&str> {
        self.tasks
            .iter()
            .find(|id| !self.completed.contains(*id))
            .map(String::as_str)
    }

    pub fn is_done(&self) -> bool {
        self.tasks.iter().all(|id| self.completed.contains(id))
    }
}

/// Aggregate workstream counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkstreamStats {
    pub total: usize,
    pub by_role: HashMap<String, usize>,
    pub by_status: HashMap<WorkstreamStatus, usize>,
}

#[derive(Default)]
struct Inner {
    role_caps: HashMap<String, usize>,
    states: HashMap<WorkstreamKey, WorkstreamState>,
    /// Non-complete workstreams awaiting activation, in discovery order.
    pending: Vec<WorkstreamKey>,
    active: BTreeSet<WorkstreamKey>,
    task_index: HashMap<String, WorkstreamKey>,
}

impl Inner {
    fn active_count(&self, role: &str) -> usize {
        self.active.iter().filter(|key| key.role == role).count()
    }

    fn cap(&self, role: &str) -> usize {
        self.role_caps.get(role).copied().unwrap_or(1)
    }
}

/// Tracks lane execution and serializes tasks within each lane.
pub struct WorkstreamScheduler {
    inner: RwLock<Inner>,
}

impl Default for WorkstreamScheduler {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl WorkstreamScheduler {
    pub fn new(role_caps: HashMap<String, usize>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                role_caps,
                ..Inner::default()
            }),
        }
    }

    /// Group tasks into workstreams. Tasks already `complete` pre-populate
    /// the completed set; workstreams with work left go on the pending
    /// list.
    pub fn initialize(&self, tasks: &[Task]) {
        let mut grouped: HashMap<WorkstreamKey, Vec<&Task>> = HashMap::new();
        let mut key_order: Vec<WorkstreamKey> = Vec::new();
        for task in tasks {
            let key = task.workstream_key();
            if !grouped.contains_key(&key) {
                key_order.push(key.clone());
            }
            grouped.entry(key).or_default().push(task);
        }

        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        inner.states.clear();
        inner.pending.clear();
        inner.active.clear();
        inner.task_index.clear();

        for key in key_order {
            let mut members = grouped.remove(&key).expect("key was grouped");
            // Priority first, declaration order within a priority.
            members.sort_by_key(|t| t.priority.order());

            let completed: BTreeSet<String> = members
                .iter()
                .filter(|t| t.status == TaskStatus::Complete)
                .map(|t| t.id.clone())
                .collect();
            let ids: Vec<String> = members.iter().map(|t| t.id.clone()).collect();
            for id in &ids {
                inner.task_index.insert(id.clone(), key.clone());
            }

            let done = completed.len() == ids.len();
            let state = WorkstreamState {
                role: key.role.clone(),
                workstream: key.workstream.clone(),
                assigned_worker: None,
                status: if done {
                    WorkstreamStatus::Completed
                } else {
                    WorkstreamStatus::Pending
                },
                tasks: ids,
                completed,
                current_task: None,
                started_at: None,
                completed_at: done.then(Utc::now),
            };
            if !done {
                inner.pending.push(key.clone());
            }
            inner.states.insert(key, state);
        }
    }

    /// Pop the first pending workstream for a role, or `None` when the
    /// role is at its cap or nothing is pending. Follow with
    /// [`Self::activate`].
    pub fn next_for_role(&self, role: &str) -> Option<WorkstreamState> {
        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        if inner.active_count(role) >= inner.cap(role) {
            return None;
        }
        let pos = inner
            .pending
            .iter()
            .position(|key| key.role == role && !inner.active.contains(key))?;
        let key = inner.pending.remove(pos);
        inner.states.get(&key).cloned()
    }

    /// Activate a workstream on a worker.
    pub fn activate(&self, role: &str, workstream: &str, worker: &str) -> Result<(), SchedulerError> {
        let key = WorkstreamKey::new(role, workstream);
        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        inner.pending.retain(|k| k != &key);
        let state = inner
            .states
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::UnknownWorkstream(key.clone()))?;
        if state.status == WorkstreamStatus::Completed || state.status == WorkstreamStatus::Failed {
            return Err(SchedulerError::InvalidWorkstreamState {
                key: key.clone(),
                status: state.status.to_string(),
            });
        }
        state.status = WorkstreamStatus::Active;
        state.assigned_worker = Some(worker.to_owned());
        state.started_at = Some(Utc::now());
        state.current_task = state.next_task().map(str::to_owned);
        inner.active.insert(key);
        Ok(())
    }

    /// Mark a task done within its workstream. Returns `true` when the
    /// whole workstream just finished (and was deactivated).
    pub fn complete_task(&self, task_id: &str) -> Result<bool, SchedulerError> {
        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        let key = inner
            .task_index
            .get(task_id)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownTask(task_id.to_owned()))?;
        let state = inner
            .states
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::UnknownWorkstream(key.clone()))?;

        state.completed.insert(task_id.to_owned());
        if state.is_done() {
            state.status = WorkstreamStatus::Completed;
            state.current_task = None;
            state.completed_at = Some(Utc::now());
            inner.active.remove(&key);
            Ok(true)
        } else {
            state.current_task = state.next_task().map(str::to_owned);
            Ok(false)
        }
    }

    /// Fail the task's entire workstream and deactivate it. Remaining
    /// tasks in the lane are not retried by this scheduler.
    pub fn fail_task(&self, task_id: &str) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        let key = inner
            .task_index
            .get(task_id)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownTask(task_id.to_owned()))?;
        let state = inner
            .states
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::UnknownWorkstream(key.clone()))?;

        state.status = WorkstreamStatus::Failed;
        state.current_task = None;
        inner.active.remove(&key);
        inner.pending.retain(|k| k != &key);
        Ok(())
    }

    pub fn get(&self, role: &str, workstream: &str) -> Option<WorkstreamState> {
        let inner = self.inner.read().expect("scheduler lock poisoned");
        inner.states.get(&WorkstreamKey::new(role, workstream)).cloned()
    }

    pub fn workstream_for_task(&self, task_id: &str) -> Option<WorkstreamKey> {
        let inner = self.inner.read().expect("scheduler lock poisoned");
        inner.task_index.get(task_id).cloned()
    }

    pub fn active_count(&self, role: &str) -> usize {
        self.inner
            .read()
            .expect("scheduler lock poisoned")
            .active_count(role)
    }

    pub fn stats(&self) -> WorkstreamStats {
        let inner = self.inner.read().expect("scheduler lock poisoned");
        let mut stats = WorkstreamStats {
            total: inner.states.len(),
            ..WorkstreamStats::default()
        };
        for state in inner.states.values() {
            *stats.by_role.entry(state.role.clone()).or_default() += 1;
            *stats.by_status.entry(state.status).or_default() += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    fn task(id: &str, role: &str, workstream: &str) -> Task {
        let mut t = Task::new(id, id.to_uppercase(), role);
        t.workstream = workstream.to_owned();
        t
    }

    #[test]
    fn initialize_groups_and_precompletes() {
        let mut done = task("a1", "be", "api", );
        done.status = TaskStatus::Complete;
        let tasks = vec![done, task("a2", "be", "api"), task("b1", "fe", "ui")];

        let scheduler = WorkstreamScheduler::default();
        scheduler.initialize(&tasks);

        let api = scheduler.get("be", "api").expect("tracked");
        assert_eq!(api.status, WorkstreamStatus::Pending);
        assert!(api.completed.contains("a1"));
        assert_eq!(api.next_task(), Some("a2"));

        let stats = scheduler.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_role[&"be".to_owned()], 1);
    }

    #[test]
    fn fully_complete_workstream_is_not_pending() {
        let mut done = task("a1", "be", "api");
        done.status = TaskStatus::Complete;
        let scheduler = WorkstreamScheduler::default();
        scheduler.initialize(&[done]);

        assert!(scheduler.next_for_role("be").is_none());
        let api = scheduler.get("be", "api").unwrap();
        assert_eq!(api.status, WorkstreamStatus::Completed);
        assert!(api.completed_at.is_some());
    }

    #[test]
    fn role_cap_limits_activation() {
        let tasks = vec![task("a", "be", "api"), task("b", "be", "ui")];
        let scheduler = WorkstreamScheduler::default();
        scheduler.initialize(&tasks);

        let first = scheduler.next_for_role("be").expect("pending");
        scheduler
            .activate("be", &first.workstream, "be-1")
            .expect("should activate");
        assert!(scheduler.next_for_role("be").is_none(), "cap 1");
        assert_eq!(scheduler.active_count("be"), 1);
    }

    #[test]
    fn tasks_within_a_lane_run_in_priority_order() {
        let mut low = task("low", "be", "api");
        low.priority = Priority::Low;
        let mut crit = task("crit", "be", "api");
        crit.priority = Priority::Critical;

        let scheduler = WorkstreamScheduler::default();
        scheduler.initialize(&[low, crit]);
        scheduler.activate("be", "api", "be-1").unwrap();

        let state = scheduler.get("be", "api").unwrap();
        assert_eq!(state.current_task.as_deref(), Some("crit"));
    }

    #[test]
    fn completing_all_tasks_finishes_the_lane() {
        let tasks = vec![task("a", "be", "api"), task("b", "be", "api")];
        let scheduler = WorkstreamScheduler::default();
        scheduler.initialize(&tasks);
        scheduler.activate("be", "api", "be-1").unwrap();

        assert!(!scheduler.complete_task("a").expect("tracked"));
        let mid = scheduler.get("be", "api").unwrap();
        assert_eq!(mid.current_task.as_deref(), Some("b"));

        assert!(scheduler.complete_task("b").expect("tracked"));
        let done = scheduler.get("be", "api").unwrap();
        assert_eq!(done.status, WorkstreamStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.is_done());
        assert_eq!(scheduler.active_count("be"), 0);
    }

    #[test]
    fn failing_a_task_fails_the_lane() {
        let tasks = vec![task("a", "be", "api"), task("b", "be", "api")];
        let scheduler = WorkstreamScheduler::default();
        scheduler.initialize(&tasks);
        scheduler.activate("be", "api", "be-1").unwrap();

        scheduler.fail_task("a").expect("tracked");
        let state = scheduler.get("be", "api").unwrap();
        assert_eq!(state.status, WorkstreamStatus::Failed);
        assert_eq!(scheduler.active_count("be"), 0);
        // The failed lane never comes back.
        assert!(scheduler.next_for_role("be").is_none());
    }

    #[test]
    fn activate_rejects_finished_lanes() {
        let mut done = task("a", "be", "api");
        done.status = TaskStatus::Complete;
        let scheduler = WorkstreamScheduler::default();
        scheduler.initialize(&[done]);

        let err = scheduler.activate("be", "api", "be-1").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidWorkstreamState { .. }));
    }

    #[test]
    fn unknown_task_is_an_error() {
        let scheduler = WorkstreamScheduler::default();
        scheduler.initialize(&[]);
        assert!(matches!(
            scheduler.complete_task("nope").unwrap_err(),
            SchedulerError::UnknownTask(_)
        ));
    }
}
