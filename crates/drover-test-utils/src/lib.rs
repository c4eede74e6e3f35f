//! Shared test fixtures for drover integration tests.
//!
//! Provides an in-memory [`MemoryTaskSource`] implementing the full
//! `TaskSource` contract and a [`ScriptedWorkerSource`] whose workers
//! return canned outputs per invocation, so orchestration tests run
//! without real subprocesses or files.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use drover_core::model::{Task, TaskStatus};
use drover_core::source::{
    SourceError, SpawnOptions, TaskSource, TaskStats, WorkerInfo, WorkerSource, WorkerStatus,
};

/// Build a task with a role, workstream, and dependencies in one call.
pub fn task(id: &str, role: &str, workstream: &str, deps: &[&str]) -> Task {
    let mut t = Task::new(id, format!("Task {id}"), role);
    t.workstream = workstream.to_owned();
    t.depends_on = deps.iter().map(|d| (*d).to_owned()).collect();
    t
}

// ---------------------------------------------------------------------------
// MemoryTaskSource
// ---------------------------------------------------------------------------

struct TaskTable {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
}

/// In-memory `TaskSource` with the same status/timestamp bookkeeping a
/// persistent store performs.
pub struct MemoryTaskSource {
    inner: RwLock<TaskTable>,
}

impl MemoryTaskSource {
    pub fn new(tasks: Vec<Task>) -> Self {
        let order = tasks.iter().map(|t| t.id.clone()).collect();
        let tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            inner: RwLock::new(TaskTable { tasks, order }),
        }
    }

    /// Snapshot one task for assertions.
    pub fn snapshot(&self, id: &str) -> Option<Task> {
        self.inner.read().unwrap().tasks.get(id).cloned()
    }

    fn all(&self) -> Vec<Task> {
        let inner = self.inner.read().unwrap();
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskSource for MemoryTaskSource {
    async fn scan(&self) -> Result<Vec<Task>, SourceError> {
        Ok(self.all())
    }

    async fn get(&self, id: &str) -> Result<Task, SourceError> {
        self.snapshot(id)
            .ok_or_else(|| SourceError::TaskNotFound(id.to_owned()))
    }

    async fn get_by_role(&self, role: &str) -> Result<Vec<Task>, SourceError> {
        Ok(self.all().into_iter().filter(|t| t.role == role).collect())
    }

    async fn get_by_workstream(&self, workstream: &str) -> Result<Vec<Task>, SourceError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|t| t.effective_workstream() == workstream)
            .collect())
    }

    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, SourceError> {
        Ok(self.all().into_iter().filter(|t| t.status == status).collect())
    }

    async fn get_pending(&self) -> Result<Vec<Task>, SourceError> {
        let mut pending: Vec<Task> = self
            .all()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        pending.sort_by_key(|t| t.priority.order());
        Ok(pending)
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), SourceError> {
        let mut inner = self.inner.write().unwrap();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| SourceError::TaskNotFound(id.to_owned()))?;
        task.status = status;
        match status {
            TaskStatus::InProgress if task.started_at.is_none() => {
                task.started_at = Some(Utc::now());
            }
            TaskStatus::Complete => {
                task.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    async fn update_failure(
        &self,
        id: &str,
        message: &str,
        log_path: Option<&str>,
    ) -> Result<(), SourceError> {
        let mut inner = self.inner.write().unwrap();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| SourceError::TaskNotFound(id.to_owned()))?;
        task.failure_message = Some(message.to_owned());
        task.log_path = log_path.map(str::to_owned);
        Ok(())
    }

    async fn assign(&self, id: &str, worker: &str) -> Result<(), SourceError> {
        let mut inner = self.inner.write().unwrap();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| SourceError::TaskNotFound(id.to_owned()))?;
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Blocked) {
            return Err(SourceError::InvalidState {
                id: id.to_owned(),
                action: "assign",
                status: task.status,
            });
        }
        task.status = TaskStatus::Assigned;
        task.assigned_worker = Some(worker.to_owned());
        Ok(())
    }

    async fn unassign(&self, id: &str) -> Result<(), SourceError> {
        let mut inner = self.inner.write().unwrap();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| SourceError::TaskNotFound(id.to_owned()))?;
        task.assigned_worker = None;
        if matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            task.status = TaskStatus::Pending;
        }
        Ok(())
    }

    async fn is_blocked(&self, id: &str) -> Result<bool, SourceError> {
        let inner = self.inner.read().unwrap();
        let task = inner
            .tasks
            .get(id)
            .ok_or_else(|| SourceError::TaskNotFound(id.to_owned()))?;
        Ok(task.depends_on.iter().any(|dep| {
            inner
                .tasks
                .get(dep)
                .is_none_or(|d| d.status != TaskStatus::Complete)
        }))
    }

    async fn stats(&self) -> Result<TaskStats, SourceError> {
        Ok(TaskStats::from_tasks(&self.all()))
    }
}

// ---------------------------------------------------------------------------
// ScriptedWorkerSource
// ---------------------------------------------------------------------------

struct Script {
    outputs: Vec<String>,
    calls: usize,
}

struct WorkerTable {
    workers: HashMap<String, WorkerInfo>,
    scripts: HashMap<String, Script>,
    prompts: Vec<(String, String)>,
}

/// `WorkerSource` whose workers return canned outputs per call.
///
/// The last scripted output repeats once the script is exhausted; a
/// worker with no script echoes a fixed line.
pub struct ScriptedWorkerSource {
    inner: RwLock<WorkerTable>,
}

impl Default for ScriptedWorkerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedWorkerSource {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(WorkerTable {
                workers: HashMap::new(),
                scripts: HashMap::new(),
                prompts: Vec::new(),
            }),
        }
    }

    pub fn add_worker(&self, name: &str, role: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.workers.insert(
            name.to_owned(),
            WorkerInfo {
                name: name.to_owned(),
                role: role.to_owned(),
                status: WorkerStatus::Idle,
            },
        );
    }

    /// Script the outputs a worker returns on successive `run` calls.
    pub fn script(&self, name: &str, outputs: &[&str]) {
        let mut inner = self.inner.write().unwrap();
        inner.scripts.insert(
            name.to_owned(),
            Script {
                outputs: outputs.iter().map(|s| (*s).to_owned()).collect(),
                calls: 0,
            },
        );
    }

    /// How many times a worker has been invoked.
    pub fn call_count(&self, name: &str) -> usize {
        let inner = self.inner.read().unwrap();
        inner.scripts.get(name).map_or(0, |s| s.calls)
    }

    /// Every `(worker, prompt)` pair seen, in order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.inner.read().unwrap().prompts.clone()
    }
}

#[async_trait]
impl WorkerSource for ScriptedWorkerSource {
    async fn spawn(&self, name: &str, opts: SpawnOptions) -> Result<WorkerInfo, SourceError> {
        let info = WorkerInfo {
            name: name.to_owned(),
            role: opts.role,
            status: WorkerStatus::Idle,
        };
        let mut inner = self.inner.write().unwrap();
        inner.workers.insert(name.to_owned(), info.clone());
        Ok(info)
    }

    async fn get(&self, name: &str) -> Result<WorkerInfo, SourceError> {
        self.inner
            .read()
            .unwrap()
            .workers
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::WorkerNotFound(name.to_owned()))
    }

    async fn list(&self) -> Result<Vec<WorkerInfo>, SourceError> {
        let inner = self.inner.read().unwrap();
        let mut workers: Vec<WorkerInfo> = inner.workers.values().cloned().collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workers)
    }

    async fn start(&self, name: &str) -> Result<(), SourceError> {
        let mut inner = self.inner.write().unwrap();
        let worker = inner
            .workers
            .get_mut(name)
            .ok_or_else(|| SourceError::WorkerNotFound(name.to_owned()))?;
        worker.status = WorkerStatus::Idle;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), SourceError> {
        let mut inner = self.inner.write().unwrap();
        let worker = inner
            .workers
            .get_mut(name)
            .ok_or_else(|| SourceError::WorkerNotFound(name.to_owned()))?;
        worker.status = WorkerStatus::Stopped;
        Ok(())
    }

    async fn remove(&self, name: &str, _force: bool) -> Result<(), SourceError> {
        let mut inner = self.inner.write().unwrap();
        inner
            .workers
            .remove(name)
            .ok_or_else(|| SourceError::WorkerNotFound(name.to_owned()))?;
        inner.scripts.remove(name);
        Ok(())
    }

    async fn run(&self, name: &str, prompt: &str) -> Result<String, SourceError> {
        let mut inner = self.inner.write().unwrap();
        if !inner.workers.contains_key(name) {
            return Err(SourceError::WorkerNotFound(name.to_owned()));
        }
        inner.prompts.push((name.to_owned(), prompt.to_owned()));
        let script = inner.scripts.entry(name.to_owned()).or_insert(Script {
            outputs: vec![format!("{name} finished the task")],
            calls: 0,
        });
        let output = script
            .outputs
            .get(script.calls)
            .or_else(|| script.outputs.last())
            .cloned()
            .unwrap_or_default();
        script.calls += 1;
        Ok(output)
    }
}
