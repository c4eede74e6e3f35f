//! The orchestrator: startup, event loop, assignment, shutdown.
//!
//! Runs a single event loop over three wake sources: cancellation, runner
//! results on a bounded channel, and a periodic tick. Runner activities
//! are spawned per assignment and report back as events; all
//! cross-component mutation is sequenced here, never under a component
//! lock.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::balancer::Balancer;
use crate::config::OrchestratorConfig;
use crate::model::{Event, EventType, Task, TaskStatus, WorkstreamKey};
use crate::queue::PriorityQueue;
use crate::resolver::DependencyResolver;
use crate::runner::{RunnerError, TaskRunner};
use crate::scheduler::readiness::{DeadlockInfo, ReadinessScheduler};
use crate::scheduler::workstream::WorkstreamScheduler;
use crate::source::{SpawnOptions, TaskSource, WorkerSource, WorkerStatus};
use crate::tracker::StatusTracker;

/// Lifecycle state of the orchestrator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Drives the fleet: discovers tasks, schedules workstreams, assigns
/// idle workers, and reacts to completions.
pub struct Orchestrator {
    config: OrchestratorConfig,
    tasks: Arc<dyn TaskSource>,
    workers: Arc<dyn WorkerSource>,
    queue: Arc<PriorityQueue>,
    readiness: Arc<ReadinessScheduler>,
    workstreams: Arc<WorkstreamScheduler>,
    balancer: Arc<Balancer>,
    tracker: Arc<StatusTracker>,
    runner: Arc<TaskRunner>,
    state: RwLock<OrchestratorState>,
    events_tx: mpsc::Sender<Event>,
    events_rx: tokio::sync::Mutex<mpsc::Receiver<Event>>,
    cancel: CancellationToken,
    /// Worker name -> the workstream it currently owns.
    assignments: RwLock<HashMap<String, WorkstreamKey>>,
    /// Workers with a runner activity in flight.
    busy: RwLock<HashSet<String>>,
    in_flight: AtomicUsize,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        tasks: Arc<dyn TaskSource>,
        workers: Arc<dyn WorkerSource>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer_size.max(1));
        let tracker = Arc::new(StatusTracker::new());
        let runner = Arc::new(TaskRunner::new(
            Arc::clone(&tasks),
            Arc::clone(&workers),
            &config,
            Arc::clone(&tracker),
        ));
        let readiness = Arc::new(ReadinessScheduler::new(config.role_concurrency.clone()));
        let workstreams = Arc::new(WorkstreamScheduler::new(config.role_concurrency.clone()));

        Self {
            config,
            tasks,
            workers,
            queue: Arc::new(PriorityQueue::new()),
            readiness,
            workstreams,
            balancer: Arc::new(Balancer::default()),
            tracker,
            runner,
            state: RwLock::new(OrchestratorState::Stopped),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            cancel: CancellationToken::new(),
            assignments: RwLock::new(HashMap::new()),
            busy: RwLock::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.read().expect("state lock poisoned")
    }

    fn set_state(&self, next: OrchestratorState) {
        *self.state.write().expect("state lock poisoned") = next;
    }

    /// The status tracker, for history queries and external listeners.
    pub fn tracker(&self) -> Arc<StatusTracker> {
        Arc::clone(&self.tracker)
    }

    /// The readiness scheduler's deadlock probe.
    pub fn detect_potential_deadlock(&self) -> Option<DeadlockInfo> {
        self.readiness.detect_potential_deadlock()
    }

    /// Request a graceful stop. Rejects unless currently running.
    pub fn stop(&self) -> Result<()> {
        let state = self.state();
        if state != OrchestratorState::Running {
            bail!("cannot stop: orchestrator is {state}");
        }
        self.cancel.cancel();
        Ok(())
    }

    /// Start the orchestrator and run its event loop to completion.
    ///
    /// Initialization errors (empty task set, dependency cycle) propagate
    /// and leave the orchestrator `stopped`.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.write().expect("state lock poisoned");
            if *state != OrchestratorState::Stopped {
                bail!("cannot start: orchestrator is {state}");
            }
            *state = OrchestratorState::Starting;
        }

        if let Err(e) = self.startup().await {
            self.set_state(OrchestratorState::Stopped);
            return Err(e);
        }

        self.set_state(OrchestratorState::Running);
        tracing::info!("orchestrator running");

        self.event_loop().await;
        self.shutdown().await;
        Ok(())
    }

    async fn startup(&self) -> Result<()> {
        let tasks = self.tasks.scan().await.context("scanning task source")?;
        if tasks.is_empty() {
            bail!("task source returned no tasks");
        }

        let resolver = DependencyResolver::new(&tasks);
        if let Some(path) = resolver.detect_cycle() {
            bail!("dependency cycle detected: {}", path.join(" -> "));
        }

        self.readiness
            .initialize(&tasks)
            .context("initializing readiness scheduler")?;
        self.workstreams.initialize(&tasks);

        for task in resolver.ready() {
            self.queue
                .enqueue(task)
                .context("seeding the priority queue")?;
        }
        // Record blocked statuses for everything that cannot run yet.
        self.unblock_and_enqueue(&tasks).await;
        tracing::info!(
            tasks = tasks.len(),
            queued = self.queue.size(),
            "task set loaded"
        );

        if self.config.auto_spawn_workers {
            self.auto_spawn(&tasks).await;
        }

        Ok(())
    }

    /// Ensure each role with open tasks has workers, up to its cap.
    /// Spawn failures are logged and skipped.
    async fn auto_spawn(&self, tasks: &[Task]) {
        let existing = match self.workers.list().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list workers for auto-spawn");
                return;
            }
        };

        let roles: BTreeSet<&str> = tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Blocked))
            .map(|t| t.role.as_str())
            .collect();

        for role in roles {
            let have = existing.iter().filter(|w| w.role == role).count();
            let cap = self.config.role_cap(role).max(1);
            for n in have..cap {
                let name = format!("{role}-{}", n + 1);
                let opts = SpawnOptions {
                    role: role.to_owned(),
                    command: None,
                };
                match self.workers.spawn(&name, opts).await {
                    Ok(_) => tracing::info!(worker = %name, role = %role, "spawned worker"),
                    Err(e) => {
                        tracing::warn!(worker = %name, role = %role, error = %e, "failed to spawn worker");
                    }
                }
            }
        }
    }

    /// Select over cancellation, runner events, and the periodic tick.
    async fn event_loop(&self) {
        let mut rx = self.events_rx.lock().await;
        let mut tick = tokio::time::interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("orchestrator cancelled");
                    return;
                }
                maybe = rx.recv() => {
                    match maybe {
                        Some(event) => self.handle_event(event).await,
                        None => return,
                    }
                }
                _ = tick.tick() => {
                    self.on_tick().await;
                }
            }

            if self.config.stop_when_complete
                && self.in_flight.load(Ordering::SeqCst) == 0
                && self.all_settled().await
            {
                tracing::info!("no runnable work remains, stopping");
                return;
            }
        }
    }

    /// No task is pending, assigned, or in progress; nothing can move.
    async fn all_settled(&self) -> bool {
        match self.tasks.scan().await {
            Ok(tasks) => tasks.iter().all(|t| {
                !matches!(
                    t.status,
                    TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::InProgress
                )
            }),
            Err(e) => {
                tracing::warn!(error = %e, "scan failed during settle check");
                false
            }
        }
    }

    /// Periodic refresh: pick up descriptor edits, unblock tasks whose
    /// dependencies completed out of band, and re-attempt assignment.
    async fn on_tick(&self) {
        let tasks = match self.tasks.scan().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(error = %e, "scan failed on tick");
                return;
            }
        };

        self.unblock_and_enqueue(&tasks).await;

        if let Some(info) = self.readiness.detect_potential_deadlock() {
            tracing::warn!(
                roles = ?info.roles,
                suggestion = %info.suggestion,
                "potential cross-role deadlock"
            );
        }

        self.assign_pending().await;
    }

    /// Reconcile statuses with the dependency graph: mark waiting pending
    /// tasks `blocked`, transition `blocked` tasks whose dependencies are
    /// all complete back to `pending`, and enqueue every dispatchable
    /// pending task that is not already queued or assigned.
    async fn unblock_and_enqueue(&self, tasks: &[Task]) {
        let resolver = DependencyResolver::new(tasks);

        for task in tasks {
            if task.status != TaskStatus::Pending
                || !resolver.is_blocked(&task.id)
                || self.queue.contains(&task.id)
            {
                continue;
            }
            if let Err(e) = self.tracker.record_change(
                &task.id,
                Some(TaskStatus::Pending),
                TaskStatus::Blocked,
                None,
                Some("waiting on dependencies"),
            ) {
                tracing::warn!(task_id = %task.id, error = %e, "block transition rejected");
                continue;
            }
            if let Err(e) = self.tasks.update_status(&task.id, TaskStatus::Blocked).await {
                tracing::warn!(task_id = %task.id, error = %e, "failed to mark task blocked");
            }
        }

        for task in tasks {
            if task.status != TaskStatus::Blocked || resolver.is_blocked(&task.id) {
                continue;
            }
            if let Err(e) = self.tracker.record_change(
                &task.id,
                Some(TaskStatus::Blocked),
                TaskStatus::Pending,
                None,
                Some("dependencies complete"),
            ) {
                tracing::warn!(task_id = %task.id, error = %e, "unblock transition rejected");
                continue;
            }
            if let Err(e) = self.tasks.update_status(&task.id, TaskStatus::Pending).await {
                tracing::warn!(task_id = %task.id, error = %e, "failed to unblock task");
                continue;
            }
            tracing::info!(task_id = %task.id, "task unblocked");
            let mut unblocked = task.clone();
            unblocked.status = TaskStatus::Pending;
            if let Err(e) = self.queue.enqueue(unblocked) {
                tracing::warn!(task_id = %task.id, error = %e, "failed to enqueue unblocked task");
            }
        }

        for task in resolver.ready() {
            if task.assigned_worker.is_none() && !self.queue.contains(&task.id) {
                let id = task.id.clone();
                if let Err(e) = self.queue.enqueue(task) {
                    tracing::warn!(task_id = %id, error = %e, "failed to enqueue ready task");
                }
            }
        }
    }

    /// Hand queued work to idle workers.
    ///
    /// A worker owns at most one workstream at a time: an idle worker with
    /// no lane is given the top-scored ready lane for its role, then
    /// dequeues only from that lane's partition until the lane completes
    /// or fails.
    async fn assign_pending(&self) {
        let workers = match self.workers.list().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list workers for assignment");
                return;
            }
        };

        for worker in workers {
            if worker.status != WorkerStatus::Idle || worker.role.is_empty() {
                continue;
            }
            if self.busy.read().expect("busy lock poisoned").contains(&worker.name) {
                continue;
            }

            let key = match self.workstream_for_worker(&worker.name, &worker.role) {
                Some(key) => key,
                None => continue,
            };

            let task = match self.queue.dequeue(&key.to_string()) {
                Ok(task) => task,
                Err(_) => {
                    // Nothing dispatchable in this lane right now (its next
                    // task waits on another lane). Unbind so the worker can
                    // serve other lanes; a completion refresh will put the
                    // lane back in rotation.
                    self.readiness.release(&key.role, &key.workstream);
                    self.assignments
                        .write()
                        .expect("assignments lock poisoned")
                        .remove(&worker.name);
                    continue;
                }
            };

            // The queue can lag the ground truth; re-check before dispatch.
            match self.tasks.is_blocked(&task.id).await {
                Ok(false) => {}
                Ok(true) => {
                    tracing::debug!(task_id = %task.id, "task re-blocked, requeueing");
                    let _ = self.queue.enqueue(task);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(task_id = %task.id, error = %e, "blocked check failed, requeueing");
                    let _ = self.queue.enqueue(task);
                    continue;
                }
            }

            if let Err(e) = self.tasks.assign(&task.id, &worker.name).await {
                tracing::warn!(task_id = %task.id, worker = %worker.name, error = %e, "assignment failed");
                continue;
            }
            if let Err(e) = self.tracker.record_change(
                &task.id,
                Some(task.status),
                TaskStatus::Assigned,
                Some(&worker.name),
                None,
            ) {
                tracing::warn!(task_id = %task.id, error = %e, "assignment transition rejected");
            }
            self.balancer.track_assignment(&worker.name);
            self.busy
                .write()
                .expect("busy lock poisoned")
                .insert(worker.name.clone());
            self.in_flight.fetch_add(1, Ordering::SeqCst);

            tracing::info!(
                task_id = %task.id,
                title = %task.title,
                worker = %worker.name,
                workstream = %key,
                "assigned task"
            );
            self.spawn_runner(task, worker.name.clone());
        }
    }

    /// The workstream a worker owns, picking a new one when it has none.
    fn workstream_for_worker(&self, worker: &str, role: &str) -> Option<WorkstreamKey> {
        {
            let assignments = self.assignments.read().expect("assignments lock poisoned");
            if let Some(key) = assignments.get(worker) {
                return Some(key.clone());
            }
        }

        let record = self.readiness.next_for_role(role)?;
        self.readiness.activate(&record.role, &record.workstream);
        if let Err(e) = self
            .workstreams
            .activate(&record.role, &record.workstream, worker)
        {
            tracing::warn!(
                workstream = %record.key(),
                worker = %worker,
                error = %e,
                "workstream activation failed"
            );
            self.readiness.release(&record.role, &record.workstream);
            return None;
        }

        let key = record.key();
        tracing::info!(worker = %worker, workstream = %key, "worker took workstream");
        self.assignments
            .write()
            .expect("assignments lock poisoned")
            .insert(worker.to_owned(), key.clone());
        Some(key)
    }

    /// Run the task in a background activity and report the verdict as an
    /// event. Events emitted after shutdown are dropped with the channel.
    fn spawn_runner(&self, task: Task, worker: String) {
        let runner = Arc::clone(&self.runner);
        let events_tx = self.events_tx.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            let result = runner.run_task(&cancel, &task.id, &worker).await;
            let event = match result {
                Ok(()) => Event::new(EventType::Completed, task.id.as_str(), task.title.as_str())
                    .with_worker(worker.as_str()),
                Err(RunnerError::Cancelled) => {
                    tracing::debug!(task_id = %task.id, "runner cancelled");
                    return;
                }
                Err(e) => Event::new(EventType::Failed, task.id.as_str(), task.title.as_str())
                    .with_worker(worker.as_str())
                    .with_message(e.to_string()),
            };
            // Fire-and-forget: a closed channel means we are shutting down.
            let _ = events_tx.send(event).await;
        });
    }

    async fn handle_event(&self, event: Event) {
        tracing::debug!(
            event = %event.event_type,
            task_id = %event.task_id,
            worker = %event.worker,
            "handling event"
        );
        match event.event_type {
            EventType::Completed => self.handle_completed(&event).await,
            EventType::Failed => self.handle_failed(&event).await,
            EventType::Blocked => {
                if let Err(e) = self
                    .tasks
                    .update_status(&event.task_id, TaskStatus::Blocked)
                    .await
                {
                    tracing::warn!(task_id = %event.task_id, error = %e, "failed to block task");
                }
            }
            _ => {}
        }
    }

    async fn handle_completed(&self, event: &Event) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.balancer.track_completion(&event.worker);
        self.busy
            .write()
            .expect("busy lock poisoned")
            .remove(&event.worker);

        if let Err(e) = self.tasks.unassign(&event.task_id).await {
            tracing::debug!(task_id = %event.task_id, error = %e, "unassign after completion");
        }

        match self.workstreams.complete_task(&event.task_id) {
            Ok(true) => {
                if let Some(key) = self.workstreams.workstream_for_task(&event.task_id) {
                    tracing::info!(workstream = %key, "workstream completed");
                    self.readiness.release(&key.role, &key.workstream);
                }
                self.assignments
                    .write()
                    .expect("assignments lock poisoned")
                    .remove(&event.worker);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(task_id = %event.task_id, error = %e, "workstream completion tracking failed");
            }
        }

        match self.tasks.scan().await {
            Ok(tasks) => {
                self.readiness.on_task_complete(&event.task_id, &tasks);
                self.unblock_and_enqueue(&tasks).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "scan failed after completion");
            }
        }

        self.assign_pending().await;
    }

    async fn handle_failed(&self, event: &Event) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.balancer.track_completion(&event.worker);
        self.busy
            .write()
            .expect("busy lock poisoned")
            .remove(&event.worker);

        tracing::warn!(
            task_id = %event.task_id,
            worker = %event.worker,
            message = %event.message,
            "task failed"
        );

        if let Some(key) = self.workstreams.workstream_for_task(&event.task_id) {
            self.readiness.release(&key.role, &key.workstream);
        }
        if let Err(e) = self.workstreams.fail_task(&event.task_id) {
            tracing::warn!(task_id = %event.task_id, error = %e, "workstream failure tracking failed");
        }
        self.assignments
            .write()
            .expect("assignments lock poisoned")
            .remove(&event.worker);

        // The worker is idle again; see if other lanes have work.
        self.assign_pending().await;
    }

    /// Stop every worker with a role, then mark the orchestrator stopped.
    async fn shutdown(&self) {
        self.set_state(OrchestratorState::Stopping);
        tracing::info!("orchestrator stopping");

        match self.workers.list().await {
            Ok(list) => {
                for worker in list.iter().filter(|w| !w.role.is_empty()) {
                    if let Err(e) = self.workers.stop(&worker.name).await {
                        tracing::warn!(worker = %worker.name, error = %e, "failed to stop worker");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot list workers for shutdown");
            }
        }

        self.set_state(OrchestratorState::Stopped);
        tracing::info!("orchestrator stopped");
    }
}
