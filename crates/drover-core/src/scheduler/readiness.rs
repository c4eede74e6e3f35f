//! Readiness-aware workstream selection.
//!
//! For each role the scheduler keeps a score-ordered queue of workstreams
//! that have at least one dispatchable task, a set of fully blocked
//! workstreams, and the set currently active. Scores prefer lanes with
//! more ready work, higher-priority first tasks, and more dependents, so
//! finishing them unblocks the most downstream work.
//!
//! Counts are recomputed against a fresh task snapshot after every
//! completion; a workstream can never be selected while its first task is
//! still blocked.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::model::{Priority, Task, TaskStatus, WorkstreamKey};
use crate::resolver::DependencyResolver;

use super::SchedulerError;

/// Callback invoked when a workstream transitions blocked -> ready.
pub type ReadyListener = Box<dyn Fn(&WorkstreamReadiness) + Send + Sync>;

/// Readiness snapshot of one workstream.
///
/// Counts cover non-`complete` tasks only, so
/// `ready_count + blocked_count == total_count` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkstreamReadiness {
    pub project: String,
    pub role: String,
    pub workstream: String,
    pub ready_count: usize,
    pub blocked_count: usize,
    pub total_count: usize,
    /// Highest-priority dispatchable task, when one exists.
    pub first_ready_id: Option<String>,
    pub first_ready_priority: Option<Priority>,
    /// Workstreams whose incomplete tasks block this one (self excluded).
    pub blockers: BTreeSet<WorkstreamKey>,
    /// Workstreams that wait on this one.
    pub dependents: BTreeSet<WorkstreamKey>,
}

impl WorkstreamReadiness {
    pub fn key(&self) -> WorkstreamKey {
        WorkstreamKey::new(self.role.clone(), self.workstream.clone())
    }

    pub fn is_ready(&self) -> bool {
        self.ready_count > 0
    }

    /// Selection score; higher dequeues first. Blocked workstreams score 0.
    pub fn score(&self) -> i64 {
        if self.ready_count == 0 {
            return 0;
        }
        let priority_order = self
            .first_ready_priority
            .unwrap_or_default()
            .order() as i64;
        1000 + 10 * self.ready_count as i64 - priority_order + 5 * self.dependents.len() as i64
    }
}

/// A detected cross-role wait-for loop.
#[derive(Debug, Clone)]
pub struct DeadlockInfo {
    /// The two roles that wait on each other.
    pub roles: Vec<String>,
    /// Blocked workstream -> the workstreams it waits on.
    pub wait_for: HashMap<WorkstreamKey, BTreeSet<WorkstreamKey>>,
    pub suggestion: String,
}

#[derive(Default)]
struct Inner {
    role_caps: HashMap<String, usize>,
    records: HashMap<WorkstreamKey, WorkstreamReadiness>,
    /// Per-role queues of ready workstream keys, sorted by descending score.
    ready_queues: HashMap<String, Vec<WorkstreamKey>>,
    blocked: BTreeSet<WorkstreamKey>,
    active: BTreeSet<WorkstreamKey>,
    task_index: HashMap<String, WorkstreamKey>,
}

impl Inner {
    fn insert_ready(&mut self, key: WorkstreamKey) {
        let score = self.records[&key].score();
        let queue = self.ready_queues.entry(key.role.clone()).or_default();
        let pos = queue
            .iter()
            .position(|k| self.records[k].score() < score)
            .unwrap_or(queue.len());
        queue.insert(pos, key);
    }

    fn remove_ready(&mut self, key: &WorkstreamKey) {
        if let Some(queue) = self.ready_queues.get_mut(&key.role) {
            queue.retain(|k| k != key);
            if queue.is_empty() {
                self.ready_queues.remove(&key.role);
            }
        }
    }

    fn active_count(&self, role: &str) -> usize {
        self.active.iter().filter(|k| k.role == role).count()
    }

    fn cap(&self, role: &str) -> usize {
        self.role_caps.get(role).copied().unwrap_or(1)
    }
}

/// Per-role, deadlock-aware workstream scheduler.
pub struct ReadinessScheduler {
    inner: RwLock<Inner>,
    on_ready: RwLock<Option<ReadyListener>>,
}

impl Default for ReadinessScheduler {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl ReadinessScheduler {
    pub fn new(role_caps: HashMap<String, usize>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                role_caps,
                ..Inner::default()
            }),
            on_ready: RwLock::new(None),
        }
    }

    /// Register a callback fired once per blocked -> ready transition.
    /// Invoked outside the scheduler lock.
    pub fn set_ready_listener(&self, listener: ReadyListener) {
        *self.on_ready.write().expect("listener lock poisoned") = Some(listener);
    }

    /// Build readiness state from a task snapshot.
    ///
    /// Fails when the dependency graph has a cycle; nothing is scheduled
    /// in that case.
    pub fn initialize(&self, tasks: &[Task]) -> Result<(), SchedulerError> {
        let resolver = DependencyResolver::new(tasks);
        if let Some(path) = resolver.detect_cycle() {
            return Err(crate::resolver::ResolverError::CycleDetected { path }.into());
        }

        let records = compute_readiness(tasks, &resolver);

        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        inner.records.clear();
        inner.ready_queues.clear();
        inner.blocked.clear();
        inner.active.clear();
        inner.task_index.clear();

        for task in tasks {
            inner
                .task_index
                .insert(task.id.clone(), task.workstream_key());
        }
        for (key, record) in records {
            let ready = record.is_ready();
            inner.records.insert(key.clone(), record);
            if ready {
                inner.insert_ready(key);
            } else {
                inner.blocked.insert(key);
            }
        }
        Ok(())
    }

    /// Pop the top-scored ready workstream for a role, or `None` when the
    /// role is at its concurrency cap or has nothing ready. The caller is
    /// expected to follow up with [`Self::activate`].
    pub fn next_for_role(&self, role: &str) -> Option<WorkstreamReadiness> {
        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        if inner.active_count(role) >= inner.cap(role) {
            return None;
        }
        let queue = inner.ready_queues.get_mut(role)?;
        let key = if queue.is_empty() {
            return None;
        } else {
            queue.remove(0)
        };
        if queue.is_empty() {
            inner.ready_queues.remove(role);
        }
        inner.records.get(&key).cloned()
    }

    /// Mark a workstream active.
    pub fn activate(&self, role: &str, workstream: &str) {
        let key = WorkstreamKey::new(role, workstream);
        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        inner.remove_ready(&key);
        inner.active.insert(key);
    }

    /// Mark a workstream inactive. It is not re-queued until the next
    /// [`Self::on_task_complete`] refresh.
    pub fn release(&self, role: &str, workstream: &str) {
        let key = WorkstreamKey::new(role, workstream);
        let mut inner = self.inner.write().expect("scheduler lock poisoned");
        inner.active.remove(&key);
    }

    /// Refresh readiness after a task completed, against a fresh task
    /// snapshot.
    ///
    /// Blocked records that gained a dispatchable task move into their
    /// role's ready queue (firing the ready listener once per transition);
    /// records that stay blocked are updated in place; active records keep
    /// their identity with refreshed counts. Workstreams with no remaining
    /// incomplete tasks are dropped.
    pub fn on_task_complete(&self, completed_id: &str, tasks: &[Task]) {
        let resolver = DependencyResolver::new(tasks);
        let fresh = compute_readiness(tasks, &resolver);

        let mut newly_ready: Vec<WorkstreamReadiness> = Vec::new();
        {
            let mut inner = self.inner.write().expect("scheduler lock poisoned");
            inner.task_index.clear();
            for task in tasks {
                inner
                    .task_index
                    .insert(task.id.clone(), task.workstream_key());
            }

            let blocked: Vec<WorkstreamKey> = inner.blocked.iter().cloned().collect();
            for key in blocked {
                match fresh.get(&key) {
                    Some(record) if record.is_ready() => {
                        inner.blocked.remove(&key);
                        inner.records.insert(key.clone(), record.clone());
                        inner.insert_ready(key);
                        newly_ready.push(record.clone());
                    }
                    Some(record) => {
                        inner.records.insert(key.clone(), record.clone());
                    }
                    // All tasks complete; nothing left to schedule.
                    None => {
                        inner.blocked.remove(&key);
                        inner.records.remove(&key);
                    }
                }
            }

            let active: Vec<WorkstreamKey> = inner.active.iter().cloned().collect();
            for key in active {
                match fresh.get(&key) {
                    Some(record) => {
                        inner.records.insert(key.clone(), record.clone());
                    }
                    None => {
                        // Counts go to zero but the record survives until
                        // the orchestrator releases the workstream.
                        if let Some(record) = inner.records.get_mut(&key) {
                            record.ready_count = 0;
                            record.blocked_count = 0;
                            record.total_count = 0;
                            record.first_ready_id = None;
                            record.first_ready_priority = None;
                        }
                    }
                }
            }

            // Released-but-unfinished workstreams sit in neither set; fold
            // them back in so a refresh can reschedule them.
            let queued: std::collections::HashSet<WorkstreamKey> = inner
                .ready_queues
                .values()
                .flatten()
                .cloned()
                .collect();
            let orphans: Vec<WorkstreamKey> = inner
                .records
                .keys()
                .filter(|key| {
                    !inner.blocked.contains(*key)
                        && !inner.active.contains(*key)
                        && !queued.contains(*key)
                })
                .cloned()
                .collect();
            for key in orphans {
                match fresh.get(&key) {
                    Some(record) if record.is_ready() => {
                        inner.records.insert(key.clone(), record.clone());
                        inner.insert_ready(key);
                    }
                    Some(record) => {
                        inner.records.insert(key.clone(), record.clone());
                        inner.blocked.insert(key);
                    }
                    None => {
                        inner.records.remove(&key);
                    }
                }
            }
        }

        if !newly_ready.is_empty() {
            tracing::debug!(
                completed = %completed_id,
                unblocked = newly_ready.len(),
                "workstreams became ready"
            );
            let listener = self.on_ready.read().expect("listener lock poisoned");
            if let Some(listener) = listener.as_ref() {
                for record in &newly_ready {
                    listener(record);
                }
            }
        }
    }

    /// Ready workstreams for a role in selection order.
    pub fn ready_workstreams(&self, role: &str) -> Vec<WorkstreamReadiness> {
        let inner = self.inner.read().expect("scheduler lock poisoned");
        inner
            .ready_queues
            .get(role)
            .map(|queue| {
                queue
                    .iter()
                    .filter_map(|key| inner.records.get(key).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Blocked workstreams for a role.
    pub fn blocked_workstreams(&self, role: &str) -> Vec<WorkstreamReadiness> {
        let inner = self.inner.read().expect("scheduler lock poisoned");
        inner
            .blocked
            .iter()
            .filter(|key| key.role == role)
            .filter_map(|key| inner.records.get(key).cloned())
            .collect()
    }

    pub fn active_count(&self, role: &str) -> usize {
        self.inner
            .read()
            .expect("scheduler lock poisoned")
            .active_count(role)
    }

    pub fn workstream_for_task(&self, task_id: &str) -> Option<WorkstreamKey> {
        self.inner
            .read()
            .expect("scheduler lock poisoned")
            .task_index
            .get(task_id)
            .cloned()
    }

    /// Look for a pair of roles that can make no progress because each
    /// waits on a workstream owned by the other.
    pub fn detect_potential_deadlock(&self) -> Option<DeadlockInfo> {
        let inner = self.inner.read().expect("scheduler lock poisoned");

        let mut roles: BTreeSet<&str> = BTreeSet::new();
        for key in inner.records.keys() {
            roles.insert(&key.role);
        }

        let blocked_by_role = |role: &str| -> Vec<&WorkstreamReadiness> {
            inner
                .blocked
                .iter()
                .filter(|key| key.role == role)
                .filter_map(|key| inner.records.get(key))
                .collect()
        };
        let has_ready = |role: &str| -> bool {
            inner.ready_queues.get(role).is_some_and(|q| !q.is_empty())
        };
        let waits_on_role = |records: &[&WorkstreamReadiness], other: &str| -> bool {
            records
                .iter()
                .any(|r| r.blockers.iter().any(|b| b.role == other))
        };

        let roles: Vec<&str> = roles.into_iter().collect();
        for (i, &r1) in roles.iter().enumerate() {
            for &r2 in &roles[i + 1..] {
                if has_ready(r1) || has_ready(r2) {
                    continue;
                }
                let b1 = blocked_by_role(r1);
                let b2 = blocked_by_role(r2);
                if b1.is_empty() || b2.is_empty() {
                    continue;
                }
                if waits_on_role(&b1, r2) && waits_on_role(&b2, r1) {
                    let mut wait_for = HashMap::new();
                    for record in b1.iter().chain(b2.iter()) {
                        wait_for.insert(record.key(), record.blockers.clone());
                    }
                    return Some(DeadlockInfo {
                        roles: vec![r1.to_owned(), r2.to_owned()],
                        wait_for,
                        suggestion: format!(
                            "roles {r1:?} and {r2:?} wait on each other's workstreams; \
                             raise their concurrency caps or break the cross-role dependency"
                        ),
                    });
                }
            }
        }
        None
    }
}

/// Compute readiness records for every workstream with at least one
/// non-`complete` task.
fn compute_readiness(
    tasks: &[Task],
    resolver: &DependencyResolver,
) -> HashMap<WorkstreamKey, WorkstreamReadiness> {
    let mut records: HashMap<WorkstreamKey, WorkstreamReadiness> = HashMap::new();

    for task in tasks {
        if task.status == TaskStatus::Complete {
            continue;
        }
        let key = task.workstream_key();
        let record = records.entry(key.clone()).or_insert_with(|| WorkstreamReadiness {
            project: task.project.clone(),
            role: key.role.clone(),
            workstream: key.workstream.clone(),
            ready_count: 0,
            blocked_count: 0,
            total_count: 0,
            first_ready_id: None,
            first_ready_priority: None,
            blockers: BTreeSet::new(),
            dependents: BTreeSet::new(),
        });
        record.total_count += 1;

        if resolver.is_blocked(&task.id) {
            record.blocked_count += 1;
            for blocker in resolver.blocking(&task.id) {
                if let Some(dep) = resolver.get(&blocker.id) {
                    let dep_key = dep.workstream_key();
                    if dep_key != key {
                        record.blockers.insert(dep_key);
                    }
                }
            }
        } else {
            record.ready_count += 1;
            let better = match record.first_ready_priority {
                None => true,
                Some(current) => task.priority.order() < current.order(),
            };
            if better {
                record.first_ready_id = Some(task.id.clone());
                record.first_ready_priority = Some(task.priority);
            }
        }
    }

    // Invert the blocker relation.
    let edges: Vec<(WorkstreamKey, WorkstreamKey)> = records
        .iter()
        .flat_map(|(key, record)| {
            record
                .blockers
                .iter()
                .map(move |blocker| (blocker.clone(), key.clone()))
        })
        .collect();
    for (blocker, dependent) in edges {
        if let Some(record) = records.get_mut(&blocker) {
            record.dependents.insert(dependent);
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Task, TaskStatus};

    fn task(id: &str, role: &str, workstream: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, id.to_uppercase(), role);
        t.workstream = workstream.to_owned();
        t.depends_on = deps.iter().map(|d| (*d).to_owned()).collect();
        t
    }

    #[test]
    fn every_workstream_is_ready_or_blocked_never_both() {
        let tasks = vec![
            task("a", "be", "A", &[]),
            task("b", "be", "B", &["a"]),
            task("c", "fe", "C", &[]),
        ];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("acyclic");

        for role in ["be", "fe"] {
            let ready: BTreeSet<WorkstreamKey> = scheduler
                .ready_workstreams(role)
                .iter()
                .map(WorkstreamReadiness::key)
                .collect();
            let blocked: BTreeSet<WorkstreamKey> = scheduler
                .blocked_workstreams(role)
                .iter()
                .map(WorkstreamReadiness::key)
                .collect();
            assert!(ready.is_disjoint(&blocked));
        }
        assert_eq!(scheduler.ready_workstreams("be").len(), 1);
        assert_eq!(scheduler.blocked_workstreams("be").len(), 1);
        assert_eq!(scheduler.ready_workstreams("fe").len(), 1);
    }

    #[test]
    fn ready_scores_strictly_outrank_blocked() {
        let tasks = vec![task("a", "be", "A", &[]), task("b", "be", "B", &["a"])];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("acyclic");

        let ready = scheduler.ready_workstreams("be");
        let blocked = scheduler.blocked_workstreams("be");
        for r in &ready {
            for b in &blocked {
                assert!(r.score() > b.score());
            }
        }
        assert_eq!(blocked[0].score(), 0);
    }

    #[test]
    fn counts_partition_noncomplete_tasks() {
        let mut done = task("a0", "be", "A", &[]);
        done.status = TaskStatus::Complete;
        let tasks = vec![
            done,
            task("a1", "be", "A", &[]),
            task("a2", "be", "A", &["missing"]),
        ];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("acyclic");

        let ready = scheduler.ready_workstreams("be");
        assert_eq!(ready.len(), 1);
        let record = &ready[0];
        assert_eq!(record.total_count, 2, "complete tasks are not counted");
        assert_eq!(record.ready_count + record.blocked_count, record.total_count);
    }

    #[test]
    fn same_role_chain_schedules_serially() {
        // S1: two lanes in one role, B depends on A, cap 1.
        let tasks = vec![task("a", "be", "A", &[]), task("b", "be", "B", &["a"])];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("acyclic");

        let first = scheduler.next_for_role("be").expect("A is ready");
        assert_eq!(first.workstream, "A");
        scheduler.activate("be", "A");

        assert!(scheduler.next_for_role("be").is_none(), "cap 1 reached");
        let blocked = scheduler.blocked_workstreams("be");
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].workstream, "B");

        // A completes.
        let mut refreshed = tasks.clone();
        refreshed[0].status = TaskStatus::Complete;
        scheduler.release("be", "A");
        scheduler.on_task_complete("a", &refreshed);

        assert!(scheduler.blocked_workstreams("be").is_empty());
        let ready = scheduler.ready_workstreams("be");
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].workstream, "B");
    }

    #[test]
    fn cross_role_wait_blocks_the_downstream_role() {
        // S2: fe waits on be within the same named lane.
        let tasks = vec![
            task("be-task", "be", "main", &[]),
            task("fe-task", "fe", "main", &["be-task"]),
        ];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("acyclic");

        assert_eq!(scheduler.next_for_role("be").unwrap().workstream, "main");
        assert!(scheduler.next_for_role("fe").is_none());
        assert_eq!(scheduler.blocked_workstreams("fe").len(), 1);
    }

    #[test]
    fn cycle_fails_initialization() {
        // S3: cross-role cycle.
        let tasks = vec![
            task("be-task", "be", "main", &["fe-task"]),
            task("fe-task", "fe", "main", &["be-task"]),
        ];
        let scheduler = ReadinessScheduler::default();
        let err = scheduler.initialize(&tasks).unwrap_err();
        assert!(matches!(err, SchedulerError::Cycle(_)));
    }

    #[test]
    fn highest_priority_first_ready_wins() {
        // S4: three ready lanes, first-ready priorities low/high/critical.
        let mut low = task("l", "be", "L", &[]);
        low.priority = Priority::Low;
        let mut high = task("h", "be", "H", &[]);
        high.priority = Priority::High;
        let mut crit = task("c", "be", "C", &[]);
        crit.priority = Priority::Critical;

        let mut caps = HashMap::new();
        caps.insert("be".to_owned(), 3);
        let scheduler = ReadinessScheduler::new(caps);
        scheduler.initialize(&[low, high, crit]).expect("acyclic");

        assert_eq!(scheduler.ready_workstreams("be").len(), 3);
        let first = scheduler.next_for_role("be").expect("ready");
        assert_eq!(first.workstream, "C");
        assert_eq!(first.first_ready_priority, Some(Priority::Critical));
    }

    #[test]
    fn dependents_raise_the_score() {
        let alone = task("x", "be", "X", &[]);
        let hub = task("h", "be", "H", &[]);
        let d1 = task("d1", "be", "D1", &["h"]);
        let d2 = task("d2", "be", "D2", &["h"]);

        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&[alone, hub, d1, d2]).expect("acyclic");

        let ready = scheduler.ready_workstreams("be");
        let hub_record = ready.iter().find(|r| r.workstream == "H").unwrap();
        let alone_record = ready.iter().find(|r| r.workstream == "X").unwrap();
        assert_eq!(hub_record.dependents.len(), 2);
        assert!(hub_record.score() > alone_record.score());
        assert_eq!(ready[0].workstream, "H", "hub should be queued first");
    }

    #[test]
    fn release_does_not_requeue() {
        // R3: activate + release leaves the lane out of the ready queue
        // until a completion refresh re-adds it.
        let tasks = vec![task("a", "be", "A", &[])];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("acyclic");

        let record = scheduler.next_for_role("be").expect("ready");
        scheduler.activate("be", &record.workstream);
        scheduler.release("be", &record.workstream);

        assert!(scheduler.ready_workstreams("be").is_empty());
        assert_eq!(scheduler.active_count("be"), 0);
    }

    #[test]
    fn ready_listener_fires_once_per_transition() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let tasks = vec![task("a", "be", "A", &[]), task("b", "be", "B", &["a"])];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("acyclic");

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        scheduler.set_ready_listener(Box::new(move |record| {
            assert_eq!(record.workstream, "B");
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut refreshed = tasks.clone();
        refreshed[0].status = TaskStatus::Complete;
        scheduler.on_task_complete("a", &refreshed);
        // Second refresh with the same state must not fire again.
        scheduler.on_task_complete("a", &refreshed);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detects_cross_role_deadlock() {
        // S7: both roles fully blocked, each waiting on the other. The
        // blockers reference lanes whose own tasks are incomplete but not
        // part of a graph cycle (they wait on a third, missing task), so
        // initialization succeeds.
        let tasks = vec![
            task("be-1", "be", "be-lane", &["fe-1"]),
            task("fe-1", "fe", "fe-lane", &["be-2"]),
            task("be-2", "be", "be-lane", &["ghost"]),
        ];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("no graph cycle");

        let info = scheduler
            .detect_potential_deadlock()
            .expect("deadlock should be detected");
        assert_eq!(info.roles.len(), 2);
        assert!(info.roles.contains(&"be".to_owned()));
        assert!(info.roles.contains(&"fe".to_owned()));
        assert!(!info.wait_for.is_empty());
        assert!(info.suggestion.contains("concurrency"));
    }

    #[test]
    fn no_deadlock_when_a_role_has_ready_work() {
        let tasks = vec![
            task("be-1", "be", "be-lane", &[]),
            task("fe-1", "fe", "fe-lane", &["be-1"]),
        ];
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&tasks).expect("acyclic");
        assert!(scheduler.detect_potential_deadlock().is_none());
    }

    #[test]
    fn empty_task_set_initializes_cleanly() {
        let scheduler = ReadinessScheduler::default();
        scheduler.initialize(&[]).expect("empty is fine");
        assert!(scheduler.next_for_role("be").is_none());
        assert!(scheduler.ready_workstreams("be").is_empty());
    }
}
