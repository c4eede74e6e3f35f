//! Workstream-partitioned, priority-ordered task queue.
//!
//! Holds pending-but-ready work. Each workstream gets its own binary heap
//! ordered by priority, partitioned by the workstream key's string form
//! (`role:workstream`) so that same-named lanes of different roles stay
//! separate; a task with no declared workstream is partitioned under its
//! own ID. All operations are safe for concurrent callers.

use std::collections::{BinaryHeap, HashMap};
use std::sync::RwLock;

use serde::Serialize;
use thiserror::Error;

use crate::model::{Priority, Task};

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no tasks queued for workstream {0:?}")]
    NoTasks(String),

    #[error("cannot enqueue a task with an empty ID")]
    EmptyTaskId,
}

/// Heap entry ordered purely by priority; higher priority (lower order)
/// pops first. Ties are broken arbitrarily.
struct Entry(Task);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority.order() == other.0.priority.order()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap and lower order wins.
        other.0.priority.order().cmp(&self.0.priority.order())
    }
}

/// Aggregate queue counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub by_workstream: HashMap<String, usize>,
    pub by_priority: HashMap<Priority, usize>,
}

/// Thread-safe priority queue, partitioned by workstream.
#[derive(Default)]
pub struct PriorityQueue {
    partitions: RwLock<HashMap<String, BinaryHeap<Entry>>>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        if task.id.is_empty() {
            return Err(QueueError::EmptyTaskId);
        }
        let key = task.workstream_key().to_string();
        let mut partitions = self.partitions.write().expect("queue lock poisoned");
        partitions.entry(key).or_default().push(Entry(task));
        Ok(())
    }

    pub fn enqueue_all(&self, tasks: Vec<Task>) -> Result<(), QueueError> {
        for task in tasks {
            self.enqueue(task)?;
        }
        Ok(())
    }

    /// Pop the highest-priority task for a workstream.
    pub fn dequeue(&self, workstream: &str) -> Result<Task, QueueError> {
        let mut partitions = self.partitions.write().expect("queue lock poisoned");
        let heap = partitions
            .get_mut(workstream)
            .ok_or_else(|| QueueError::NoTasks(workstream.to_owned()))?;
        let entry = heap
            .pop()
            .ok_or_else(|| QueueError::NoTasks(workstream.to_owned()))?;
        if heap.is_empty() {
            partitions.remove(workstream);
        }
        Ok(entry.0)
    }

    /// Drain a workstream's partition in priority order.
    pub fn dequeue_all(&self, workstream: &str) -> Vec<Task> {
        let mut partitions = self.partitions.write().expect("queue lock poisoned");
        match partitions.remove(workstream) {
            Some(heap) => heap.into_sorted_vec().into_iter().rev().map(|e| e.0).collect(),
            None => Vec::new(),
        }
    }

    /// The highest-priority task for a workstream, without removing it.
    pub fn peek(&self, workstream: &str) -> Result<Task, QueueError> {
        let partitions = self.partitions.read().expect("queue lock poisoned");
        partitions
            .get(workstream)
            .and_then(|heap| heap.peek())
            .map(|entry| entry.0.clone())
            .ok_or_else(|| QueueError::NoTasks(workstream.to_owned()))
    }

    /// Remove a task by ID, scanning all partitions. Returns whether a
    /// task was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut partitions = self.partitions.write().expect("queue lock poisoned");
        let mut hit_key: Option<String> = None;
        for (key, heap) in partitions.iter() {
            if heap.iter().any(|entry| entry.0.id == id) {
                hit_key = Some(key.clone());
                break;
            }
        }
        let Some(key) = hit_key else {
            return false;
        };
        let heap = partitions.get_mut(&key).expect("partition exists");
        let mut kept: Vec<Entry> = Vec::with_capacity(heap.len().saturating_sub(1));
        let mut removed = false;
        for entry in heap.drain() {
            if !removed && entry.0.id == id {
                removed = true;
            } else {
                kept.push(entry);
            }
        }
        heap.extend(kept);
        if heap.is_empty() {
            partitions.remove(&key);
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        let partitions = self.partitions.read().expect("queue lock poisoned");
        partitions
            .values()
            .any(|heap| heap.iter().any(|entry| entry.0.id == id))
    }

    pub fn size(&self) -> usize {
        let partitions = self.partitions.read().expect("queue lock poisoned");
        partitions.values().map(BinaryHeap::len).sum()
    }

    pub fn size_by_workstream(&self, workstream: &str) -> usize {
        let partitions = self.partitions.read().expect("queue lock poisoned");
        partitions.get(workstream).map_or(0, BinaryHeap::len)
    }

    /// Keys of all non-empty partitions.
    pub fn workstreams(&self) -> Vec<String> {
        let partitions = self.partitions.read().expect("queue lock poisoned");
        partitions
            .iter()
            .filter(|(_, heap)| !heap.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.partitions.write().expect("queue lock poisoned").clear();
    }

    pub fn stats(&self) -> QueueStats {
        let partitions = self.partitions.read().expect("queue lock poisoned");
        let mut stats = QueueStats::default();
        for (key, heap) in partitions.iter() {
            stats.total += heap.len();
            *stats.by_workstream.entry(key.clone()).or_default() += heap.len();
            for entry in heap.iter() {
                *stats.by_priority.entry(entry.0.priority).or_default() += 1;
            }
        }
        stats
    }
}
