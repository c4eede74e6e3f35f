//! Dependency queries over an immutable snapshot of tasks.
//!
//! The resolver indexes a task set by ID and answers blocking, readiness,
//! ordering, and cycle questions. It never mutates tasks; the orchestrator
//! rebuilds it from a fresh scan whenever task state changes.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use thiserror::Error;

use crate::model::{Task, TaskStatus};

/// Errors from dependency resolution.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },
}

/// One unmet dependency of a task.
///
/// `found` is false when the dependency ID does not exist in the task set;
/// such dependencies block forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocker {
    pub id: String,
    pub found: bool,
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.found {
            f.write_str(&self.id)
        } else {
            write!(f, "{} (not found)", self.id)
        }
    }
}

/// Immutable dependency index over a task snapshot.
pub struct DependencyResolver {
    tasks: HashMap<String, Task>,
    /// Task IDs in declaration order.
    order: Vec<String>,
}

impl DependencyResolver {
    pub fn new(tasks: &[Task]) -> Self {
        let order = tasks.iter().map(|t| t.id.clone()).collect();
        let tasks = tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();
        Self { tasks, order }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether any dependency of the task is unknown or not `complete`.
    /// Unknown tasks are themselves treated as blocked.
    pub fn is_blocked(&self, id: &str) -> bool {
        let Some(task) = self.tasks.get(id) else {
            return true;
        };
        task.depends_on.iter().any(|dep| {
            self.tasks
                .get(dep)
                .is_none_or(|d| d.status != TaskStatus::Complete)
        })
    }

    /// The incomplete or missing dependencies of a task, in declaration
    /// order.
    pub fn blocking(&self, id: &str) -> Vec<Blocker> {
        let Some(task) = self.tasks.get(id) else {
            return Vec::new();
        };
        task.depends_on
            .iter()
            .filter_map(|dep| match self.tasks.get(dep) {
                Some(d) if d.status == TaskStatus::Complete => None,
                Some(_) => Some(Blocker {
                    id: dep.clone(),
                    found: true,
                }),
                None => Some(Blocker {
                    id: dep.clone(),
                    found: false,
                }),
            })
            .collect()
    }

    /// All `pending` tasks whose dependencies are all `complete`, in
    /// declaration order.
    pub fn ready(&self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.status == TaskStatus::Pending && !self.is_blocked(&t.id))
            .cloned()
            .collect()
    }

    /// Tasks in dependency order via Kahn's algorithm.
    ///
    /// Cycles are detected separately first so the error carries the actual
    /// cycle path rather than just the residue of the sort.
    pub fn topological_sort(&self) -> Result<Vec<Task>, ResolverError> {
        if let Some(path) = self.detect_cycle() {
            return Err(ResolverError::CycleDetected { path });
        }

        let idx: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let n = self.order.len();
        let mut in_degree = vec![0usize; n];
        let mut adj: Vec<Vec<usize>> = vec![vec![]; n];

        for (i, id) in self.order.iter().enumerate() {
            for dep in &self.tasks[id].depends_on {
                // Edges only between known tasks; a missing dependency has
                // no node to order against.
                if let Some(&dep_idx) = idx.get(dep.as_str()) {
                    adj[dep_idx].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            sorted.push(self.tasks[&self.order[node]].clone());
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        Ok(sorted)
    }

    /// Find a dependency cycle, if any, with three-color DFS.
    ///
    /// Returns the cycle path in traversal order, starting and ending at
    /// the node the back edge landed on (a self-loop yields `[a, a]`).
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&str, Color> =
            self.order.iter().map(|id| (id.as_str(), Color::White)).collect();
        let mut parent: HashMap<&str, &str> = HashMap::new();

        fn visit<'a>(
            resolver: &'a DependencyResolver,
            node: &'a str,
            color: &mut HashMap<&'a str, Color>,
            parent: &mut HashMap<&'a str, &'a str>,
        ) -> Option<Vec<String>> {
            color.insert(node, Color::Gray);
            if let Some(task) = resolver.tasks.get(node) {
                for dep in &task.depends_on {
                    match color.get(dep.as_str()).copied() {
                        // Unknown dependency: blocks, but cannot cycle.
                        None => continue,
                        Some(Color::Gray) => {
                            // Back edge node -> dep: walk parents from node
                            // back to dep to recover the cycle.
                            let mut walk = vec![node.to_owned()];
                            let mut cur = node;
                            while cur != dep.as_str() {
                                match parent.get(cur) {
                                    Some(&p) => {
                                        cur = p;
                                        walk.push(cur.to_owned());
                                    }
                                    None => break,
                                }
                            }
                            // walk is node..=dep; reverse to traversal order
                            // and close the loop. A self-loop yields [a, a].
                            walk.reverse();
                            walk.push(dep.clone());
                            return Some(walk);
                        }
                        Some(Color::Black) => continue,
                        Some(Color::White) => {
                            parent.insert(dep.as_str(), node);
                            if let Some(cycle) = visit(resolver, dep, color, parent) {
                                return Some(cycle);
                            }
                        }
                    }
                }
            }
            color.insert(node, Color::Black);
            None
        }

        for id in &self.order {
            if color[id.as_str()] == Color::White {
                if let Some(cycle) = visit(self, id, &mut color, &mut parent) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Tasks grouped by dependency depth: tasks with no dependencies at
    /// level 0, every other task at `1 + max(level of dependencies)`.
    pub fn levels(&self) -> Vec<Vec<Task>> {
        fn depth<'a>(
            resolver: &'a DependencyResolver,
            id: &'a str,
            memo: &mut HashMap<&'a str, usize>,
            visiting: &mut BTreeSet<&'a str>,
        ) -> usize {
            if let Some(&d) = memo.get(id) {
                return d;
            }
            // Cycle guard; meaningful levels require an acyclic graph.
            if !visiting.insert(id) {
                return 0;
            }
            let d = match resolver.tasks.get(id) {
                Some(task) => task
                    .depends_on
                    .iter()
                    .filter(|dep| resolver.tasks.contains_key(dep.as_str()))
                    .map(|dep| 1 + depth(resolver, dep, memo, visiting))
                    .max()
                    .unwrap_or(0),
                None => 0,
            };
            visiting.remove(id);
            memo.insert(id, d);
            d
        }

        let mut memo = HashMap::new();
        let mut visiting = BTreeSet::new();
        let mut levels: Vec<Vec<Task>> = Vec::new();
        for id in &self.order {
            let d = depth(self, id, &mut memo, &mut visiting);
            while levels.len() <= d {
                levels.push(Vec::new());
            }
            levels[d].push(self.tasks[id].clone());
        }
        levels
    }

    /// For each workstream, the set of other workstreams it waits on,
    /// derived from dependency edges that cross workstream boundaries.
    pub fn cross_workstream_deps(&self) -> HashMap<String, BTreeSet<String>> {
        let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();
        for id in &self.order {
            let task = &self.tasks[id];
            let own = task.effective_workstream();
            for dep in &task.depends_on {
                if let Some(dep_task) = self.tasks.get(dep) {
                    let theirs = dep_task.effective_workstream();
                    if theirs != own {
                        map.entry(own.to_owned()).or_default().insert(theirs.to_owned());
                    }
                }
            }
        }
        map
    }
}
