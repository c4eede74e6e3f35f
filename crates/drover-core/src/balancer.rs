//! Worker load accounting and selection.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use rand::Rng;
use thiserror::Error;

use crate::model::Task;
use crate::source::{WorkerInfo, WorkerStatus};

/// Errors from worker selection.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("no workers with role {0:?}")]
    NoRoleMatch(String),

    #[error("no idle workers with role {0:?}")]
    NoIdleWorker(String),
}

/// How to pick among idle workers of the right role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    LeastLoaded,
    RoundRobin,
    Random,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LeastLoaded => "least_loaded",
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
        };
        f.write_str(s)
    }
}

impl FromStr for Strategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "least_loaded" => Ok(Self::LeastLoaded),
            "round_robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            other => Err(StrategyParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Strategy`] string.
#[derive(Debug, Clone)]
pub struct StrategyParseError(pub String);

impl fmt::Display for StrategyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid balance strategy: {:?}", self.0)
    }
}

impl std::error::Error for StrategyParseError {}

#[derive(Default)]
struct Inner {
    /// Active task count per worker. Never negative.
    loads: HashMap<String, usize>,
    rr_cursor: usize,
}

/// Tracks per-worker load and assigns tasks by strategy.
pub struct Balancer {
    strategy: Strategy,
    inner: RwLock<Inner>,
}

impl Default for Balancer {
    fn default() -> Self {
        Self::new(Strategy::default())
    }
}

impl Balancer {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn track_assignment(&self, worker: &str) {
        let mut inner = self.inner.write().expect("balancer lock poisoned");
        *inner.loads.entry(worker.to_owned()).or_default() += 1;
    }

    pub fn track_completion(&self, worker: &str) {
        let mut inner = self.inner.write().expect("balancer lock poisoned");
        if let Some(load) = inner.loads.get_mut(worker) {
            *load = load.saturating_sub(1);
        }
    }

    pub fn load(&self, worker: &str) -> usize {
        let inner = self.inner.read().expect("balancer lock poisoned");
        inner.loads.get(worker).copied().unwrap_or(0)
    }

    /// Pick a worker for a task: filter to the task's role, then to idle
    /// workers, then select by strategy.
    pub fn assign_task(&self, task: &Task, workers: &[WorkerInfo]) -> Result<WorkerInfo, BalanceError> {
        let role_matched: Vec<&WorkerInfo> =
            workers.iter().filter(|w| w.role == task.role).collect();
        if role_matched.is_empty() {
            return Err(BalanceError::NoRoleMatch(task.role.clone()));
        }

        let idle: Vec<&WorkerInfo> = role_matched
            .into_iter()
            .filter(|w| w.status == WorkerStatus::Idle)
            .collect();
        if idle.is_empty() {
            return Err(BalanceError::NoIdleWorker(task.role.clone()));
        }

        let mut inner = self.inner.write().expect("balancer lock poisoned");
        let picked = match self.strategy {
            Strategy::LeastLoaded => idle
                .iter()
                .min_by_key(|w| inner.loads.get(&w.name).copied().unwrap_or(0))
                .expect("idle is non-empty"),
            Strategy::RoundRobin => {
                let pick = &idle[inner.rr_cursor % idle.len()];
                inner.rr_cursor = inner.rr_cursor.wrapping_add(1);
                pick
            }
            Strategy::Random => {
                let i = rand::rng().random_range(0..idle.len());
                &idle[i]
            }
        };
        Ok((*picked).clone())
    }
}
