//! Engine configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::DEFAULT_MAX_ITERATIONS;

/// Tunables for the orchestrator and its components.
///
/// Library consumers construct one of these (usually from a config file or
/// CLI flags) and hand it to [`crate::Orchestrator::new`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How often the event loop refreshes task state and re-attempts
    /// assignment in the absence of events.
    pub poll_interval: Duration,
    /// Per-role concurrency caps. Roles not listed get a cap of 1.
    pub role_concurrency: HashMap<String, usize>,
    /// Spawn workers at startup for roles that have pending or blocked
    /// tasks but no registered worker.
    pub auto_spawn_workers: bool,
    /// Exit the event loop once no task can make further progress.
    pub stop_when_complete: bool,
    /// Sleep between iterations of an iterative runner loop.
    pub runner_cooldown: Duration,
    /// Wall-time limit for a completion verify command.
    pub verify_timeout: Duration,
    /// Working directory verify commands run in.
    pub verify_workdir: PathBuf,
    /// Capacity of the bounded event channel. Senders block when full.
    pub event_buffer_size: usize,
    /// Default iteration cap for tasks that do not override it.
    pub max_iterations: u32,
}

impl OrchestratorConfig {
    /// The concurrency cap for a role (default 1).
    pub fn role_cap(&self, role: &str) -> usize {
        self.role_concurrency.get(role).copied().unwrap_or(1)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            role_concurrency: HashMap::new(),
            auto_spawn_workers: false,
            stop_when_complete: false,
            runner_cooldown: Duration::from_secs(5),
            verify_timeout: Duration::from_secs(300),
            verify_workdir: PathBuf::from("."),
            event_buffer_size: 100,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_cap_defaults_to_one() {
        let mut config = OrchestratorConfig::default();
        assert_eq!(config.role_cap("be"), 1);

        config.role_concurrency.insert("be".to_owned(), 3);
        assert_eq!(config.role_cap("be"), 3);
        assert_eq!(config.role_cap("fe"), 1);
    }
}
