//! `drover run`: drive a task directory to completion.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use drover_core::orchestrator::Orchestrator;
use drover_core::source::{TaskSource, WorkerSource};
use drover_files::{FileTaskSource, WorkerRegistry};

use crate::config::ConfigFile;
use crate::worker::ProcessWorkerSource;

pub struct RunFlags {
    pub poll_interval_secs: Option<u64>,
    pub role_caps: Vec<(String, usize)>,
    pub auto_spawn: bool,
    pub watch: bool,
    pub worker_command: Option<String>,
}

pub async fn run(dir: &Path, flags: RunFlags, file: &ConfigFile) -> Result<()> {
    let mut config = file.to_orchestrator_config();
    if let Some(secs) = flags.poll_interval_secs {
        config.poll_interval = Duration::from_secs(secs.max(1));
    }
    for (role, cap) in flags.role_caps {
        config.role_concurrency.insert(role, cap);
    }
    config.auto_spawn_workers = config.auto_spawn_workers || flags.auto_spawn;
    config.stop_when_complete = !flags.watch;
    config.verify_workdir = dir.to_path_buf();

    let tasks: Arc<dyn TaskSource> = Arc::new(FileTaskSource::new(dir));
    let registry = WorkerRegistry::new(dir.join(".drover").join("workers.json"));
    let command = flags
        .worker_command
        .unwrap_or_else(|| file.workers.command.clone());
    let workers: Arc<dyn WorkerSource> = Arc::new(
        ProcessWorkerSource::new(registry, command).context("loading worker registry")?,
    );

    let orchestrator = Arc::new(Orchestrator::new(config, Arc::clone(&tasks), workers));

    // Ctrl-C requests a graceful stop; in-flight runners observe the
    // cancellation at their next iteration boundary.
    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping");
                let _ = orchestrator.stop();
            }
        })
    };

    let result = orchestrator.start().await;
    interrupt.abort();
    result?;

    let stats = tasks.stats().await?;
    let mut by_status: Vec<(String, usize)> = stats
        .by_status
        .iter()
        .map(|(status, count)| (status.to_string(), *count))
        .collect();
    by_status.sort();
    let rendered: Vec<String> = by_status
        .iter()
        .map(|(status, count)| format!("{status}={count}"))
        .collect();
    println!("run finished: {} task(s), {}", stats.total, rendered.join(" "));

    Ok(())
}
