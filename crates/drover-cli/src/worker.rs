//! Process-backed worker source.
//!
//! Each worker is a registry record naming a shell command. A `run` call
//! spawns the command through `sh -c`, writes the prompt to its stdin,
//! and returns the merged output. Worker state persists through the
//! registry so separate invocations see the same fleet.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use drover_core::source::{SourceError, SpawnOptions, WorkerInfo, WorkerSource, WorkerStatus};
use drover_files::{WorkerRecord, WorkerRegistry};

/// `WorkerSource` that runs each worker as a subprocess per invocation.
pub struct ProcessWorkerSource {
    registry: WorkerRegistry,
    default_command: String,
    state: RwLock<HashMap<String, WorkerRecord>>,
}

impl ProcessWorkerSource {
    pub fn new(registry: WorkerRegistry, default_command: impl Into<String>) -> anyhow::Result<Self> {
        let records = registry.load()?;
        let state = records.into_iter().map(|r| (r.name.clone(), r)).collect();
        Ok(Self {
            registry,
            default_command: default_command.into(),
            state: RwLock::new(state),
        })
    }

    fn persist(&self) {
        let records: Vec<WorkerRecord> = {
            let state = self.state.read().expect("worker state lock poisoned");
            let mut records: Vec<WorkerRecord> = state.values().cloned().collect();
            records.sort_by(|a, b| a.name.cmp(&b.name));
            records
        };
        if let Err(e) = self.registry.save(&records) {
            tracing::warn!(error = %e, "failed to persist worker registry");
        }
    }

    fn set_status(&self, name: &str, status: WorkerStatus) -> Result<(), SourceError> {
        {
            let mut state = self.state.write().expect("worker state lock poisoned");
            let record = state
                .get_mut(name)
                .ok_or_else(|| SourceError::WorkerNotFound(name.to_owned()))?;
            record.status = status;
        }
        self.persist();
        Ok(())
    }

    fn command_for(&self, name: &str) -> Result<String, SourceError> {
        let state = self.state.read().expect("worker state lock poisoned");
        let record = state
            .get(name)
            .ok_or_else(|| SourceError::WorkerNotFound(name.to_owned()))?;
        Ok(record
            .command
            .clone()
            .unwrap_or_else(|| self.default_command.clone()))
    }
}

fn info(record: &WorkerRecord) -> WorkerInfo {
    WorkerInfo {
        name: record.name.clone(),
        role: record.role.clone(),
        status: record.status,
    }
}

#[async_trait]
impl WorkerSource for ProcessWorkerSource {
    async fn spawn(&self, name: &str, opts: SpawnOptions) -> Result<WorkerInfo, SourceError> {
        let mut record = WorkerRecord::new(name, opts.role);
        record.command = opts.command;
        let result = info(&record);
        self.state
            .write()
            .expect("worker state lock poisoned")
            .insert(name.to_owned(), record);
        self.persist();
        Ok(result)
    }

    async fn get(&self, name: &str) -> Result<WorkerInfo, SourceError> {
        let state = self.state.read().expect("worker state lock poisoned");
        state
            .get(name)
            .map(info)
            .ok_or_else(|| SourceError::WorkerNotFound(name.to_owned()))
    }

    async fn list(&self) -> Result<Vec<WorkerInfo>, SourceError> {
        let state = self.state.read().expect("worker state lock poisoned");
        let mut workers: Vec<WorkerInfo> = state.values().map(info).collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workers)
    }

    async fn start(&self, name: &str) -> Result<(), SourceError> {
        self.set_status(name, WorkerStatus::Idle)
    }

    async fn stop(&self, name: &str) -> Result<(), SourceError> {
        self.set_status(name, WorkerStatus::Stopped)
    }

    async fn remove(&self, name: &str, force: bool) -> Result<(), SourceError> {
        {
            let mut state = self.state.write().expect("worker state lock poisoned");
            let record = state
                .get(name)
                .ok_or_else(|| SourceError::WorkerNotFound(name.to_owned()))?;
            if record.status == WorkerStatus::Working && !force {
                return Err(SourceError::Other(format!(
                    "worker {name:?} is working; use force to remove it"
                )));
            }
            state.remove(name);
        }
        self.persist();
        Ok(())
    }

    async fn run(&self, name: &str, prompt: &str) -> Result<String, SourceError> {
        let command = self.command_for(name)?;
        self.set_status(name, WorkerStatus::Working)?;

        let outcome = invoke(&command, prompt).await;

        match outcome {
            Ok(output) => {
                self.set_status(name, WorkerStatus::Idle)?;
                Ok(output)
            }
            Err(message) => {
                self.set_status(name, WorkerStatus::Error)?;
                Err(SourceError::WorkerFailed {
                    worker: name.to_owned(),
                    message,
                })
            }
        }
    }
}

/// Run one worker command with the prompt on stdin; return merged output.
async fn invoke(command: &str, prompt: &str) -> Result<String, String> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn worker command: {e}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
            tracing::warn!(error = %e, "failed to write prompt to worker stdin");
        }
        drop(stdin); // Close stdin so the worker starts processing.
    }

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stdout_pipe {
            pipe.read_to_end(&mut buf).await.ok();
        }
        String::from_utf8_lossy(&buf).into_owned()
    };
    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stderr_pipe {
            pipe.read_to_end(&mut buf).await.ok();
        }
        String::from_utf8_lossy(&buf).into_owned()
    };

    let (wait_result, stdout, stderr) = tokio::join!(child.wait(), read_stdout, read_stderr);
    let status = wait_result.map_err(|e| format!("failed to wait on worker command: {e}"))?;

    let mut output = stdout;
    output.push_str(&stderr);
    if status.success() {
        Ok(output)
    } else {
        Err(format!(
            "worker command exited with {}: {}",
            status
                .code()
                .map_or_else(|| "signal".to_owned(), |c| c.to_string()),
            output.trim(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(dir: &std::path::Path, default_command: &str) -> ProcessWorkerSource {
        let registry = WorkerRegistry::new(dir.join("workers.json"));
        ProcessWorkerSource::new(registry, default_command).expect("empty registry loads")
    }

    #[tokio::test]
    async fn spawn_list_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let workers = source(dir.path(), "cat");

        workers
            .spawn(
                "be-1",
                SpawnOptions {
                    role: "be".to_owned(),
                    command: None,
                },
            )
            .await
            .expect("spawn");

        let listed = workers.list().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, WorkerStatus::Idle);

        workers.remove("be-1", false).await.expect("remove");
        assert!(workers.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_pipes_the_prompt_through_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let workers = source(dir.path(), "cat");
        workers
            .spawn(
                "be-1",
                SpawnOptions {
                    role: "be".to_owned(),
                    command: None,
                },
            )
            .await
            .unwrap();

        let output = workers.run("be-1", "hello worker").await.expect("run");
        assert_eq!(output, "hello worker");
        assert_eq!(workers.get("be-1").await.unwrap().status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn failing_command_marks_the_worker_errored() {
        let dir = tempfile::tempdir().unwrap();
        let workers = source(dir.path(), "echo boom >&2; exit 2");
        workers
            .spawn(
                "be-1",
                SpawnOptions {
                    role: "be".to_owned(),
                    command: None,
                },
            )
            .await
            .unwrap();

        let err = workers.run("be-1", "go").await.unwrap_err();
        assert!(matches!(err, SourceError::WorkerFailed { .. }));
        assert_eq!(
            workers.get("be-1").await.unwrap().status,
            WorkerStatus::Error
        );
    }

    #[tokio::test]
    async fn registry_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let workers = source(dir.path(), "cat");
            workers
                .spawn(
                    "fe-1",
                    SpawnOptions {
                        role: "fe".to_owned(),
                        command: Some("tr a-z A-Z".to_owned()),
                    },
                )
                .await
                .unwrap();
        }
        let workers = source(dir.path(), "cat");
        let listed = workers.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].role, "fe");

        let output = workers.run("fe-1", "shout").await.expect("run");
        assert_eq!(output, "SHOUT");
    }
}
