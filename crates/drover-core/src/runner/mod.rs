//! Task execution: drive a single task on a single worker to a verdict.
//!
//! Tasks without machine-checkable criteria run single-shot: one worker
//! invocation, classified by the validator. Tasks with a verify command or
//! completion signal run iteratively ("re-run until verified"): the worker
//! is invoked up to the iteration cap, with a cooldown between rounds,
//! until the criteria hold or the task fails.

pub mod validator;

pub use validator::{Validator, Verdict};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::model::{Task, TaskStatus};
use crate::source::{SourceError, TaskSource, WorkerSource};
use crate::tracker::{StatusTracker, TrackerError};

/// Errors from running a task.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("task run cancelled")]
    Cancelled,

    #[error("max iterations ({0}) reached without completion")]
    MaxIterations(u32),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("worker invocation failed: {0}")]
    WorkerFailed(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Executes one task on one worker.
pub struct TaskRunner {
    tasks: Arc<dyn TaskSource>,
    workers: Arc<dyn WorkerSource>,
    validator: Validator,
    tracker: Arc<StatusTracker>,
    cooldown: Duration,
    default_max_iterations: u32,
}

impl TaskRunner {
    pub fn new(
        tasks: Arc<dyn TaskSource>,
        workers: Arc<dyn WorkerSource>,
        config: &OrchestratorConfig,
        tracker: Arc<StatusTracker>,
    ) -> Self {
        Self {
            tasks,
            workers,
            validator: Validator::new(config.verify_timeout, config.verify_workdir.clone()),
            tracker,
            cooldown: config.runner_cooldown,
            default_max_iterations: config.max_iterations,
        }
    }

    /// Assemble the worker prompt: title, body, and — when criteria are
    /// set — explicit completion instructions.
    pub fn build_prompt(task: &Task) -> String {
        let mut prompt = format!("# Task: {}\n\n{}", task.title, task.content);
        if let Some(completion) = task.completion.as_ref().filter(|c| c.has_criteria()) {
            prompt.push_str("\n\n## Completion Instructions\n");
            if let Some(verify) = &completion.verify {
                prompt.push_str(&format!(
                    "\n- The command `{verify}` must exit successfully when you are done."
                ));
            }
            if let Some(signal) = &completion.signal {
                prompt.push_str(&format!(
                    "\n- When every criterion is met, output the exact string: {signal}"
                ));
            }
            prompt.push_str("\n\nDo not say you are done until all criteria are met.\n");
        }
        prompt
    }

    /// Drive one task to a verdict. Honors cancellation at iteration
    /// boundaries and during cooldown.
    pub async fn run_task(
        &self,
        cancel: &CancellationToken,
        task_id: &str,
        worker: &str,
    ) -> Result<(), RunnerError> {
        let task = self.tasks.get(task_id).await?;
        let prompt = Self::build_prompt(&task);

        self.set_status(&task, task.status, TaskStatus::InProgress, worker, None)
            .await?;

        if task.is_iterative() {
            self.run_iterative(cancel, &task, &prompt, worker).await
        } else {
            self.run_single_shot(&task, &prompt, worker).await
        }
    }

    /// One invocation, one verdict.
    async fn run_single_shot(
        &self,
        task: &Task,
        prompt: &str,
        worker: &str,
    ) -> Result<(), RunnerError> {
        let output = match self.workers.run(worker, prompt).await {
            Ok(output) => output,
            Err(e) => {
                let message = e.to_string();
                self.mark_failed(task, worker, &message).await?;
                return Err(RunnerError::WorkerFailed(message));
            }
        };

        match self.validator.validate(task, &output).await {
            Verdict::Complete => {
                self.set_status(task, TaskStatus::InProgress, TaskStatus::Complete, worker, None)
                    .await?;
                self.tasks.unassign(&task.id).await?;
                Ok(())
            }
            Verdict::Review { reason } => {
                self.set_status(
                    task,
                    TaskStatus::InProgress,
                    TaskStatus::Review,
                    worker,
                    Some(&reason),
                )
                .await?;
                Ok(())
            }
            Verdict::InProgress => Ok(()),
            Verdict::Failed { reason } => {
                self.mark_failed(task, worker, &reason).await?;
                Err(RunnerError::VerificationFailed(reason))
            }
        }
    }

    /// Re-run until verified, up to the iteration cap. Every worker
    /// invocation counts toward the cap, including ones that errored.
    async fn run_iterative(
        &self,
        cancel: &CancellationToken,
        task: &Task,
        prompt: &str,
        worker: &str,
    ) -> Result<(), RunnerError> {
        let max = task
            .completion
            .as_ref()
            .map(|c| c.effective_max_iterations(self.default_max_iterations))
            .unwrap_or(self.default_max_iterations);

        for iteration in 1..=max {
            if cancel.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }

            match self.workers.run(worker, prompt).await {
                Ok(output) => match self.validator.validate(task, &output).await {
                    Verdict::Complete => {
                        tracing::info!(
                            task_id = %task.id,
                            worker = %worker,
                            iteration,
                            "task completed"
                        );
                        self.set_status(
                            task,
                            TaskStatus::InProgress,
                            TaskStatus::Complete,
                            worker,
                            None,
                        )
                        .await?;
                        self.tasks.unassign(&task.id).await?;
                        return Ok(());
                    }
                    Verdict::Failed { reason } => {
                        self.mark_failed(task, worker, &reason).await?;
                        return Err(RunnerError::VerificationFailed(reason));
                    }
                    Verdict::InProgress | Verdict::Review { .. } => {
                        tracing::debug!(
                            task_id = %task.id,
                            iteration,
                            max,
                            "criteria not yet met, continuing"
                        );
                    }
                },
                Err(e) => {
                    // Transient worker errors do not terminate the loop,
                    // but the invocation still counted.
                    tracing::warn!(
                        task_id = %task.id,
                        worker = %worker,
                        iteration,
                        error = %e,
                        "worker invocation failed, continuing"
                    );
                }
            }

            if iteration < max {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
                    _ = tokio::time::sleep(self.cooldown) => {}
                }
            }
        }

        self.set_status(
            task,
            TaskStatus::InProgress,
            TaskStatus::Review,
            worker,
            Some("max iterations reached"),
        )
        .await?;
        Err(RunnerError::MaxIterations(max))
    }

    async fn mark_failed(&self, task: &Task, worker: &str, reason: &str) -> Result<(), RunnerError> {
        self.set_status(
            task,
            TaskStatus::InProgress,
            TaskStatus::Failed,
            worker,
            Some(reason),
        )
        .await?;
        self.tasks.update_failure(&task.id, reason, None).await?;
        Ok(())
    }

    async fn set_status(
        &self,
        task: &Task,
        from: TaskStatus,
        to: TaskStatus,
        worker: &str,
        message: Option<&str>,
    ) -> Result<(), RunnerError> {
        self.tracker
            .record_change(&task.id, Some(from), to, Some(worker), message)?;
        self.tasks.update_status(&task.id, to).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Completion;

    #[test]
    fn prompt_without_criteria_is_title_and_body() {
        let mut task = Task::new("t-1", "Wire the API", "be");
        task.content = "Add the /users endpoint.".to_owned();

        let prompt = TaskRunner::build_prompt(&task);
        assert_eq!(prompt, "# Task: Wire the API\n\nAdd the /users endpoint.");
    }

    #[test]
    fn prompt_with_criteria_states_them_literally() {
        let mut task = Task::new("t-1", "Wire the API", "be");
        task.content = "Add the /users endpoint.".to_owned();
        task.completion = Some(Completion {
            verify: Some("cargo test".to_owned()),
            signal: Some("USERS_DONE".to_owned()),
            max_iterations: None,
        });

        let prompt = TaskRunner::build_prompt(&task);
        assert!(prompt.contains("## Completion Instructions"));
        assert!(prompt.contains("`cargo test`"));
        assert!(prompt.contains("output the exact string: USERS_DONE"));
        assert!(prompt.contains("Do not say you are done until all criteria are met."));
    }

    #[test]
    fn prompt_with_empty_completion_has_no_instructions() {
        let mut task = Task::new("t-1", "Wire the API", "be");
        task.completion = Some(Completion::default());
        let prompt = TaskRunner::build_prompt(&task);
        assert!(!prompt.contains("Completion Instructions"));
    }
}
