//! Completion validation.
//!
//! Given a task's completion criteria and a worker's textual output,
//! decide the next status. Verify commands run through a shell with a
//! timeout; a non-zero exit is a semantic "verification failed" (review),
//! not a spawn error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::model::{Task, TaskStatus};

/// Outcome of validating one worker response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every specified criterion is satisfied.
    Complete,
    /// The completion signal has not appeared yet; keep working.
    InProgress,
    /// Needs a human look: no criteria, or the verify command exited
    /// non-zero.
    Review { reason: String },
    /// Hard failure: verify timed out or could not be run.
    Failed { reason: String },
}

impl Verdict {
    /// The task status this verdict maps to.
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Complete => TaskStatus::Complete,
            Self::InProgress => TaskStatus::InProgress,
            Self::Review { .. } => TaskStatus::Review,
            Self::Failed { .. } => TaskStatus::Failed,
        }
    }
}

enum VerifyOutcome {
    Passed,
    ExitNonZero { code: Option<i32>, output: String },
    TimedOut,
    SpawnError(std::io::Error),
}

/// Evaluates completion criteria against worker output.
#[derive(Debug, Clone)]
pub struct Validator {
    verify_timeout: Duration,
    workdir: PathBuf,
}

impl Validator {
    pub fn new(verify_timeout: Duration, workdir: impl Into<PathBuf>) -> Self {
        Self {
            verify_timeout,
            workdir: workdir.into(),
        }
    }

    /// Apply the decision table, in order: no criteria -> review; missing
    /// signal -> keep working; verify timeout/spawn failure -> failed;
    /// verify non-zero -> review; otherwise complete.
    pub async fn validate(&self, task: &Task, output: &str) -> Verdict {
        let Some(completion) = task.completion.as_ref().filter(|c| c.has_criteria()) else {
            return Verdict::Review {
                reason: "no completion criteria".to_owned(),
            };
        };

        if let Some(signal) = &completion.signal {
            if !output.contains(signal.as_str()) {
                return Verdict::InProgress;
            }
        }

        if let Some(verify) = &completion.verify {
            match run_verify(verify, &self.workdir, self.verify_timeout).await {
                VerifyOutcome::Passed => {}
                VerifyOutcome::ExitNonZero { code, output } => {
                    return Verdict::Review {
                        reason: format!(
                            "verification command exited with {} ({})",
                            code.map_or_else(|| "signal".to_owned(), |c| c.to_string()),
                            tail(&output, 400),
                        ),
                    };
                }
                VerifyOutcome::TimedOut => {
                    return Verdict::Failed {
                        reason: format!(
                            "verification command timed out after {}s",
                            self.verify_timeout.as_secs()
                        ),
                    };
                }
                VerifyOutcome::SpawnError(e) => {
                    return Verdict::Failed {
                        reason: format!("failed to run verification command: {e}"),
                    };
                }
            }
        }

        Verdict::Complete
    }
}

/// Run a verify command through `sh -c` and capture merged output.
async fn run_verify(command: &str, workdir: &Path, timeout: Duration) -> VerifyOutcome {
    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return VerifyOutcome::SpawnError(e),
    };

    // Read both pipes concurrently with waiting, so a chatty command
    // cannot deadlock on a full pipe buffer.
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

    match tokio::time::timeout(timeout, async {
        let (wait_result, stdout, stderr) = tokio::join!(child.wait(), read_stdout, read_stderr);
        (wait_result, stdout, stderr)
    })
    .await
    {
        Ok((Ok(status), stdout, stderr)) => {
            if status.success() {
                VerifyOutcome::Passed
            } else {
                let mut output = stdout;
                output.push_str(&stderr);
                VerifyOutcome::ExitNonZero {
                    code: status.code(),
                    output,
                }
            }
        }
        Ok((Err(e), _, _)) => VerifyOutcome::SpawnError(e),
        Err(_elapsed) => {
            let _ = child.kill().await;
            VerifyOutcome::TimedOut
        }
    }
}

fn tail(s: &str, max: usize) -> &str {
    let trimmed = s.trim();
    match trimmed.char_indices().nth_back(max.saturating_sub(1)) {
        Some((i, _)) => &trimmed[i..],
        None => trimmed,
    }
}
