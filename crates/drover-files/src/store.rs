//! Directory-backed task source.
//!
//! Tasks are `*.md` descriptor files in a flat directory. A scan is a full
//! rediscovery; unparseable files are logged and skipped rather than
//! failing the whole scan. Every mutation rewrites the task's file with
//! owner-only permissions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use drover_core::model::{Task, TaskStatus};
use drover_core::source::{SourceError, TaskSource, TaskStats};

use crate::descriptor::TaskDocument;

/// `TaskSource` over a directory of descriptor files.
pub struct FileTaskSource {
    dir: PathBuf,
    /// Task ID -> descriptor path, refreshed on every scan.
    index: RwLock<HashMap<String, PathBuf>>,
}

impl FileTaskSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every parseable descriptor, in file-name order.
    fn load_all(&self) -> Result<Vec<TaskDocument>, SourceError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        let mut index = HashMap::with_capacity(paths.len());
        for path in paths {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read descriptor, skipping");
                    continue;
                }
            };
            match TaskDocument::parse(&content) {
                Ok(doc) => {
                    index.insert(doc.task.id.clone(), path);
                    docs.push(doc);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot parse descriptor, skipping");
                }
            }
        }

        *self.index.write().expect("index lock poisoned") = index;
        Ok(docs)
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, SourceError> {
        if let Some(path) = self.index.read().expect("index lock poisoned").get(id) {
            return Ok(path.clone());
        }
        // Index may be stale; rescan once before giving up.
        self.load_all()?;
        self.index
            .read()
            .expect("index lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::TaskNotFound(id.to_owned()))
    }

    fn load(&self, id: &str) -> Result<TaskDocument, SourceError> {
        let path = self.path_for(id)?;
        let content = std::fs::read_to_string(&path)?;
        TaskDocument::parse(&content)
            .map_err(|e| SourceError::Other(format!("{}: {e}", path.display())))
    }

    fn write(&self, doc: &TaskDocument) -> Result<(), SourceError> {
        let path = self.path_for(&doc.task.id)?;
        let rendered = doc
            .render()
            .map_err(|e| SourceError::Other(format!("{}: {e}", path.display())))?;
        std::fs::write(&path, rendered)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Load, mutate, and rewrite one descriptor.
    fn mutate(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Task) -> Result<(), SourceError>,
    ) -> Result<(), SourceError> {
        let mut doc = self.load(id)?;
        apply(&mut doc.task)?;
        self.write(&doc)
    }
}

#[async_trait]
impl TaskSource for FileTaskSource {
    async fn scan(&self) -> Result<Vec<Task>, SourceError> {
        Ok(self.load_all()?.into_iter().map(|doc| doc.task).collect())
    }

    async fn get(&self, id: &str) -> Result<Task, SourceError> {
        Ok(self.load(id)?.task)
    }

    async fn get_by_role(&self, role: &str) -> Result<Vec<Task>, SourceError> {
        let tasks = self.scan().await?;
        Ok(tasks.into_iter().filter(|t| t.role == role).collect())
    }

    async fn get_by_workstream(&self, workstream: &str) -> Result<Vec<Task>, SourceError> {
        let tasks = self.scan().await?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.effective_workstream() == workstream)
            .collect())
    }

    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, SourceError> {
        let tasks = self.scan().await?;
        Ok(tasks.into_iter().filter(|t| t.status == status).collect())
    }

    async fn get_pending(&self) -> Result<Vec<Task>, SourceError> {
        let mut pending: Vec<Task> = self
            .scan()
            .await?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        pending.sort_by_key(|t| t.priority.order());
        Ok(pending)
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), SourceError> {
        self.mutate(id, |task| {
            task.status = status;
            match status {
                TaskStatus::InProgress if task.started_at.is_none() => {
                    task.started_at = Some(Utc::now());
                }
                TaskStatus::Complete => {
                    task.completed_at = Some(Utc::now());
                }
                _ => {}
            }
            Ok(())
        })
    }

    async fn update_failure(
        &self,
        id: &str,
        message: &str,
        log_path: Option<&str>,
    ) -> Result<(), SourceError> {
        self.mutate(id, |task| {
            task.failure_message = Some(message.to_owned());
            if let Some(log_path) = log_path {
                task.log_path = Some(log_path.to_owned());
            }
            Ok(())
        })
    }

    async fn assign(&self, id: &str, worker: &str) -> Result<(), SourceError> {
        self.mutate(id, |task| {
            if !matches!(task.status, TaskStatus::Pending | TaskStatus::Blocked) {
                return Err(SourceError::InvalidState {
                    id: task.id.clone(),
                    action: "assign",
                    status: task.status,
                });
            }
            task.status = TaskStatus::Assigned;
            task.assigned_worker = Some(worker.to_owned());
            Ok(())
        })
    }

    async fn unassign(&self, id: &str) -> Result<(), SourceError> {
        self.mutate(id, |task| {
            task.assigned_worker = None;
            if matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
                task.status = TaskStatus::Pending;
            }
            Ok(())
        })
    }

    async fn is_blocked(&self, id: &str) -> Result<bool, SourceError> {
        let docs = self.load_all()?;
        let by_id: HashMap<&str, &Task> =
            docs.iter().map(|doc| (doc.task.id.as_str(), &doc.task)).collect();
        let task = by_id
            .get(id)
            .ok_or_else(|| SourceError::TaskNotFound(id.to_owned()))?;
        Ok(task.depends_on.iter().any(|dep| {
            by_id
                .get(dep.as_str())
                .is_none_or(|d| d.status != TaskStatus::Complete)
        }))
    }

    async fn stats(&self) -> Result<TaskStats, SourceError> {
        let tasks = self.scan().await?;
        Ok(TaskStats::from_tasks(&tasks))
    }
}
