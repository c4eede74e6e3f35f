//! Worker registry: a single versioned JSON document.
//!
//! Writes are atomic (write to a temp file in the same directory, then
//! rename over the target). Unknown schema versions abort rather than
//! guessing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use drover_core::source::WorkerStatus;

/// Current registry schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from registry I/O.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid registry JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported registry schema version {found} (supported: {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

/// One registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstream: Option<String>,
    /// Shell command executed per `run` call; the source default applies
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub status: WorkerStatus,
    pub created_at: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            workstream: None,
            command: None,
            status: WorkerStatus::Idle,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    schema_version: u32,
    workers: Vec<WorkerRecord>,
}

/// Persistent worker registry backed by one JSON file.
#[derive(Debug, Clone)]
pub struct WorkerRegistry {
    path: PathBuf,
}

impl WorkerRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. A missing file is an empty registry.
    pub fn load(&self) -> Result<Vec<WorkerRecord>, RegistryError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let file: RegistryFile = serde_json::from_str(&content)?;
        if file.schema_version != SCHEMA_VERSION {
            return Err(RegistryError::UnsupportedSchema {
                found: file.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(file.workers)
    }

    /// Replace the registry contents atomically.
    pub fn save(&self, workers: &[WorkerRecord]) -> Result<(), RegistryError> {
        let file = RegistryFile {
            schema_version: SCHEMA_VERSION,
            workers: workers.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Insert or replace one record.
    pub fn upsert(&self, record: WorkerRecord) -> Result<(), RegistryError> {
        let mut workers = self.load()?;
        match workers.iter_mut().find(|w| w.name == record.name) {
            Some(existing) => *existing = record,
            None => workers.push(record),
        }
        self.save(&workers)
    }

    /// Remove one record. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, RegistryError> {
        let mut workers = self.load()?;
        let before = workers.len();
        workers.retain(|w| w.name != name);
        let removed = workers.len() != before;
        if removed {
            self.save(&workers)?;
        }
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Result<Option<WorkerRecord>, RegistryError> {
        Ok(self.load()?.into_iter().find(|w| w.name == name))
    }
}
