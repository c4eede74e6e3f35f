//! Configuration file management for drover.
//!
//! Settings resolve along one chain: CLI flag > environment > config file
//! > default. The file itself is TOML; its location follows the same
//! chain, with `DROVER_CONFIG` naming an exact file before the XDG
//! lookup applies.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use drover_core::config::OrchestratorConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    /// Per-role concurrency caps.
    #[serde(default)]
    pub roles: HashMap<String, usize>,
    #[serde(default)]
    pub workers: WorkersSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrchestratorSection {
    pub poll_interval_secs: u64,
    pub runner_cooldown_secs: u64,
    pub verify_timeout_secs: u64,
    pub event_buffer_size: usize,
    pub max_iterations: u32,
    pub auto_spawn_workers: bool,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            runner_cooldown_secs: 5,
            verify_timeout_secs: 300,
            event_buffer_size: 100,
            max_iterations: 30,
            auto_spawn_workers: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkersSection {
    /// Default shell command executed per worker invocation; the prompt
    /// arrives on stdin.
    pub command: String,
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            command: "claude -p".to_owned(),
        }
    }
}

impl ConfigFile {
    /// Translate the file into engine configuration.
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(self.orchestrator.poll_interval_secs),
            role_concurrency: self.roles.clone(),
            auto_spawn_workers: self.orchestrator.auto_spawn_workers,
            runner_cooldown: Duration::from_secs(self.orchestrator.runner_cooldown_secs),
            verify_timeout: Duration::from_secs(self.orchestrator.verify_timeout_secs),
            event_buffer_size: self.orchestrator.event_buffer_size,
            max_iterations: self.orchestrator.max_iterations,
            ..OrchestratorConfig::default()
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Resolve the config file location.
///
/// `DROVER_CONFIG` names an exact file and wins outright. Otherwise the
/// file lives at `drover/config.toml` under the XDG config base:
/// `$XDG_CONFIG_HOME`, then `~/.config`, then the working directory as a
/// last resort.
pub fn config_path() -> PathBuf {
    if let Ok(explicit) = std::env::var("DROVER_CONFIG") {
        return PathBuf::from(explicit);
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("drover").join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns defaults when it does not
/// exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config file at {}", path.display()))
        }
    };
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file to its resolved location,
/// creating parent directories as needed. On Unix the file is created
/// owner read/write only.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .with_context(|| format!("failed to open config file at {}", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("failed to write config file at {}", path.display()))?;
    }
    #[cfg(not(unix))]
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_engine_defaults() {
        let file = ConfigFile::default();
        let config = file.to_orchestrator_config();
        let engine = OrchestratorConfig::default();
        assert_eq!(config.poll_interval, engine.poll_interval);
        assert_eq!(config.runner_cooldown, engine.runner_cooldown);
        assert_eq!(config.verify_timeout, engine.verify_timeout);
        assert_eq!(config.max_iterations, engine.max_iterations);
    }

    #[test]
    fn file_roundtrips_through_toml() {
        let mut file = ConfigFile::default();
        file.roles.insert("be".to_owned(), 3);
        let rendered = toml::to_string_pretty(&file).expect("serialize");
        let parsed: ConfigFile = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed.roles[&"be".to_owned()], 3);
        assert_eq!(parsed.workers.command, "claude -p");
    }
}
