//! Taskbox Config - merged settings
//!
//! Global (`<config_dir>/taskbox/config.json`) is loaded first, then the
//! project file (`./.taskbox/config.json`) is overlaid on top of it.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Config file name
pub const TASKBOX_CONFIG_FILE: &str = "config.json";

/// Idle command that keeps a container alive until the exec session runs
const DEFAULT_ENTRYPOINT: &str = "sleep infinity";

const DEFAULT_WORKING_DIR: &str = "/app";

const DEFAULT_STOP_TIMEOUT_SECS: i64 = 10;

/// Taskbox settings
///
/// Every field is optional so that a project file only needs to carry the
/// values it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskboxConfig {
    /// Version (for migrations)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Docker daemon address (`unix:///var/run/docker.sock`, `tcp://...`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,

    /// Entrypoint used when a task does not declare one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_entrypoint: Option<String>,

    /// Working directory used when a task does not declare one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_working_dir: Option<String>,

    /// Where downloaded image archives are stored before loading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// Grace period given to `docker stop`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_timeout_secs: Option<i64>,

    /// Echo the script before running it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_commands: Option<bool>,
}

impl TaskboxConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Default::default()
        }
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Load global + project, project wins
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<TaskboxConfig>(TASKBOX_CONFIG_FILE)? {
                config.merge(global_config);
            }
        }

        let project = JsonStore::current_project()?;
        if let Some(project_config) = project.load_optional::<TaskboxConfig>(TASKBOX_CONFIG_FILE)? {
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load from a single store only
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<TaskboxConfig>(TASKBOX_CONFIG_FILE)?
            .unwrap_or_else(Self::new))
    }

    pub fn save_to(&self, store: &JsonStore) -> Result<()> {
        store.save(TASKBOX_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge another config into this one (`other` wins)
    pub fn merge(&mut self, other: TaskboxConfig) {
        if other.docker_host.is_some() {
            self.docker_host = other.docker_host;
        }
        if other.default_entrypoint.is_some() {
            self.default_entrypoint = other.default_entrypoint;
        }
        if other.default_working_dir.is_some() {
            self.default_working_dir = other.default_working_dir;
        }
        if other.scratch_dir.is_some() {
            self.scratch_dir = other.scratch_dir;
        }
        if other.stop_timeout_secs.is_some() {
            self.stop_timeout_secs = other.stop_timeout_secs;
        }
        if other.show_commands.is_some() {
            self.show_commands = other.show_commands;
        }
    }

    // ========================================================================
    // Effective values
    // ========================================================================

    pub fn entrypoint(&self) -> &str {
        self.default_entrypoint
            .as_deref()
            .unwrap_or(DEFAULT_ENTRYPOINT)
    }

    pub fn working_dir(&self) -> &str {
        self.default_working_dir
            .as_deref()
            .unwrap_or(DEFAULT_WORKING_DIR)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("taskbox"))
    }

    pub fn stop_timeout_secs(&self) -> i64 {
        self.stop_timeout_secs.unwrap_or(DEFAULT_STOP_TIMEOUT_SECS)
    }

    pub fn show_commands(&self) -> bool {
        self.show_commands.unwrap_or(true)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn docker_host(mut self, host: impl Into<String>) -> Self {
        self.docker_host = Some(host.into());
        self
    }

    pub fn default_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.default_entrypoint = Some(entrypoint.into());
        self
    }

    pub fn default_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.default_working_dir = Some(dir.into());
        self
    }
}

fn default_version() -> u32 {
    1
}
