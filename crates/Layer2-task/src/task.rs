//! Task definition and result types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Reserved input key carrying the URL of an image archive to load instead of
/// pulling `image` from a registry
pub const IMAGE_PATH_INPUT: &str = "_image_path";

/// Unique identifier for one task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Container name derived from the id
    pub fn container_name(&self) -> String {
        format!("taskbox-{}", self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A task to be executed
///
/// Deserializes from the JSON task format:
///
/// ```json
/// {
///   "image": "ubuntu:latest",
///   "script": ["sh", "-c", "echo $MYVAR"],
///   "inputs": { "MYVAR": "42" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Image reference (registry tag, or the tag provided by the archive)
    pub image: String,

    /// Command and arguments, run as a single exec invocation
    #[serde(default)]
    pub script: Vec<String>,

    /// Container main process; the runner's idle command when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    /// Working directory inside the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Injected verbatim
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Injected as environment variables
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    /// Injected as environment variables (paths the script writes to)
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl Task {
    /// Create a new task
    pub fn new<I, S>(image: impl Into<String>, script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image: image.into(),
            script: script.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// URL of the image archive, if the task carries one
    pub fn image_archive_url(&self) -> Option<&str> {
        self.inputs.get(IMAGE_PATH_INPUT).map(String::as_str)
    }

    /// Parse a task from JSON
    pub fn from_json(json: &str) -> taskbox_foundation::Result<Self> {
        let task: Task = serde_json::from_str(json)?;
        task.validate()?;
        Ok(task)
    }

    /// Reject tasks the engine cannot possibly run
    pub fn validate(&self) -> taskbox_foundation::Result<()> {
        if self.image.trim().is_empty() {
            return Err("task image must not be empty".into());
        }
        if self.script.is_empty() {
            return Err("task script must not be empty".into());
        }
        Ok(())
    }
}

/// Result of one task execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code of the exec session (0 = success)
    pub exit_code: i64,

    /// Runtime-assigned process id of the exec session
    pub pid: i64,

    /// Most recent stderr chunk, or the last stdout chunk when the script
    /// failed without writing to stderr
    pub last_stderr_chunk: Option<Bytes>,

    /// Container the task ran in
    pub container_id: String,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Wall-clock time of the whole run
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Diagnostic chunk as text
    pub fn stderr_summary(&self) -> Option<String> {
        self.last_stderr_chunk
            .as_ref()
            .map(|chunk| String::from_utf8_lossy(chunk).trim_end().to_string())
    }
}
