//! Engine trait

use crate::env::Environment;
use crate::error::EngineError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::Path;

/// Registry pull progress, one status line per item
pub type StatusStream<'a> = BoxStream<'a, Result<String, EngineError>>;

/// Demultiplexed output of an exec session
pub type ExecOutput = BoxStream<'static, Result<OutputChunk, EngineError>>;

/// Identifier of a created container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Short form for log lines
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_id())
    }
}

/// Identifier of an exec session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecId(pub String);

impl std::fmt::Display for ExecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to create
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    pub image: String,
    /// Main process (the idle command, not the script)
    pub entrypoint: Vec<String>,
    pub env: Environment,
    pub working_dir: Option<String>,
}

/// One piece of exec output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// Final state of an exec session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStatus {
    pub exit_code: i64,
    pub pid: i64,
}

/// Container engine capability - implement to add new runtimes
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Whether an image with exactly this reference is in local storage
    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError>;

    /// Pull from the registry, yielding status lines as they arrive
    fn pull_image<'a>(&'a self, reference: &'a str) -> StatusStream<'a>;

    /// Load an image archive (`docker save` format) from disk
    async fn load_image(&self, archive: &Path) -> Result<(), EngineError>;

    /// Create (but do not start) a container
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError>;

    async fn start_container(&self, container: &ContainerHandle) -> Result<(), EngineError>;

    /// Create an exec session running `command` with `env`
    async fn exec_create(
        &self,
        container: &ContainerHandle,
        command: &[String],
        env: &Environment,
    ) -> Result<ExecId, EngineError>;

    /// Start the exec session with stdout/stderr attached
    async fn exec_start(&self, exec: &ExecId) -> Result<ExecOutput, EngineError>;

    async fn exec_inspect(&self, exec: &ExecId) -> Result<ExecStatus, EngineError>;

    async fn stop_container(&self, container: &ContainerHandle) -> Result<(), EngineError>;

    async fn remove_container(&self, container: &ContainerHandle) -> Result<(), EngineError>;

    /// Release the connection
    async fn close(&self) -> Result<(), EngineError>;

    /// Get engine name
    fn name(&self) -> &'static str;
}
