//! Error types for task execution
//!
//! `EngineError` comes from the container engine, `ResolveError` from image
//! resolution, and `RunError` is what `TaskRunner::run` returns: one wrapped
//! error per stage with the original cause kept as `source()`.

use std::path::PathBuf;
use thiserror::Error;

/// Container engine failure
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Invalid image archive: {0}")]
    InvalidArchive(String),

    #[error("Image pull failed: {0}")]
    Pull(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Other(String),
}

/// Image resolution failure
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to inspect local image {image}: {source}")]
    Lookup {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to download image archive from {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write image archive {}: {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load image archive {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("Failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: EngineError,
    },
}

/// Fatal failure of a task run
///
/// A nonzero exit code is not an error; it is a normal `ExecutionResult`.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Image resolution failed for {image}: {source}")]
    ImageResolution {
        image: String,
        #[source]
        source: ResolveError,
    },

    #[error("Container creation failed for {image}: {source}")]
    ContainerCreation {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("Execution failed in container {container}: {source}")]
    Execution {
        container: String,
        #[source]
        source: EngineError,
    },

    #[error("Teardown failed for container {container}: {source}")]
    Teardown {
        container: String,
        #[source]
        source: EngineError,
    },
}

impl RunError {
    /// Pipeline stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            RunError::ImageResolution { .. } => "image",
            RunError::ContainerCreation { .. } => "create",
            RunError::Execution { .. } => "exec",
            RunError::Teardown { .. } => "teardown",
        }
    }
}
