//! # taskbox-task
//!
//! Runs a declarative task (image + script + environment bindings) inside a
//! disposable container and reports a structured result.
//!
//! ## Pipeline
//!
//! ```text
//! TaskRunner::run
//!   ├── ImageResolver      cache hit / archive download + load / registry pull
//!   ├── compose_environment  environment -> inputs -> outputs (later wins)
//!   ├── ContainerEngine    create (idle entrypoint) -> start
//!   ├── exec session       script, demultiplexed stdout/stderr -> sinks
//!   └── teardown           stop -> remove -> close
//! ```

pub mod engine;
pub mod env;
pub mod error;
pub mod image;
pub mod runner;
pub mod sink;
pub mod state;
pub mod task;

pub use engine::{
    ContainerEngine, ContainerHandle, ContainerSpec, DockerEngine, ExecId, ExecOutput, ExecStatus,
    OutputChunk, StatusStream,
};
pub use env::{compose_environment, to_env_vars, Environment};
pub use error::{EngineError, ResolveError, RunError};
pub use image::{ImageResolver, ImageSource, DOWNLOAD_CHUNK_SIZE};
pub use runner::{RunOptions, TaskRunner};
pub use sink::{CaptureSink, LogSink, OutputSink, WriterSink};
pub use state::RunState;
pub use task::{ExecutionResult, Task, TaskId, IMAGE_PATH_INPUT};
