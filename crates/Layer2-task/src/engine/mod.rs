//! Container engines
//!
//! - `ContainerEngine` - capability surface the runner drives
//! - `DockerEngine` - Docker Engine API implementation (bollard)

pub mod docker;
pub mod r#trait;

pub use docker::DockerEngine;
pub use r#trait::{
    ContainerEngine, ContainerHandle, ContainerSpec, ExecId, ExecOutput, ExecStatus, OutputChunk,
    StatusStream,
};
