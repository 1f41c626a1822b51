//! # taskbox-foundation
//!
//! Foundation layer for taskbox:
//! - Error: shared error type for config and storage
//! - Storage: `JsonStore` for global/project JSON files
//! - Config: `TaskboxConfig`, merged global + project settings

pub mod config;
pub mod error;
pub mod storage;

pub use config::{TaskboxConfig, TASKBOX_CONFIG_FILE};
pub use error::{Error, Result};
pub use storage::JsonStore;
