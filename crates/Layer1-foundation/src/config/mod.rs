//! Config - taskbox settings
//!
//! - `taskbox.rs` - TaskboxConfig (global + project merge)

mod taskbox;

pub use taskbox::{TaskboxConfig, TASKBOX_CONFIG_FILE};
