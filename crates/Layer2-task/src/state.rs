//! Run state machine

use serde::{Deserialize, Serialize};

/// Lifecycle of one `TaskRunner::run` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Task accepted, nothing provisioned yet
    Created,

    /// Image present in local storage
    ImageReady,

    /// Container created with the idle entrypoint, not started
    ContainerCreated,

    /// Container started, exec session streaming
    Running,

    /// Exec finished and was inspected
    Completed,

    /// A runtime-engine error aborted the run
    Failed,
}

impl RunState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Legal edges of the state machine
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match (self, next) {
            (s, RunState::Failed) => !s.is_terminal(),
            (RunState::Created, RunState::ImageReady) => true,
            (RunState::ImageReady, RunState::ContainerCreated) => true,
            (RunState::ContainerCreated, RunState::Running) => true,
            (RunState::Running, RunState::Completed) => true,
            _ => false,
        }
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            RunState::Created => "Created",
            RunState::ImageReady => "ImageReady",
            RunState::ContainerCreated => "ContainerCreated",
            RunState::Running => "Running",
            RunState::Completed => "Completed",
            RunState::Failed => "Failed",
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::Created
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
