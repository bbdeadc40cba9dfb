use std::fmt;

use vigil_actions::DispatchError;

/// Lifecycle of an engine: `Created → Running → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Running,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Created => "created",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine is not running (state: {0})")]
    NotRunning(EngineState),

    #[error("Cannot move engine from {from} to {to}")]
    InvalidTransition { from: EngineState, to: EngineState },

    #[error("Action pool error: {0}")]
    Dispatch(#[from] DispatchError),
}
