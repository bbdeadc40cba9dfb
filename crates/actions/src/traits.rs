//! Action handler trait definition and shared error types.

use vigil_core::{ActionRequest, RuleId};

/// Errors raised by an action handler while executing a fired rule.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors returned by [`ActionPool::submit`](crate::ActionPool::submit).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("action pool has not been started")]
    NotStarted,

    #[error("action pool is shut down")]
    ShutDown,

    #[error("no tokio runtime available to run action workers")]
    NoRuntime,
}

/// Trait for action channel implementations.
///
/// Handlers run on pool workers, never on the evaluation path, so they may
/// call slow external systems.
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    /// Execute the action for one fired rule.
    async fn execute(&self, request: &ActionRequest) -> Result<(), ActionError>;

    /// Human-readable name for this handler (e.g., "webhook", "log").
    fn handler_name(&self) -> &str;
}

/// Result of running a single handler for a fired rule.
#[derive(Debug)]
pub struct ExecutionResult {
    pub handler: String,
    pub rule_id: RuleId,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
