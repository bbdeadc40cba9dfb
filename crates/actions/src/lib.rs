//! Fired-rule action execution.
//!
//! This crate provides:
//! - `ActionHandler` trait for pluggable action channels
//! - `ActionRouter` mapping rule ids to their handlers, with defaults
//! - `ActionPool`, a growable worker pool fed by an unbounded FIFO queue
//! - Logging and webhook handler implementations

pub mod logging;
pub mod pool;
pub mod router;
pub mod traits;
pub mod webhook;

pub use logging::LogActionHandler;
pub use pool::{ActionPool, PoolStats};
pub use router::ActionRouter;
pub use traits::{ActionError, ActionHandler, DispatchError, ExecutionResult};
pub use webhook::WebhookActionHandler;
