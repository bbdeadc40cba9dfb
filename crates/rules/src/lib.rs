//! Per-tenant streaming rule engine.
//!
//! This crate provides:
//! - A fact store holding the latest reading and arrival time per source
//! - The `Engine`, which applies readings and runs a `RuleEvaluator` under
//!   one lock per tenant, dispatching fired rules to an action pool
//! - An idle scheduler that re-evaluates stored readings when traffic stops
//! - Observers notified of idle re-evaluations
//! - YAML rule sets compiled into an immutable evaluator

pub mod engine;
pub mod evaluator;
pub mod facts;
pub mod observer;
pub mod ruleset;
pub mod scheduler;

pub use engine::{CycleOutcome, Engine, EngineBuilder, EngineError, EngineState};
pub use evaluator::{from_fn, EvaluatorError, FnEvaluator, RuleEvaluator};
pub use facts::{ApplyOutcome, FactSnapshot, FactStore};
pub use observer::{AsyncObserver, LoggingObserver, NotifyReport, ObserverError, ObserverId, ObserverRegistry};
pub use ruleset::{CompiledRuleSet, RuleSetCache, RuleSetError};
pub use scheduler::TickReport;
