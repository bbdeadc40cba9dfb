//! YAML rule sets compiled into an immutable evaluator.
//!
//! A rule file lists rules; each rule fires when all of its conditions hold
//! for the cycle's fact snapshot. A compiled set is built once per distinct
//! configuration and shared by reference between engines.

mod cache;
mod compiled;
mod cooldown;
mod error;
mod schema;

#[cfg(test)]
mod tests;

pub use cache::RuleSetCache;
pub use compiled::CompiledRuleSet;
pub use cooldown::parse_cooldown;
pub use error::RuleSetError;
pub use schema::{
    Condition, MaxSilenceCondition, RuleDefinition, RuleSetDocument, ThresholdCondition,
    ThresholdOperator,
};
