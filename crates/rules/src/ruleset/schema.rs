//! Serde model of a rule file.
//!
//! ```yaml
//! rules:
//!   - id: freezer-warm
//!     name: Freezer above threshold
//!     cooldown: 10m
//!     when:
//!       - kind: threshold
//!         source: "42"
//!         field: temp
//!         operator: gt
//!         value: -10
//!   - id: gateway-silent
//!     when:
//!       - kind: max_silence
//!         source: gateway-1
//!         max_ms: 60000
//! ```

use serde::{Deserialize, Serialize};
use vigil_core::SourceId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDocument {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum time between two firings, e.g. "30s" or "1h".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<String>,
    /// All conditions must hold for the rule to fire.
    #[serde(default)]
    pub when: Vec<Condition>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Threshold(ThresholdCondition),
    MaxSilence(MaxSilenceCondition),
}

impl Condition {
    pub fn source(&self) -> &SourceId {
        match self {
            Condition::Threshold(c) => &c.source,
            Condition::MaxSilence(c) => &c.source,
        }
    }
}

/// Holds when the source's latest value for `field` compares true against
/// `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCondition {
    pub source: SourceId,
    pub field: String,
    pub operator: ThresholdOperator,
    pub value: f64,
}

/// Holds when the source has been quiet for at least `max_ms` at cycle
/// time. Sources never seen don't match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxSilenceCondition {
    pub source: SourceId,
    pub max_ms: i64,
}

/// Comparison operators for threshold conditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

impl ThresholdOperator {
    pub fn compare(self, actual: f64, expected: f64) -> bool {
        match self {
            ThresholdOperator::Gt => actual > expected,
            ThresholdOperator::Gte => actual >= expected,
            ThresholdOperator::Lt => actual < expected,
            ThresholdOperator::Lte => actual <= expected,
            ThresholdOperator::Eq => (actual - expected).abs() < f64::EPSILON,
            ThresholdOperator::Neq => (actual - expected).abs() >= f64::EPSILON,
        }
    }
}
