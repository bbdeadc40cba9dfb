use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reading::ReadingFact;

/// Identifier of a rule inside a compiled rule set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Signal emitted by a rule evaluator for a rule whose conditions hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredRuleRecord {
    pub rule_id: RuleId,
    pub fired: bool,
    pub fired_at: DateTime<Utc>,
}

impl FiredRuleRecord {
    pub fn new(rule_id: impl Into<RuleId>, fired_at: DateTime<Utc>) -> Self {
        Self {
            rule_id: rule_id.into(),
            fired: true,
            fired_at,
        }
    }
}

/// A fired rule queued for action execution.
///
/// `trigger` is the reading whose arrival (or forced re-evaluation) started
/// the cycle; it is `None` for cycles started by a fired-rule insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub tenant_id: String,
    pub record: FiredRuleRecord,
    pub trigger: Option<ReadingFact>,
}

impl ActionRequest {
    pub fn rule_id(&self) -> &RuleId {
        &self.record.rule_id
    }
}
