use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use vigil_core::{FiredRuleRecord, RuleId, SourceId};

use crate::evaluator::{EvaluatorError, RuleEvaluator};
use crate::facts::FactSnapshot;

use super::cooldown::parse_cooldown;
use super::error::RuleSetError;
use super::schema::{Condition, RuleSetDocument};

#[derive(Debug)]
struct CompiledRule {
    id: RuleId,
    name: Option<String>,
    enabled: bool,
    cooldown: Option<Duration>,
    conditions: Vec<Condition>,
    /// Sources referenced by any condition.
    sources: BTreeSet<SourceId>,
}

impl CompiledRule {
    fn holds(&self, snapshot: &FactSnapshot<'_>) -> bool {
        self.conditions.iter().all(|condition| condition_holds(condition, snapshot))
    }

    fn in_cooldown(&self, snapshot: &FactSnapshot<'_>, now: DateTime<Utc>) -> bool {
        let (Some(cooldown), Some(last)) = (self.cooldown, snapshot.last_fired(&self.id)) else {
            return false;
        };
        if !last.fired {
            return false;
        }
        now.signed_duration_since(last.fired_at) < cooldown
    }
}

fn condition_holds(condition: &Condition, snapshot: &FactSnapshot<'_>) -> bool {
    match condition {
        Condition::Threshold(c) => snapshot
            .reading(&c.source)
            .and_then(|reading| reading.number(&c.field))
            .is_some_and(|actual| c.operator.compare(actual, c.value)),
        Condition::MaxSilence(c) => snapshot
            .last_received_at(&c.source)
            .is_some_and(|last| snapshot.now_millis().saturating_sub(last) >= c.max_ms),
    }
}

/// An immutable, validated rule set.
///
/// A rule is considered in a cycle only when it references the source that
/// started the cycle, so an unrelated source's arrival never re-fires it.
/// Cycles started by fired-rule insertions fire nothing.
#[derive(Debug)]
pub struct CompiledRuleSet {
    rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    /// Validate and compile a parsed document.
    pub fn compile(document: RuleSetDocument) -> Result<Self, RuleSetError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(document.rules.len());

        for definition in document.rules {
            let id = definition.id.trim().to_string();
            if id.is_empty() {
                return Err(RuleSetError::Validation("rule id must not be empty".to_string()));
            }
            if !seen.insert(id.clone()) {
                return Err(RuleSetError::DuplicateRule(id));
            }
            if definition.when.is_empty() {
                return Err(RuleSetError::EmptyRule(id));
            }

            let cooldown = match definition.cooldown.as_deref() {
                None => None,
                // Must also fit a chrono duration to be compared with fire times.
                Some(raw) => Some(
                    parse_cooldown(raw)
                        .and_then(|d| Duration::from_std(d).ok())
                        .ok_or_else(|| RuleSetError::InvalidCooldown {
                            rule_id: id.clone(),
                            value: raw.to_string(),
                        })?,
                ),
            };

            for condition in &definition.when {
                if let Condition::MaxSilence(c) = condition {
                    if c.max_ms < 0 {
                        return Err(RuleSetError::Validation(format!(
                            "rule {id}: max_ms must not be negative"
                        )));
                    }
                }
            }

            let sources = definition.when.iter().map(|c| c.source().clone()).collect();
            rules.push(CompiledRule {
                id: RuleId::from(id),
                name: definition.name,
                enabled: definition.enabled,
                cooldown,
                conditions: definition.when,
                sources,
            });
        }

        Ok(Self { rules })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RuleSetError> {
        let document: RuleSetDocument = serde_yaml::from_str(yaml)?;
        Self::compile(document)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleSetError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let compiled = Self::from_yaml_str(&yaml)?;
        info!(path = %path.display(), rules = compiled.len(), "loaded rule set");
        Ok(compiled)
    }

    pub fn rule_ids(&self) -> Vec<&RuleId> {
        self.rules.iter().map(|r| &r.id).collect()
    }

    /// Display name of a rule, falling back to its id.
    pub fn rule_name(&self, rule_id: &RuleId) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| &r.id == rule_id)
            .map(|r| r.name.as_deref().unwrap_or(r.id.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleEvaluator for CompiledRuleSet {
    fn evaluate(&self, snapshot: &FactSnapshot<'_>) -> Result<Vec<FiredRuleRecord>, EvaluatorError> {
        let Some(trigger) = snapshot.trigger() else {
            return Ok(Vec::new());
        };
        let now = DateTime::<Utc>::from_timestamp_millis(snapshot.now_millis()).ok_or_else(|| {
            EvaluatorError::Failed(format!("clock reading {} is out of range", snapshot.now_millis()))
        })?;

        let mut fired = Vec::new();
        for rule in &self.rules {
            if !rule.enabled || !rule.sources.contains(trigger) || !rule.holds(snapshot) {
                continue;
            }
            if rule.in_cooldown(snapshot, now) {
                debug!(rule_id = %rule.id, "rule matched but is still in cooldown");
                continue;
            }
            fired.push(FiredRuleRecord::new(rule.id.clone(), now));
        }
        Ok(fired)
    }
}
