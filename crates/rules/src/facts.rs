//! Per-tenant fact store: the latest reading and last-arrival timestamp
//! for every source seen by an engine.
//!
//! The store does no locking of its own. The engine mutates it only while
//! holding its working-memory lock, which makes [`FactStore::apply`] and the
//! evaluation that follows it one atomic step.

use std::collections::HashMap;

use vigil_core::{FiredRuleRecord, LastArrivalFact, Reading, ReadingFact, RuleId, SourceId};

/// Result of [`FactStore::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The reading is now current for its source.
    Applied,
    /// A strictly newer reading was already stored; nothing changed.
    Stale,
}

impl ApplyOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

#[derive(Debug, Default)]
pub struct FactStore {
    readings: HashMap<SourceId, ReadingFact>,
    arrivals: HashMap<SourceId, LastArrivalFact>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reading` for `source_id` unless it is older than what is held.
    ///
    /// - Unknown source: both facts are created.
    /// - Known source, strictly newer arrival: both facts are replaced.
    /// - Known source, equal arrival: the facts are touched (rewritten with
    ///   identical content) so a re-evaluation sees them as updated.
    /// - Known source, older arrival: [`ApplyOutcome::Stale`], no change.
    pub fn apply(&mut self, source_id: &SourceId, reading: Reading, arrival_millis: i64) -> ApplyOutcome {
        if let Some(last) = self.arrivals.get(source_id) {
            if arrival_millis < last.last_received_at_millis {
                return ApplyOutcome::Stale;
            }
        }

        self.readings.insert(
            source_id.clone(),
            ReadingFact {
                source_id: source_id.clone(),
                reading,
                arrival_millis,
            },
        );
        self.arrivals.insert(
            source_id.clone(),
            LastArrivalFact {
                last_received_at_millis: arrival_millis,
            },
        );
        ApplyOutcome::Applied
    }

    pub fn reading(&self, source_id: &SourceId) -> Option<&ReadingFact> {
        self.readings.get(source_id)
    }

    pub fn last_arrival(&self, source_id: &SourceId) -> Option<LastArrivalFact> {
        self.arrivals.get(source_id).copied()
    }

    /// Tracked source ids, sorted.
    pub fn source_ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.readings.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Read-only view handed to a rule evaluator for one cycle.
///
/// Borrows the engine's working memory for the duration of the
/// evaluator call, so nothing can change underneath it.
#[derive(Debug, Clone, Copy)]
pub struct FactSnapshot<'a> {
    facts: &'a FactStore,
    fired: &'a HashMap<RuleId, FiredRuleRecord>,
    now_millis: i64,
    trigger: Option<&'a SourceId>,
}

impl<'a> FactSnapshot<'a> {
    pub fn new(
        facts: &'a FactStore,
        fired: &'a HashMap<RuleId, FiredRuleRecord>,
        now_millis: i64,
        trigger: Option<&'a SourceId>,
    ) -> Self {
        Self {
            facts,
            fired,
            now_millis,
            trigger,
        }
    }

    /// Engine clock reading taken when the cycle started.
    pub fn now_millis(&self) -> i64 {
        self.now_millis
    }

    /// Source whose reading started this cycle. `None` when the cycle was
    /// started by a fired-rule insertion.
    pub fn trigger(&self) -> Option<&'a SourceId> {
        self.trigger
    }

    pub fn reading(&self, source_id: &SourceId) -> Option<&'a Reading> {
        self.facts.reading(source_id).map(|fact| &fact.reading)
    }

    pub fn last_received_at(&self, source_id: &SourceId) -> Option<i64> {
        self.facts
            .last_arrival(source_id)
            .map(|fact| fact.last_received_at_millis)
    }

    pub fn facts(&self) -> &'a FactStore {
        self.facts
    }

    /// Last record retained for `rule_id`, if the rule has fired before.
    pub fn last_fired(&self, rule_id: &RuleId) -> Option<&'a FiredRuleRecord> {
        self.fired.get(rule_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(value: i64) -> Reading {
        Reading::new().with_field("temp", value)
    }

    #[test]
    fn first_reading_creates_both_facts() {
        let mut store = FactStore::new();
        let id = SourceId::from("42");

        assert_eq!(store.apply(&id, temp(30), 1_000), ApplyOutcome::Applied);
        assert_eq!(store.reading(&id).unwrap().reading, temp(30));
        assert_eq!(store.last_arrival(&id).unwrap().last_received_at_millis, 1_000);
    }

    #[test]
    fn newer_reading_replaces() {
        let mut store = FactStore::new();
        let id = SourceId::from("42");
        store.apply(&id, temp(30), 1_000);

        assert!(store.apply(&id, temp(31), 2_000).is_applied());
        let fact = store.reading(&id).unwrap();
        assert_eq!(fact.reading, temp(31));
        assert_eq!(fact.arrival_millis, 2_000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn older_reading_is_stale_and_changes_nothing() {
        let mut store = FactStore::new();
        let id = SourceId::from("42");
        store.apply(&id, temp(30), 2_000);

        assert_eq!(store.apply(&id, temp(99), 1_000), ApplyOutcome::Stale);
        assert_eq!(store.reading(&id).unwrap().reading, temp(30));
        assert_eq!(store.last_arrival(&id).unwrap().last_received_at_millis, 2_000);
    }

    #[test]
    fn equal_timestamp_is_accepted() {
        let mut store = FactStore::new();
        let id = SourceId::from("42");
        store.apply(&id, temp(30), 2_000);

        assert!(store.apply(&id, temp(30), 2_000).is_applied());
        assert_eq!(store.last_arrival(&id).unwrap().last_received_at_millis, 2_000);
    }

    #[test]
    fn source_ids_are_sorted() {
        let mut store = FactStore::new();
        for id in ["b", "c", "a"] {
            store.apply(&SourceId::from(id), Reading::new(), 0);
        }
        let ids: Vec<String> = store.source_ids().iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
