use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use vigil_core::{FiredRuleRecord, Reading, RuleId, SourceId};

use super::*;
use crate::evaluator::RuleEvaluator;
use crate::facts::{FactSnapshot, FactStore};

const RULES: &str = r#"
rules:
  - id: hot
    name: Too hot
    when:
      - kind: threshold
        source: "42"
        field: temp
        operator: gt
        value: 25
  - id: hot-and-quiet
    cooldown: 1m
    when:
      - kind: threshold
        source: 42
        field: temp
        operator: gte
        value: 25
      - kind: max_silence
        source: gateway
        max_ms: 5000
  - id: disabled
    enabled: false
    when:
      - kind: threshold
        source: "42"
        field: temp
        operator: gt
        value: 0
"#;

fn fired_ids(
    set: &CompiledRuleSet,
    store: &FactStore,
    fired: &HashMap<RuleId, FiredRuleRecord>,
    now: i64,
    trigger: Option<&SourceId>,
) -> Vec<String> {
    let snapshot = FactSnapshot::new(store, fired, now, trigger);
    set.evaluate(&snapshot)
        .unwrap()
        .into_iter()
        .map(|r| r.rule_id.to_string())
        .collect()
}

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

#[test]
fn parses_rules_and_numeric_sources() {
    let set = CompiledRuleSet::from_yaml_str(RULES).unwrap();
    assert_eq!(set.len(), 3);
    let ids: Vec<&str> = set.rule_ids().iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, ["hot", "hot-and-quiet", "disabled"]);
    assert_eq!(set.rule_name(&RuleId::from("hot")), Some("Too hot"));
    assert_eq!(set.rule_name(&RuleId::from("disabled")), Some("disabled"));
}

#[test]
fn threshold_fires_only_for_its_trigger_source() {
    let set = CompiledRuleSet::from_yaml_str(RULES).unwrap();
    let mut store = FactStore::new();
    let sensor = SourceId::from("42");
    let other = SourceId::from("7");
    store.apply(&sensor, Reading::new().with_field("temp", 30), 0);
    store.apply(&other, Reading::new(), 0);
    let fired = HashMap::new();

    assert_eq!(fired_ids(&set, &store, &fired, 0, Some(&sensor)), ["hot"]);
    assert!(fired_ids(&set, &store, &fired, 0, Some(&other)).is_empty());
    assert!(fired_ids(&set, &store, &fired, 0, None).is_empty());
}

#[test]
fn max_silence_needs_a_known_quiet_source() {
    let set = CompiledRuleSet::from_yaml_str(RULES).unwrap();
    let mut store = FactStore::new();
    let sensor = SourceId::from("42");
    store.apply(&sensor, Reading::new().with_field("temp", 25), 10_000);
    let fired = HashMap::new();

    // Gateway never seen.
    assert!(fired_ids(&set, &store, &fired, 10_000, Some(&sensor)).is_empty());

    store.apply(&SourceId::from("gateway"), Reading::new(), 6_000);
    assert!(fired_ids(&set, &store, &fired, 10_000, Some(&sensor)).is_empty());
    assert_eq!(
        fired_ids(&set, &store, &fired, 11_000, Some(&sensor)),
        ["hot-and-quiet"]
    );
}

#[test]
fn cooldown_suppresses_refiring() {
    let set = CompiledRuleSet::from_yaml_str(RULES).unwrap();
    let mut store = FactStore::new();
    let sensor = SourceId::from("42");
    store.apply(&sensor, Reading::new().with_field("temp", 25), 0);
    store.apply(&SourceId::from("gateway"), Reading::new(), 0);

    let mut fired = HashMap::new();
    fired.insert(
        RuleId::from("hot-and-quiet"),
        FiredRuleRecord::new("hot-and-quiet", at(10_000)),
    );

    assert!(fired_ids(&set, &store, &fired, 69_999, Some(&sensor)).is_empty());
    assert_eq!(
        fired_ids(&set, &store, &fired, 70_000, Some(&sensor)),
        ["hot-and-quiet"]
    );

    // A record saying the rule did not fire doesn't start a cooldown.
    let mut record = FiredRuleRecord::new("hot-and-quiet", at(60_000));
    record.fired = false;
    fired.insert(RuleId::from("hot-and-quiet"), record);
    assert_eq!(
        fired_ids(&set, &store, &fired, 61_000, Some(&sensor)),
        ["hot-and-quiet"]
    );
}

#[test]
fn max_silence_saturates_on_extreme_arrival_times() {
    let set = CompiledRuleSet::from_yaml_str(
        "rules:\n  - id: quiet\n    when: [{ kind: max_silence, source: s, max_ms: 1000 }]\n",
    )
    .unwrap();
    let mut store = FactStore::new();
    let source = SourceId::from("s");
    store.apply(&source, Reading::new(), i64::MIN);

    assert_eq!(
        fired_ids(&set, &store, &HashMap::new(), 0, Some(&source)),
        ["quiet"]
    );
}

#[test]
fn fired_records_carry_cycle_time() {
    let set = CompiledRuleSet::from_yaml_str(RULES).unwrap();
    let mut store = FactStore::new();
    let sensor = SourceId::from("42");
    store.apply(&sensor, Reading::new().with_field("temp", 30), 0);
    let fired = HashMap::new();

    let snapshot = FactSnapshot::new(&store, &fired, 1_234, Some(&sensor));
    let records = set.evaluate(&snapshot).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].fired);
    assert_eq!(records[0].fired_at, at(1_234));
}

#[test]
fn validation_errors() {
    let duplicate = r#"
rules:
  - id: a
    when: [{ kind: max_silence, source: s, max_ms: 1 }]
  - id: a
    when: [{ kind: max_silence, source: s, max_ms: 1 }]
"#;
    assert!(matches!(
        CompiledRuleSet::from_yaml_str(duplicate),
        Err(RuleSetError::DuplicateRule(id)) if id == "a"
    ));

    let empty = "rules:\n  - id: lonely\n";
    assert!(matches!(
        CompiledRuleSet::from_yaml_str(empty),
        Err(RuleSetError::EmptyRule(id)) if id == "lonely"
    ));

    let cooldown = r#"
rules:
  - id: c
    cooldown: soon
    when: [{ kind: max_silence, source: s, max_ms: 1 }]
"#;
    assert!(matches!(
        CompiledRuleSet::from_yaml_str(cooldown),
        Err(RuleSetError::InvalidCooldown { .. })
    ));

    let endless = r#"
rules:
  - id: e
    cooldown: 200000000000d
    when: [{ kind: max_silence, source: s, max_ms: 1 }]
"#;
    assert!(matches!(
        CompiledRuleSet::from_yaml_str(endless),
        Err(RuleSetError::InvalidCooldown { rule_id, .. }) if rule_id == "e"
    ));

    let negative = r#"
rules:
  - id: n
    when: [{ kind: max_silence, source: s, max_ms: -5 }]
"#;
    assert!(matches!(
        CompiledRuleSet::from_yaml_str(negative),
        Err(RuleSetError::Validation(_))
    ));

    assert!(matches!(
        CompiledRuleSet::from_yaml_str("rules: [{ id: x, when: [{ kind: bogus }] }]"),
        Err(RuleSetError::Parse(_))
    ));
}

#[test]
fn empty_document_compiles_to_empty_set() {
    let set = CompiledRuleSet::from_yaml_str("rules: []").unwrap();
    assert!(set.is_empty());
}

#[test]
fn cache_compiles_each_configuration_once() {
    let cache = RuleSetCache::new();
    let a = cache.get_or_compile(RULES).unwrap();
    let b = cache.get_or_compile(RULES).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let c = cache.get_or_compile("rules: []").unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(cache.len(), 2);

    assert!(cache.get_or_compile("rules: [{ id: a }]").is_err());
    assert_eq!(cache.len(), 2);
}
