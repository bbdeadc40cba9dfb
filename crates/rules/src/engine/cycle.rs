//! One evaluation cycle: apply a fact, run the evaluator, collect actions.
//!
//! Everything in here runs while the working-memory lock is held. Actions
//! are handed back to the caller and submitted to the pool after the lock
//! is released.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;

use tracing::{debug, error, warn};
use vigil_core::{ActionRequest, FiredRuleRecord, Reading, SourceId};

use crate::facts::FactSnapshot;

use super::{EngineInner, WorkingMemory};

/// What a cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The reading was older than the stored one and was dropped.
    Stale,
    /// The evaluator ran; `fired` rules were queued for action.
    Evaluated { fired: usize },
    /// The evaluator returned an error or panicked. Facts stay as applied.
    EvaluatorFailed,
}

pub(crate) struct Cycle {
    pub(crate) outcome: CycleOutcome,
    pub(crate) actions: Vec<ActionRequest>,
}

impl Cycle {
    fn stale() -> Self {
        Self {
            outcome: CycleOutcome::Stale,
            actions: Vec::new(),
        }
    }

    fn failed() -> Self {
        Self {
            outcome: CycleOutcome::EvaluatorFailed,
            actions: Vec::new(),
        }
    }
}

impl EngineInner {
    pub(crate) fn apply_and_evaluate(
        &self,
        memory: &mut WorkingMemory,
        source_id: SourceId,
        reading: Reading,
        arrival_millis: i64,
    ) -> Cycle {
        if !memory.facts.apply(&source_id, reading, arrival_millis).is_applied() {
            debug!(
                tenant = %self.tenant_id,
                source_id = %source_id,
                arrival_ms = arrival_millis,
                "dropping stale reading"
            );
            return Cycle::stale();
        }
        let now = self.clock.now_millis();
        self.run_evaluator(memory, Some(&source_id), now)
    }

    pub(crate) fn insert_fired_and_evaluate(&self, memory: &mut WorkingMemory, record: FiredRuleRecord) -> Cycle {
        memory.fired.insert(record.rule_id.clone(), record);
        let now = self.clock.now_millis();
        self.run_evaluator(memory, None, now)
    }

    fn run_evaluator(&self, memory: &mut WorkingMemory, trigger: Option<&SourceId>, now: i64) -> Cycle {
        self.last_evaluation_at.store(now, Ordering::Release);

        let result = {
            let snapshot = FactSnapshot::new(&memory.facts, &memory.fired, now, trigger);
            panic::catch_unwind(AssertUnwindSafe(|| self.evaluator.evaluate(&snapshot)))
        };

        let records = match result {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                warn!(tenant = %self.tenant_id, error = %e, "rule evaluation failed");
                return Cycle::failed();
            }
            Err(_) => {
                error!(tenant = %self.tenant_id, "rule evaluator panicked");
                return Cycle::failed();
            }
        };

        let trigger_fact = trigger.and_then(|id| memory.facts.reading(id).cloned());
        let mut actions = Vec::new();
        for record in records {
            memory.fired.insert(record.rule_id.clone(), record.clone());
            if record.fired {
                actions.push(ActionRequest {
                    tenant_id: self.tenant_id.clone(),
                    record,
                    trigger: trigger_fact.clone(),
                });
            }
        }

        Cycle {
            outcome: CycleOutcome::Evaluated {
                fired: actions.len(),
            },
            actions,
        }
    }

    /// Submit a finished cycle's actions. Never called with the memory
    /// lock held.
    pub(crate) fn dispatch(&self, actions: Vec<ActionRequest>) {
        for action in actions {
            let rule_id = action.rule_id().clone();
            if let Err(e) = self.pool.submit(action) {
                warn!(
                    tenant = %self.tenant_id,
                    rule_id = %rule_id,
                    error = %e,
                    "fired rule not dispatched"
                );
            }
        }
    }
}
