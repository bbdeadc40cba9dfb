//! The per-tenant rule engine.
//!
//! An [`Engine`] owns a fact store, an evaluator, an observer registry and
//! an action pool. Every mutation of working memory and the evaluator call
//! that follows it happen under one lock, so each cycle sees a consistent
//! snapshot and cycles for the same tenant never interleave.

mod cycle;
mod error;
mod summary;


use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;
use vigil_actions::{ActionHandler, ActionPool, ActionRouter, LogActionHandler, PoolStats};
use vigil_core::{
    Clock, EngineConfig, FiredRuleRecord, Reading, ReadingFact, RuleId, SourceId, SystemClock,
};

use crate::evaluator::RuleEvaluator;
use crate::facts::FactStore;
use crate::observer::{AsyncObserver, ObserverId, ObserverRegistry};
use crate::scheduler::{self, SchedulerHandle};

pub use cycle::CycleOutcome;
pub use error::{EngineError, EngineState};

#[derive(Debug, Default)]
pub(crate) struct WorkingMemory {
    pub(crate) facts: FactStore,
    /// Last record per rule, kept for cooldowns and introspection.
    pub(crate) fired: HashMap<RuleId, FiredRuleRecord>,
}

/// State shared between the engine handle and its scheduler task.
pub(crate) struct EngineInner {
    pub(crate) tenant_id: String,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) observers: ObserverRegistry,
    evaluator: Arc<dyn RuleEvaluator>,
    memory: Mutex<WorkingMemory>,
    last_evaluation_at: AtomicI64,
    pool: ActionPool,
}

impl EngineInner {
    pub(crate) fn lock_memory(&self) -> MutexGuard<'_, WorkingMemory> {
        // Evaluator panics are caught inside the lock, so poisoning only
        // follows a bug in the engine itself; the data is still consistent.
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn last_evaluation_at(&self) -> i64 {
        self.last_evaluation_at.load(Ordering::Acquire)
    }

    pub(crate) fn tracked_sources(&self) -> Vec<SourceId> {
        self.lock_memory().facts.source_ids()
    }

    /// Re-run the cycle for `source_id` with its stored reading and arrival
    /// timestamp. Returns the reading that was re-evaluated, or `None` if
    /// the source is unknown.
    pub(crate) fn reevaluate(&self, source_id: &SourceId) -> Option<(CycleOutcome, Reading)> {
        let (cycle, reading) = {
            let mut memory = self.lock_memory();
            let fact = memory.facts.reading(source_id)?.clone();
            let cycle = self.apply_and_evaluate(
                &mut memory,
                fact.source_id,
                fact.reading.clone(),
                fact.arrival_millis,
            );
            (cycle, fact.reading)
        };
        let outcome = cycle.outcome;
        self.dispatch(cycle.actions);
        Some((outcome, reading))
    }
}

struct Lifecycle {
    state: EngineState,
    scheduler: Option<SchedulerHandle>,
}

/// Streaming rule engine for a single tenant.
pub struct Engine {
    inner: Arc<EngineInner>,
    lifecycle: Mutex<Lifecycle>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    tenant_id: String,
    evaluator: Arc<dyn RuleEvaluator>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    router: Option<ActionRouter>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Action routing for fired rules. Defaults to logging every fired rule.
    pub fn router(mut self, router: ActionRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn build(self) -> Engine {
        let router = self.router.unwrap_or_else(|| {
            let log: Arc<dyn ActionHandler> = Arc::new(LogActionHandler);
            ActionRouter::with_defaults(vec![log])
        });
        let pool = ActionPool::new(self.config.pool.clone(), Arc::new(router));

        Engine {
            inner: Arc::new(EngineInner {
                tenant_id: self.tenant_id,
                config: self.config,
                clock: self.clock,
                observers: ObserverRegistry::new(),
                evaluator: self.evaluator,
                memory: Mutex::new(WorkingMemory::default()),
                last_evaluation_at: AtomicI64::new(0),
                pool,
            }),
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::Created,
                scheduler: None,
            }),
        }
    }
}

impl Engine {
    pub fn builder(tenant_id: impl Into<String>, evaluator: Arc<dyn RuleEvaluator>) -> EngineBuilder {
        EngineBuilder {
            tenant_id: tenant_id.into(),
            evaluator,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            router: None,
        }
    }

    /// Engine on the system clock with the default log action.
    pub fn new(tenant_id: impl Into<String>, evaluator: Arc<dyn RuleEvaluator>, config: EngineConfig) -> Self {
        Self::builder(tenant_id, evaluator).config(config).build()
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the action pool and, if enabled, the idle scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.state != EngineState::Created {
            return Err(EngineError::InvalidTransition {
                from: lifecycle.state,
                to: EngineState::Running,
            });
        }

        self.inner.pool.start()?;
        self.inner
            .last_evaluation_at
            .store(self.inner.clock.now_millis(), Ordering::Release);

        if self.inner.config.scheduler.idle_reevaluation_enabled {
            lifecycle.scheduler = Some(scheduler::spawn(Arc::clone(&self.inner)));
        }
        lifecycle.state = EngineState::Running;

        info!(
            tenant = %self.inner.tenant_id,
            idle_reevaluation = self.inner.config.scheduler.idle_reevaluation_enabled,
            "rule engine started"
        );
        Ok(())
    }

    /// Stop the scheduler (letting an in-flight tick finish), drain or
    /// discard queued actions per the pool's policy, and clear observers.
    ///
    /// Idempotent.
    pub async fn stop(&self) {
        let scheduler = {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.state == EngineState::Stopped {
                return;
            }
            lifecycle.state = EngineState::Stopped;
            lifecycle.scheduler.take()
        };

        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        self.inner.pool.shutdown().await;
        self.inner.observers.clear();

        info!(tenant = %self.inner.tenant_id, "rule engine stopped");
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        match self.lock_lifecycle().state {
            EngineState::Running => Ok(()),
            state => Err(EngineError::NotRunning(state)),
        }
    }

    /// Apply a reading and evaluate the rule set against the updated facts.
    ///
    /// Stale readings are dropped. Evaluator failures are logged and
    /// reported in the outcome; they never fail the call.
    ///
    /// Blocks while another cycle holds the working memory. Async callers
    /// with a slow evaluator should call this from `spawn_blocking`.
    pub fn evaluate(
        &self,
        source_id: impl Into<SourceId>,
        reading: Reading,
        arrival_millis: i64,
    ) -> Result<CycleOutcome, EngineError> {
        self.ensure_running()?;
        let cycle = {
            let mut memory = self.inner.lock_memory();
            self.inner
                .apply_and_evaluate(&mut memory, source_id.into(), reading, arrival_millis)
        };
        let outcome = cycle.outcome;
        self.inner.dispatch(cycle.actions);
        Ok(outcome)
    }

    /// Insert (or replace) the retained record for a rule and evaluate.
    pub fn record_fired_rule(
        &self,
        rule_id: impl Into<RuleId>,
        fired: bool,
        fired_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<CycleOutcome, EngineError> {
        self.ensure_running()?;
        let mut record = FiredRuleRecord::new(rule_id, fired_at);
        record.fired = fired;

        let cycle = {
            let mut memory = self.inner.lock_memory();
            self.inner.insert_fired_and_evaluate(&mut memory, record)
        };
        let outcome = cycle.outcome;
        self.inner.dispatch(cycle.actions);
        Ok(outcome)
    }

    pub fn register_observer(&self, observer: Arc<dyn AsyncObserver>) -> ObserverId {
        self.inner.observers.register(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.unregister(id)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    pub fn state(&self) -> EngineState {
        self.lock_lifecycle().state
    }

    pub fn tenant_id(&self) -> &str {
        &self.inner.tenant_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn tracked_sources(&self) -> Vec<SourceId> {
        self.inner.tracked_sources()
    }

    pub fn reading(&self, source_id: &SourceId) -> Option<ReadingFact> {
        self.inner.lock_memory().facts.reading(source_id).cloned()
    }

    pub fn last_fired(&self, rule_id: &RuleId) -> Option<FiredRuleRecord> {
        self.inner.lock_memory().fired.get(rule_id).cloned()
    }

    /// Clock reading at the start of the most recent evaluation, or at
    /// engine start if nothing has been evaluated yet.
    pub fn last_evaluation_at_millis(&self) -> i64 {
        self.inner.last_evaluation_at()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }
}
