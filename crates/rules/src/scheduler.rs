//! Idle re-evaluation.
//!
//! When no evaluation has happened for `idle_threshold_ms`, every tracked
//! source is pushed through the evaluation cycle again with its stored
//! reading and arrival time, so time-based conditions (silence, cooldown
//! expiry) are noticed without new traffic. Registered observers are told
//! about each re-evaluated reading.
//!
//! Re-evaluations run on tokio's blocking pool: they take the engine's
//! working-memory lock and call the evaluator, which may be slow.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::{CycleOutcome, EngineInner};

/// What one scheduler tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `false` if the idle threshold had not been reached.
    pub ran: bool,
    pub reevaluated: usize,
    pub evaluator_failures: usize,
    pub observer_failures: usize,
}

pub(crate) struct SchedulerHandle {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop ticking. A tick already in progress runs to completion first.
    pub(crate) async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "idle scheduler ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        // Stored as a permit if the task is mid-tick.
        self.shutdown.notify_one();
    }
}

pub(crate) fn spawn(inner: Arc<EngineInner>) -> SchedulerHandle {
    let shutdown = Arc::new(Notify::new());
    let task = tokio::spawn(run(inner, Arc::clone(&shutdown)));
    SchedulerHandle {
        shutdown,
        task: Some(task),
    }
}

async fn run(inner: Arc<EngineInner>, shutdown: Arc<Notify>) {
    let config = &inner.config.scheduler;
    let mut ticker = tokio::time::interval_at(Instant::now() + config.initial_delay(), config.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        tenant = %inner.tenant_id,
        initial_delay_ms = config.initial_delay_ms,
        period_ms = config.period_ms,
        idle_threshold_ms = config.idle_threshold_ms,
        "idle scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.notified() => break,
        }

        let report = tick(&inner).await;
        if report.ran {
            debug!(
                tenant = %inner.tenant_id,
                reevaluated = report.reevaluated,
                evaluator_failures = report.evaluator_failures,
                observer_failures = report.observer_failures,
                "idle tick finished"
            );
        }
    }

    info!(tenant = %inner.tenant_id, "idle scheduler stopped");
}

pub(crate) async fn tick(inner: &Arc<EngineInner>) -> TickReport {
    let now = inner.clock.now_millis();
    let idle_for = now - inner.last_evaluation_at();
    if idle_for < inner.config.scheduler.idle_threshold_ms {
        return TickReport::default();
    }

    // Taking the lock can wait on an evaluator running elsewhere.
    let sources = match blocking(inner, |inner| inner.tracked_sources()).await {
        Some(sources) => sources,
        None => return TickReport::default(),
    };
    debug!(
        tenant = %inner.tenant_id,
        idle_for_ms = idle_for,
        sources = sources.len(),
        "engine idle, re-evaluating tracked sources"
    );

    let mut report = TickReport {
        ran: true,
        ..TickReport::default()
    };
    for source_id in sources {
        let id = source_id.clone();
        let Some(Some((outcome, reading))) = blocking(inner, move |inner| inner.reevaluate(&id)).await
        else {
            continue;
        };
        match outcome {
            CycleOutcome::Stale => continue,
            CycleOutcome::EvaluatorFailed => report.evaluator_failures += 1,
            CycleOutcome::Evaluated { .. } => {}
        }
        report.reevaluated += 1;

        let notified = inner.observers.notify(&source_id, &reading).await;
        report.observer_failures += notified.failed;
    }
    report
}

async fn blocking<T, F>(inner: &Arc<EngineInner>, f: F) -> Option<T>
where
    F: FnOnce(&EngineInner) -> T + Send + 'static,
    T: Send + 'static,
{
    let shared = Arc::clone(inner);
    match tokio::task::spawn_blocking(move || f(&shared)).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(tenant = %inner.tenant_id, error = %e, "idle re-evaluation task failed");
            None
        }
    }
}
