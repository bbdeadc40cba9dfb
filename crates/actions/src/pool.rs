//! Growable worker pool for fired-rule actions.
//!
//! Submissions go into an unbounded FIFO queue and never block the caller.
//! Workers share the queue's receiver, so every request is taken by exactly
//! one worker, in submission order. The pool starts `core_workers` workers,
//! spawns more (up to `max_workers`) while requests are queued faster than
//! idle workers can take them, and retires the extras after
//! `idle_keep_alive` without work.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vigil_core::{ActionRequest, DrainPolicy, PoolConfig};

use crate::router::ActionRouter;
use crate::traits::DispatchError;

type SharedReceiver = Arc<tokio::sync::Mutex<UnboundedReceiver<ActionRequest>>>;

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub live_workers: usize,
    pub idle_workers: usize,
    pub queued: usize,
    pub executed: u64,
    pub failed: u64,
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    live: AtomicUsize,
    idle: AtomicUsize,
    queued: AtomicUsize,
    executed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    discard_queued: AtomicBool,
    next_worker_id: AtomicUsize,
}

impl PoolCounters {
    /// Give up one live slot if the pool is above its core size and has
    /// nothing queued.
    fn try_retire(&self, core_workers: usize) -> bool {
        let mut live = self.live.load(Ordering::Acquire);
        loop {
            if live <= core_workers || self.queued.load(Ordering::SeqCst) > 0 {
                return false;
            }
            match self
                .live
                .compare_exchange(live, live - 1, Ordering::SeqCst, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
    }

    /// Called right after a successful [`try_retire`](Self::try_retire).
    /// A submit that raced the retirement may have found the pool full and
    /// spawned nobody; take the slot back if anything is queued.
    fn reclaim_if_queued(&self, max_workers: usize) -> bool {
        self.queued.load(Ordering::SeqCst) > 0 && self.try_reserve(max_workers)
    }

    /// Reserve a live slot for a new worker if below `max_workers`.
    fn try_reserve(&self, max_workers: usize) -> bool {
        let mut live = self.live.load(Ordering::SeqCst);
        loop {
            if live >= max_workers {
                return false;
            }
            match self
                .live
                .compare_exchange(live, live + 1, Ordering::SeqCst, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
    }
}

struct Running {
    tx: UnboundedSender<ActionRequest>,
    rx: SharedReceiver,
    runtime: Handle,
    workers: Vec<JoinHandle<()>>,
}

enum PoolState {
    Created,
    Running(Running),
    Stopped,
}

/// Settings copied into every worker task.
#[derive(Clone, Copy)]
struct WorkerSettings {
    core_workers: usize,
    max_workers: usize,
    keep_alive: Duration,
}

/// Bounded worker pool fed by an unbounded FIFO queue of action requests.
pub struct ActionPool {
    config: PoolConfig,
    router: Arc<ActionRouter>,
    counters: Arc<PoolCounters>,
    state: Mutex<PoolState>,
}

impl ActionPool {
    pub fn new(config: PoolConfig, router: Arc<ActionRouter>) -> Self {
        Self {
            config,
            router,
            counters: Arc::new(PoolCounters::default()),
            state: Mutex::new(PoolState::Created),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        // Nothing panics while the state lock is held; recover regardless.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            core_workers: self.config.core_workers,
            max_workers: self.config.resolved_max_workers(),
            // A zero keep-alive would spin idle core workers.
            keep_alive: self.config.idle_keep_alive().max(Duration::from_secs(1)),
        }
    }

    /// Start the core workers on the current tokio runtime.
    ///
    /// Starting an already running pool is a no-op; a stopped pool cannot be
    /// restarted.
    pub fn start(&self) -> Result<(), DispatchError> {
        let mut state = self.lock_state();
        match *state {
            PoolState::Running(_) => return Ok(()),
            PoolState::Stopped => return Err(DispatchError::ShutDown),
            PoolState::Created => {}
        }

        let runtime = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut running = Running {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            runtime,
            workers: Vec::new(),
        };

        for _ in 0..self.config.core_workers.min(self.config.resolved_max_workers()) {
            if self.counters.try_reserve(self.config.resolved_max_workers()) {
                self.spawn_worker(&mut running);
            }
        }

        info!(
            core = self.config.core_workers,
            max = self.config.resolved_max_workers(),
            keep_alive_secs = self.config.idle_keep_alive_secs,
            "action pool started"
        );
        *state = PoolState::Running(running);
        Ok(())
    }

    /// Enqueue a fired-rule action. Never blocks.
    pub fn submit(&self, request: ActionRequest) -> Result<(), DispatchError> {
        let mut state = self.lock_state();
        let running = match &mut *state {
            PoolState::Running(running) => running,
            PoolState::Created => return Err(DispatchError::NotStarted),
            PoolState::Stopped => return Err(DispatchError::ShutDown),
        };

        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if running.tx.send(request).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(DispatchError::ShutDown);
        }

        // Grow when more work is waiting than there are idle workers to take it.
        let queued = self.counters.queued.load(Ordering::Acquire);
        let idle = self.counters.idle.load(Ordering::Acquire);
        if queued > idle && self.counters.try_reserve(self.config.resolved_max_workers()) {
            self.spawn_worker(running);
        }

        Ok(())
    }

    /// Caller must already hold a reserved live slot.
    fn spawn_worker(&self, running: &mut Running) {
        running.workers.retain(|handle| !handle.is_finished());

        let id = self.counters.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let rx = Arc::clone(&running.rx);
        let router = Arc::clone(&self.router);
        let counters = Arc::clone(&self.counters);
        let settings = self.settings();

        let handle = running
            .runtime
            .spawn(worker_loop(id, rx, router, counters, settings));
        running.workers.push(handle);
    }

    /// Stop accepting work and wait for the workers to exit.
    ///
    /// With [`DrainPolicy::Drain`] every queued request is executed first;
    /// with [`DrainPolicy::Discard`] requests no worker has taken yet are
    /// dropped. In-flight actions are never interrupted.
    pub async fn shutdown(&self) {
        let mut running = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, PoolState::Stopped) {
                PoolState::Running(running) => running,
                PoolState::Created | PoolState::Stopped => return,
            }
        };

        if self.config.drain_policy == DrainPolicy::Discard {
            self.counters.discard_queued.store(true, Ordering::Release);
        }

        // Every worker may have retired (core_workers = 0); keep one around
        // so the queue still empties.
        if self.counters.queued.load(Ordering::Acquire) > 0
            && self.counters.try_reserve(1)
        {
            self.spawn_worker(&mut running);
        }

        let Running { tx, workers, .. } = running;
        drop(tx);

        let pending = self.counters.queued.load(Ordering::Acquire);
        info!(pending, policy = ?self.config.drain_policy, "action pool shutting down");

        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "action worker ended abnormally");
            }
        }

        let stats = self.stats();
        info!(
            executed = stats.executed,
            failed = stats.failed,
            discarded = stats.discarded,
            "action pool stopped"
        );
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live_workers: self.counters.live.load(Ordering::Acquire),
            idle_workers: self.counters.idle.load(Ordering::Acquire),
            queued: self.counters.queued.load(Ordering::Acquire),
            executed: self.counters.executed.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
            discarded: self.counters.discarded.load(Ordering::Acquire),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), PoolState::Running(_))
    }
}

async fn worker_loop(
    id: usize,
    rx: SharedReceiver,
    router: Arc<ActionRouter>,
    counters: Arc<PoolCounters>,
    settings: WorkerSettings,
) {
    debug!(worker = id, "action worker started");

    loop {
        counters.idle.fetch_add(1, Ordering::AcqRel);
        let next = tokio::time::timeout(settings.keep_alive, async {
            rx.lock().await.recv().await
        })
        .await;
        counters.idle.fetch_sub(1, Ordering::AcqRel);

        let request = match next {
            Ok(Some(request)) => request,
            // Queue closed and empty.
            Ok(None) => break,
            Err(_) => {
                if counters.try_retire(settings.core_workers) {
                    if counters.reclaim_if_queued(settings.max_workers) {
                        continue;
                    }
                    debug!(worker = id, "idle action worker retired");
                    return;
                }
                continue;
            }
        };
        counters.queued.fetch_sub(1, Ordering::AcqRel);

        if counters.discard_queued.load(Ordering::Acquire) {
            counters.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(worker = id, rule_id = %request.record.rule_id, "discarding queued action");
            continue;
        }

        execute(id, &router, &counters, &request).await;
    }

    counters.live.fetch_sub(1, Ordering::AcqRel);
    debug!(worker = id, "action worker stopped");
}

async fn execute(id: usize, router: &ActionRouter, counters: &PoolCounters, request: &ActionRequest) {
    match AssertUnwindSafe(router.route(request)).catch_unwind().await {
        Ok(results) => {
            counters.executed.fetch_add(1, Ordering::Relaxed);
            if results.iter().any(|r| !r.success) {
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Err(panic) => {
            counters.executed.fetch_add(1, Ordering::Relaxed);
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                worker = id,
                rule_id = %request.record.rule_id,
                tenant = %request.tenant_id,
                panic = %panic_message(panic.as_ref()),
                "action handler panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
