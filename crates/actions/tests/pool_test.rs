//! Behavioural tests for the action dispatch pool.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use vigil_actions::{ActionError, ActionHandler, ActionPool, ActionRouter, DispatchError};
use vigil_core::{
    ActionRequest, DrainPolicy, FiredRuleRecord, PoolConfig, Reading, ReadingFact, SourceId,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn request(rule: &str) -> ActionRequest {
    ActionRequest {
        tenant_id: "tenant-1".to_string(),
        record: FiredRuleRecord::new(rule, Utc::now()),
        trigger: Some(ReadingFact {
            source_id: SourceId::from("sensor-1"),
            reading: Reading::new().with_field("temp", 30),
            arrival_millis: 0,
        }),
    }
}

fn pool_config(core: usize, max: usize) -> PoolConfig {
    PoolConfig {
        core_workers: core,
        max_workers: max,
        idle_keep_alive_secs: 1,
        drain_policy: DrainPolicy::Drain,
    }
}

/// Records the rule id of every request it executes.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

#[async_trait::async_trait]
impl ActionHandler for Recorder {
    async fn execute(&self, request: &ActionRequest) -> Result<(), ActionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.seen.lock().unwrap().push(request.record.rule_id.to_string());
        Ok(())
    }
    fn handler_name(&self) -> &str {
        "recorder"
    }
}

/// Blocks until the gate opens.
struct Gated {
    gate: watch::Receiver<bool>,
    started: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ActionHandler for Gated {
    async fn execute(&self, _request: &ActionRequest) -> Result<(), ActionError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.clone();
        let _ = gate.wait_for(|open| *open).await;
        Ok(())
    }
    fn handler_name(&self) -> &str {
        "gated"
    }
}

/// Panics or fails depending on the rule id.
struct Unreliable {
    ok_count: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ActionHandler for Unreliable {
    async fn execute(&self, request: &ActionRequest) -> Result<(), ActionError> {
        match request.record.rule_id.as_str() {
            "boom" => panic!("handler exploded"),
            "bad" => Err(ActionError::Delivery("downstream refused".to_string())),
            _ => {
                self.ok_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
    fn handler_name(&self) -> &str {
        "unreliable"
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ── Ordering / exactly-once ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn sequential_submissions_run_once_in_order() {
    let recorder = Arc::new(Recorder::default());
    let router = ActionRouter::with_defaults(vec![recorder.clone() as Arc<dyn ActionHandler>]);
    let pool = ActionPool::new(pool_config(1, 1), Arc::new(router));
    pool.start().unwrap();

    let expected: Vec<String> = (0..50).map(|i| format!("rule-{i}")).collect();
    for id in &expected {
        pool.submit(request(id)).unwrap();
    }

    pool.shutdown().await;

    assert_eq!(*recorder.seen.lock().unwrap(), expected);
    let stats = pool.stats();
    assert_eq!(stats.executed, 50);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.queued, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_request_runs_exactly_once_across_workers() {
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
        delay: Some(Duration::from_millis(2)),
    });
    let router = ActionRouter::with_defaults(vec![recorder.clone() as Arc<dyn ActionHandler>]);
    let pool = ActionPool::new(pool_config(2, 8), Arc::new(router));
    pool.start().unwrap();

    for i in 0..200 {
        pool.submit(request(&format!("rule-{i}"))).unwrap();
    }
    pool.shutdown().await;

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 200);
    let unique: HashSet<&String> = seen.iter().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(pool.stats().executed, 200);
}

// ── Growth and shrink ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn pool_grows_to_max_under_load_and_shrinks_back_to_core() {
    let (open_tx, open_rx) = watch::channel(false);
    let started = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(Gated {
        gate: open_rx,
        started: started.clone(),
    });
    let pool = ActionPool::new(pool_config(1, 4), Arc::new(ActionRouter::with_defaults(vec![handler as Arc<dyn ActionHandler>])));
    pool.start().unwrap();
    settle().await;
    assert_eq!(pool.stats().live_workers, 1);

    for i in 0..6 {
        pool.submit(request(&format!("r{i}"))).unwrap();
    }
    settle().await;

    let stats = pool.stats();
    assert_eq!(stats.live_workers, 4);
    assert_eq!(started.load(Ordering::SeqCst), 4);
    assert_eq!(stats.queued, 2);

    open_tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let stats = pool.stats();
    assert_eq!(stats.executed, 6);
    assert_eq!(stats.live_workers, 1, "extra workers retire after keep-alive");

    pool.shutdown().await;
    assert_eq!(pool.stats().live_workers, 0);
}

// ── Failure isolation ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failing_and_panicking_actions_do_not_stop_the_pool() {
    let ok_count = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(Unreliable {
        ok_count: ok_count.clone(),
    });
    let pool = ActionPool::new(pool_config(1, 1), Arc::new(ActionRouter::with_defaults(vec![handler as Arc<dyn ActionHandler>])));
    pool.start().unwrap();

    for rule in ["boom", "ok-1", "bad", "ok-2"] {
        pool.submit(request(rule)).unwrap();
    }
    pool.shutdown().await;

    assert_eq!(ok_count.load(Ordering::SeqCst), 2);
    let stats = pool.stats();
    assert_eq!(stats.executed, 4);
    assert_eq!(stats.failed, 2);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn submit_requires_a_running_pool() {
    let pool = ActionPool::new(pool_config(1, 2), Arc::new(ActionRouter::empty()));
    assert_eq!(pool.submit(request("early")), Err(DispatchError::NotStarted));

    pool.start().unwrap();
    assert!(pool.is_running());
    assert!(pool.submit(request("ok")).is_ok());

    pool.shutdown().await;
    assert!(!pool.is_running());
    assert_eq!(pool.submit(request("late")), Err(DispatchError::ShutDown));
    assert_eq!(pool.start(), Err(DispatchError::ShutDown));
}

#[test]
fn start_outside_runtime_fails() {
    let pool = ActionPool::new(pool_config(1, 1), Arc::new(ActionRouter::empty()));
    assert_eq!(pool.start(), Err(DispatchError::NoRuntime));
}

#[tokio::test(start_paused = true)]
async fn discard_policy_drops_untaken_requests() {
    let (open_tx, open_rx) = watch::channel(false);
    let started = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(Gated {
        gate: open_rx,
        started: started.clone(),
    });
    let mut config = pool_config(1, 1);
    config.drain_policy = DrainPolicy::Discard;
    let pool = Arc::new(ActionPool::new(
        config,
        Arc::new(ActionRouter::with_defaults(vec![handler as Arc<dyn ActionHandler>])),
    ));
    pool.start().unwrap();

    for i in 0..5 {
        pool.submit(request(&format!("r{i}"))).unwrap();
    }
    settle().await;
    assert_eq!(started.load(Ordering::SeqCst), 1);

    let stopping = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.shutdown().await })
    };
    settle().await;
    open_tx.send(true).unwrap();
    stopping.await.unwrap();

    let stats = pool.stats();
    assert_eq!(stats.executed, 1, "in-flight action finishes");
    assert_eq!(stats.discarded, 4);
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn drain_policy_runs_everything_queued() {
    let (open_tx, open_rx) = watch::channel(false);
    let started = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(Gated {
        gate: open_rx,
        started: started.clone(),
    });
    let pool = Arc::new(ActionPool::new(
        pool_config(1, 1),
        Arc::new(ActionRouter::with_defaults(vec![handler as Arc<dyn ActionHandler>])),
    ));
    pool.start().unwrap();

    for i in 0..5 {
        pool.submit(request(&format!("r{i}"))).unwrap();
    }
    settle().await;

    let stopping = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.shutdown().await })
    };
    settle().await;
    open_tx.send(true).unwrap();
    stopping.await.unwrap();

    assert_eq!(pool.stats().executed, 5);
    assert_eq!(started.load(Ordering::SeqCst), 5);
}
