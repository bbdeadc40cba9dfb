//! Observers notified of readings re-evaluated by the idle scheduler.
//!
//! Only the scheduler notifies observers; readings arriving through
//! `Engine::evaluate` do not.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_core::{Reading, SourceId};

/// Errors an observer may report. Logged and otherwise ignored.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("Observer failed: {0}")]
    Failed(String),
}

/// Handle returned by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait::async_trait]
pub trait AsyncObserver: Send + Sync {
    async fn process_data(&self, source_id: &SourceId, reading: &Reading) -> Result<(), ObserverError>;

    fn observer_name(&self) -> &str {
        "observer"
    }
}

/// Outcome of one notification round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<(ObserverId, Arc<dyn AsyncObserver>)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn AsyncObserver>) -> ObserverId {
        let id = ObserverId(Uuid::new_v4());
        debug!(observer = observer.observer_name(), %id, "observer registered");
        self.observers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, observer));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|p| p.into_inner());
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        before != observers.len()
    }

    pub fn clear(&self) {
        self.observers.write().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every observer registered at the time of the call, in
    /// registration order. A failing or panicking observer doesn't stop
    /// the others.
    pub async fn notify(&self, source_id: &SourceId, reading: &Reading) -> NotifyReport {
        let observers: Vec<Arc<dyn AsyncObserver>> = self
            .observers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        let mut report = NotifyReport::default();
        for observer in observers {
            let outcome = AssertUnwindSafe(observer.process_data(source_id, reading))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(
                        observer = observer.observer_name(),
                        source_id = %source_id,
                        error = %e,
                        "observer failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        observer = observer.observer_name(),
                        source_id = %source_id,
                        "observer panicked"
                    );
                }
            }
        }
        report
    }
}

/// Logs every re-evaluated reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

#[async_trait::async_trait]
impl AsyncObserver for LoggingObserver {
    async fn process_data(&self, source_id: &SourceId, reading: &Reading) -> Result<(), ObserverError> {
        let reading = serde_json::to_string(reading).map_err(|e| ObserverError::Failed(e.to_string()))?;
        info!(source_id = %source_id, reading = %reading, "reading re-evaluated");
        Ok(())
    }

    fn observer_name(&self) -> &str {
        "log"
    }
}
