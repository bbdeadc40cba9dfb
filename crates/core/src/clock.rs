//! Millisecond clocks used for arrival stamps and idle-threshold checks.

use chrono::Utc;
use tokio::time::Instant;

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock driven by the tokio timer: `epoch_millis` plus the time elapsed
/// since construction.
///
/// Under `tokio::time::pause()` this advances in lock-step with the
/// scheduler's intervals, so timer-driven behaviour can be tested without
/// real sleeps.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    epoch_millis: i64,
    origin: Instant,
}

impl TokioClock {
    pub fn starting_at(epoch_millis: i64) -> Self {
        Self {
            epoch_millis,
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.epoch_millis.saturating_add(elapsed)
    }
}
