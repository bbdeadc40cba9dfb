use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

/// Parse a profiled env var, warning and falling back to `default` on bad input.
fn profiled_env_parse<T>(profile: &str, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    match profiled_env_opt(profile, key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "invalid config value, using default");
            default
        }),
        None => default,
    }
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            tracing::warn!(key, value = %v, default, "invalid boolean config value, using default");
            default
        }
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Per-engine configuration. One value is shared by every engine a worker
/// process hosts; engines copy it at construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    pub scheduler: SchedulerConfig,
    pub pool: PoolConfig,
}

impl EngineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIGIL_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VIGIL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            scheduler: SchedulerConfig::from_env_profiled(p),
            pool: PoolConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn with_idle_reevaluation(mut self, enabled: bool) -> Self {
        self.scheduler.idle_reevaluation_enabled = enabled;
        self
    }

    pub fn with_idle_threshold_millis(mut self, millis: i64) -> Self {
        self.scheduler.idle_threshold_ms = millis;
        self
    }

    pub fn with_scheduler_timing(mut self, initial_delay: Duration, period: Duration) -> Self {
        self.scheduler.initial_delay_ms = duration_millis(initial_delay);
        self.scheduler.period_ms = duration_millis(period);
        self
    }

    pub fn with_pool_workers(mut self, core: usize, max: usize) -> Self {
        self.pool.core_workers = core;
        self.pool.max_workers = max;
        self
    }

    pub fn with_pool_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.pool.idle_keep_alive_secs = keep_alive.as_secs();
        self
    }

    pub fn with_drain_policy(mut self, policy: DrainPolicy) -> Self {
        self.pool.drain_policy = policy;
        self
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   enabled={}, initial_delay={}ms, period={}ms, idle_threshold={}ms",
            self.scheduler.idle_reevaluation_enabled,
            self.scheduler.initial_delay_ms,
            self.scheduler.period_ms,
            self.scheduler.idle_threshold_ms,
        );
        tracing::info!(
            "  pool:        core={}, max={}, keep_alive={}s, drain={:?}",
            self.pool.core_workers,
            self.pool.max_workers,
            self.pool.idle_keep_alive_secs,
            self.pool.drain_policy,
        );
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Idle re-evaluation scheduler ──────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the idle re-evaluation timer runs at all.
    pub idle_reevaluation_enabled: bool,
    /// Delay before the first tick.
    pub initial_delay_ms: u64,
    /// Interval between ticks.
    pub period_ms: u64,
    /// A tick only forces re-evaluation when the last evaluation cycle
    /// is at least this old.
    pub idle_threshold_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_reevaluation_enabled: true,
            initial_delay_ms: 10_000,
            period_ms: 5_000,
            idle_threshold_ms: 5_000,
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            idle_reevaluation_enabled: profiled_env_bool(
                p,
                "VIGIL_IDLE_REEVALUATION",
                d.idle_reevaluation_enabled,
            ),
            initial_delay_ms: profiled_env_parse(p, "VIGIL_SCHEDULER_INITIAL_DELAY_MS", d.initial_delay_ms),
            period_ms: profiled_env_parse(p, "VIGIL_SCHEDULER_PERIOD_MS", d.period_ms),
            idle_threshold_ms: profiled_env_parse(p, "VIGIL_IDLE_THRESHOLD_MS", d.idle_threshold_ms),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Tick period; a zero period is clamped to 1ms.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

// ── Action dispatch pool ──────────────────────────────────────

/// What happens to queued actions when the pool shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Workers finish everything already queued.
    #[default]
    Drain,
    /// Queued items that no worker has picked up are dropped.
    Discard,
}

impl std::str::FromStr for DrainPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "discard" => Ok(Self::Discard),
            other => Err(format!("unknown drain policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Workers kept alive even when idle.
    pub core_workers: usize,
    /// Upper bound on concurrently running workers.
    pub max_workers: usize,
    /// Idle time after which a worker above `core_workers` exits.
    pub idle_keep_alive_secs: u64,
    pub drain_policy: DrainPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_workers: 1,
            max_workers: 10,
            idle_keep_alive_secs: 60,
            drain_policy: DrainPolicy::Drain,
        }
    }
}

impl PoolConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            core_workers: profiled_env_parse(p, "VIGIL_POOL_CORE_WORKERS", d.core_workers),
            max_workers: profiled_env_parse(p, "VIGIL_POOL_MAX_WORKERS", d.max_workers),
            idle_keep_alive_secs: profiled_env_parse(
                p,
                "VIGIL_POOL_IDLE_KEEP_ALIVE_SECS",
                d.idle_keep_alive_secs,
            ),
            drain_policy: profiled_env_parse(p, "VIGIL_POOL_DRAIN_POLICY", d.drain_policy),
        }
    }

    pub fn idle_keep_alive(&self) -> Duration {
        Duration::from_secs(self.idle_keep_alive_secs)
    }

    /// `max_workers` never below `core_workers`, and at least one worker.
    pub fn resolved_max_workers(&self) -> usize {
        self.max_workers.max(self.core_workers).max(1)
    }
}
