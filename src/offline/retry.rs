//! # Retry Logic and Backoff Strategies
//!
//! Transient failures are retried on the next drain pass. This module keeps
//! that from turning into a request storm:
//!
//! - **Pass backoff**: consecutive passes that end with transient failures
//!   push out the next *periodic* pass, exponentially with jitter. Explicit
//!   triggers ignore it.
//! - **Attempt limit**: with `max_transient_attempts` set, an action that
//!   keeps failing transiently is reported as exhausted so the engine can
//!   reject it.
//!
//! Attempt counts are retry metadata only and live in memory; the queue
//! itself is never changed by a transient failure.

use crate::shared::config::{BackoffConfig, BackoffKind, SyncConfig};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// How long to wait after the n-th consecutive failure
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Same interval every time
    Fixed {
        interval_secs: u64,
    },
    /// Doubling interval, capped, with proportional jitter
    Exponential {
        base_secs: u64,
        max_secs: u64,
        /// Jitter factor (0.0 to 1.0)
        jitter: f64,
    },
}

impl BackoffStrategy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        match config.strategy {
            BackoffKind::Fixed => BackoffStrategy::Fixed {
                interval_secs: config.base_secs,
            },
            BackoffKind::Exponential => BackoffStrategy::Exponential {
                base_secs: config.base_secs,
                max_secs: config.max_secs,
                jitter: config.jitter,
            },
        }
    }

    /// Delay before retrying after `attempt` consecutive failures (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { interval_secs } => Duration::from_secs(*interval_secs),
            BackoffStrategy::Exponential {
                base_secs,
                max_secs,
                jitter,
            } => {
                let exponent = attempt.saturating_sub(1).min(32);
                let delay = base_secs.saturating_mul(1u64 << exponent).min(*max_secs);
                let delay = Duration::from_secs(delay);
                delay + delay.mul_f64(jitter * rand::random::<f64>())
            }
        }
    }
}

/// Retry metadata for one queued action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Consecutive transient failures
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Default)]
struct PassState {
    consecutive_failures: u32,
    next_periodic_at: Option<Instant>,
}

/// Tracks transient failures across drain passes
#[derive(Debug)]
pub struct RetryManager {
    retrying: RwLock<HashMap<i64, RetryState>>,
    passes: RwLock<PassState>,
    strategy: BackoffStrategy,
    max_attempts: Option<u32>,
}

impl RetryManager {
    pub fn new(strategy: BackoffStrategy, max_attempts: Option<u32>) -> Self {
        Self {
            retrying: RwLock::new(HashMap::new()),
            passes: RwLock::new(PassState::default()),
            strategy,
            max_attempts,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            BackoffStrategy::from_config(&config.backoff),
            config.max_transient_attempts,
        )
    }

    /// Record a transient failure; returns the attempts so far
    pub async fn record_failure(&self, action_id: i64, error: impl Into<String>) -> u32 {
        let mut retrying = self.retrying.write().await;
        let state = retrying.entry(action_id).or_insert(RetryState {
            attempts: 0,
            last_error: String::new(),
        });
        state.attempts += 1;
        state.last_error = error.into();
        state.attempts
    }

    /// Whether `attempts` has reached the configured limit
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Forget an action that was applied or rejected
    pub async fn clear(&self, action_id: i64) {
        self.retrying.write().await.remove(&action_id);
    }

    /// Drop metadata of actions no longer queued; returns how many were dropped
    pub async fn retain_queued(&self, queued: &HashSet<i64>) -> usize {
        let mut retrying = self.retrying.write().await;
        let before = retrying.len();
        retrying.retain(|id, _| queued.contains(id));
        before - retrying.len()
    }

    pub async fn state(&self, action_id: i64) -> Option<RetryState> {
        self.retrying.read().await.get(&action_id).cloned()
    }

    pub async fn count_retrying(&self) -> usize {
        self.retrying.read().await.len()
    }

    /// Close out a pass; returns the backoff now in force, if any
    pub async fn record_pass(&self, had_transient_failures: bool) -> Option<Duration> {
        let mut passes = self.passes.write().await;
        if had_transient_failures {
            passes.consecutive_failures += 1;
            let delay = self.strategy.delay(passes.consecutive_failures);
            passes.next_periodic_at = Some(Instant::now() + delay);
            Some(delay)
        } else {
            *passes = PassState::default();
            None
        }
    }

    /// Time left before a periodic pass may run; `None` when it may run now
    pub async fn periodic_wait(&self) -> Option<Duration> {
        let at = self.passes.read().await.next_periodic_at?;
        let left = at.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }

    /// Whether a periodic pass may run now
    pub async fn ready_for_periodic(&self) -> bool {
        self.periodic_wait().await.is_none()
    }

    pub async fn consecutive_failed_passes(&self) -> u32 {
        self.passes.read().await.consecutive_failures
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(BackoffStrategy::from_config(&BackoffConfig::default()), None)
    }
}
