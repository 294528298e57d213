use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{RelayerConfig, MAX_DELAY_MS};

/// How a failed attempt was classified by the destination adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Rejected,
}

/// Exponential backoff with a cap and upward jitter.
///
/// The undelayed value doubles each attempt and jitter adds at most
/// `jitter * value` before the cap is applied. Since the jitter ratio never
/// exceeds 1.0, a jittered delay is never larger than the next attempt's
/// base value, so successive delays are non-decreasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl Backoff {
    /// Delays are clamped to [`MAX_DELAY_MS`] so a scheduled instant can
    /// never overflow.
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        let ceiling = Duration::from_millis(MAX_DELAY_MS);
        let base = base.min(ceiling);
        Self {
            base,
            cap: cap.min(ceiling).max(base),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `attempt` (1-based), with `sample` in `[0, 1)`.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let undelayed = self
            .base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.cap)
            .min(self.cap);
        let jitter = undelayed.mul_f64(self.jitter * sample.clamp(0.0, 1.0));
        (undelayed + jitter).min(self.cap)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let sample = rand::thread_rng().gen::<f64>();
        self.delay_with_sample(attempt, sample)
    }
}

/// Decides whether and when a failed submission is attempted again.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    backoff: Backoff,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(backoff: Backoff, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &RelayerConfig) -> Self {
        Self::new(
            Backoff::new(
                Duration::from_millis(config.retry_base_delay_ms),
                Duration::from_millis(config.retry_max_delay_ms),
                config.retry_jitter,
            ),
            config.max_attempts,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `attempts` is the number of submissions already made. `None` means
    /// stop: the failure was `Rejected`, or the attempt budget is spent.
    pub fn next_delay(&self, attempts: u32, kind: FailureKind) -> Option<Duration> {
        match kind {
            FailureKind::Rejected => None,
            FailureKind::Transient if attempts >= self.max_attempts => None,
            FailureKind::Transient => Some(self.backoff.delay(attempts)),
        }
    }
}

/// Retry bookkeeping for one in-flight message.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempts: u32,
    pub next_attempt_at: Instant,
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new(now: Instant) -> Self {
        Self {
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
        }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.next_attempt_at <= now
    }
}
