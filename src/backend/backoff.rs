//! Reconnect throttling for the TCP link.
//!
//! A connect attempt is permitted only when the time since the previous
//! attempt is at least the current delay. Each failure multiplies the delay by
//! [`BackoffPolicy::factor`] up to [`BackoffPolicy::max`]; a success resets it
//! to [`BackoffPolicy::base`]. No timer is involved: callers simply ask
//! [`Backoff::ready`] before touching the network.

use std::time::{Duration, Instant};

/// Initial delay between connect attempts
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Multiplier applied after each failed attempt
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Upper bound on the delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Parameters of the exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after a success (and before the first failure)
    pub base: Duration,
    /// Growth factor per consecutive failure
    pub factor: f64,
    /// Cap on the delay
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            factor: DEFAULT_BACKOFF_FACTOR,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Delay after `failures` consecutive failures: `min(base * factor^failures, max)`
    pub fn delay_after(&self, failures: u32) -> Duration {
        let secs = self.base.as_secs_f64() * self.factor.powi(failures.min(i32::MAX as u32) as i32);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Mutable backoff state owned by the connection manager
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    delay: Duration,
    failures: u32,
    last_attempt: Option<Instant>,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            delay: policy.base,
            failures: 0,
            last_attempt: None,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Current minimum spacing between attempts
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether an attempt is permitted at `now`. The first attempt always is.
    pub fn ready(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.delay,
        }
    }

    /// Time left until an attempt is permitted
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_attempt {
            None => Duration::ZERO,
            Some(last) => self
                .delay
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }

    /// Stamp the start of an attempt
    pub fn mark_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.delay = self.policy.base;
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.delay = self.delay.mul_f64(self.policy.factor).min(self.policy.max);
    }
}
