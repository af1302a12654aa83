use crate::types::{AnalysisConfig, AnalysisError};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff, Clock, SystemClock};
use std::time::Duration;

/// Bounded exponential backoff for transient analysis failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Optional cap on wall time since the first attempt. Attempts are
    /// already bounded, so configured policies leave this unset; slow
    /// requests would otherwise eat into the attempt budget.
    pub max_elapsed: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            multiplier: 2.0,
            max_elapsed: None,
        }
    }

    pub fn start(&self) -> RetryState<SystemClock> {
        self.start_with_clock(SystemClock::default())
    }

    /// Start a retry sequence against an explicit clock; tests pass a manual one.
    pub fn start_with_clock<C: Clock>(&self, clock: C) -> RetryState<C> {
        let start_time = clock.now();
        let backoff = ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.max_delay,
            start_time,
            max_elapsed_time: self.max_elapsed,
            clock,
        };

        RetryState {
            attempts: 0,
            max_attempts: self.max_attempts,
            backoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Attempt counter plus backoff schedule for one batch.
pub struct RetryState<C: Clock> {
    attempts: u32,
    max_attempts: u32,
    backoff: ExponentialBackoff<C>,
}

impl<C: Clock> RetryState<C> {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Record a failed attempt and decide what happens next.
    /// Permanent errors and cancellation never retry.
    pub fn record_failure(&mut self, error: &AnalysisError) -> RetryDecision {
        self.attempts += 1;
        if !error.is_transient() || self.is_exhausted() {
            return RetryDecision::GiveUp;
        }
        match self.backoff.next_backoff() {
            Some(delay) => RetryDecision::RetryAfter(delay),
            None => RetryDecision::GiveUp,
        }
    }
}
