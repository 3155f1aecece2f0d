use std::time::Duration;
use tokio::time::Instant;

use super::classify::Classification;

/// Delay schedule between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base + step * retry`.
    Linear { base: Duration, step: Duration },
    /// `base * 2^(retry - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear {
            base: Duration::from_secs(3),
            step: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (1 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Linear { base, step } => base.saturating_add(step.saturating_mul(retry)),
            Backoff::Exponential { base, max } => {
                let exp = 1u32 << retry.saturating_sub(1).min(8);
                base.saturating_mul(exp).min(max)
            }
        }
    }
}

/// Decision returned by the retry policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; the attempt's failure is terminal.
    Stop,
    /// Retry after the given delay.
    RetryAfter(Duration),
    /// A retry was warranted but waiting `delay` would reach the deadline.
    BudgetExhausted { delay: Duration },
}

/// Retry configuration shared by every call. Read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 => at most 4 attempts).
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Optional cap on a single attempt. Always clamped to the call deadline.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Deadline handed to an attempt starting at `now`.
    ///
    /// Never later than the call deadline, whatever the attempt timeout.
    pub fn attempt_deadline(&self, now: Instant, deadline: Instant) -> Instant {
        match self.attempt_timeout.and_then(|t| now.checked_add(t)) {
            Some(slice_end) => slice_end.min(deadline),
            None => deadline,
        }
    }

    /// Decide what follows attempt `attempt_index` (0 = first attempt).
    ///
    /// Returns `BudgetExhausted` instead of a delay that would wake at or after
    /// `deadline`, so the caller never sleeps into a call it cannot finish.
    pub fn decide(
        &self,
        attempt_index: u32,
        classification: Classification,
        now: Instant,
        deadline: Instant,
    ) -> RetryDecision {
        match classification {
            Classification::Success | Classification::FatalFailure => RetryDecision::Stop,
            Classification::RetryableFailure => {
                if attempt_index >= self.max_retries {
                    return RetryDecision::Stop;
                }
                let delay = self.backoff.delay(attempt_index + 1);
                match now.checked_add(delay) {
                    Some(wake) if wake < deadline => RetryDecision::RetryAfter(delay),
                    _ => RetryDecision::BudgetExhausted { delay },
                }
            }
        }
    }
}
