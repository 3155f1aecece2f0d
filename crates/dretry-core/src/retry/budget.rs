//! Absolute deadline governing one logical call, retries and backoff included.

use std::time::Duration;
use tokio::time::Instant;

/// Roughly 30 years; used when a requested budget overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Fixed for the lifetime of a call; never reset per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    deadline: Instant,
}

impl TimeBudget {
    pub fn until(deadline: Instant) -> Self {
        Self { deadline }
    }

    /// Budget expiring `budget` from now.
    pub fn from_now(budget: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(budget).unwrap_or(now + FAR_FUTURE);
        Self { deadline }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn is_exhausted(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn budget_counts_down_and_exhausts() {
        let budget = TimeBudget::from_now(Duration::from_secs(1));
        assert_eq!(budget.remaining(Instant::now()), Duration::from_secs(1));
        assert!(!budget.is_exhausted(Instant::now()));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(budget.remaining(Instant::now()), Duration::from_millis(600));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(budget.is_exhausted(Instant::now()));
        assert_eq!(budget.remaining(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn zero_budget_is_already_exhausted() {
        let budget = TimeBudget::from_now(Duration::ZERO);
        assert!(budget.is_exhausted(budget.deadline()));
    }

    #[test]
    fn huge_budget_does_not_overflow() {
        let budget = TimeBudget::from_now(Duration::MAX);
        assert!(!budget.is_exhausted(Instant::now()));
    }
}
