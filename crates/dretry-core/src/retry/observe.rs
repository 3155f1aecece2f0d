//! Retry notifications for logging and diagnostics.

use std::time::Duration;

use super::classify::Classification;
use super::error::CallError;

/// Emitted right before the retrier sleeps ahead of another attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryEvent<'a> {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub classification: Classification,
    pub delay: Duration,
    /// Endpoint description from the invoker.
    pub target: &'a str,
    pub failure: &'a CallError,
}

/// Best-effort sink for retry events.
///
/// Called synchronously on the call's task; implementations must not block
/// and cannot influence the retry decision.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, event: &RetryEvent<'_>);
}

/// Logs each retry at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        let status = event
            .failure
            .status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        tracing::warn!(
            attempt = event.attempt,
            classification = %event.classification,
            grpc_status = %status,
            delay_ms = event.delay.as_millis() as u64,
            "request {} failed ({}); retry in {:?}",
            event.target,
            event.failure,
            event.delay
        );
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RetryObserver for NoopObserver {
    fn on_retry(&self, _event: &RetryEvent<'_>) {}
}

impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        (**self).on_retry(event)
    }
}
