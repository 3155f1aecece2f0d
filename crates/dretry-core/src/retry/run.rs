//! Retry loop: attempt, classify, and back off until success, a fatal failure,
//! or the call's time budget runs out.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::budget::TimeBudget;
use super::classify::{Classification, StatusClassifier};
use super::error::CallError;
use super::observe::{RetryEvent, RetryObserver, TracingObserver};
use super::outcome::{CancelReason, Outcome, RpcResponse};
use super::policy::{RetryDecision, RetryPolicy};
use crate::transport::Invoker;

/// One attempt as seen by the retrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub number: u32,
    pub started_at: Instant,
    /// Deadline handed to the invoker for this attempt.
    pub deadline: Instant,
    pub classification: Classification,
    /// What the attempt failed with; `None` for the successful attempt.
    pub failure: Option<CallError>,
}

/// Everything that happened during one call.
#[derive(Debug)]
pub struct CallReport {
    pub started_at: Instant,
    pub attempts: Vec<AttemptRecord>,
    pub result: Result<RpcResponse, CallError>,
    pub elapsed: Duration,
}

impl CallReport {
    /// Attempt timeline and outcome as JSON. Times are milliseconds since the call started.
    pub fn to_json(&self) -> serde_json::Value {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        let attempts: Vec<serde_json::Value> = self
            .attempts
            .iter()
            .map(|a| {
                let mut entry = serde_json::json!({
                    "number": a.number,
                    "started_ms": ms(a.started_at - self.started_at),
                    "deadline_ms": ms(a.deadline - self.started_at),
                    "classification": a.classification.to_string(),
                });
                if let Some(failure) = &a.failure {
                    entry["error"] = serde_json::Value::from(failure.to_string());
                    if let Some(code) = failure.status() {
                        entry["status"] = serde_json::Value::from(code.name());
                    }
                }
                entry
            })
            .collect();
        let mut out = serde_json::json!({
            "ok": self.result.is_ok(),
            "elapsed_ms": ms(self.elapsed),
            "attempts": attempts,
        });
        if let Err(e) = &self.result {
            out["error"] = serde_json::Value::from(e.to_string());
            out["budget_exhausted"] = serde_json::Value::from(e.is_budget_exhausted());
            if let Some(code) = e.status() {
                out["status"] = serde_json::Value::from(code.name());
            }
        }
        out
    }
}

/// Runs calls against an invoker under a shared policy and classifier.
///
/// Holds no per-call state, so one retrier can serve concurrent calls.
pub struct Retrier<I, O = TracingObserver> {
    invoker: I,
    classifier: StatusClassifier,
    policy: RetryPolicy,
    observer: O,
    target: String,
}

impl<I: Invoker> Retrier<I> {
    pub fn new(invoker: I, classifier: StatusClassifier, policy: RetryPolicy) -> Self {
        let target = invoker.target();
        Self {
            invoker,
            classifier,
            policy,
            observer: TracingObserver,
            target,
        }
    }
}

impl<I: Invoker, O: RetryObserver> Retrier<I, O> {
    /// Replace the retry observer.
    pub fn with_observer<P: RetryObserver>(self, observer: P) -> Retrier<I, P> {
        Retrier {
            invoker: self.invoker,
            classifier: self.classifier,
            policy: self.policy,
            observer,
            target: self.target,
        }
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    /// Call with retries, all within `budget`.
    pub async fn call(&self, request: &I::Request, budget: TimeBudget) -> Result<RpcResponse, CallError> {
        self.run(request, budget, &CancellationToken::new()).await.result
    }

    /// Like [`call`](Self::call), but stops early once `cancel` fires.
    pub async fn call_with_cancel(
        &self,
        request: &I::Request,
        budget: TimeBudget,
        cancel: &CancellationToken,
    ) -> Result<RpcResponse, CallError> {
        self.run(request, budget, cancel).await.result
    }

    /// Call and return the full attempt history along with the result.
    pub async fn run(&self, request: &I::Request, budget: TimeBudget, cancel: &CancellationToken) -> CallReport {
        let started = Instant::now();
        let mut attempts = Vec::new();
        let result = self.drive(request, budget, cancel, &mut attempts).await;
        match &result {
            Ok(_) => tracing::debug!(endpoint = %self.target, attempts = attempts.len(), "call succeeded"),
            Err(e) => tracing::info!(endpoint = %self.target, attempts = attempts.len(), "call failed: {}", e),
        }
        CallReport {
            started_at: started,
            attempts,
            result,
            elapsed: started.elapsed(),
        }
    }

    /// Observers are best-effort: a panicking one is logged and the call goes on.
    fn notify(&self, event: &RetryEvent<'_>) {
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| self.observer.on_retry(event)));
        if delivered.is_err() {
            tracing::warn!(endpoint = %self.target, attempt = event.attempt, "retry observer panicked; ignoring");
        }
    }

    async fn drive(
        &self,
        request: &I::Request,
        budget: TimeBudget,
        cancel: &CancellationToken,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Result<RpcResponse, CallError> {
        let deadline = budget.deadline();
        let mut attempt_index = 0u32;
        let mut last_failure: Option<CallError> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(CallError::Cancelled(CancelReason::CallerAbandoned));
            }
            let now = Instant::now();
            if budget.is_exhausted(now) {
                tracing::debug!(endpoint = %self.target, attempt_index, "no budget left for another attempt");
                return Err(CallError::BudgetExhausted {
                    attempts: attempt_index,
                    last: last_failure.map(Box::new),
                });
            }

            let attempt_deadline = self.policy.attempt_deadline(now, deadline);
            let outcome = self.invoker.invoke(request, attempt_deadline).await;
            let classification = self.classifier.classify(&outcome);
            let record = move |failure: Option<CallError>| AttemptRecord {
                number: attempt_index + 1,
                started_at: now,
                deadline: attempt_deadline,
                classification,
                failure,
            };

            let failure = match (classification, outcome) {
                (Classification::Success, Outcome::Response(resp)) => {
                    attempts.push(record(None));
                    return Ok(resp);
                }
                (_, outcome) => CallError::from_outcome(outcome),
            };
            attempts.push(record(Some(failure.clone())));

            match self.policy.decide(attempt_index, classification, Instant::now(), deadline) {
                RetryDecision::Stop => return Err(failure),
                RetryDecision::BudgetExhausted { delay } => {
                    tracing::debug!(
                        endpoint = %self.target,
                        attempt = attempt_index + 1,
                        delay_ms = delay.as_millis() as u64,
                        "backoff would pass the deadline"
                    );
                    return Err(CallError::BudgetExhausted {
                        attempts: attempt_index + 1,
                        last: Some(Box::new(failure)),
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    self.notify(&RetryEvent {
                        attempt: attempt_index + 1,
                        classification,
                        delay,
                        target: &self.target,
                        failure: &failure,
                    });
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {
                            tracing::debug!(endpoint = %self.target, "call abandoned during backoff");
                            return Err(CallError::Cancelled(CancelReason::CallerAbandoned));
                        }
                    }
                    last_failure = Some(failure);
                    attempt_index += 1;
                }
            }
        }
    }
}
