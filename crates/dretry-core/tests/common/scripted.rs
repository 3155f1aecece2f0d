//! In-process invokers and observers for driving the retrier under paused time.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use dretry_core::retry::{
    CancelReason, Classification, Outcome, RetryEvent, RetryObserver, RpcResponse, StatusCode,
};
use dretry_core::transport::Invoker;

/// One scripted attempt: how long the "server" takes and what it returns.
#[derive(Debug, Clone)]
pub struct Step {
    pub latency: Duration,
    pub outcome: Outcome,
}

impl Step {
    pub fn now(outcome: Outcome) -> Self {
        Self {
            latency: Duration::ZERO,
            outcome,
        }
    }

    pub fn after(latency: Duration, outcome: Outcome) -> Self {
        Self { latency, outcome }
    }
}

pub fn grpc(code: StatusCode) -> Outcome {
    Outcome::Response(RpcResponse::with_status(200, code.as_i32().to_string()))
}

pub fn ok(payload: &[u8]) -> Outcome {
    Outcome::Response(RpcResponse::ok(payload.to_vec()))
}

/// What the invoker saw for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct Seen {
    pub started_at: Instant,
    pub deadline: Instant,
}

/// Plays back steps in order, repeating the last one when the script runs out.
///
/// Honors the deadline like a real transport: a step slower than the deadline
/// ends at the deadline with `Cancelled(LocalDeadline)`.
pub struct ScriptedInvoker {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedInvoker {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new(vec![step])
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut last = self.last.lock().unwrap();
        match self.steps.lock().unwrap().pop_front() {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or_else(|| Step::now(Outcome::Missing)),
        }
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    type Request = ();

    async fn invoke(&self, _request: &(), deadline: Instant) -> Outcome {
        let started_at = Instant::now();
        self.seen.lock().unwrap().push(Seen {
            started_at,
            deadline,
        });
        let step = self.next_step();
        let finish = started_at + step.latency;
        if finish > deadline {
            tokio::time::sleep_until(deadline).await;
            return Outcome::Cancelled(CancelReason::LocalDeadline);
        }
        tokio::time::sleep(step.latency).await;
        step.outcome
    }

    fn target(&self) -> String {
        "scripted://test".to_string()
    }
}

/// Answers with the gRPC status given as the request, for concurrency tests.
pub struct EchoStatusInvoker;

#[async_trait]
impl Invoker for EchoStatusInvoker {
    type Request = StatusCode;

    async fn invoke(&self, request: &StatusCode, _deadline: Instant) -> Outcome {
        tokio::time::sleep(Duration::from_millis(100)).await;
        grpc(*request)
    }
}

/// Owned copy of a retry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub attempt: u32,
    pub classification: Classification,
    pub delay: Duration,
    pub target: String,
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }
}

impl RetryObserver for RecordingObserver {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        self.events.lock().unwrap().push(Recorded {
            attempt: event.attempt,
            classification: event.classification,
            delay: event.delay,
            target: event.target.to_string(),
        });
    }
}
