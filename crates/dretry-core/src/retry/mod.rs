//! Deadline-budgeted retry for RPC calls.
//!
//! Classification turns an attempt [`Outcome`] into a verdict; the policy
//! turns a verdict into a backoff decision bounded by the call's
//! [`TimeBudget`]; [`Retrier`] drives the loop against an
//! [`Invoker`](crate::transport::Invoker).

mod budget;
mod classify;
mod error;
mod observe;
mod outcome;
mod policy;
mod run;
mod status;

pub use budget::TimeBudget;
pub use classify::{
    is_transient_http, protocol_status, Classification, ClassifierConfig, MalformedStatus,
    StatusClassifier,
};
pub use error::CallError;
pub use observe::{NoopObserver, RetryEvent, RetryObserver, TracingObserver};
pub use outcome::{CancelReason, Outcome, RpcResponse, TransportErrorKind};
pub use policy::{Backoff, RetryDecision, RetryPolicy};
pub use run::{AttemptRecord, CallReport, Retrier};
pub use status::StatusCode;
