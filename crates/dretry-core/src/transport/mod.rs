//! Transports the retrier can drive.
//!
//! The retrier only sees [`Invoker`]: one attempt in, one [`Outcome`] out.
//! [`GrpcHttpInvoker`] is the libcurl-backed gRPC-over-HTTP implementation.

mod frame;
mod grpc_http;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::retry::Outcome;

pub use frame::{encode_frame, grpc_timeout, is_compressed_frame, parse_response};
pub use grpc_http::{GrpcHttpInvoker, TransportOptions};

/// Performs a single attempt of a call.
#[async_trait]
pub trait Invoker: Send + Sync {
    type Request: Send + Sync;

    /// Run one attempt. Must give up by `deadline` and report it as
    /// `Outcome::Cancelled(CancelReason::LocalDeadline)`.
    async fn invoke(&self, request: &Self::Request, deadline: Instant) -> Outcome;

    /// Human-readable endpoint, used in logs.
    fn target(&self) -> String {
        "<unknown>".to_string()
    }
}
