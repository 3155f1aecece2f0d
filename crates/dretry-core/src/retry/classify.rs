//! Classify attempt outcomes (transport errors, HTTP status, gRPC status metadata)
//! into retry verdicts.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::outcome::{CancelReason, Outcome, RpcResponse, TransportErrorKind};
use super::status::StatusCode;

/// Retry verdict for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    RetryableFailure,
    FatalFailure,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Success => f.write_str("success"),
            Classification::RetryableFailure => f.write_str("retryable"),
            Classification::FatalFailure => f.write_str("fatal"),
        }
    }
}

/// `grpc-status` metadata that is not a gRPC status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed grpc-status metadata {raw:?}")]
pub struct MalformedStatus {
    pub raw: String,
}

/// Which outcomes count as transient. Immutable once the classifier is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// gRPC codes retried when carried over a successful HTTP exchange.
    pub retryable_codes: Vec<StatusCode>,
    /// Network failures retried.
    pub retryable_transport: Vec<TransportErrorKind>,
    /// Retry HTTP 5xx and 408 responses regardless of status metadata.
    pub retry_transient_http: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            retryable_codes: vec![
                StatusCode::DeadlineExceeded,
                StatusCode::Internal,
                StatusCode::NotFound,
                StatusCode::ResourceExhausted,
                StatusCode::Unavailable,
                StatusCode::Unknown,
            ],
            retryable_transport: vec![
                TransportErrorKind::AddressNotAvailable,
                TransportErrorKind::ConnectionRefused,
                TransportErrorKind::NameResolution,
                TransportErrorKind::HostUnreachable,
                TransportErrorKind::HostDown,
            ],
            retry_transient_http: true,
        }
    }
}

/// Extract the gRPC status of a completed exchange.
///
/// A bare HTTP 200 counts as `OK`. Without metadata on any other HTTP status
/// there is no gRPC status (`None`).
pub fn protocol_status(resp: &RpcResponse) -> Result<Option<StatusCode>, MalformedStatus> {
    match resp.grpc_status.as_deref() {
        None if resp.http_status == 200 => Ok(Some(StatusCode::Ok)),
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i32>()
            .ok()
            .and_then(StatusCode::from_i32)
            .map(Some)
            .ok_or_else(|| MalformedStatus {
                raw: raw.to_string(),
            }),
    }
}

/// HTTP statuses treated as transient when no usable gRPC status says otherwise.
pub fn is_transient_http(code: u16) -> bool {
    code == 408 || (500..=599).contains(&code)
}

/// Pure, total outcome classifier.
#[derive(Debug, Clone, Default)]
pub struct StatusClassifier {
    config: ClassifierConfig,
}

impl StatusClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_retryable_code(&self, code: StatusCode) -> bool {
        self.config.retryable_codes.contains(&code)
    }

    /// Classify an attempt outcome. Never panics; malformed metadata is fatal.
    pub fn classify(&self, outcome: &Outcome) -> Classification {
        match outcome {
            // Nothing came back: same as an UNKNOWN status, which is retryable by default.
            Outcome::Missing => self.classify_code(StatusCode::Unknown),
            Outcome::Response(resp) => self.classify_response(resp),
            Outcome::TransportError(kind) => {
                if self.config.retryable_transport.contains(kind) {
                    Classification::RetryableFailure
                } else {
                    Classification::FatalFailure
                }
            }
            // A client-side deadline is retried like a server DEADLINE_EXCEEDED.
            // The retrier's budget check is what stops this from running past the call.
            Outcome::Cancelled(CancelReason::LocalDeadline) => Classification::RetryableFailure,
            Outcome::Cancelled(CancelReason::CallerAbandoned) => Classification::FatalFailure,
        }
    }

    fn classify_code(&self, code: StatusCode) -> Classification {
        match code {
            StatusCode::Ok => Classification::Success,
            c if self.is_retryable_code(c) => Classification::RetryableFailure,
            _ => Classification::FatalFailure,
        }
    }

    fn classify_response(&self, resp: &RpcResponse) -> Classification {
        let status = match protocol_status(resp) {
            Ok(status) => status,
            Err(_) => return Classification::FatalFailure,
        };
        if resp.http_status == 200 {
            if let Some(code) = status {
                return self.classify_code(code);
            }
        }
        if self.config.retry_transient_http && is_transient_http(resp.http_status) {
            return Classification::RetryableFailure;
        }
        Classification::FatalFailure
    }
}
