//! Terminal failure of a budgeted call.

use super::classify::protocol_status;
use super::outcome::{CancelReason, Outcome, TransportErrorKind};
use super::status::StatusCode;

/// Why a call ended without a response.
///
/// Every terminal state of the retrier is one of these; attempt-level
/// failures are converted with [`CallError::from_outcome`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Network-level failure (connection refused, DNS, ...).
    #[error("transport error: {0}")]
    Transport(TransportErrorKind),
    /// The exchange completed but reported a failure status.
    #[error("rpc failed: {}", describe_protocol(.status, .http_status, .message))]
    Protocol {
        status: Option<StatusCode>,
        http_status: Option<u16>,
        message: Option<String>,
    },
    /// The attempt or the whole call was cancelled.
    #[error("call cancelled: {0}")]
    Cancelled(CancelReason),
    /// No time left to attempt again or to wait out the next backoff.
    #[error("time budget exhausted after {attempts} attempt(s)")]
    BudgetExhausted {
        attempts: u32,
        #[source]
        last: Option<Box<CallError>>,
    },
    /// `grpc-status` metadata could not be parsed.
    #[error("malformed grpc-status metadata {raw:?}")]
    ClassificationDefect { raw: String },
}

impl CallError {
    /// Convert a failed attempt outcome into a terminal error.
    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::TransportError(kind) => CallError::Transport(kind),
            Outcome::Cancelled(reason) => CallError::Cancelled(reason),
            Outcome::Missing => CallError::Protocol {
                status: Some(StatusCode::Unknown),
                http_status: None,
                message: None,
            },
            Outcome::Response(resp) => match protocol_status(&resp) {
                Err(defect) => CallError::ClassificationDefect { raw: defect.raw },
                Ok(status) => CallError::Protocol {
                    status,
                    http_status: Some(resp.http_status),
                    message: resp.grpc_message,
                },
            },
        }
    }

    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, CallError::BudgetExhausted { .. })
    }

    /// gRPC status of the failure, looking through `BudgetExhausted`.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CallError::Protocol { status, .. } => *status,
            CallError::BudgetExhausted { last: Some(last), .. } => last.status(),
            _ => None,
        }
    }
}

fn describe_protocol(
    status: &Option<StatusCode>,
    http_status: &Option<u16>,
    message: &Option<String>,
) -> String {
    let mut out = match status {
        Some(code) => format!("status {}", code),
        None => "no grpc-status".to_string(),
    };
    if let Some(http) = http_status {
        out.push_str(&format!(", HTTP {}", http));
    }
    if let Some(msg) = message {
        out.push_str(&format!(": {}", msg));
    }
    out
}
