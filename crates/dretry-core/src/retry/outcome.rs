//! What a single attempt produced, as reported by the transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result of one invocation of the underlying call.
///
/// Transport failures and cancellations are values here rather than errors so
/// the classifier can look at every attempt the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The HTTP exchange completed; status metadata may still report failure.
    Response(RpcResponse),
    /// The exchange failed below the RPC layer.
    TransportError(TransportErrorKind),
    /// The exchange was aborted before a response arrived.
    Cancelled(CancelReason),
    /// Neither a response nor an error was produced.
    Missing,
}

/// Response metadata and payload of a completed exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcResponse {
    /// HTTP status of the exchange (200 for a well-formed gRPC response).
    pub http_status: u16,
    /// Raw `grpc-status` value from headers or trailers, if present.
    pub grpc_status: Option<String>,
    /// Decoded `grpc-message` value, if present.
    pub grpc_message: Option<String>,
    /// Response message bytes with gRPC framing removed.
    pub payload: Vec<u8>,
}

impl RpcResponse {
    /// HTTP 200 with no status metadata.
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            http_status: 200,
            payload,
            ..Self::default()
        }
    }

    /// Response carrying the given raw `grpc-status` value.
    pub fn with_status(http_status: u16, grpc_status: impl Into<String>) -> Self {
        Self {
            http_status,
            grpc_status: Some(grpc_status.into()),
            ..Self::default()
        }
    }

    /// Response with a transport status and no status metadata (e.g. a proxy 503).
    pub fn http(http_status: u16) -> Self {
        Self {
            http_status,
            ..Self::default()
        }
    }
}

/// Network-level failure kinds the transport can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    ConnectionRefused,
    HostUnreachable,
    HostDown,
    AddressNotAvailable,
    NameResolution,
    ConnectionReset,
    Tls,
    Other,
}

impl TransportErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            TransportErrorKind::ConnectionRefused => "connection_refused",
            TransportErrorKind::HostUnreachable => "host_unreachable",
            TransportErrorKind::HostDown => "host_down",
            TransportErrorKind::AddressNotAvailable => "address_not_available",
            TransportErrorKind::NameResolution => "name_resolution",
            TransportErrorKind::ConnectionReset => "connection_reset",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [TransportErrorKind; 8] = [
            TransportErrorKind::ConnectionRefused,
            TransportErrorKind::HostUnreachable,
            TransportErrorKind::HostDown,
            TransportErrorKind::AddressNotAvailable,
            TransportErrorKind::NameResolution,
            TransportErrorKind::ConnectionReset,
            TransportErrorKind::Tls,
            TransportErrorKind::Other,
        ];
        let wanted = s.trim().replace('-', "_");
        ALL.iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown transport error kind {:?}", s))
    }
}

/// Why an attempt was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The deadline handed to the invoker passed on the client side.
    LocalDeadline,
    /// The caller gave up on the whole call.
    CallerAbandoned,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::LocalDeadline => f.write_str("local deadline exceeded"),
            CancelReason::CallerAbandoned => f.write_str("caller abandoned the call"),
        }
    }
}
