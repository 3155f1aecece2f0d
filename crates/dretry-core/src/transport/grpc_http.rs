//! Unary gRPC calls over HTTP/2 using libcurl.
//!
//! Each attempt is one blocking curl transfer run on the blocking pool. The
//! attempt deadline becomes both the curl timeout and the `grpc-timeout`
//! header, so client and server give up at the same point.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::str;
use std::time::Duration;
use tokio::time::Instant;

use super::frame;
use super::Invoker;
use crate::retry::{CancelReason, Outcome, RpcResponse, TransportErrorKind};

/// Connection settings for [`GrpcHttpInvoker`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Speak HTTP/2 (prior knowledge for `http://`, ALPN for `https://`).
    pub http2: bool,
    /// Skip TLS peer and host verification (local development certificates).
    pub insecure: bool,
    /// Upper bound on connection setup; further clamped by the attempt deadline.
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            http2: true,
            insecure: false,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

/// [`Invoker`] for a single unary method. Requests are raw message bytes.
#[derive(Debug, Clone)]
pub struct GrpcHttpInvoker {
    endpoint: String,
    options: TransportOptions,
}

impl GrpcHttpInvoker {
    /// `target` is the server base URL, `method` the `/package.Service/Method` path.
    pub fn new(target: &str, method: &str, options: TransportOptions) -> Result<Self> {
        let base = url::Url::parse(target).with_context(|| format!("invalid target URL {:?}", target))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            bail!("unsupported scheme {:?} in {}", base.scheme(), target);
        }
        if !method.starts_with('/') {
            bail!("method path must start with '/': {:?}", method);
        }
        let endpoint = base.join(method).context("invalid method path")?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            options,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Invoker for GrpcHttpInvoker {
    type Request = Vec<u8>;

    async fn invoke(&self, request: &Vec<u8>, deadline: Instant) -> Outcome {
        let remaining = deadline.saturating_duration_since(Instant::now());
        // curl treats a zero timeout as "no timeout".
        if remaining < Duration::from_millis(1) {
            return Outcome::Cancelled(CancelReason::LocalDeadline);
        }
        let endpoint = self.endpoint.clone();
        let options = self.options.clone();
        let body = frame::encode_frame(request);

        match tokio::task::spawn_blocking(move || exchange(&endpoint, &body, remaining, &options)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("transport task join failed: {}", e);
                Outcome::TransportError(TransportErrorKind::Other)
            }
        }
    }

    fn target(&self) -> String {
        self.endpoint.clone()
    }
}

fn exchange(endpoint: &str, body: &[u8], timeout: Duration, options: &TransportOptions) -> Outcome {
    match perform(endpoint, body, timeout, options) {
        Ok(resp) => Outcome::Response(resp),
        Err(e) => {
            tracing::debug!(endpoint, "curl transfer failed: {}", e);
            outcome_for_curl_error(&e)
        }
    }
}

fn perform(
    endpoint: &str,
    body: &[u8],
    timeout: Duration,
    options: &TransportOptions,
) -> Result<RpcResponse, curl::Error> {
    let mut lines: Vec<String> = Vec::new();
    let mut payload: Vec<u8> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(endpoint)?;
    easy.post(true)?;
    easy.post_fields_copy(body)?;
    easy.timeout(timeout)?;
    easy.connect_timeout(options.connect_timeout.min(timeout))?;
    if options.http2 {
        let version = if endpoint.starts_with("https:") {
            curl::easy::HttpVersion::V2TLS
        } else {
            curl::easy::HttpVersion::V2PriorKnowledge
        };
        easy.http_version(version)?;
    }
    if options.insecure {
        easy.ssl_verify_peer(false)?;
        easy.ssl_verify_host(false)?;
    }

    let mut list = curl::easy::List::new();
    list.append("content-type: application/grpc")?;
    list.append("te: trailers")?;
    list.append(&format!("grpc-timeout: {}", frame::grpc_timeout(timeout)))?;
    // No 100-continue round trip on HTTP/1.1.
    list.append("expect:")?;
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        // libcurl passes trailers through the header callback too.
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            payload.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    Ok(frame::parse_response(code, &lines, &payload))
}

/// Map a curl failure onto the attempt outcome the classifier understands.
fn outcome_for_curl_error(e: &curl::Error) -> Outcome {
    if e.is_operation_timedout() {
        return Outcome::Cancelled(CancelReason::LocalDeadline);
    }
    let kind = if e.is_couldnt_connect() {
        TransportErrorKind::ConnectionRefused
    } else if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        TransportErrorKind::NameResolution
    } else if e.is_ssl_connect_error() || e.is_peer_failed_verification() {
        TransportErrorKind::Tls
    } else if e.is_recv_error() || e.is_send_error() || e.is_got_nothing() {
        TransportErrorKind::ConnectionReset
    } else {
        TransportErrorKind::Other
    };
    Outcome::TransportError(kind)
}
