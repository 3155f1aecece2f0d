//! gRPC message framing and response metadata parsing.

use std::time::Duration;

use crate::retry::RpcResponse;

/// Length-prefixed message frame: 1 byte compressed flag + 4 byte big-endian length.
const PREFIX_LEN: usize = 5;

/// Largest value the `grpc-timeout` header accepts in one unit (8 digits).
const TIMEOUT_MAX_DIGITS: u128 = 99_999_999;

/// Wrap an uncompressed message in the gRPC length prefix.
pub fn encode_frame(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PREFIX_LEN + message.len());
    out.push(0);
    out.extend_from_slice(&(message.len() as u32).to_be_bytes());
    out.extend_from_slice(message);
    out
}

/// First message of an uncompressed framed body. Anything else is returned
/// as-is: compressed frames (flag 1) and bodies without a valid prefix, such
/// as an HTML error page from a proxy.
fn decode_frame(body: &[u8]) -> Vec<u8> {
    if body.len() < PREFIX_LEN {
        return body.to_vec();
    }
    let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
    match body.get(PREFIX_LEN..PREFIX_LEN + len) {
        Some(message) if body[0] == 0 => message.to_vec(),
        _ => body.to_vec(),
    }
}

/// Whether `payload` is still a compressed gRPC frame (left in place by [`parse_response`]).
pub fn is_compressed_frame(payload: &[u8]) -> bool {
    if payload.len() < PREFIX_LEN || payload[0] != 1 {
        return false;
    }
    let len = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]) as usize;
    payload.len() >= PREFIX_LEN + len
}

/// `grpc-timeout` header value for the remaining attempt time.
pub fn grpc_timeout(remaining: Duration) -> String {
    let millis = remaining.as_millis().max(1);
    if millis <= TIMEOUT_MAX_DIGITS {
        return format!("{}m", millis);
    }
    let secs = u128::from(remaining.as_secs()).min(TIMEOUT_MAX_DIGITS);
    format!("{}S", secs)
}

/// Build an [`RpcResponse`] from the HTTP status, header/trailer lines, and body.
///
/// Lines are what libcurl hands to its header callback: status lines, headers,
/// and trailers. A status line starts a new response (redirects, 100-continue),
/// so metadata seen before it is discarded.
pub fn parse_response(http_status: u32, lines: &[String], body: &[u8]) -> RpcResponse {
    let mut grpc_status = None;
    let mut grpc_message = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            grpc_status = None;
            grpc_message = None;
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("grpc-status") {
                grpc_status = Some(value.to_string());
            }
            if name.eq_ignore_ascii_case("grpc-message") {
                grpc_message = Some(percent_decode(value));
            }
        }
    }

    RpcResponse {
        http_status: u16::try_from(http_status).unwrap_or(0),
        grpc_status,
        grpc_message,
        payload: decode_frame(body),
    }
}

/// `grpc-message` is percent-encoded UTF-8; invalid escapes are kept verbatim.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
