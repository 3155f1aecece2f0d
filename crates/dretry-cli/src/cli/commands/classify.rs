//! `dretry classify` – show the verdict for a hand-described attempt outcome.

use anyhow::{bail, Result};
use dretry_core::config::DretryConfig;
use dretry_core::retry::{
    protocol_status, CallError, CancelReason, Classification, Outcome, RpcResponse, StatusCode,
    TransportErrorKind,
};

/// Build the outcome described by the `classify` flags. Exactly one source is allowed.
///
/// `grpc_status` may be a number or a code name (`UNAVAILABLE`); anything else is
/// passed through verbatim so malformed metadata can be inspected too.
pub fn outcome_from_args(
    http_status: Option<u16>,
    grpc_status: Option<String>,
    transport: Option<TransportErrorKind>,
    timeout: bool,
    missing: bool,
) -> Result<Outcome> {
    let sources = [http_status.is_some(), transport.is_some(), timeout, missing]
        .iter()
        .filter(|set| **set)
        .count();
    if sources != 1 {
        bail!("give exactly one of --http-status, --transport, --timeout, --missing");
    }

    if let Some(http_status) = http_status {
        let grpc_status = grpc_status.map(|raw| match raw.parse::<StatusCode>() {
            Ok(code) => code.as_i32().to_string(),
            Err(_) => raw,
        });
        return Ok(Outcome::Response(RpcResponse {
            http_status,
            grpc_status,
            ..RpcResponse::default()
        }));
    }
    if let Some(kind) = transport {
        return Ok(Outcome::TransportError(kind));
    }
    if timeout {
        return Ok(Outcome::Cancelled(CancelReason::LocalDeadline));
    }
    Ok(Outcome::Missing)
}

pub fn run_classify(cfg: &DretryConfig, outcome: &Outcome) {
    let classifier = cfg.classifier();
    let verdict = classifier.classify(outcome);
    println!("{}", verdict);

    if let Outcome::Response(resp) = outcome {
        match protocol_status(resp) {
            Ok(Some(code)) => println!("  grpc status: {}", code),
            Ok(None) => println!("  grpc status: none (HTTP {})", resp.http_status),
            Err(e) => println!("  grpc status: {}", e),
        }
    }
    if verdict != Classification::Success {
        println!("  error: {}", CallError::from_outcome(outcome.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_exactly_one_source() {
        assert!(outcome_from_args(None, None, None, false, false).is_err());
        assert!(outcome_from_args(Some(200), None, None, true, false).is_err());
        assert!(outcome_from_args(None, None, Some(TransportErrorKind::Tls), false, true).is_err());
    }

    #[test]
    fn status_names_become_numbers() {
        let outcome = outcome_from_args(Some(200), Some("UNAVAILABLE".into()), None, false, false).unwrap();
        assert_eq!(outcome, Outcome::Response(RpcResponse::with_status(200, "14")));

        let outcome = outcome_from_args(Some(200), Some("banana".into()), None, false, false).unwrap();
        assert_eq!(outcome, Outcome::Response(RpcResponse::with_status(200, "banana")));
    }

    #[test]
    fn flag_outcomes() {
        assert_eq!(
            outcome_from_args(None, None, None, true, false).unwrap(),
            Outcome::Cancelled(CancelReason::LocalDeadline)
        );
        assert_eq!(outcome_from_args(None, None, None, false, true).unwrap(), Outcome::Missing);
        assert_eq!(
            outcome_from_args(None, None, Some(TransportErrorKind::HostDown), false, false).unwrap(),
            Outcome::TransportError(TransportErrorKind::HostDown)
        );
        assert_eq!(
            outcome_from_args(Some(503), None, None, false, false).unwrap(),
            Outcome::Response(RpcResponse::http(503))
        );
    }
}
