//! `dretry call` – one unary call with retries inside a single time budget.

use anyhow::{bail, Context, Result};
use dretry_core::config::DretryConfig;
use dretry_core::retry::{CallReport, Retrier, RetryPolicy, TimeBudget};
use dretry_core::transport::{is_compressed_frame, GrpcHttpInvoker, TransportOptions};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::{hello, CallArgs};

/// Call settings after applying command-line overrides to the config.
#[derive(Debug, Clone)]
pub(crate) struct CallSettings {
    pub target: String,
    pub method: String,
    pub budget: Duration,
    pub policy: RetryPolicy,
    pub options: TransportOptions,
}

pub(crate) fn resolve_settings(cfg: &DretryConfig, args: &CallArgs) -> Result<CallSettings> {
    let budget = match args.budget_ms {
        Some(ms) => Duration::from_millis(ms),
        None => cfg.budget()?,
    };
    let mut policy = cfg.retry_policy()?;
    if let Some(n) = args.max_retries {
        policy.max_retries = n;
    }
    if let Some(ms) = args.attempt_timeout_ms {
        policy.attempt_timeout = Some(Duration::from_millis(ms));
    }
    let mut options = cfg.transport_options();
    options.insecure |= args.insecure;
    if args.http1 {
        options.http2 = false;
    }
    Ok(CallSettings {
        target: args.target.clone().unwrap_or_else(|| cfg.target.clone()),
        method: args.method.clone().unwrap_or_else(|| cfg.method.clone()),
        budget,
        policy,
        options,
    })
}

pub(crate) fn request_payload(args: &CallArgs) -> Result<Vec<u8>> {
    if let Some(name) = &args.name {
        return Ok(hello::encode_request(name));
    }
    match &args.payload_hex {
        Some(h) => hex::decode(h.trim()).context("--payload-hex is not valid hex"),
        None => Ok(Vec::new()),
    }
}

fn report_json(report: &CallReport, endpoint: &str) -> serde_json::Value {
    let mut out = report.to_json();
    out["endpoint"] = serde_json::Value::from(endpoint);
    if let Ok(resp) = &report.result {
        out["payload_hex"] = serde_json::Value::from(hex::encode(&resp.payload));
    }
    out
}

pub async fn run_call(cfg: &DretryConfig, args: &CallArgs) -> Result<()> {
    let settings = resolve_settings(cfg, args)?;
    let request = request_payload(args)?;
    let invoker = GrpcHttpInvoker::new(&settings.target, &settings.method, settings.options.clone())?;
    let endpoint = invoker.endpoint().to_string();
    let retrier = Retrier::new(invoker, cfg.classifier(), settings.policy);

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted; cancelling call");
                cancel.cancel();
            }
        }
    });

    tracing::info!(
        endpoint = %endpoint,
        budget_ms = settings.budget.as_millis() as u64,
        max_retries = settings.policy.max_retries,
        "starting call"
    );
    let report = retrier
        .run(&request, TimeBudget::from_now(settings.budget), &cancel)
        .await;
    ctrl_c.abort();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report_json(&report, &endpoint))?);
    }

    let resp = report
        .result
        .with_context(|| format!("call to {} failed after {} attempt(s)", endpoint, report.attempts.len()))?;

    if is_compressed_frame(&resp.payload) {
        bail!("{} sent a compressed reply; compressed messages are not supported", endpoint);
    }
    if !args.json {
        if args.name.is_some() {
            println!("{}", hello::decode_reply(&resp.payload)?);
        } else {
            println!("{}", hex::encode(&resp.payload));
        }
    }
    Ok(())
}
