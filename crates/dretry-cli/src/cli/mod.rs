//! CLI for the dretry client.

mod commands;
mod hello;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dretry_core::config::{self, DretryConfig};
use dretry_core::retry::TransportErrorKind;
use std::path::PathBuf;

use commands::{outcome_from_args, run_call, run_classify, run_show_config};

/// Top-level CLI for dretry.
#[derive(Debug, Parser)]
#[command(name = "dretry")]
#[command(about = "dretry: gRPC calls with retries bounded by one deadline", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/dretry/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Issue one unary call, retrying transient failures within the time budget.
    Call(CallArgs),

    /// Show how an attempt outcome would be classified.
    Classify {
        /// HTTP status of a completed exchange.
        #[arg(long, value_name = "CODE")]
        http_status: Option<u16>,
        /// Raw grpc-status metadata sent with --http-status.
        #[arg(long, value_name = "VALUE", requires = "http_status")]
        grpc_status: Option<String>,
        /// Transport failure kind (e.g. connection_refused, name_resolution).
        #[arg(long, value_name = "KIND")]
        transport: Option<TransportErrorKind>,
        /// The attempt hit its client-side deadline.
        #[arg(long)]
        timeout: bool,
        /// Nothing came back: no response and no error.
        #[arg(long)]
        missing: bool,
    },

    /// Print the config file path and effective configuration.
    Config,
}

/// Options for `dretry call`. Unset values come from the config file.
#[derive(Debug, Args)]
pub struct CallArgs {
    /// Server base URL (e.g. https://localhost:5001).
    #[arg(long, value_name = "URL")]
    pub target: Option<String>,
    /// Method path (e.g. /greet.Greeter/SayHello).
    #[arg(long, value_name = "PATH")]
    pub method: Option<String>,
    /// Send a Greeter HelloRequest with this name and print the reply message.
    #[arg(long, conflicts_with = "payload_hex")]
    pub name: Option<String>,
    /// Raw request message bytes, hex-encoded.
    #[arg(long, value_name = "HEX")]
    pub payload_hex: Option<String>,
    /// Time budget for the whole call, retries included.
    #[arg(long, value_name = "MS")]
    pub budget_ms: Option<u64>,
    /// Retries after the first attempt.
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,
    /// Cap on a single attempt; never exceeds the remaining budget.
    #[arg(long, value_name = "MS")]
    pub attempt_timeout_ms: Option<u64>,
    /// Skip TLS certificate verification.
    #[arg(long)]
    pub insecure: bool,
    /// Use HTTP/1.1 instead of HTTP/2.
    #[arg(long)]
    pub http1: bool,
    /// Print the call report as JSON.
    #[arg(long)]
    pub json: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<DretryConfig> {
    match path {
        Some(p) => config::load_from_path(p),
        None => config::load_or_init(),
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = load_config(cli.config.as_ref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Call(args) => run_call(&cfg, &args).await?,
            CliCommand::Classify {
                http_status,
                grpc_status,
                transport,
                timeout,
                missing,
            } => {
                let outcome = outcome_from_args(http_status, grpc_status, transport, timeout, missing)?;
                run_classify(&cfg, &outcome);
            }
            CliCommand::Config => run_show_config(&cfg, cli.config.as_deref())?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
