//! `dretry config` – show where the config lives and what it resolves to.

use anyhow::Result;
use dretry_core::config::{self, DretryConfig};
use std::path::Path;

pub fn run_show_config(cfg: &DretryConfig, path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);

    let policy = cfg.retry_policy()?;
    let budget = cfg.budget()?;
    println!();
    println!("# effective retry policy");
    println!("# budget: {:?}", budget);
    println!("# max attempts: {}", policy.max_retries.saturating_add(1));
    for retry in 1..=policy.max_retries {
        println!("# delay before retry {}: {:?}", retry, policy.backoff.delay(retry));
    }
    match policy.attempt_timeout {
        Some(t) => println!("# attempt timeout: {:?} (clamped to the budget)", t),
        None => println!("# attempt timeout: remaining budget"),
    }
    Ok(())
}
