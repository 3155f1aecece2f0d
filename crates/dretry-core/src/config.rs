use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{Backoff, ClassifierConfig, RetryPolicy, StatusClassifier};
use crate::transport::TransportOptions;

/// Backoff schedule as written in config.toml (`[retry.backoff]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffConfig {
    /// `base_secs + step_secs * retry`.
    Linear { base_secs: f64, step_secs: f64 },
    /// `base_secs * 2^(retry - 1)`, capped at `max_secs`.
    Exponential { base_secs: f64, max_secs: f64 },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Linear {
            base_secs: 3.0,
            step_secs: 1.0,
        }
    }
}

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Optional cap on a single attempt, in seconds. Unset = the remaining budget.
    pub attempt_timeout_secs: Option<f64>,
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout_secs: None,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let backoff = match self.backoff {
            BackoffConfig::Linear { base_secs, step_secs } => Backoff::Linear {
                base: secs("retry.backoff.base_secs", base_secs)?,
                step: secs("retry.backoff.step_secs", step_secs)?,
            },
            BackoffConfig::Exponential { base_secs, max_secs } => Backoff::Exponential {
                base: secs("retry.backoff.base_secs", base_secs)?,
                max: secs("retry.backoff.max_secs", max_secs)?,
            },
        };
        let attempt_timeout = self
            .attempt_timeout_secs
            .map(|s| secs("retry.attempt_timeout_secs", s))
            .transpose()?;
        Ok(RetryPolicy {
            max_retries: self.max_retries,
            backoff,
            attempt_timeout,
        })
    }
}

/// Global configuration loaded from `~/.config/dretry/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DretryConfig {
    /// Server base URL.
    pub target: String,
    /// Method path, `/package.Service/Method`.
    pub method: String,
    /// Time budget for a whole call, retries included, in seconds.
    pub budget_secs: f64,
    /// Skip TLS verification (self-signed development certificates).
    #[serde(default)]
    pub insecure: bool,
    /// Use HTTP/2; gRPC servers generally require it.
    #[serde(default = "default_http2")]
    pub http2: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional retryable code/error sets; if missing, built-in defaults are used.
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,
}

fn default_http2() -> bool {
    true
}

impl Default for DretryConfig {
    fn default() -> Self {
        Self {
            target: "https://localhost:5001".to_string(),
            method: "/greet.Greeter/SayHello".to_string(),
            budget_secs: 1.0,
            insecure: false,
            http2: true,
            retry: None,
            classifier: None,
        }
    }
}

impl DretryConfig {
    pub fn budget(&self) -> Result<Duration> {
        secs("budget_secs", self.budget_secs)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    pub fn classifier(&self) -> StatusClassifier {
        StatusClassifier::new(self.classifier.clone().unwrap_or_default())
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            http2: self.http2,
            insecure: self.insecure,
            ..TransportOptions::default()
        }
    }
}

fn secs(field: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        bail!("{} must be a non-negative number of seconds, got {}", field, value);
    }
    Duration::try_from_secs_f64(value).with_context(|| format!("{} out of range: {}", field, value))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dretry")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DretryConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DretryConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<DretryConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: DretryConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{StatusCode, TransportErrorKind};

    #[test]
    fn default_config_values() {
        let cfg = DretryConfig::default();
        assert_eq!(cfg.target, "https://localhost:5001");
        assert_eq!(cfg.method, "/greet.Greeter/SayHello");
        assert_eq!(cfg.budget().unwrap(), Duration::from_secs(1));
        assert!(cfg.http2);
        assert_eq!(cfg.retry_policy().unwrap(), RetryPolicy::default());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = DretryConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: DretryConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_retry_and_classifier() {
        let toml = r#"
            target = "http://127.0.0.1:50051"
            method = "/echo.Echo/Ping"
            budget_secs = 10.5

            [retry]
            max_retries = 5
            attempt_timeout_secs = 2.0

            [retry.backoff]
            kind = "exponential"
            base_secs = 0.25
            max_secs = 4

            [classifier]
            retryable_codes = ["UNAVAILABLE", "RESOURCE_EXHAUSTED"]
            retryable_transport = ["connection_refused"]
            retry_transient_http = false
        "#;
        let cfg: DretryConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.budget().unwrap(), Duration::from_millis(10_500));
        assert!(cfg.http2);
        assert!(!cfg.insecure);

        let policy = cfg.retry_policy().unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.attempt_timeout, Some(Duration::from_secs(2)));
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                base: Duration::from_millis(250),
                max: Duration::from_secs(4),
            }
        );

        let classifier = cfg.classifier();
        assert!(classifier.is_retryable_code(StatusCode::Unavailable));
        assert!(!classifier.is_retryable_code(StatusCode::Unknown));
        assert_eq!(
            classifier.config().retryable_transport,
            vec![TransportErrorKind::ConnectionRefused]
        );
        assert!(!classifier.config().retry_transient_http);
    }

    #[test]
    fn partial_retry_section_uses_defaults() {
        let toml = r#"
            target = "https://localhost:5001"
            method = "/greet.Greeter/SayHello"
            budget_secs = 1

            [retry]
            max_retries = 1
        "#;
        let cfg: DretryConfig = toml::from_str(toml).unwrap();
        let policy = cfg.retry_policy().unwrap();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.backoff, Backoff::default());
        assert_eq!(policy.attempt_timeout, None);
        assert!(cfg.classifier.is_none());
    }

    #[test]
    fn negative_durations_rejected() {
        let cfg = DretryConfig {
            budget_secs: -1.0,
            ..DretryConfig::default()
        };
        assert!(cfg.budget().is_err());

        let cfg = DretryConfig {
            retry: Some(RetryConfig {
                attempt_timeout_secs: Some(f64::NAN),
                ..RetryConfig::default()
            }),
            ..DretryConfig::default()
        };
        assert!(cfg.retry_policy().is_err());
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "target = \"http://localhost:9000\"\nmethod = \"/a.B/C\"\nbudget_secs = 2\nhttp2 = false\n",
        )
        .unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.target, "http://localhost:9000");
        assert!(!cfg.transport_options().http2);

        fs::write(&path, "target = 3").unwrap();
        assert!(load_from_path(&path).is_err());
    }
}
