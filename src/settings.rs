//! Operator settings.
//!
//! Loaded from `config.toml` under the muster home directory. Every section
//! is optional; a missing file means all defaults. Settings cover the
//! ambient concerns (logging, provider endpoint, retry budgets), never
//! cluster shape, which lives in profiles.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ConfigError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingConfig,
    pub provider: ProviderConfig,
    pub retry: RetryConfig,
    pub rollout: RolloutConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// API token; the `MUSTER_PROVIDER_TOKEN` environment variable wins
    /// when set, so tokens stay out of the settings file.
    pub token: Option<String>,
}

/// Attempt budgets for the three wait phases of a rollout.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Provider polling until an instance reports running.
    pub instance: RetrySection,
    /// Shell connection attempts against a freshly booted host.
    pub connect: RetrySection,
    /// HTTP probing of dashboards and notebooks.
    pub endpoint: RetrySection,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// How many worker hosts are configured concurrently.
    pub worker_concurrency: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit browser command; the platform opener when unset.
    pub command: Option<String>,
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadSettings)?;
        let settings = toml::from_str(&content).map_err(ConfigError::ParseSettings)?;
        Ok(settings)
    }

    /// Provider token, preferring the environment over the settings file.
    #[must_use]
    pub fn provider_token(&self) -> Option<String> {
        std::env::var("MUSTER_PROVIDER_TOKEN")
            .ok()
            .or_else(|| self.provider.token.clone())
    }
}

impl LoggingConfig {
    /// Initialize the tracing subscriber with this logging configuration.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

impl RetrySection {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.interval_secs))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8776".into(),
            token: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            instance: RetrySection {
                max_attempts: 40,
                interval_secs: 5,
            },
            connect: RetrySection {
                max_attempts: 20,
                interval_secs: 5,
            },
            endpoint: RetrySection {
                max_attempts: 30,
                interval_secs: 2,
            },
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval_secs: 5,
        }
    }
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 8,
        }
    }
}
