// ABOUTME: Runner configuration loaded from a TOML file and command-line overrides
// ABOUTME: Validation happens before any remote call so config mistakes fail fast

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, RunnerError};
use crate::orchestrator::{OrchestratorSettings, DEFAULT_POLL_INTERVAL};
use crate::remote::client::DEFAULT_BASE_URL;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_OUTPUT_DIR: &str = "out";

/// Raw, partially filled configuration. Both the config file and the command
/// line produce one of these; [`ConfigLayer::merge`] lets the later layer win.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub account_id: Option<u64>,
    pub job_id: Option<u64>,
    pub api_key: Option<String>,
    pub cause: Option<String>,
    pub wait_for_result: Option<bool>,
    /// Minutes.
    pub max_wait_time: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

impl ConfigLayer {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| RunnerError::Config(format!("Invalid configuration file: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RunnerError::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            account_id: over.account_id.or(self.account_id),
            job_id: over.job_id.or(self.job_id),
            api_key: over.api_key.or(self.api_key),
            cause: over.cause.or(self.cause),
            wait_for_result: over.wait_for_result.or(self.wait_for_result),
            max_wait_time: over.max_wait_time.or(self.max_wait_time),
            poll_interval_secs: over.poll_interval_secs.or(self.poll_interval_secs),
            base_url: over.base_url.or(self.base_url),
            output_dir: over.output_dir.or(self.output_dir),
            request_timeout_secs: over.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

/// Fully resolved and validated configuration.
#[derive(Clone)]
pub struct RunnerConfig {
    pub account_id: u64,
    pub job_id: u64,
    pub api_key: String,
    pub cause: String,
    pub wait_for_result: bool,
    pub max_wait: Option<Duration>,
    pub poll_interval: Duration,
    pub base_url: String,
    pub output_dir: PathBuf,
    pub request_timeout: Duration,
}

impl RunnerConfig {
    pub fn resolve(layer: ConfigLayer) -> Result<Self> {
        let account_id = layer.account_id.ok_or_else(|| missing("account_id"))?;
        let job_id = layer.job_id.ok_or_else(|| missing("job_id"))?;
        let api_key = layer.api_key.unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RunnerError::Config(
                "api_key must be set to a non-empty dbt Cloud API token".to_string(),
            ));
        }
        let cause = layer.cause.unwrap_or_default();
        if cause.trim().is_empty() {
            return Err(missing("cause"));
        }

        let poll_interval = match layer.poll_interval_secs {
            Some(0) => {
                return Err(RunnerError::Config(
                    "poll_interval_secs must be greater than zero".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            account_id,
            job_id,
            api_key,
            cause,
            wait_for_result: layer.wait_for_result.unwrap_or(true),
            max_wait: layer
                .max_wait_time
                .filter(|minutes| *minutes > 0)
                .map(|minutes| Duration::from_secs(minutes.saturating_mul(60))),
            poll_interval,
            base_url: layer
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            output_dir: layer
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            request_timeout: Duration::from_secs(
                layer
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            wait_for_result: self.wait_for_result,
            poll_interval: self.poll_interval,
            max_wait: self.max_wait,
            ..OrchestratorSettings::default()
        }
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("account_id", &self.account_id)
            .field("job_id", &self.job_id)
            .field("api_key", &"<redacted>")
            .field("cause", &self.cause)
            .field("wait_for_result", &self.wait_for_result)
            .field("max_wait", &self.max_wait)
            .field("poll_interval", &self.poll_interval)
            .field("base_url", &self.base_url)
            .field("output_dir", &self.output_dir)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn missing(key: &str) -> RunnerError {
    RunnerError::Config(format!("Missing required parameter '{}'", key))
}
