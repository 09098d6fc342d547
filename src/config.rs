//! Runtime configuration.
//!
//! Loaded from a JSON file or from `CRASHTRIAGE_*` environment variables.
//! Missing values fall back to the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings shared by the classification pipeline and the sync workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Threads in the revision sync pool.
    pub worker_threads: usize,
    /// Per-command limit for repository providers; 0 disables it.
    pub provider_timeout_secs: u64,
    /// Frames used when proposing a signature for a crash.
    pub signature_max_frames: usize,
    /// `log` level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            provider_timeout_secs: 300,
            signature_max_frames: 8,
            log_level: "info".to_string(),
        }
    }
}

impl TriageConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("CRASHTRIAGE_WORKER_THREADS") {
            config.worker_threads = parse_var("CRASHTRIAGE_WORKER_THREADS", &value)?;
        }
        if let Some(value) = lookup("CRASHTRIAGE_PROVIDER_TIMEOUT_SECS") {
            config.provider_timeout_secs = parse_var("CRASHTRIAGE_PROVIDER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("CRASHTRIAGE_SIGNATURE_MAX_FRAMES") {
            config.signature_max_frames = parse_var("CRASHTRIAGE_SIGNATURE_MAX_FRAMES", &value)?;
        }
        if let Some(value) = lookup("CRASHTRIAGE_LOG_LEVEL") {
            config.log_level = value;
        }

        Ok(config)
    }

    pub fn provider_timeout(&self) -> Option<Duration> {
        match self.provider_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}
