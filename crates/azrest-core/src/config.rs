//! Client configuration
//!
//! Options load from TOML (default `~/.config/azrest/config.toml`) and can be
//! overridden from the environment:
//! - `AZREST_RECORD_MODE`: `record`, `replay` or `live`
//! - `AZREST_MAX_RETRIES`: retry budget per call

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::policies::RetryOptions;
use crate::recording::RecordMode;

pub const RECORD_MODE_ENV: &str = "AZREST_RECORD_MODE";
pub const MAX_RETRIES_ENV: &str = "AZREST_MAX_RETRIES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Wait between LRO polls when the service gives no `Retry-After`
    #[serde(rename = "poll_frequency_ms", with = "millis")]
    pub poll_frequency: Duration,
    /// Application id prepended to the User-Agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Per-attempt transport timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub normalize_query: bool,
    pub retry: RetryOptions,
    pub recording: RecordingOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            poll_frequency: Duration::from_secs(30),
            user_agent: None,
            timeout_secs: None,
            normalize_query: true,
            retry: RetryOptions::default(),
            recording: RecordingOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingOptions {
    pub mode: RecordMode,
    pub cassette_dir: PathBuf,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            mode: RecordMode::Live,
            cassette_dir: PathBuf::from("testdata/recordings"),
        }
    }
}

impl ClientOptions {
    /// Default config location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("azrest").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from `path` (defaults when the file is absent), then apply env overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut options = if path.exists() {
            info!("Loading client options from {:?}", path);
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)?
        } else {
            debug!("No config at {:?}, using defaults", path);
            Self::default()
        };
        options.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(options)
    }

    /// Apply overrides from a variable lookup (the process env in [`Self::load`])
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(mode) = lookup(RECORD_MODE_ENV) {
            self.recording.mode = mode.parse()?;
        }
        if let Some(retries) = lookup(MAX_RETRIES_ENV) {
            self.retry.max_retries = retries
                .trim()
                .parse()
                .map_err(|_| {
                    Error::Config(format!("{MAX_RETRIES_ENV}={retries} is not a number"))
                })?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
