//! Error types for azrest-core

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Service answered with a non-success status
    #[error("{status}: {code}: {message}")]
    Status {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Long-running operation reached `Failed` or `Canceled`
    #[error("long-running operation finished with status {status}")]
    OperationFailed { status: String, body: String },

    /// Service broke the polling or paging protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Replay found nothing recorded for this request
    #[error("no recorded interaction matches {method} {url}")]
    NoMatchingInteraction { method: String, url: String },

    #[error("authentication failed: {0}")]
    Credential(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Transport failures worth another attempt (connection resets, timeouts)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
