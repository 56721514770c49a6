//! On-disk cassette format (YAML)

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::http::{Headers, Request, Response};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
    /// `body` holds base64 because the bytes were not UTF-8
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub base64: bool,
}

impl From<&Request> for RecordedRequest {
    fn from(request: &Request) -> Self {
        let (body, base64) = encode_body(request.body());
        Self {
            method: request.method().as_str().to_string(),
            url: request.url().to_string(),
            headers: request.headers().clone(),
            body,
            base64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub base64: bool,
}

impl From<&Response> for RecordedResponse {
    fn from(response: &Response) -> Self {
        let (body, base64) = encode_body(response.body());
        Self {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
            body,
            base64,
        }
    }
}

impl RecordedResponse {
    pub fn to_response(&self) -> Result<Response> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| Error::Protocol(format!("recorded status {} is invalid", self.status)))?;
        let body = if self.base64 {
            BASE64_STANDARD
                .decode(self.body.trim())
                .map_err(|e| Error::Protocol(format!("recorded body is not base64: {e}")))?
        } else {
            self.body.clone().into_bytes()
        };
        Ok(Response::new(status, self.headers.clone(), body))
    }
}

/// Text bodies stay readable in the YAML; anything else is base64
fn encode_body(bytes: &[u8]) -> (String, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (BASE64_STANDARD.encode(bytes), true),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cassette {
    pub name: String,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    /// Values generated during recording (random names, timestamps)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Cassette {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// `<dir>/<name>.yaml`
    pub fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.yaml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!("cassette {} not found; record it first", path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        let cassette: Cassette = serde_yaml::from_str(&content)?;
        debug!(
            "Loaded cassette '{}' with {} interactions",
            cassette.name,
            cassette.interactions.len()
        );
        Ok(cassette)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        debug!(
            "Saved cassette '{}' ({} interactions) to {:?}",
            self.name,
            self.interactions.len(),
            path
        );
        Ok(())
    }
}
