//! Scrubbing secrets and identifiers before interactions hit disk

use once_cell::sync::Lazy;
use regex::Regex;

use super::{RecordedRequest, RecordedResponse};
use crate::error::{Error, Result};
use crate::http::Headers;

pub const SANITIZED: &str = "Sanitized";
pub const ZERO_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

static SUBSCRIPTION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(/subscriptions/)",
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
    ))
    .expect("subscription id pattern is valid")
});

#[derive(Debug, Clone)]
pub struct Sanitizer {
    redacted_headers: Vec<String>,
    replacements: Vec<(Regex, String)>,
}

impl Default for Sanitizer {
    /// Redacts `Authorization` and zeroes subscription ids in URLs, headers
    /// and bodies
    fn default() -> Self {
        Self {
            redacted_headers: vec!["authorization".into()],
            replacements: vec![(
                Regex::clone(&SUBSCRIPTION_ID),
                format!("${{1}}{ZERO_SUBSCRIPTION}"),
            )],
        }
    }
}

impl Sanitizer {
    /// A sanitizer that changes nothing
    pub fn none() -> Self {
        Self {
            redacted_headers: Vec::new(),
            replacements: Vec::new(),
        }
    }

    pub fn redact_header(mut self, name: &str) -> Self {
        self.redacted_headers.push(name.to_ascii_lowercase());
        self
    }

    /// Replace every match of `pattern`; `replacement` may use `$1` groups
    pub fn replace(mut self, pattern: &str, replacement: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("bad sanitizer pattern {pattern:?}: {e}")))?;
        self.replacements.push((regex, replacement.to_string()));
        Ok(self)
    }

    pub fn apply_request(&self, request: &mut RecordedRequest) {
        request.url = self.scrub(&request.url);
        if !request.base64 {
            request.body = self.scrub(&request.body);
        }
        self.scrub_headers(&mut request.headers);
    }

    pub fn apply_response(&self, response: &mut RecordedResponse) {
        if !response.base64 {
            response.body = self.scrub(&response.body);
        }
        self.scrub_headers(&mut response.headers);
    }

    fn scrub_headers(&self, headers: &mut Headers) {
        for (name, value) in headers.iter_mut() {
            if self.redacted_headers.iter().any(|h| h == name) {
                *value = SANITIZED.to_string();
            } else {
                *value = self.scrub(value);
            }
        }
    }

    fn scrub(&self, text: &str) -> String {
        let mut text = text.to_string();
        for (regex, replacement) in &self.replacements {
            text = regex.replace_all(&text, replacement.as_str()).into_owned();
        }
        text
    }
}
