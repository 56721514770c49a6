//! Request/response model shared by every policy and transport
//!
//! Bodies are held in memory so a request can be replayed on retry and an
//! interaction can be written to a cassette.

mod transport;

pub use transport::{ReqwestTransport, Transport};

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::error::{Error, Result};

/// Header map with lowercase names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map = BTreeMap::<String, String>::deserialize(deserializer)?;
        Ok(map.into_iter().collect())
    }
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut String)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// An outgoing HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Serialize `value` as the body and mark it as JSON
    pub fn set_json_body<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        self.headers.insert("content-type", "application/json");
        Ok(())
    }
}

/// A buffered HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Convert a failed response into [`Error::Status`]
    ///
    /// Understands the ARM error envelope (`{"error": {"code", "message"}}`),
    /// the bare `{"code", "message"}` form and the `x-ms-error-code` header.
    pub fn into_error(self) -> Error {
        #[derive(Deserialize)]
        struct Envelope {
            error: Option<Detail>,
            code: Option<String>,
            message: Option<String>,
        }

        #[derive(Deserialize)]
        struct Detail {
            code: Option<String>,
            message: Option<String>,
        }

        let (code, message) = match serde_json::from_slice::<Envelope>(&self.body) {
            Ok(Envelope {
                error: Some(detail),
                ..
            }) => (detail.code, detail.message),
            Ok(Envelope { code, message, .. }) => (code, message),
            Err(_) => (None, None),
        };

        let code = code
            .or_else(|| self.header("x-ms-error-code").map(str::to_string))
            .unwrap_or_else(|| {
                self.status
                    .canonical_reason()
                    .unwrap_or("Unknown")
                    .to_string()
            });
        let message = message.unwrap_or_else(|| self.text());

        Error::Status {
            status: self.status,
            code,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Retry-After", "5");
        assert_eq!(headers.get("retry-after"), Some("5"));
        assert_eq!(headers.get("RETRY-AFTER"), Some("5"));
        assert!(headers.contains("Retry-after"));
        assert_eq!(headers.remove("RETRY-after").as_deref(), Some("5"));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let mut request = Request::new(Method::PUT, Url::parse("https://example.com/").unwrap());
        request
            .set_json_body(&serde_json::json!({"location": "westus"}))
            .unwrap();
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(&request.body()[..], br#"{"location":"westus"}"#);
    }

    #[test]
    fn test_empty_body_decodes_as_null() {
        let response = Response::new(StatusCode::NO_CONTENT, Headers::new(), Bytes::new());
        let value: Option<serde_json::Value> = response.json().unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_into_error_arm_envelope() {
        let body = r#"{"error":{"code":"ResourceNotFound","message":"vm1 was not found"}}"#;
        let response = Response::new(StatusCode::NOT_FOUND, Headers::new(), body);
        match response.into_error() {
            Error::Status {
                status,
                code,
                message,
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(code, "ResourceNotFound");
                assert_eq!(message, "vm1 was not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_into_error_falls_back_to_header_and_text() {
        let headers: Headers = [("x-ms-error-code", "ServerBusy")].into_iter().collect();
        let response = Response::new(StatusCode::SERVICE_UNAVAILABLE, headers, "try later");
        match response.into_error() {
            Error::Status { code, message, .. } => {
                assert_eq!(code, "ServerBusy");
                assert_eq!(message, "try later");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
