//! Transports: the last hop of every pipeline

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{Headers, Request, Response};
use crate::error::Result;

/// Sends a fully prepared request and buffers the response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response>;
}

/// Production transport backed by a pooled `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone());
        for (name, value) in request.headers().iter() {
            builder = builder.header(name, value);
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?;
        debug!("Transport: {} bytes from {}", body.len(), request.url());

        Ok(Response::new(status, headers, body))
    }
}
