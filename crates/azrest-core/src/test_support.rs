//! Scripted transport for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::http::{Headers, Request, Response, Transport};
use crate::pipeline::Pipeline;

/// Answers requests from a queue and keeps every request it saw
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<Response>>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response: Response) {
        self.responses.lock().push_back(Ok(response));
    }

    pub fn push_status(&self, status: StatusCode) {
        self.push(Response::new(status, Headers::new(), ""));
    }

    pub fn push_json(&self, status: StatusCode, headers: &[(&str, &str)], body: serde_json::Value) {
        let headers: Headers = headers.iter().copied().collect();
        self.push(Response::new(status, headers, body.to_string()));
    }

    pub fn push_error(&self, error: Error) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::Protocol(format!(
                    "no scripted response for {}",
                    request.url()
                )))
            })
    }
}

/// Options with millisecond waits so tests never stall
pub fn fast_options() -> ClientOptions {
    let mut options = ClientOptions::default();
    options.retry.base_delay = Duration::from_millis(1);
    options.retry.max_delay = Duration::from_millis(5);
    options.poll_frequency = Duration::from_millis(1);
    options
}

pub fn test_pipeline(transport: Arc<MockTransport>) -> Pipeline {
    Pipeline::new(&fast_options(), vec![], vec![], transport)
}
