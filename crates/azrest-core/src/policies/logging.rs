use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::http::{Request, Response};
use crate::pipeline::{call_next, Context, Policy};
use crate::policies::CLIENT_REQUEST_ID;

/// Logs each attempt (method, URL, status, latency)
///
/// Only the request id header is logged; credentials never reach the log.
pub struct LoggingPolicy;

#[async_trait]
impl Policy for LoggingPolicy {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        let started = Instant::now();
        let request_id = request.header(CLIENT_REQUEST_ID).unwrap_or("-").to_string();
        debug!(
            "--> {} {} (request id {})",
            request.method(),
            request.url(),
            request_id
        );

        let outcome = call_next(ctx, request, next).await;
        match &outcome {
            Ok(response) => debug!(
                "<-- {} {} in {:?}",
                response.status(),
                request.url(),
                started.elapsed()
            ),
            Err(e) => warn!(
                "<-- {} {} failed after {:?}: {}",
                request.method(),
                request.url(),
                started.elapsed(),
                e
            ),
        }
        outcome
    }
}
