//! Throttling and transient-failure retries
//!
//! Retries on 429 and the usual transient statuses. A server-supplied wait
//! (`retry-after-ms`, `x-ms-retry-after-ms`, `Retry-After`) always wins over
//! computed backoff. Retrying stops once the attempt budget is spent or the
//! next wait would push the cumulative wait past `max_total_wait`; the last
//! response is then returned to the caller unchanged.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::config::millis;
use crate::error::Result;
use crate::http::{Headers, Request, Response};
use crate::pipeline::{call_next, Context, Policy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Cap on the sum of all waits for one call
    #[serde(rename = "max_total_wait_ms", with = "millis")]
    pub max_total_wait: Duration,
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    /// Cap on a single computed backoff
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_total_wait: Duration::from_secs(60),
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
            retry_statuses: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryOptions {
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Exponential backoff with jitter: `base * 2^attempt`, scaled by a
    /// random factor in `[0.8, 1.3)` and capped at `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exponential = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.8..1.3);
        exponential.mul_f64(jitter).min(self.max_delay)
    }
}

/// Wait requested by the server, if any
///
/// Millisecond headers take precedence over `Retry-After`, which may hold
/// either delta-seconds or an HTTP date. Dates in the past yield zero.
pub fn retry_after(headers: &Headers) -> Option<Duration> {
    for name in ["retry-after-ms", "x-ms-retry-after-ms"] {
        if let Some(ms) = headers.get(name).and_then(|v| v.trim().parse::<u64>().ok()) {
            return Some(Duration::from_millis(ms));
        }
    }

    let value = headers.get("retry-after")?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(
        at.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

pub struct RetryPolicy {
    options: RetryOptions,
}

impl RetryPolicy {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Policy for RetryPolicy {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        let mut attempt: u32 = 0;
        let mut waited = Duration::ZERO;

        loop {
            // Each attempt starts from the request as this policy received it
            let mut attempt_request = request.clone();
            let outcome = call_next(ctx, &mut attempt_request, next).await;

            let delay = match &outcome {
                Ok(response) if self.options.should_retry_status(response.status().as_u16()) => {
                    let delay = retry_after(response.headers())
                        .unwrap_or_else(|| self.options.backoff(attempt));
                    Some(delay)
                }
                Err(e) if e.is_retryable() => {
                    debug!("Retry: transport error on attempt {}: {}", attempt + 1, e);
                    Some(self.options.backoff(attempt))
                }
                _ => None,
            };
            let Some(delay) = delay else {
                return outcome;
            };

            if attempt >= self.options.max_retries {
                warn!(
                    "Retry: giving up on {} after {} attempts",
                    request.url(),
                    attempt + 1
                );
                return outcome;
            }
            let over_budget = waited
                .checked_add(delay)
                .map_or(true, |total| total > self.options.max_total_wait);
            if over_budget {
                warn!(
                    "Retry: waiting {:?} more would exceed {:?} total for {}",
                    delay,
                    self.options.max_total_wait,
                    request.url()
                );
                return outcome;
            }

            if let Ok(response) = &outcome {
                debug!(
                    "Retry: {} from {}, retrying in {:?} (attempt {}/{})",
                    response.status(),
                    request.url(),
                    delay,
                    attempt + 1,
                    self.options.max_retries
                );
            }

            ctx.sleep(delay).await?;
            waited += delay;
            attempt += 1;
        }
    }
}
