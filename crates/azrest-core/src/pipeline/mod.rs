//! Policy chain every request travels through
//!
//! A pipeline is an ordered list of [`Policy`] values ending with the
//! transport. Each policy gets the remaining slice and decides whether and
//! how often to call further down.

mod context;

pub use context::Context;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::http::{Request, Response, Transport};
use crate::policies::{
    ClientRequestIdPolicy, LoggingPolicy, QueryNormalizationPolicy, RetryPolicy, UserAgentPolicy,
};

#[async_trait]
pub trait Policy: Send + Sync {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response>;
}

/// Invoke the head of `next` with the rest of the chain
pub async fn call_next(
    ctx: &Context,
    request: &mut Request,
    next: &[Arc<dyn Policy>],
) -> Result<Response> {
    match next.split_first() {
        Some((policy, rest)) => policy.send(ctx, request, rest).await,
        None => Err(Error::Protocol("pipeline ended without a transport".into())),
    }
}

/// Terminal policy handing the request to a [`Transport`]
struct TransportPolicy {
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl Policy for TransportPolicy {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        _next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        let token = ctx.child_token();
        tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            response = self.transport.send(request) => response,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    policies: Arc<[Arc<dyn Policy>]>,
}

impl Pipeline {
    /// Build the standard chain:
    /// request id, user agent, `per_call`, query normalization, retry,
    /// `per_retry`, logging, transport.
    ///
    /// `per_retry` policies run once per attempt (auth belongs there so a
    /// refreshed token is picked up on retry).
    pub fn new(
        options: &ClientOptions,
        per_call: Vec<Arc<dyn Policy>>,
        per_retry: Vec<Arc<dyn Policy>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mut policies: Vec<Arc<dyn Policy>> = vec![
            Arc::new(ClientRequestIdPolicy),
            Arc::new(UserAgentPolicy::new(options.user_agent.clone())),
        ];
        policies.extend(per_call);
        if options.normalize_query {
            policies.push(Arc::new(QueryNormalizationPolicy));
        }
        policies.push(Arc::new(RetryPolicy::new(options.retry.clone())));
        policies.extend(per_retry);
        policies.push(Arc::new(LoggingPolicy));
        policies.push(Arc::new(TransportPolicy { transport }));

        Self {
            policies: policies.into(),
        }
    }

    /// A pipeline made of exactly the given policies plus the transport
    pub fn from_policies(policies: Vec<Arc<dyn Policy>>, transport: Arc<dyn Transport>) -> Self {
        let mut policies = policies;
        policies.push(Arc::new(TransportPolicy { transport }));
        Self {
            policies: policies.into(),
        }
    }

    pub async fn send(&self, ctx: &Context, request: &mut Request) -> Result<Response> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        call_next(ctx, request, &self.policies).await
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fast_options, MockTransport};
    use reqwest::{Method, StatusCode};
    use url::Url;

    struct TagPolicy(&'static str);

    #[async_trait]
    impl Policy for TagPolicy {
        async fn send(
            &self,
            ctx: &Context,
            request: &mut Request,
            next: &[Arc<dyn Policy>],
        ) -> Result<Response> {
            let seen = request.header("x-tags").unwrap_or("").to_string();
            request.insert_header("x-tags", format!("{seen}{}", self.0));
            call_next(ctx, request, next).await
        }
    }

    #[tokio::test]
    async fn test_policies_run_in_order() {
        let transport = MockTransport::new();
        transport.push_status(StatusCode::OK);
        let pipeline = Pipeline::from_policies(
            vec![Arc::new(TagPolicy("a")), Arc::new(TagPolicy("b"))],
            transport.clone(),
        );

        let mut request = Request::new(Method::GET, Url::parse("https://example.com/").unwrap());
        pipeline.send(&Context::new(), &mut request).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].header("x-tags"), Some("ab"));
    }

    #[tokio::test]
    async fn test_standard_pipeline_sets_ids() {
        let transport = MockTransport::new();
        transport.push_status(StatusCode::OK);
        let pipeline = Pipeline::new(&fast_options(), vec![], vec![], transport.clone());

        let mut request = Request::new(Method::GET, Url::parse("https://example.com/").unwrap());
        let response = pipeline.send(&Context::new(), &mut request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = transport.requests();
        assert!(sent[0].header("x-ms-client-request-id").is_some());
        assert!(sent[0].header("user-agent").is_some());
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let transport = MockTransport::new();
        let pipeline = Pipeline::new(&fast_options(), vec![], vec![], transport.clone());
        let ctx = Context::new();
        ctx.cancel();

        let mut request = Request::new(Method::GET, Url::parse("https://example.com/").unwrap());
        let result = pipeline.send(&ctx, &mut request).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(transport.requests().is_empty());
    }
}
