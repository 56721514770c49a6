use async_trait::async_trait;
use std::sync::Arc;

use super::TokenCredential;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{call_next, Context, Policy};

/// Adds `Authorization: Bearer <token>`; register as a per-retry policy
pub struct BearerTokenPolicy {
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
}

impl BearerTokenPolicy {
    pub fn new(credential: Arc<dyn TokenCredential>, scopes: Vec<String>) -> Self {
        Self { credential, scopes }
    }
}

#[async_trait]
impl Policy for BearerTokenPolicy {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        if request.url().scheme() != "https" && request.url().host_str() != Some("localhost") {
            return Err(Error::Credential(
                "bearer tokens require an https endpoint".into(),
            ));
        }
        let token = self.credential.get_token(&self.scopes).await?;
        request.insert_header("authorization", format!("Bearer {}", token.token));
        call_next(ctx, request, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, StaticTokenCredential, ARM_SCOPE};
    use crate::pipeline::Pipeline;
    use crate::test_support::MockTransport;
    use chrono::{Duration, Utc};
    use reqwest::{Method, StatusCode};
    use url::Url;

    fn policy() -> Arc<dyn Policy> {
        let credential = StaticTokenCredential::new(AccessToken::new(
            "secret",
            Utc::now() + Duration::hours(1),
        ));
        Arc::new(BearerTokenPolicy::new(
            Arc::new(credential),
            vec![ARM_SCOPE.to_string()],
        ))
    }

    #[tokio::test]
    async fn test_sets_authorization() {
        let transport = MockTransport::new();
        transport.push_status(StatusCode::OK);
        let pipeline = Pipeline::from_policies(vec![policy()], transport.clone());

        let mut request = Request::new(
            Method::GET,
            Url::parse("https://management.azure.com/subscriptions").unwrap(),
        );
        pipeline.send(&Context::new(), &mut request).await.unwrap();
        assert_eq!(
            transport.requests()[0].header("Authorization"),
            Some("Bearer secret")
        );
    }

    #[tokio::test]
    async fn test_rejects_plain_http() {
        let transport = MockTransport::new();
        let pipeline = Pipeline::from_policies(vec![policy()], transport.clone());

        let mut request = Request::new(Method::GET, Url::parse("http://example.com/").unwrap());
        let result = pipeline.send(&Context::new(), &mut request).await;
        assert!(matches!(result, Err(Error::Credential(_))));
        assert!(transport.requests().is_empty());
    }
}
