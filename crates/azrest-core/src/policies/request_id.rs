//! Client request ids

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::http::{Request, Response};
use crate::pipeline::{call_next, Context, Policy};

pub const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";

/// Generate a fresh random (v4) request id
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Stamps each logical call with `x-ms-client-request-id`
///
/// Sits before the retry policy, so every attempt of one call shares the id.
/// A caller-provided id is left untouched.
pub struct ClientRequestIdPolicy;

#[async_trait]
impl Policy for ClientRequestIdPolicy {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        if request.header(CLIENT_REQUEST_ID).is_none() {
            request.insert_header(CLIENT_REQUEST_ID, new_request_id());
        }
        call_next(ctx, request, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::test_support::MockTransport;
    use reqwest::{Method, StatusCode};
    use url::Url;

    #[test]
    fn test_request_ids_are_v4_and_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
        let parsed = Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_existing_id_is_kept() {
        let transport = MockTransport::new();
        transport.push_status(StatusCode::OK);
        let pipeline =
            Pipeline::from_policies(vec![Arc::new(ClientRequestIdPolicy)], transport.clone());

        let mut request = Request::new(Method::GET, Url::parse("https://example.com/").unwrap());
        request.insert_header(CLIENT_REQUEST_ID, "fixed-id");
        pipeline.send(&Context::new(), &mut request).await.unwrap();

        assert_eq!(
            transport.requests()[0].header(CLIENT_REQUEST_ID),
            Some("fixed-id")
        );
    }
}
