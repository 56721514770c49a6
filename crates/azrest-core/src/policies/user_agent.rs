use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::http::{Request, Response};
use crate::pipeline::{call_next, Context, Policy};

const DEFAULT_USER_AGENT: &str = concat!("azrest/", env!("CARGO_PKG_VERSION"));

/// Sets `User-Agent`, prefixing the application id when one is configured
pub struct UserAgentPolicy {
    value: String,
}

impl UserAgentPolicy {
    pub fn new(application_id: Option<String>) -> Self {
        let value = match application_id {
            Some(app) if !app.trim().is_empty() => format!("{} {}", app.trim(), DEFAULT_USER_AGENT),
            _ => DEFAULT_USER_AGENT.to_string(),
        };
        Self { value }
    }
}

#[async_trait]
impl Policy for UserAgentPolicy {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        if request.header("user-agent").is_none() {
            request.insert_header("user-agent", self.value.clone());
        }
        call_next(ctx, request, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_id_prefix() {
        let policy = UserAgentPolicy::new(Some("deployer/2.1".into()));
        assert!(policy.value.starts_with("deployer/2.1 azrest/"));

        let policy = UserAgentPolicy::new(Some("  ".into()));
        assert_eq!(policy.value, DEFAULT_USER_AGENT);
    }
}
