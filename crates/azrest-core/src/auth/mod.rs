//! Credentials and bearer-token authentication
//!
//! - [`TokenCredential`] abstracts whatever issues access tokens
//! - [`CachedCredential`] keeps a token until shortly before it expires
//! - [`BearerTokenPolicy`] puts the token on every attempt

mod cache;
mod policy;

pub use cache::CachedCredential;
pub use policy::BearerTokenPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Scope for Azure Resource Manager
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken>;
}

/// A fixed token, e.g. from `az account get-access-token`
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scopes: &[String]) -> Result<AccessToken> {
        Ok(self.token.clone())
    }
}
