//! Token caching with early refresh

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{AccessToken, TokenCredential};
use crate::error::Result;

/// Refresh this long before the token actually expires
const REFRESH_MARGIN_SECS: i64 = 300;

pub struct CachedCredential {
    inner: Arc<dyn TokenCredential>,
    cached: RwLock<Option<(Vec<String>, AccessToken)>>,
}

impl CachedCredential {
    pub fn new(inner: Arc<dyn TokenCredential>) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
        }
    }

    fn is_fresh(token: &AccessToken) -> bool {
        Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS) < token.expires_on
    }
}

#[async_trait]
impl TokenCredential for CachedCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        {
            let cached = self.cached.read().await;
            if let Some((cached_scopes, token)) = &*cached {
                if cached_scopes == scopes && Self::is_fresh(token) {
                    return Ok(token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some((cached_scopes, token)) = &*cached {
            if cached_scopes == scopes && Self::is_fresh(token) {
                return Ok(token.clone());
            }
        }

        debug!("CachedCredential: fetching token for {:?}", scopes);
        let token = self.inner.get_token(scopes).await?;
        *cached = Some((scopes.to_vec(), token.clone()));
        Ok(token)
    }
}
