//! Per-call context threaded through the pipeline
//!
//! Allows interrupting in-flight requests, retry waits and LRO polling.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Cancel every call sharing this context
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Get a child token for a subtask
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Sleep for `duration` unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
