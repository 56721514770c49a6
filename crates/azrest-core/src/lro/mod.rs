//! Long-running operations
//!
//! ARM signals an asynchronous operation in one of three ways, checked in
//! this order on the initial response:
//! 1. `Azure-AsyncOperation` / `Operation-Location`: a status monitor whose
//!    JSON body carries `status`
//! 2. `Location`: polled until it stops answering 202
//! 3. `properties.provisioningState` in a PUT/PATCH body: the resource
//!    itself is polled
//!
//! Anything else means the operation completed synchronously.

mod poller;

pub use poller::Poller;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollStatus {
    InProgress(String),
    Succeeded,
    Failed,
    Canceled,
}

impl PollStatus {
    /// Terminal states are matched case-insensitively; any other value
    /// (`Accepted`, `Running`, `Updating`, ...) is in progress
    pub fn from_state(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "succeeded" => PollStatus::Succeeded,
            "failed" => PollStatus::Failed,
            "canceled" | "cancelled" => PollStatus::Canceled,
            _ => PollStatus::InProgress(state.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollStatus::InProgress(_))
    }
}

impl FromStr for PollStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PollStatus::from_state(s))
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollStatus::InProgress(state) => write!(f, "{state}"),
            PollStatus::Succeeded => write!(f, "Succeeded"),
            PollStatus::Failed => write!(f, "Failed"),
            PollStatus::Canceled => write!(f, "Canceled"),
        }
    }
}
