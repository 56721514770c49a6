//! Built-in pipeline policies

mod logging;
mod query;
mod request_id;
pub mod retry;
mod user_agent;

pub use logging::LoggingPolicy;
pub use query::{normalize_query, QueryNormalizationPolicy};
pub use request_id::{new_request_id, ClientRequestIdPolicy, CLIENT_REQUEST_ID};
pub use retry::{retry_after, RetryOptions, RetryPolicy};
pub use user_agent::UserAgentPolicy;
