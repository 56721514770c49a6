//! azrest-core - shared HTTP infrastructure for Azure REST clients
//!
//! Every generated client builds a [`http::Request`], sends it through a
//! [`pipeline::Pipeline`] and decodes the [`http::Response`]. This crate holds the
//! pieces those clients share:
//! - Pipeline and policies (retry, query normalization, request ids, auth, logging)
//! - Long-running operation pollers
//! - Pagers over `nextLink` list responses
//! - Cassette recording and replay for offline tests

pub mod arm;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lro;
pub mod pager;
pub mod pipeline;
pub mod policies;
pub mod recording;

#[cfg(test)]
pub(crate) mod test_support;

pub use arm::ArmClient;
pub use config::ClientOptions;
pub use error::{Error, Result};
pub use http::{Request, Response, Transport};
pub use pipeline::{Context, Pipeline, Policy};
