//! Canonical query strings
//!
//! Signing and caching layers compare URLs textually, so the query is put in
//! a canonical form: names lowercased, pairs stably sorted by name. Values
//! are never altered and duplicate names keep their relative order.

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::error::Result;
use crate::http::{Request, Response};
use crate::pipeline::{call_next, Context, Policy};

/// Rewrite the query of `url` into canonical form
///
/// Pairs are re-serialized with form encoding, so `%20` becomes `+`.
pub fn normalize_query(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| (name.to_lowercase(), value.into_owned()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
        return;
    }

    // sort_by is stable
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    url.query_pairs_mut().clear().extend_pairs(pairs);
}

pub struct QueryNormalizationPolicy;

#[async_trait]
impl Policy for QueryNormalizationPolicy {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        normalize_query(request.url_mut());
        call_next(ctx, request, next).await
    }
}
