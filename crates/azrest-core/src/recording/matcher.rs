//! Request matching for replay

use std::collections::HashSet;
use url::Url;

use super::RecordedRequest;

/// Decides whether a live request corresponds to a recorded one
///
/// Method and URL must match; query pairs compare order-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    ignored_query_params: HashSet<String>,
    compare_body: bool,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip a query parameter (lowercase compare), e.g. a changing `api-version`
    pub fn ignore_query_param(mut self, name: &str) -> Self {
        self.ignored_query_params.insert(name.to_ascii_lowercase());
        self
    }

    pub fn compare_body(mut self, compare: bool) -> Self {
        self.compare_body = compare;
        self
    }

    pub fn matches(&self, live: &RecordedRequest, recorded: &RecordedRequest) -> bool {
        if !live.method.eq_ignore_ascii_case(&recorded.method) {
            return false;
        }
        if self.compare_body && (live.body != recorded.body || live.base64 != recorded.base64) {
            return false;
        }
        match (Url::parse(&live.url), Url::parse(&recorded.url)) {
            (Ok(a), Ok(b)) => {
                a.scheme() == b.scheme()
                    && a.host_str().map(str::to_ascii_lowercase)
                        == b.host_str().map(str::to_ascii_lowercase)
                    && a.port_or_known_default() == b.port_or_known_default()
                    && a.path().eq_ignore_ascii_case(b.path())
                    && self.query(&a) == self.query(&b)
            }
            _ => live.url == recorded.url,
        }
    }

    fn query(&self, url: &Url) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| (name.to_lowercase(), value.into_owned()))
            .filter(|(name, _)| !self.ignored_query_params.contains(name))
            .collect();
        pairs.sort();
        pairs
    }
}
