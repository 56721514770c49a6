//! Paged list results
//!
//! ARM list operations return `{"value": [...], "nextLink": "..."}`. A
//! [`Pager`] follows `nextLink` until it is absent or empty.

use futures::stream::{self, Stream};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::marker::PhantomData;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::http::Request;
use crate::pipeline::{Context, Pipeline};

/// One page of a list response
pub trait Page: DeserializeOwned + Send {
    type Item: Send;

    fn next_link(&self) -> Option<&str>;

    fn into_items(self) -> Vec<Self::Item>;
}

/// The standard ARM list envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default)]
    pub next_link: Option<String>,
}

impl<T: DeserializeOwned + Send> Page for ListPage<T> {
    type Item = T;

    fn next_link(&self) -> Option<&str> {
        self.next_link.as_deref()
    }

    fn into_items(self) -> Vec<T> {
        self.value
    }
}

pub struct Pager<P> {
    pipeline: Pipeline,
    next: Option<Url>,
    pages: usize,
    _page: PhantomData<fn() -> P>,
}

impl<P: Page> Pager<P> {
    pub fn new(pipeline: Pipeline, first: Url) -> Self {
        Self {
            pipeline,
            next: Some(first),
            pages: 0,
            _page: PhantomData,
        }
    }

    /// Whether another page can be fetched
    pub fn more(&self) -> bool {
        self.next.is_some()
    }

    /// Fetch the next page, or `None` once the listing is exhausted
    ///
    /// Relative next links resolve against the current page URL. A next link
    /// pointing back at the current page is a protocol error, since following
    /// it would never terminate.
    pub async fn next_page(&mut self, ctx: &Context) -> Result<Option<P>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        let mut request = Request::new(Method::GET, url.clone());
        let response = self.pipeline.send(ctx, &mut request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let page: P = response.json()?;
        self.pages += 1;

        self.next = match page.next_link().filter(|link| !link.trim().is_empty()) {
            Some(link) => {
                let next = url
                    .join(link)
                    .map_err(|e| Error::InvalidUrl(format!("nextLink {link:?}: {e}")))?;
                if next == url {
                    return Err(Error::Protocol(format!(
                        "nextLink {link} repeats the current page"
                    )));
                }
                Some(next)
            }
            None => None,
        };
        debug!(
            "Pager: page {} from {} (more: {})",
            self.pages,
            url,
            self.next.is_some()
        );

        Ok(Some(page))
    }

    /// Pages as a stream; the first error ends it
    pub fn into_stream(self, ctx: Context) -> impl Stream<Item = Result<P>> {
        stream::try_unfold((self, ctx), |(mut pager, ctx)| async move {
            let page = pager.next_page(&ctx).await?;
            Ok::<_, Error>(page.map(|page| (page, (pager, ctx))))
        })
    }

    /// Drain every page into one item list
    pub async fn collect_items(mut self, ctx: &Context) -> Result<Vec<P::Item>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page(ctx).await? {
            items.extend(page.into_items());
        }
        Ok(items)
    }
}
