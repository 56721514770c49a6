//! Azure Resource Manager client
//!
//! The shape every generated ARM client takes: expand a path template, add
//! `api-version`, send through the pipeline, decode JSON or map the ARM error
//! envelope. List operations return a [`Pager`], long-running ones a
//! [`Poller`].

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::auth::{BearerTokenPolicy, CachedCredential, TokenCredential, ARM_SCOPE};
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::http::{Request, Response, Transport};
use crate::lro::Poller;
use crate::pager::{ListPage, Pager};
use crate::pipeline::{Context, Pipeline};

pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

#[derive(Clone)]
pub struct ArmClient {
    endpoint: Url,
    api_version: String,
    pipeline: Pipeline,
    poll_frequency: Duration,
}

impl ArmClient {
    pub fn new(
        endpoint: &str,
        api_version: impl Into<String>,
        pipeline: Pipeline,
        poll_frequency: Duration,
    ) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| Error::InvalidUrl(format!("{endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{endpoint} cannot be a base URL")));
        }
        Ok(Self {
            endpoint,
            api_version: api_version.into(),
            pipeline,
            poll_frequency,
        })
    }

    /// Standard pipeline with a cached bearer-token credential for ARM
    pub fn with_credential(
        endpoint: &str,
        api_version: impl Into<String>,
        options: &ClientOptions,
        credential: Arc<dyn TokenCredential>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let auth = BearerTokenPolicy::new(
            Arc::new(CachedCredential::new(credential)),
            vec![ARM_SCOPE.to_string()],
        );
        let pipeline = Pipeline::new(options, vec![], vec![Arc::new(auth)], transport);
        Self::new(endpoint, api_version, pipeline, options.poll_frequency)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Expand `{name}` placeholders in `template` and append `api-version`
    ///
    /// Values are percent-encoded as single path segments, so a `/` in a
    /// value cannot change the path structure. Missing or empty values are
    /// rejected.
    pub fn url_for(&self, template: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::InvalidUrl(format!("{} cannot be a base URL", self.endpoint)))?;
            segments.pop_if_empty();
            for segment in template.trim_matches('/').split('/') {
                segments.push(&expand_segment(segment, params)?);
            }
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, url: Url) -> Result<T> {
        let response = self.send_raw(ctx, Method::GET, url, None::<&()>).await?;
        checked(response)?.json()
    }

    pub async fn put<B, T>(&self, ctx: &Context, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_raw(ctx, Method::PUT, url, Some(body)).await?;
        checked(response)?.json()
    }

    pub async fn patch<B, T>(&self, ctx: &Context, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_raw(ctx, Method::PATCH, url, Some(body)).await?;
        checked(response)?.json()
    }

    pub async fn delete(&self, ctx: &Context, url: Url) -> Result<()> {
        let response = self.send_raw(ctx, Method::DELETE, url, None::<&()>).await?;
        checked(response)?;
        Ok(())
    }

    pub fn list<T: DeserializeOwned + Send>(&self, url: Url) -> Pager<ListPage<T>> {
        Pager::new(self.pipeline.clone(), url)
    }

    pub async fn begin_put<B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        url: Url,
        body: &B,
    ) -> Result<Poller> {
        self.begin(ctx, Method::PUT, url, Some(body)).await
    }

    pub async fn begin_post<B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        url: Url,
        body: Option<&B>,
    ) -> Result<Poller> {
        self.begin(ctx, Method::POST, url, body).await
    }

    pub async fn begin_delete(&self, ctx: &Context, url: Url) -> Result<Poller> {
        self.begin(ctx, Method::DELETE, url, None::<&()>).await
    }

    async fn begin<B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Poller> {
        let initial = self.send_raw(ctx, method.clone(), url.clone(), body).await?;
        Poller::new(
            self.pipeline.clone(),
            self.poll_frequency,
            &method,
            url,
            initial,
        )
    }

    async fn send_raw<B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response> {
        let mut request = Request::new(method, url);
        request.insert_header("accept", "application/json");
        if let Some(body) = body {
            request.set_json_body(body)?;
        }
        self.pipeline.send(ctx, &mut request).await
    }
}

fn checked(response: Response) -> Result<Response> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(response.into_error())
    }
}

fn expand_segment(segment: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut out = String::new();
    let mut rest = segment;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let end = rest[start..]
            .find('}')
            .map(|offset| start + offset)
            .ok_or_else(|| Error::InvalidUrl(format!("unclosed placeholder in {segment:?}")))?;
        let name = &rest[start + 1..end];
        let value = params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| Error::InvalidUrl(format!("no value for {{{name}}}")))?;
        if value.is_empty() {
            return Err(Error::InvalidUrl(format!("{{{name}}} must not be empty")));
        }
        out.push_str(value);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    // The url crate would resolve these as dot segments
    if out == "." || out == ".." {
        return Err(Error::InvalidUrl(format!("{segment:?} expands to {out:?}")));
    }
    Ok(out)
}
