//! Poller driving one long-running operation to a terminal state

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::PollStatus;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{Context, Pipeline};
use crate::policies::retry_after;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Strategy {
    /// `Azure-AsyncOperation` or `Operation-Location`
    StatusMonitor {
        url: String,
        location: Option<String>,
    },
    Location {
        url: String,
    },
    /// Poll the resource's own `provisioningState`
    Resource,
    Done,
}

/// Serializable poller state, exposed as an opaque resume token
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PollerState {
    method: String,
    resource_url: String,
    strategy: Strategy,
    status: PollStatus,
}

enum FinalSource {
    Fetch(String),
    Last,
    Empty,
}

pub struct Poller {
    pipeline: Pipeline,
    poll_frequency: Duration,
    state: PollerState,
    last: Option<Response>,
    next_delay: Option<Duration>,
}

impl Poller {
    /// Start tracking an operation from its initial response
    ///
    /// A failed initial response is returned as an error right away.
    pub fn new(
        pipeline: Pipeline,
        poll_frequency: Duration,
        method: &Method,
        resource_url: Url,
        initial: Response,
    ) -> Result<Self> {
        if !initial.is_success() {
            return Err(initial.into_error());
        }

        let resolve = |value: &str| -> Result<String> {
            resource_url
                .join(value)
                .map(String::from)
                .map_err(|e| Error::Protocol(format!("bad polling URL {value:?}: {e}")))
        };

        let monitor = initial
            .header("azure-asyncoperation")
            .or_else(|| initial.header("operation-location"));

        let (strategy, status) = if let Some(url) = monitor {
            let location = initial.header("location").map(resolve).transpose()?;
            (
                Strategy::StatusMonitor {
                    url: resolve(url)?,
                    location,
                },
                PollStatus::InProgress("InProgress".into()),
            )
        } else if let Some(url) = initial.header("location") {
            let status = if initial.status() == StatusCode::ACCEPTED {
                PollStatus::InProgress("Accepted".into())
            } else {
                PollStatus::Succeeded
            };
            (Strategy::Location { url: resolve(url)? }, status)
        } else if is_put_or_patch(method) {
            match provisioning_state(&initial) {
                Some(state) => (Strategy::Resource, PollStatus::from_state(&state)),
                None => (Strategy::Done, PollStatus::Succeeded),
            }
        } else {
            (Strategy::Done, PollStatus::Succeeded)
        };

        debug!(
            "Poller: {} {} using {:?}, status {}",
            method, resource_url, strategy, status
        );

        Ok(Self {
            pipeline,
            poll_frequency,
            next_delay: retry_after(initial.headers()),
            state: PollerState {
                method: method.as_str().to_string(),
                resource_url: resource_url.into(),
                strategy,
                status,
            },
            last: Some(initial),
        })
    }

    /// Rebuild a poller from [`Poller::resume_token`]
    pub fn from_resume_token(
        pipeline: Pipeline,
        poll_frequency: Duration,
        token: &str,
    ) -> Result<Self> {
        let state: PollerState = serde_json::from_str(token)?;
        Ok(Self {
            pipeline,
            poll_frequency,
            state,
            last: None,
            next_delay: None,
        })
    }

    pub fn resume_token(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.state)?)
    }

    pub fn status(&self) -> &PollStatus {
        &self.state.status
    }

    pub fn done(&self) -> bool {
        self.state.status.is_terminal()
    }

    /// Issue one status request and update the tracked state
    pub async fn poll(&mut self, ctx: &Context) -> Result<PollStatus> {
        if self.done() {
            return Ok(self.state.status.clone());
        }

        let url = match &self.state.strategy {
            Strategy::StatusMonitor { url, .. } | Strategy::Location { url } => url.clone(),
            Strategy::Resource | Strategy::Done => self.state.resource_url.clone(),
        };
        let response = self.get(ctx, &url).await?;
        self.next_delay = retry_after(response.headers());

        let status = match &self.state.strategy {
            Strategy::StatusMonitor { .. } => {
                if !response.is_success() {
                    return Err(response.into_error());
                }
                let body: Value = response.json()?;
                let state = body.get("status").and_then(Value::as_str).ok_or_else(|| {
                    Error::Protocol(format!("status monitor {url} returned no status"))
                })?;
                PollStatus::from_state(state)
            }
            Strategy::Location { .. } => match response.status() {
                StatusCode::ACCEPTED => PollStatus::InProgress("Accepted".into()),
                s if s.is_success() => PollStatus::Succeeded,
                _ => return Err(response.into_error()),
            },
            Strategy::Resource | Strategy::Done => {
                if !response.is_success() {
                    return Err(response.into_error());
                }
                // A resource without provisioningState is settled
                provisioning_state(&response)
                    .map(|state| PollStatus::from_state(&state))
                    .unwrap_or(PollStatus::Succeeded)
            }
        };

        debug!("Poller: {} -> {}", url, status);
        self.last = Some(response);
        self.state.status = status.clone();
        Ok(status)
    }

    /// Poll until terminal and decode the final result
    ///
    /// Waits `Retry-After` of the latest response between polls, falling back
    /// to the configured poll frequency.
    pub async fn poll_until_done<T: DeserializeOwned>(&mut self, ctx: &Context) -> Result<T> {
        while !self.done() {
            let delay = self.next_delay.take().unwrap_or(self.poll_frequency);
            ctx.sleep(delay).await?;
            self.poll(ctx).await?;
        }
        info!(
            "Poller: {} {} finished with {}",
            self.state.method, self.state.resource_url, self.state.status
        );
        self.result(ctx).await
    }

    /// Final result of a finished operation
    pub async fn result<T: DeserializeOwned>(&mut self, ctx: &Context) -> Result<T> {
        match &self.state.status {
            PollStatus::InProgress(state) => Err(Error::Protocol(format!(
                "operation has not finished (status {state})"
            ))),
            PollStatus::Failed | PollStatus::Canceled => Err(Error::OperationFailed {
                status: self.state.status.to_string(),
                body: self.last.as_ref().map(Response::text).unwrap_or_default(),
            }),
            PollStatus::Succeeded => match self.final_source() {
                FinalSource::Fetch(url) => {
                    let response = self.get(ctx, &url).await?;
                    if !response.is_success() {
                        return Err(response.into_error());
                    }
                    response.json()
                }
                FinalSource::Last => match &self.last {
                    Some(response) => response.json(),
                    None => Ok(serde_json::from_slice(b"null")?),
                },
                FinalSource::Empty => Ok(serde_json::from_slice(b"null")?),
            },
        }
    }

    fn final_source(&self) -> FinalSource {
        let put_or_patch = matches!(self.state.method.as_str(), "PUT" | "PATCH");
        match &self.state.strategy {
            Strategy::StatusMonitor { .. } if put_or_patch => {
                FinalSource::Fetch(self.state.resource_url.clone())
            }
            Strategy::StatusMonitor {
                location: Some(location),
                ..
            } => FinalSource::Fetch(location.clone()),
            Strategy::StatusMonitor { .. } if self.state.method == "DELETE" => FinalSource::Empty,
            Strategy::Location { .. } if put_or_patch => {
                FinalSource::Fetch(self.state.resource_url.clone())
            }
            _ => FinalSource::Last,
        }
    }

    async fn get(&self, ctx: &Context, url: &str) -> Result<Response> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let mut request = Request::new(Method::GET, url);
        self.pipeline.send(ctx, &mut request).await
    }
}

fn is_put_or_patch(method: &Method) -> bool {
    *method == Method::PUT || *method == Method::PATCH
}

fn provisioning_state(response: &Response) -> Option<String> {
    let body: Value = serde_json::from_slice(response.body()).ok()?;
    body.get("properties")?
        .get("provisioningState")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Headers;
    use crate::test_support::{test_pipeline, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    const VM: &str = concat!(
        "https://management.azure.com/subscriptions/s/resourceGroups/rg",
        "/providers/Microsoft.Compute/virtualMachines/vm1?api-version=2024-07-01"
    );
    const MONITOR: &str = "https://management.azure.com/operations/op1";
    const LOCATION: &str = "https://management.azure.com/operationResults/op1";

    fn response(status: StatusCode, headers: &[(&str, &str)], body: &str) -> Response {
        let headers: Headers = headers.iter().copied().collect();
        Response::new(status, headers, body.to_string())
    }

    fn poller(transport: &Arc<MockTransport>, method: Method, initial: Response) -> Poller {
        Poller::new(
            test_pipeline(transport.clone()),
            Duration::from_millis(1),
            &method,
            Url::parse(VM).unwrap(),
            initial,
        )
        .unwrap()
    }

    fn urls(transport: &MockTransport) -> Vec<String> {
        transport
            .requests()
            .iter()
            .map(|r| r.url().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_status_monitor_put_fetches_resource() {
        let transport = MockTransport::new();
        transport.push_json(StatusCode::OK, &[], json!({"status": "InProgress"}));
        transport.push_json(StatusCode::OK, &[], json!({"status": "Succeeded"}));
        transport.push_json(StatusCode::OK, &[], json!({"name": "vm1"}));

        let initial = response(
            StatusCode::CREATED,
            &[("Azure-AsyncOperation", MONITOR)],
            r#"{"properties":{"provisioningState":"Creating"}}"#,
        );
        let mut poller = poller(&transport, Method::PUT, initial);
        assert!(!poller.done());

        let vm: Value = poller.poll_until_done(&Context::new()).await.unwrap();
        assert_eq!(vm["name"], "vm1");
        assert_eq!(poller.status(), &PollStatus::Succeeded);
        assert_eq!(urls(&transport), vec![MONITOR, MONITOR, VM]);
    }

    #[tokio::test]
    async fn test_location_delete() {
        let transport = MockTransport::new();
        transport.push_status(StatusCode::ACCEPTED);
        transport.push_status(StatusCode::NO_CONTENT);

        let initial = response(StatusCode::ACCEPTED, &[("Location", LOCATION)], "");
        let mut poller = poller(&transport, Method::DELETE, initial);

        poller.poll_until_done::<()>(&Context::new()).await.unwrap();
        assert_eq!(urls(&transport), vec![LOCATION, LOCATION]);
    }

    #[tokio::test]
    async fn test_relative_location_resolved() {
        let transport = MockTransport::new();
        transport.push_json(StatusCode::OK, &[], json!({"exported": true}));

        let initial = response(StatusCode::ACCEPTED, &[("Location", "/operationResults/op1")], "");
        let mut poller = poller(&transport, Method::POST, initial);

        let result: Value = poller.poll_until_done(&Context::new()).await.unwrap();
        assert_eq!(result["exported"], true);
        assert_eq!(urls(&transport), vec![LOCATION]);
    }

    #[tokio::test]
    async fn test_post_status_monitor_fetches_location() {
        let transport = MockTransport::new();
        transport.push_json(StatusCode::OK, &[], json!({"status": "Succeeded"}));
        transport.push_json(StatusCode::OK, &[], json!({"exported": 3}));

        let initial = response(
            StatusCode::ACCEPTED,
            &[("Azure-AsyncOperation", MONITOR), ("Location", LOCATION)],
            "",
        );
        let mut poller = poller(&transport, Method::POST, initial);

        let result: Value = poller.poll_until_done(&Context::new()).await.unwrap();
        assert_eq!(result["exported"], 3);
        assert_eq!(urls(&transport), vec![MONITOR, LOCATION]);
    }

    #[tokio::test]
    async fn test_retry_after_overrides_poll_frequency() {
        let transport = MockTransport::new();
        transport.push_json(
            StatusCode::OK,
            &[("retry-after-ms", "1")],
            json!({"status": "Running"}),
        );
        transport.push_json(StatusCode::OK, &[], json!({"status": "Succeeded"}));
        transport.push_json(StatusCode::OK, &[], json!({"name": "vm1"}));

        let initial = response(
            StatusCode::CREATED,
            &[("Azure-AsyncOperation", MONITOR), ("retry-after-ms", "1")],
            "",
        );
        // An hour between polls unless the service asks for less
        let mut poller = Poller::new(
            test_pipeline(transport.clone()),
            Duration::from_secs(3600),
            &Method::PUT,
            Url::parse(VM).unwrap(),
            initial,
        )
        .unwrap();

        let vm: Value = tokio::time::timeout(
            Duration::from_secs(5),
            poller.poll_until_done(&Context::new()),
        )
        .await
        .expect("poller slept for the default frequency")
        .unwrap();
        assert_eq!(vm["name"], "vm1");
        assert_eq!(urls(&transport), vec![MONITOR, MONITOR, VM]);
    }

    #[tokio::test]
    async fn test_provisioning_state_polling() {
        let transport = MockTransport::new();
        transport.push_json(
            StatusCode::OK,
            &[],
            json!({"properties": {"provisioningState": "Updating"}}),
        );
        transport.push_json(
            StatusCode::OK,
            &[],
            json!({"name": "vm1", "properties": {"provisioningState": "Succeeded"}}),
        );

        let initial = response(
            StatusCode::CREATED,
            &[],
            r#"{"properties":{"provisioningState":"Creating"}}"#,
        );
        let mut poller = poller(&transport, Method::PUT, initial);

        let vm: Value = poller.poll_until_done(&Context::new()).await.unwrap();
        assert_eq!(vm["name"], "vm1");
        assert_eq!(urls(&transport), vec![VM, VM]);
    }

    #[tokio::test]
    async fn test_synchronous_completion() {
        let transport = MockTransport::new();
        let initial = response(StatusCode::OK, &[], r#"{"name":"vm1"}"#);
        let mut poller = poller(&transport, Method::PUT, initial);
        assert!(poller.done());

        let vm: Value = poller.poll_until_done(&Context::new()).await.unwrap();
        assert_eq!(vm["name"], "vm1");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_failed_operation() {
        let transport = MockTransport::new();
        transport.push_json(
            StatusCode::OK,
            &[],
            json!({"status": "Failed", "error": {"code": "QuotaExceeded"}}),
        );

        let initial = response(StatusCode::ACCEPTED, &[("Azure-AsyncOperation", MONITOR)], "");
        let mut poller = poller(&transport, Method::POST, initial);

        match poller.poll_until_done::<Value>(&Context::new()).await {
            Err(Error::OperationFailed { status, body }) => {
                assert_eq!(status, "Failed");
                assert!(body.contains("QuotaExceeded"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_status_is_protocol_error() {
        let transport = MockTransport::new();
        transport.push_json(StatusCode::OK, &[], json!({"percentComplete": 50}));

        let initial = response(StatusCode::ACCEPTED, &[("Operation-Location", MONITOR)], "");
        let mut poller = poller(&transport, Method::POST, initial);

        let result = poller.poll(&Context::new()).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_initial_failure() {
        let transport = MockTransport::new();
        let initial = response(
            StatusCode::CONFLICT,
            &[],
            r#"{"error":{"code":"Conflict","message":"busy"}}"#,
        );
        let result = Poller::new(
            test_pipeline(transport),
            Duration::from_millis(1),
            &Method::PUT,
            Url::parse(VM).unwrap(),
            initial,
        );
        assert!(matches!(result, Err(Error::Status { .. })));
    }

    #[tokio::test]
    async fn test_resume_token() {
        let transport = MockTransport::new();
        let initial = response(StatusCode::ACCEPTED, &[("Azure-AsyncOperation", MONITOR)], "");
        let token = poller(&transport, Method::DELETE, initial)
            .resume_token()
            .unwrap();

        transport.push_json(StatusCode::OK, &[], json!({"status": "Succeeded"}));
        let mut resumed =
            Poller::from_resume_token(
                test_pipeline(transport.clone()),
                Duration::from_millis(1),
                &token,
            )
                .unwrap();
        assert!(!resumed.done());

        resumed.poll_until_done::<()>(&Context::new()).await.unwrap();
        assert_eq!(urls(&transport), vec![MONITOR]);
    }

    #[tokio::test]
    async fn test_result_before_done() {
        let transport = MockTransport::new();
        let initial = response(StatusCode::ACCEPTED, &[("Location", LOCATION)], "");
        let mut poller = poller(&transport, Method::DELETE, initial);
        let result = poller.result::<()>(&Context::new()).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
