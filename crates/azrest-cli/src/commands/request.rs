//! get / put / delete through the standard pipeline

use anyhow::{anyhow, bail, Context as _, Result};
use azrest_core::arm::DEFAULT_ENDPOINT;
use azrest_core::auth::{AccessToken, StaticTokenCredential};
use azrest_core::http::ReqwestTransport;
use azrest_core::recording::{RecordMode, Recorder};
use azrest_core::{ArmClient, ClientOptions, Context, Transport};
use chrono::{Duration, Utc};
use clap::Args;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Bearer token for ARM, e.g. from `az account get-access-token`
const TOKEN_ENV: &str = "AZREST_TOKEN";
/// Fills `{subscriptionId}` when not given with -p
const SUBSCRIPTION_ENV: &str = "AZURE_SUBSCRIPTION_ID";
/// Stands in for the bearer token when replaying a cassette
const REPLAY_TOKEN: &str = "replay";

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Path template, e.g. /subscriptions/{subscriptionId}/resourcegroups
    pub path: String,

    #[arg(long)]
    pub api_version: String,

    /// Placeholder value as name=value (repeatable)
    #[arg(short = 'p', long = "param")]
    pub params: Vec<String>,

    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Record to / replay from this cassette (mode from config or AZREST_RECORD_MODE)
    #[arg(long)]
    pub cassette: Option<String>,
}

/// Client plus the recorder to flush once the command finishes
struct Session {
    client: ArmClient,
    recorder: Option<Arc<Recorder>>,
}

impl Session {
    fn open(config: Option<&Path>, args: &RequestArgs) -> Result<Self> {
        let options = load_options(config)?;
        let live: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(options.timeout())?);

        let (transport, recorder) = match &args.cassette {
            Some(name) => {
                let recorder = Arc::new(Recorder::start(&options.recording, name, live)?);
                let transport: Arc<dyn Transport> = recorder.clone();
                (transport, Some(recorder))
            }
            None => (live, None),
        };

        let replaying = recorder
            .as_ref()
            .is_some_and(|recorder| recorder.mode() == RecordMode::Replay);
        let token = resolve_token(std::env::var(TOKEN_ENV).ok(), replaying)?;
        // Expiry unknown; the service rejects the token once it lapses
        let credential =
            StaticTokenCredential::new(AccessToken::new(token, Utc::now() + Duration::hours(1)));
        let client = ArmClient::with_credential(
            &args.endpoint,
            args.api_version.clone(),
            &options,
            Arc::new(credential),
            transport,
        )?;

        Ok(Self { client, recorder })
    }

    fn url(&self, args: &RequestArgs) -> Result<Url> {
        let mut params = parse_params(&args.params)?;
        if args.path.contains("{subscriptionId}")
            && !params.iter().any(|(name, _)| name == "subscriptionId")
        {
            if let Ok(subscription) = std::env::var(SUBSCRIPTION_ENV) {
                params.push(("subscriptionId".to_string(), subscription));
            }
        }
        let borrowed: Vec<(&str, &str)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        let url = self.client.url_for(&args.path, &borrowed)?;
        debug!("Resolved {} to {}", args.path, url);
        Ok(url)
    }

    fn finish(&self) -> Result<()> {
        if let Some(recorder) = &self.recorder {
            recorder.stop()?;
            info!("Recorded {} interactions", recorder.interaction_count());
        }
        Ok(())
    }

    /// Flush the cassette whether or not the command succeeded
    ///
    /// The command's own error wins over a failure to save.
    fn conclude<T>(&self, outcome: Result<T>) -> Result<T> {
        let flushed = self.finish();
        let value = outcome?;
        flushed?;
        Ok(value)
    }
}

/// Replay never reaches the service, so a token is optional there
fn resolve_token(env: Option<String>, replaying: bool) -> Result<String> {
    match env {
        Some(token) if !token.trim().is_empty() => Ok(token),
        _ if replaying => Ok(REPLAY_TOKEN.to_string()),
        _ => bail!("{TOKEN_ENV} is not set"),
    }
}

fn load_options(config: Option<&Path>) -> Result<ClientOptions> {
    let path = match config {
        Some(path) => path.to_path_buf(),
        None => match ClientOptions::default_path() {
            Some(path) => path,
            None => return Ok(ClientOptions::default()),
        },
    };
    ClientOptions::load(&path).with_context(|| format!("loading {}", path.display()))
}

/// Split `name=value` pairs
fn parse_params(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|param| {
            let (name, value) = param
                .split_once('=')
                .ok_or_else(|| anyhow!("parameter {param:?} is not name=value"))?;
            if name.is_empty() {
                bail!("parameter {param:?} has no name");
            }
            Ok((name.to_string(), value.to_string()))
        })
        .collect()
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn get(config: Option<&Path>, args: &RequestArgs, all: bool) -> Result<()> {
    let session = Session::open(config, args)?;
    let url = session.url(args)?;
    let outcome = fetch(&session.client, url, all).await;
    let value = session.conclude(outcome)?;
    print_json(&value)
}

async fn fetch(client: &ArmClient, url: Url, all: bool) -> Result<Value> {
    let ctx = Context::new();
    if all {
        let items: Vec<Value> = client.list(url).collect_items(&ctx).await?;
        Ok(Value::Array(items))
    } else {
        Ok(client.get(&ctx, url).await?)
    }
}

pub async fn put(config: Option<&Path>, args: &RequestArgs, body: &Path, wait: bool) -> Result<()> {
    let text =
        std::fs::read_to_string(body).with_context(|| format!("reading {}", body.display()))?;
    let body: Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", body.display()))?;

    let session = Session::open(config, args)?;
    let url = session.url(args)?;
    let outcome = store(&session.client, url, &body, wait).await;
    let value = session.conclude(outcome)?;
    print_json(&value)
}

async fn store(client: &ArmClient, url: Url, body: &Value, wait: bool) -> Result<Value> {
    let ctx = Context::new();
    if wait {
        let mut poller = client.begin_put(&ctx, url, body).await?;
        Ok(poller.poll_until_done(&ctx).await?)
    } else {
        Ok(client.put(&ctx, url, body).await?)
    }
}

pub async fn delete(config: Option<&Path>, args: &RequestArgs, wait: bool) -> Result<()> {
    let session = Session::open(config, args)?;
    let url = session.url(args)?;
    let outcome = remove(&session.client, url, wait).await;
    session.conclude(outcome)?;
    println!("deleted {}", args.path);
    Ok(())
}

async fn remove(client: &ArmClient, url: Url, wait: bool) -> Result<()> {
    let ctx = Context::new();
    if wait {
        let mut poller = client.begin_delete(&ctx, url).await?;
        let _: Value = poller.poll_until_done(&ctx).await?;
    } else {
        client.delete(&ctx, url).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use azrest_core::config::RecordingOptions;
    use azrest_core::Pipeline;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&["a=1".into(), "b=x=y".into(), "c=".into()]).unwrap();
        assert_eq!(
            params,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x=y".to_string()),
                ("c".to_string(), String::new()),
            ]
        );
        assert!(parse_params(&["novalue".into()]).is_err());
        assert!(parse_params(&["=1".into()]).is_err());
    }

    #[test]
    fn test_load_options_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "poll_frequency_ms = 250\n").unwrap();
        let options = load_options(Some(&path)).unwrap();
        assert_eq!(options.poll_frequency, std::time::Duration::from_millis(250));
    }

    #[test]
    fn test_resolve_token() {
        assert_eq!(resolve_token(Some("abc".into()), false).unwrap(), "abc");
        assert_eq!(resolve_token(Some("abc".into()), true).unwrap(), "abc");
        assert_eq!(resolve_token(None, true).unwrap(), REPLAY_TOKEN);
        assert_eq!(resolve_token(Some(" ".into()), true).unwrap(), REPLAY_TOKEN);
        assert!(resolve_token(None, false).is_err());
    }

    #[test]
    fn test_conclude_saves_cassette_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = ClientOptions::default();
        let recording = RecordingOptions {
            mode: RecordMode::Record,
            cassette_dir: dir.path().to_path_buf(),
        };
        let live: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(None).unwrap());
        let recorder = Arc::new(Recorder::start(&recording, "failed", live).unwrap());
        let transport: Arc<dyn Transport> = recorder.clone();
        let client = ArmClient::new(
            DEFAULT_ENDPOINT,
            "2021-04-01",
            Pipeline::new(&options, vec![], vec![], transport),
            options.poll_frequency,
        )
        .unwrap();
        let session = Session {
            client,
            recorder: Some(recorder),
        };

        let outcome: Result<()> = Err(anyhow!("request failed"));
        let err = session.conclude(outcome).unwrap_err();
        assert_eq!(err.to_string(), "request failed");
        assert!(dir.path().join("failed.yaml").exists());
    }
}
