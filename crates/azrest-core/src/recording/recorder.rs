//! Record/replay transport

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    Cassette, Interaction, Matcher, RecordMode, RecordedRequest, RecordedResponse, Sanitizer,
};
use crate::config::RecordingOptions;
use crate::error::{Error, Result};
use crate::http::{Request, Response, Transport};

struct Tape {
    cassette: Cassette,
    /// Replay: which interactions were already served
    used: Vec<bool>,
}

pub struct Recorder {
    mode: RecordMode,
    inner: Arc<dyn Transport>,
    path: PathBuf,
    tape: Mutex<Tape>,
    matcher: Matcher,
    sanitizer: Sanitizer,
}

impl Recorder {
    /// Open cassette `name` under the configured directory
    ///
    /// Replay mode requires the cassette to exist; record mode starts empty
    /// and overwrites it on [`Recorder::stop`].
    pub fn start(
        options: &RecordingOptions,
        name: &str,
        inner: Arc<dyn Transport>,
    ) -> Result<Self> {
        let path = Cassette::path_for(&options.cassette_dir, name);
        let cassette = match options.mode {
            RecordMode::Replay => Cassette::load(&path)?,
            RecordMode::Record | RecordMode::Live => Cassette::new(name),
        };
        info!("Recorder: '{}' in {} mode", name, options.mode);

        Ok(Self {
            mode: options.mode,
            inner,
            path,
            tape: Mutex::new(Tape {
                used: vec![false; cassette.interactions.len()],
                cassette,
            }),
            matcher: Matcher::default(),
            sanitizer: Sanitizer::default(),
        })
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    pub fn interaction_count(&self) -> usize {
        self.tape.lock().cassette.interactions.len()
    }

    /// A value that must be identical between recording and replay
    ///
    /// Record mode stores what `generate` returns, replay mode returns the
    /// stored value, live mode just generates.
    pub fn variable(&self, name: &str, generate: impl FnOnce() -> String) -> Result<String> {
        let mut tape = self.tape.lock();
        match self.mode {
            RecordMode::Replay => tape.cassette.variables.get(name).cloned().ok_or_else(|| {
                Error::Config(format!(
                    "variable '{name}' was not recorded in {}",
                    self.path.display()
                ))
            }),
            RecordMode::Record => {
                let value = generate();
                tape.cassette
                    .variables
                    .insert(name.to_string(), value.clone());
                Ok(value)
            }
            RecordMode::Live => Ok(generate()),
        }
    }

    /// Random lowercase alphanumeric resource name, stable across replay
    pub fn random_name(&self, name: &str, prefix: &str, len: usize) -> Result<String> {
        self.variable(name, || {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(|b| char::from(b).to_ascii_lowercase())
                .collect();
            format!("{prefix}{suffix}")
        })
    }

    /// Save the cassette when recording
    pub fn stop(&self) -> Result<()> {
        if self.mode != RecordMode::Record {
            return Ok(());
        }
        let tape = self.tape.lock();
        tape.cassette.save(&self.path)?;
        info!(
            "Recorder: saved {} interactions to {}",
            tape.cassette.interactions.len(),
            self.path.display()
        );
        Ok(())
    }

    fn replay(&self, request: &Request) -> Result<Response> {
        let mut live = RecordedRequest::from(request);
        self.sanitizer.apply_request(&mut live);

        let mut tape = self.tape.lock();
        let Tape { cassette, used } = &mut *tape;
        let index = cassette
            .interactions
            .iter()
            .enumerate()
            .position(|(i, interaction)| {
                !used[i] && self.matcher.matches(&live, &interaction.request)
            })
            .ok_or_else(|| Error::NoMatchingInteraction {
                method: live.method.clone(),
                url: live.url.clone(),
            })?;

        used[index] = true;
        debug!("Recorder: replaying interaction {} for {} {}", index, live.method, live.url);
        cassette.interactions[index].response.to_response()
    }
}

#[async_trait]
impl Transport for Recorder {
    async fn send(&self, request: &Request) -> Result<Response> {
        match self.mode {
            RecordMode::Replay => self.replay(request),
            RecordMode::Live => self.inner.send(request).await,
            RecordMode::Record => {
                let response = self.inner.send(request).await?;

                let mut interaction = Interaction {
                    request: RecordedRequest::from(request),
                    response: RecordedResponse::from(&response),
                };
                self.sanitizer.apply_request(&mut interaction.request);
                self.sanitizer.apply_response(&mut interaction.response);
                self.tape.lock().cassette.interactions.push(interaction);

                Ok(response)
            }
        }
    }
}
