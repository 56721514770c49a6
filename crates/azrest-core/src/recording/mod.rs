//! Cassette recording and replay for offline tests
//!
//! A [`Recorder`] is a [`Transport`](crate::http::Transport): in record mode
//! it forwards to the real transport and keeps a sanitized copy of every
//! interaction; in replay mode it answers from the cassette without touching
//! the network.

mod cassette;
mod matcher;
mod recorder;
mod sanitizer;

pub use cassette::{Cassette, Interaction, RecordedRequest, RecordedResponse};
pub use matcher::Matcher;
pub use recorder::Recorder;
pub use sanitizer::{Sanitizer, SANITIZED, ZERO_SUBSCRIPTION};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordMode {
    /// Hit the service and save interactions
    Record,
    /// Answer from a saved cassette
    Replay,
    /// Hit the service, save nothing
    #[default]
    Live,
}

impl FromStr for RecordMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(RecordMode::Record),
            "replay" | "playback" => Ok(RecordMode::Replay),
            "live" | "passthrough" => Ok(RecordMode::Live),
            other => Err(Error::Config(format!("unknown record mode: {other}"))),
        }
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordMode::Record => write!(f, "record"),
            RecordMode::Replay => write!(f, "replay"),
            RecordMode::Live => write!(f, "live"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Record".parse::<RecordMode>().unwrap(), RecordMode::Record);
        assert_eq!("playback".parse::<RecordMode>().unwrap(), RecordMode::Replay);
        assert_eq!(" live ".parse::<RecordMode>().unwrap(), RecordMode::Live);
        assert!("rewind".parse::<RecordMode>().is_err());
    }
}
