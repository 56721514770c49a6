//! Subcommand implementations

mod cassette;
mod request;

pub use cassette::{cassette, CassetteCommand};
pub use request::{delete, get, put, RequestArgs};
