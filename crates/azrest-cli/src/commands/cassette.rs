//! Cassette inspection and cleanup

use anyhow::{Context, Result};
use azrest_core::recording::{Cassette, Sanitizer};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum CassetteCommand {
    /// List the interactions and variables of a cassette
    Show { path: PathBuf },

    /// Re-apply the default sanitizer (auth headers, subscription ids)
    Sanitize {
        path: PathBuf,

        /// Write here instead of overwriting the input
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn cassette(command: CassetteCommand) -> Result<()> {
    match command {
        CassetteCommand::Show { path } => {
            let cassette = load(&path)?;
            print!("{}", summarize(&cassette));
            Ok(())
        }
        CassetteCommand::Sanitize { path, output } => {
            let mut cassette = load(&path)?;
            sanitize(&mut cassette, &Sanitizer::default());
            let target = output.unwrap_or(path);
            cassette
                .save(&target)
                .with_context(|| format!("writing {}", target.display()))?;
            println!(
                "sanitized {} interactions into {}",
                cassette.interactions.len(),
                target.display()
            );
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<Cassette> {
    Cassette::load(path).with_context(|| format!("reading cassette {}", path.display()))
}

fn sanitize(cassette: &mut Cassette, sanitizer: &Sanitizer) {
    for interaction in &mut cassette.interactions {
        sanitizer.apply_request(&mut interaction.request);
        sanitizer.apply_response(&mut interaction.response);
    }
}

fn summarize(cassette: &Cassette) -> String {
    let mut out = format!(
        "{}: {} interactions\n",
        cassette.name,
        cassette.interactions.len()
    );
    for (i, interaction) in cassette.interactions.iter().enumerate() {
        out.push_str(&format!(
            "  {:>3}  {:<6} {} -> {}\n",
            i, interaction.request.method, interaction.request.url, interaction.response.status
        ));
    }
    if !cassette.variables.is_empty() {
        out.push_str("variables:\n");
        for (name, value) in &cassette.variables {
            out.push_str(&format!("  {name} = {value}\n"));
        }
    }
    out
}
