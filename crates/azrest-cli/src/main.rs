//! azrest - send ARM requests through the azrest pipeline and manage cassettes

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{CassetteCommand, RequestArgs};

#[derive(Parser)]
#[command(
    name = "azrest",
    version,
    about = "Azure REST requests with retry, paging, polling and recording"
)]
struct Cli {
    /// Config file (defaults to ~/.config/azrest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// GET a resource, or every page of a list with --all
    Get {
        #[command(flatten)]
        request: RequestArgs,

        /// Follow nextLink and print all items
        #[arg(long)]
        all: bool,
    },

    /// PUT a JSON body
    Put {
        #[command(flatten)]
        request: RequestArgs,

        /// File holding the JSON body
        #[arg(long)]
        body: PathBuf,

        /// Poll until the operation finishes
        #[arg(long)]
        wait: bool,
    },

    /// DELETE a resource
    Delete {
        #[command(flatten)]
        request: RequestArgs,

        /// Poll until the operation finishes
        #[arg(long)]
        wait: bool,
    },

    /// Inspect or clean recorded cassettes
    #[command(subcommand)]
    Cassette(CassetteCommand),
}

fn init_logging(verbose: bool) {
    let default = if verbose { "azrest=debug,azrest_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Command::Get { request, all } => commands::get(config, &request, all).await,
        Command::Put {
            request,
            body,
            wait,
        } => commands::put(config, &request, &body, wait).await,
        Command::Delete { request, wait } => commands::delete(config, &request, wait).await,
        Command::Cassette(command) => commands::cassette(command),
    }
}
