//! Invariant Hub - command-line front end.
//!
//! Lists the project catalog, installs and updates projects from their
//! GitHub releases, launches them, and edits the master config.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use invariant_hub::hub::{self, HubArgs};

/// Invariant Hub - project installer and launcher
#[derive(Parser, Debug)]
#[command(name = "invariant")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    hub: HubArgs,

    /// Run in verbose mode (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose {
        "invariant_hub=debug"
    } else {
        "invariant_hub=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            println!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let code = hub::execute(args.hub).await?;
    Ok(code)
}
