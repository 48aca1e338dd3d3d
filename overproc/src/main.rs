//! overproc - run and compose external processes from the command line.
//!
//! `overproc run` runs one program with optional redirections and a
//! timeout; `overproc pipe` connects two programs directly. Both exit with
//! the tree's exit code, and Ctrl-C stops the tree by signal escalation.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "overproc=debug" } else { "overproc=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = execute(cli).await?;
    std::process::exit(code);
}
