use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tubedl_lib::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tubedl=info,tubedl_lib=info"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    cli::run(Cli::parse()).await
}
