//! setup-uv - install uv on a CI runner

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use setup_uv::cmd;
use setup_uv::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let default_level = if std::env::var("RUNNER_DEBUG").as_deref() == Ok("1") {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        None => cmd::setup::setup(&cli.setup).await,
        Some(Commands::Setup(args)) => cmd::setup::setup(&args).await,
        Some(Commands::SaveCache(args)) => cmd::save_cache::save_cache(&args).await,
        Some(Commands::UpdateKnownChecksums(args)) => {
            cmd::update_known_checksums::update_known_checksums(&args).await
        }
    }
}
