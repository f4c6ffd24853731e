use clap::Parser;
use tracing::warn;

mod app;
mod cli;
mod generator;
mod http;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "autopost_gateway=debug,autopost_scheduler=debug,tower_http=debug"
    } else {
        "autopost_gateway=info,autopost_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    // load config: --config > AUTOPOST_CONFIG env > ~/.autopost/autopost.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("AUTOPOST_CONFIG").ok());
    let config = autopost_core::AutopostConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        autopost_core::AutopostConfig::default()
    });

    cli::run(cli.command, config).await
}
