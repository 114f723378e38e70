mod cli;
mod config;
mod diagnostics;
mod dispatch;
mod identity;
mod payload;
mod settings;
mod token;
mod transport;

#[cfg(test)]
mod testutil;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run => {
            if let Err(e) = dispatch::run().await {
                tracing::error!(error = %e, "relay failed");
                eprintln!("biome-relay run: {e}");
                std::process::exit(1);
            }
        }
        Command::Send { text, image } => {
            if let Err(e) = diagnostics::send(text, image).await {
                tracing::error!(error = %e, "send failed");
                eprintln!("biome-relay send: {e}");
                std::process::exit(1);
            }
        }
        Command::CheckConfig { path } => {
            if let Err(e) = diagnostics::check_config(path).await {
                eprintln!("biome-relay check-config: {e}");
                std::process::exit(1);
            }
        }
    }
}
