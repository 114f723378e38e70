use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "biome-relay", about = "Clipboard-to-cloud relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the dispatch worker, reading text payloads from stdin
    Run,

    /// Send a single diagnostic payload through the transport
    Send {
        /// Sample text to send as a clipboard payload
        #[arg(long, default_value = "Biome connectivity check")]
        text: String,

        /// Send a PNG file as an image payload instead
        #[arg(long, conflicts_with = "text")]
        image: Option<PathBuf>,
    },

    /// Validate the cloud config file
    CheckConfig {
        /// Config path (default: the configured service-account file)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}
