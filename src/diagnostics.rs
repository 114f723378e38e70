//! One-shot connectivity and configuration checks.
//!
//! `send` pushes a single diagnostic payload through the real
//! transport and reports where it ended up; `check-config` inspects
//! the service-account file without touching the network.

use std::path::PathBuf;

use crate::config::{self, ConfigError};
use crate::identity::Identity;
use crate::payload::Payload;
use crate::settings::RelaySettings;
use crate::transport::{
    Endpoints, FirebaseTransport, OutboxError, PayloadTransport, SendOutcome,
};

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Outbox(#[from] OutboxError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("config invalid: {}", .0.join(", "))]
    ConfigInvalid(Vec<&'static str>),
}

/// Send one payload through the transport and print the outcome.
pub async fn send(text: String, image: Option<PathBuf>) -> Result<(), DiagnosticsError> {
    let settings = RelaySettings::load().await;
    let identity = Identity::from_env(&settings);
    let source = Some(identity.device_id.clone());

    let payload = match image {
        Some(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| DiagnosticsError::ReadImage {
                    path: path.clone(),
                    source: e,
                })?;
            Payload::image(bytes, source)
        }
        None => Payload::text(text, source),
    };

    let http = reqwest::Client::builder().build()?;
    let transport = FirebaseTransport::new(http, settings, identity, Endpoints::default());

    match transport.send(&payload).await? {
        SendOutcome::Delivered { storage_path } => {
            println!("delivered: {storage_path}");
        }
        SendOutcome::Outboxed { reason, file } => {
            println!("not delivered ({reason}), archived to {}", file.display());
        }
    }
    Ok(())
}

/// Load and validate the cloud config, printing the verdict.
pub async fn check_config(path: Option<PathBuf>) -> Result<(), DiagnosticsError> {
    let settings = RelaySettings::load().await;
    let path = path.unwrap_or_else(|| settings.service_account_path());

    let cloud_config = config::load(&path).await?;
    let violations = config::validate(&cloud_config);
    if !violations.is_empty() {
        return Err(DiagnosticsError::ConfigInvalid(violations));
    }

    println!("{} looks valid.", path.display());
    Ok(())
}
