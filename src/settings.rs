//! Relay settings — the small subset of user settings this core reads.
//!
//! The desktop UI owns the full settings surface; the relay only needs
//! the service-account path, the push device token, and the outbox
//! location. Anything missing falls back to per-user defaults under
//! `~/.biome`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Settings consumed by the dispatch pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelaySettings {
    /// Explicit path to `firebase.json`; default is `~/.biome/firebase.json`.
    pub service_account_path: Option<PathBuf>,
    /// Push-messaging device token for the receiving device, if paired.
    pub device_token: Option<String>,
    /// Where failed sends are archived; default is `~/.biome/outbox`.
    pub outbox_dir: Option<PathBuf>,
}

impl RelaySettings {
    /// Load from `~/.biome/settings.json`. A missing file yields
    /// defaults; a malformed file is logged and also yields defaults —
    /// settings are never fatal to startup.
    pub async fn load() -> Self {
        let path = base_dir().join("settings.json");
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Self {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read settings");
                return Self::default();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse settings");
                Self::default()
            }
        }
    }

    /// The service-account file to load: explicit setting, else the
    /// default per-user location.
    pub fn service_account_path(&self) -> PathBuf {
        self.service_account_path
            .clone()
            .unwrap_or_else(|| base_dir().join("firebase.json"))
    }

    /// The outbox directory: explicit setting, else the default
    /// per-user location.
    pub fn outbox_dir(&self) -> PathBuf {
        self.outbox_dir
            .clone()
            .unwrap_or_else(|| base_dir().join("outbox"))
    }
}

/// Per-user application directory (`~/.biome`). Falls back to a
/// relative path when no home directory can be resolved.
fn base_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".biome"))
        .unwrap_or_else(|| PathBuf::from(".biome"))
}
