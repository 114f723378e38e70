//! Device and account identity — resolved once at startup.
//!
//! Environment overrides (`BIOME_ACCOUNT_ID`, `BIOME_DEVICE_ID`,
//! `BIOME_FCM_DEVICE_TOKEN`) are read here, not inside the transport,
//! so delivery code depends on an explicit collaborator instead of
//! ambient lookups.

use crate::config::CloudConfig;
use crate::settings::RelaySettings;

/// Who this device is and which account it pushes clips to.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Overrides the config's project id as the account id when set.
    pub account_id_override: Option<String>,
    /// Sender device id recorded on every clip document.
    pub device_id: String,
    /// Push-messaging token of the receiving device, if any.
    pub device_token: Option<String>,
}

impl Identity {
    /// Resolve identity from the environment with settings and
    /// machine-name fallbacks.
    pub fn from_env(settings: &RelaySettings) -> Self {
        let device_id = env_nonempty("BIOME_DEVICE_ID").unwrap_or_else(local_hostname);
        Self {
            account_id_override: env_nonempty("BIOME_ACCOUNT_ID"),
            device_id,
            device_token: env_nonempty("BIOME_FCM_DEVICE_TOKEN")
                .or_else(|| settings.device_token.clone()),
        }
    }

    /// The account clips are filed under: override, else the
    /// configured project id.
    pub fn account_id<'a>(&'a self, config: &'a CloudConfig) -> &'a str {
        self.account_id_override
            .as_deref()
            .unwrap_or(&config.web.project_id)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown-host".into())
}
