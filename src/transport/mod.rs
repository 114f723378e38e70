//! Delivery orchestration — payload in, durable cloud artifact out.
//!
//! `send` walks a fixed pipeline: envelope build, config resolution,
//! validation, token acquisition, storage upload, metadata document,
//! best-effort push notification. Every stage short-circuits to an
//! outbox record on failure; the only error that escapes is the
//! outbox write itself failing, because at that point the payload is
//! about to be lost.

pub mod envelope;
pub mod outbox;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{self, CloudConfig};
use crate::identity::Identity;
use crate::payload::Payload;
use crate::settings::RelaySettings;
use crate::token::TokenProvider;

pub use outbox::{Outbox, OutboxError, OutboxRecord};

/// What `send` did with the payload. Both variants are success from
/// the caller's perspective — the payload is durable either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { storage_path: String },
    Outboxed { reason: String, file: PathBuf },
}

/// The delivery seam between the dispatch worker and the cloud
/// backend. The contract is "never raises past this call" — errors
/// surface only when the local outbox write fails.
///
/// Declared as an RPITIT with a `Send` bound so worker tasks built on
/// any implementation can be spawned.
pub trait PayloadTransport {
    fn send(
        &self,
        payload: &Payload,
    ) -> impl Future<Output = Result<SendOutcome, OutboxError>> + Send;
}

/// Base URLs of the three backend services, overridable for tests.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub storage: String,
    pub firestore: String,
    pub fcm: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            storage: "https://storage.googleapis.com".into(),
            firestore: "https://firestore.googleapis.com".into(),
            fcm: "https://fcm.googleapis.com".into(),
        }
    }
}

/// A non-success response from one of the backend services.
#[derive(Debug, thiserror::Error)]
enum DeliveryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{stage} returned {status}")]
    Status {
        stage: &'static str,
        status: reqwest::StatusCode,
    },
}

struct CachedConfig {
    path: PathBuf,
    config: Arc<CloudConfig>,
}

pub struct FirebaseTransport {
    http: reqwest::Client,
    settings: RelaySettings,
    identity: Identity,
    tokens: TokenProvider,
    endpoints: Endpoints,
    outbox: Outbox,
    config_cache: Mutex<Option<CachedConfig>>,
}

impl FirebaseTransport {
    pub fn new(
        http: reqwest::Client,
        settings: RelaySettings,
        identity: Identity,
        endpoints: Endpoints,
    ) -> Self {
        let outbox = Outbox::new(settings.outbox_dir());
        Self {
            tokens: TokenProvider::new(http.clone()),
            http,
            settings,
            identity,
            endpoints,
            outbox,
            config_cache: Mutex::new(None),
        }
    }

    /// Load the cloud config, cached by path. A changed path forces a
    /// re-read; the lock covers the whole read-and-populate sequence.
    async fn cached_config(&self, path: &Path) -> Result<Arc<CloudConfig>, config::ConfigError> {
        let mut cache = self.config_cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.path == path {
                return Ok(Arc::clone(&cached.config));
            }
        }

        let config = Arc::new(config::load(path).await?);
        *cache = Some(CachedConfig {
            path: path.to_path_buf(),
            config: Arc::clone(&config),
        });
        Ok(config)
    }

    async fn outboxed(
        &self,
        payload: &Payload,
        reason: &str,
        context: BTreeMap<String, String>,
    ) -> Result<SendOutcome, OutboxError> {
        let file = self.outbox.record(payload, reason, context).await?;
        Ok(SendOutcome::Outboxed {
            reason: reason.to_string(),
            file,
        })
    }

    /// Storage upload + metadata document + best-effort push.
    async fn deliver(
        &self,
        token: &str,
        config: &CloudConfig,
        account_id: &str,
        clip_id: &str,
        storage_path: &str,
        envelope: &envelope::Envelope,
    ) -> Result<(), DeliveryError> {
        let generation = self
            .upload(token, &config.web.storage_bucket, storage_path, envelope)
            .await?;
        self.create_clip_document(
            token,
            &config.web.project_id,
            account_id,
            clip_id,
            storage_path,
            &generation,
            envelope,
        )
        .await?;

        if let Some(device_token) = self.identity.device_token.as_deref() {
            // Storage + metadata already succeeded; a push failure must
            // not fail the send.
            if let Err(e) = self
                .notify(
                    token,
                    &config.web.project_id,
                    device_token,
                    clip_id,
                    account_id,
                    storage_path,
                    envelope.kind,
                )
                .await
            {
                tracing::warn!(%clip_id, error = %e, "push notification failed");
            }
        }

        Ok(())
    }

    /// Simple-upload the envelope JSON; returns the object generation.
    async fn upload(
        &self,
        token: &str,
        bucket: &str,
        storage_path: &str,
        envelope: &envelope::Envelope,
    ) -> Result<String, DeliveryError> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoints.storage,
            bucket,
            urlencoding::encode(storage_path)
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(envelope)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeliveryError::Status {
                stage: "storage-upload",
                status: response.status(),
            });
        }

        let result: UploadResult = response.json().await?;
        Ok(result.generation.unwrap_or_default())
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_clip_document(
        &self,
        token: &str,
        project_id: &str,
        account_id: &str,
        clip_id: &str,
        storage_path: &str,
        generation: &str,
        envelope: &envelope::Envelope,
    ) -> Result<(), DeliveryError> {
        let url = format!(
            "{}/v1/projects/{}/databases/(default)/documents/accounts/{}/clips?documentId={}",
            self.endpoints.firestore, project_id, account_id, clip_id
        );

        let mut fields = BTreeMap::new();
        fields.insert("storagePath", FirestoreValue::string(storage_path));
        fields.insert("kind", FirestoreValue::string(envelope.kind));
        fields.insert("metadata", FirestoreValue::string(&envelope.metadata));
        fields.insert("senderDeviceId", FirestoreValue::string(&self.identity.device_id));
        fields.insert("status", FirestoreValue::string("queued"));
        fields.insert("bucketGeneration", FirestoreValue::string(generation));
        fields.insert("createdAt", FirestoreValue::timestamp_now());

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&ClipDocument { fields })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeliveryError::Status {
                stage: "clip-document",
                status: response.status(),
            });
        }
        Ok(())
    }

    async fn notify(
        &self,
        token: &str,
        project_id: &str,
        device_token: &str,
        clip_id: &str,
        account_id: &str,
        storage_path: &str,
        kind: &str,
    ) -> Result<(), DeliveryError> {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.endpoints.fcm, project_id
        );

        let mut data = BTreeMap::new();
        data.insert("clip_id", clip_id);
        data.insert("account_id", account_id);
        data.insert("kind", kind);
        data.insert("storage_path", storage_path);

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&PushRequest {
                message: PushMessage {
                    token: device_token,
                    data,
                },
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeliveryError::Status {
                stage: "push-notification",
                status: response.status(),
            });
        }
        Ok(())
    }
}

impl PayloadTransport for FirebaseTransport {
    async fn send(&self, payload: &Payload) -> Result<SendOutcome, OutboxError> {
        // Stage 1: classify and normalize before touching the network.
        let envelope = match envelope::build(payload) {
            Ok(envelope) => envelope,
            Err(reject) => {
                return self.outboxed(payload, reject.as_str(), BTreeMap::new()).await;
            }
        };

        // Stage 2: resolve and load the service-account config.
        let config_path = self.settings.service_account_path();
        if !config_path.exists() {
            let mut context = BTreeMap::new();
            context.insert("path".into(), config_path.display().to_string());
            return self
                .outboxed(payload, "service-account-file-not-found", context)
                .await;
        }

        let cloud_config = match self.cached_config(&config_path).await {
            Ok(cloud_config) => cloud_config,
            Err(e) => {
                tracing::error!(path = %config_path.display(), error = %e, "config load failed");
                let mut context = BTreeMap::new();
                context.insert("path".into(), config_path.display().to_string());
                return self
                    .outboxed(payload, "firebase-config-load-failed", context)
                    .await;
            }
        };

        // Stage 3: reject unusable configs as a whole.
        let violations = config::validate(&cloud_config);
        if !violations.is_empty() {
            let mut context = BTreeMap::new();
            context.insert("errors".into(), violations.join(", "));
            return self
                .outboxed(payload, "firebase-config-invalid", context)
                .await;
        }

        // Stage 4: bearer token (single-flight cached).
        let Some(token) = self.tokens.access_token(&cloud_config).await else {
            return self
                .outboxed(payload, "firebase-token-unavailable", BTreeMap::new())
                .await;
        };

        // Stages 5-7: upload, metadata record, push.
        let account_id = self.identity.account_id(&cloud_config).to_string();
        let clip_id = Uuid::new_v4().simple().to_string();
        let storage_path = format!("clips/{account_id}/{clip_id}.json");

        match self
            .deliver(
                &token.token,
                &cloud_config,
                &account_id,
                &clip_id,
                &storage_path,
                &envelope,
            )
            .await
        {
            Ok(()) => {
                tracing::info!(
                    payload_id = %payload.id,
                    storage_path = %storage_path,
                    "payload uploaded"
                );
                Ok(SendOutcome::Delivered { storage_path })
            }
            Err(e) => {
                tracing::error!(payload_id = %payload.id, error = %e, "delivery failed");
                let mut context = BTreeMap::new();
                context.insert("storagePath".into(), storage_path);
                context.insert("error".into(), e.to_string());
                self.outboxed(payload, "firebase-send-error", context).await
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    generation: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClipDocument {
    fields: BTreeMap<&'static str, FirestoreValue>,
}

/// Firestore REST typed value — only the two shapes this pipeline
/// writes.
#[derive(Debug, Serialize)]
struct FirestoreValue {
    #[serde(rename = "stringValue", skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(rename = "timestampValue", skip_serializing_if = "Option::is_none")]
    timestamp_value: Option<String>,
}

impl FirestoreValue {
    fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            timestamp_value: None,
        }
    }

    fn timestamp_now() -> Self {
        Self {
            string_value: None,
            timestamp_value: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    message: PushMessage<'a>,
}

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    token: &'a str,
    data: BTreeMap<&'static str, &'a str>,
}
