//! Outbox — local durable fallback for payloads that could not be
//! delivered.
//!
//! One pretty-printed JSON file per failed send, named by a generated
//! envelope id. Records are never deleted here; reprocessing is a
//! separate concern. Writing the record is the one failure the
//! transport does not swallow — if it fails, the payload is about to
//! be lost with no fallback remaining.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::payload::Payload;

/// A failed send, archived with its original payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    pub envelope_id: String,
    pub payload_id: String,
    /// Machine-readable failure tag, e.g. `firebase-send-error`.
    pub reason: String,
    pub timestamp_utc: DateTime<Utc>,
    pub payload: Payload,
    /// Diagnostic key/value pairs specific to the failure. Ordered map
    /// so serialization is deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("failed to create outbox directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write outbox record {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize outbox record: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct Outbox {
    dir: PathBuf,
}

impl Outbox {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Archive a payload with the given failure reason. Returns the
    /// path of the written record.
    pub async fn record(
        &self,
        payload: &Payload,
        reason: &str,
        context: BTreeMap<String, String>,
    ) -> Result<PathBuf, OutboxError> {
        let record = OutboxRecord {
            envelope_id: Uuid::new_v4().simple().to_string(),
            payload_id: payload.id.clone(),
            reason: reason.to_string(),
            timestamp_utc: Utc::now(),
            payload: payload.clone(),
            context,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| OutboxError::CreateDir {
                path: self.dir.clone(),
                source: e,
            })?;

        let path = self.dir.join(format!("{}.json", record.envelope_id));
        let body = serde_json::to_vec_pretty(&record)?;

        // create_new: envelope ids are fresh uuids, a collision means
        // something is badly wrong and must not overwrite silently.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| OutboxError::Write {
                path: path.clone(),
                source: e,
            })?;
        file.write_all(&body)
            .await
            .map_err(|e| OutboxError::Write {
                path: path.clone(),
                source: e,
            })?;
        // tokio files buffer writes; dropping without flushing can lose
        // the record and swallow the error this function promises to
        // surface.
        file.flush().await.map_err(|e| OutboxError::Write {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!(
            payload_id = %payload.id,
            %reason,
            path = %path.display(),
            "payload recorded in outbox"
        );
        Ok(path)
    }
}
