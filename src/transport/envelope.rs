//! Storage envelope — the normalized, transport-ready form of a payload.
//!
//! Classification happens here, before any network call: empty or
//! unsupported content is rejected with a machine-readable reason the
//! transport turns into an outbox record.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::payload::{Payload, PayloadKind};

/// Why a payload cannot be turned into an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyText,
    EmptyImage,
    UnsupportedKind,
}

impl RejectReason {
    /// Outbox reason tag.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::EmptyText => "empty-text-payload",
            RejectReason::EmptyImage => "empty-image-payload",
            RejectReason::UnsupportedKind => "unsupported-payload-kind",
        }
    }
}

/// The wire envelope uploaded to object storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub kind: &'static str,
    /// Text verbatim, or base64 of the image bytes.
    pub data: String,
    /// Serialized JSON of the typed metadata (kept as a string so the
    /// envelope schema is stable regardless of payload kind).
    pub metadata: String,
    pub version: u32,
    #[serde(rename = "sent_at")]
    pub sent_at_seconds: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextMetadata<'a> {
    captured_at_utc: DateTime<Utc>,
    source_application: Option<&'a str>,
    length: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageMetadata<'a> {
    captured_at_utc: DateTime<Utc>,
    source_application: Option<&'a str>,
    size_bytes: usize,
    format: &'static str,
}

/// Classify a payload and build its envelope.
///
/// Text requires non-empty trimmed content; Image requires non-empty
/// bytes; every other kind is unsupported.
pub fn build(payload: &Payload) -> Result<Envelope, RejectReason> {
    match payload.kind {
        PayloadKind::Text => {
            let text = payload
                .text_content
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or(RejectReason::EmptyText)?;

            let metadata = TextMetadata {
                captured_at_utc: payload.captured_at_utc,
                source_application: payload.source_application.as_deref(),
                length: text.chars().count(),
            };
            Ok(Envelope {
                kind: "text",
                data: text.to_string(),
                metadata: serde_json::to_string(&metadata)
                    .expect("text metadata is serializable"),
                version: 1,
                sent_at_seconds: Utc::now().timestamp(),
            })
        }
        PayloadKind::Image => {
            let bytes = payload
                .image_bytes
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or(RejectReason::EmptyImage)?;

            let metadata = ImageMetadata {
                captured_at_utc: payload.captured_at_utc,
                source_application: payload.source_application.as_deref(),
                size_bytes: bytes.len(),
                format: "png",
            };
            Ok(Envelope {
                kind: "image",
                data: STANDARD.encode(bytes),
                metadata: serde_json::to_string(&metadata)
                    .expect("image metadata is serializable"),
                version: 1,
                sent_at_seconds: Utc::now().timestamp(),
            })
        }
        PayloadKind::File | PayloadKind::Unknown => Err(RejectReason::UnsupportedKind),
    }
}
