//! Clipboard payload values — one captured item awaiting delivery.
//!
//! A [`Payload`] is created at capture time and is immutable from then
//! on. It is consumed by the transport or archived verbatim into an
//! outbox record when delivery fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of clipboard content a payload carries.
///
/// `File` and `Unknown` are accepted into the type but produce an
/// unsupported outcome at transport time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Unknown,
    Text,
    Image,
    File,
}

/// One captured clipboard item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Opaque unique identifier, generated at capture.
    pub id: String,
    pub kind: PayloadKind,
    /// Present iff `kind == Text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    /// Present iff `kind == Image`. Serialized as base64.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub image_bytes: Option<Vec<u8>>,
    pub captured_at_utc: DateTime<Utc>,
    /// Provenance — currently always the capturing host's identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_application: Option<String>,
}

impl Payload {
    /// Create a text payload captured now.
    pub fn text(content: impl Into<String>, source_application: Option<String>) -> Self {
        Self {
            id: fresh_id(),
            kind: PayloadKind::Text,
            text_content: Some(content.into()),
            image_bytes: None,
            captured_at_utc: Utc::now(),
            source_application,
        }
    }

    /// Create an image payload (PNG bytes) captured now.
    pub fn image(bytes: Vec<u8>, source_application: Option<String>) -> Self {
        Self {
            id: fresh_id(),
            kind: PayloadKind::Image,
            text_content: None,
            image_bytes: Some(bytes),
            captured_at_utc: Utc::now(),
            source_application,
        }
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Base64 (de)serialization for optional image bytes, so outbox files
/// stay readable instead of carrying JSON number arrays.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => ser.serialize_str(&STANDARD.encode(b)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded = Option::<String>::deserialize(de)?;
        match encoded {
            Some(s) => STANDARD
                .decode(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
