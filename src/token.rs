//! OAuth2 token provider — JWT-bearer exchange with single-flight refresh.
//!
//! A cached token is reused while it has more than a minute of
//! validity left (margin against clock skew and in-flight latency).
//! The refresh path is serialized by an async mutex so concurrent
//! callers during a cold start share one token-endpoint request.
//! Exchange failures are logged and surfaced as `None` — credential
//! trouble becomes an outbox record upstream, never a panic or error
//! propagated past the transport.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{CloudConfig, ServiceAccountConfig};

/// Object storage read/write, document database, and push messaging.
const SCOPES: &str = "https://www.googleapis.com/auth/devstorage.read_write \
                      https://www.googleapis.com/auth/datastore \
                      https://www.googleapis.com/auth/firebase.messaging";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// How long before expiry a token stops being handed out.
const VALIDITY_MARGIN: Duration = Duration::seconds(60);

/// Assertion lifetime requested from the token endpoint.
const ASSERTION_LIFETIME: Duration = Duration::minutes(55);

/// A cached bearer token with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at_utc: DateTime<Utc>,
}

impl AccessToken {
    /// Usable only while more than [`VALIDITY_MARGIN`] remains.
    fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at_utc - VALIDITY_MARGIN
    }
}

pub struct TokenProvider {
    http: reqwest::Client,
    cached: RwLock<Option<AccessToken>>,
    refresh_lock: Mutex<()>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Return a usable bearer token, refreshing via the JWT-bearer
    /// flow when the cache is cold or near expiry. Returns `None` on
    /// signing or exchange failure; nothing is cached in that case.
    pub async fn access_token(&self, config: &CloudConfig) -> Option<AccessToken> {
        // Lock-free-ish fast path: a usable cached token needs no
        // coordination with refreshers.
        if let Some(token) = self.cached_usable() {
            return Some(token);
        }

        let _refresh = self.refresh_lock.lock().await;
        // Re-check: a concurrent caller may have refreshed while we
        // waited for the lock.
        if let Some(token) = self.cached_usable() {
            return Some(token);
        }

        let assertion = match sign_assertion(&config.service_account) {
            Ok(assertion) => assertion,
            Err(e) => {
                tracing::error!(error = %e, "failed to sign token assertion");
                return None;
            }
        };

        let response = self
            .exchange(&config.service_account.token_uri, &assertion)
            .await?;

        let lifetime = Duration::seconds(response.expires_in.saturating_sub(60).max(0));
        let token = AccessToken {
            token: response.access_token,
            expires_at_utc: Utc::now() + lifetime,
        };

        match self.cached.write() {
            Ok(mut cached) => *cached = Some(token.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(token.clone()),
        }
        Some(token)
    }

    fn cached_usable(&self) -> Option<AccessToken> {
        let cached = match self.cached.read() {
            Ok(cached) => cached,
            Err(poisoned) => poisoned.into_inner(),
        };
        cached.as_ref().filter(|t| t.is_usable(Utc::now())).cloned()
    }

    async fn exchange(&self, token_uri: &str, assertion: &str) -> Option<TokenResponse> {
        let result = self
            .http
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "token exchange request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "token endpoint rejected exchange");
            return None;
        }

        match response.json::<TokenResponse>().await {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::error!(error = %e, "token response unreadable");
                None
            }
        }
    }

    #[cfg(test)]
    fn set_cached(&self, token: AccessToken) {
        *self.cached.write().unwrap() = Some(token);
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Build the signed RS256 assertion for the service account.
fn sign_assertion(account: &ServiceAccountConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = AssertionClaims {
        iss: &account.client_email,
        scope: SCOPES,
        aud: &account.token_uri,
        iat: now.timestamp(),
        exp: (now + ASSERTION_LIFETIME).timestamp(),
    };

    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}
