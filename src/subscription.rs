//! Push subscription records and registration payloads.
//!
//! A subscription is one browser's push registration (RFC 8030): the push
//! service endpoint plus the client key material needed to seal messages
//! to it (RFC 8291). The endpoint is the unique key; registering the same
//! endpoint again replaces the stored material.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A browser's push subscription.
///
/// Contains everything needed to seal and deliver a web push message to
/// one recipient. `p256dh` and `auth` are stored exactly as registered
/// (base64url) and decoded at seal time, so malformed key material
/// surfaces per recipient instead of blocking registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Push service endpoint URL. Globally unique per registration.
    pub endpoint: String,
    /// Browser's P-256 ECDH public key (base64url, 65 bytes decoded).
    pub p256dh: String,
    /// Shared auth secret (base64url, 16 bytes decoded).
    pub auth: String,
    /// Optional user association.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

/// Key material block of a registration request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
}

/// Registration request body, as produced by `PushSubscription.toJSON()`
/// in the browser: endpoint at the top level, key material nested under
/// `keys`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Client key material.
    pub keys: SubscriptionKeys,
    /// Optional user association.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

/// Rejection reasons for a registration request.
///
/// These map to HTTP 400 at the intake API. Key material is checked for
/// presence only; base64url decoding happens at seal time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The endpoint field is empty.
    #[error("endpoint must not be empty")]
    EmptyEndpoint,
    /// The p256dh key is empty.
    #[error("keys.p256dh must not be empty")]
    EmptyP256dh,
    /// The auth secret is empty.
    #[error("keys.auth must not be empty")]
    EmptyAuth,
}

impl RegistrationRequest {
    /// Check that all required fields are present and non-empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoint.trim().is_empty() {
            return Err(ValidationError::EmptyEndpoint);
        }
        if self.keys.p256dh.trim().is_empty() {
            return Err(ValidationError::EmptyP256dh);
        }
        if self.keys.auth.trim().is_empty() {
            return Err(ValidationError::EmptyAuth);
        }
        Ok(())
    }

    /// Flatten into the stored subscription shape.
    pub fn into_subscription(self) -> Subscription {
        Subscription {
            endpoint: self.endpoint,
            p256dh: self.keys.p256dh,
            auth: self.keys.auth,
            owner_id: self.owner_id,
        }
    }
}
