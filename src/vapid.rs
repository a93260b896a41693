//! VAPID authentication for Web Push (RFC 8292).
//!
//! The service identity is a long-lived P-256 ECDSA keypair, generated
//! once at setup and persisted next to the configuration. Every delivery
//! attaches a short-lived ES256 token scoped to the push service origin,
//! so push services can attribute traffic to this sender without any
//! prior registration.

// Rust guideline compliant 2026-02

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::{DateTime, Utc};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Hard ceiling on token lifetime (RFC 8292 §2: at most 24 hours).
pub const MAX_TOKEN_TTL_SECS: i64 = 86_400;

/// Fixed JWT header for every token we sign.
const JWT_HEADER: &str = r#"{"typ":"JWT","alg":"ES256"}"#;

/// Signing and verification failures.
#[derive(Debug, Error)]
pub enum VapidError {
    /// The endpoint URL has no usable scheme+host origin.
    #[error("endpoint has no usable origin: {0}")]
    InvalidAudience(String),
    /// Stored public key fails shape validation.
    #[error("VAPID public key must be a 65-byte uncompressed P-256 point")]
    InvalidPublicKey,
    /// Stored private key fails scalar validation.
    #[error("VAPID private key is not a valid 32-byte P-256 scalar")]
    InvalidPrivateKey,
    /// ECDSA signing failed.
    #[error("credential signing failed")]
    Signing,
    /// Token is not three base64url segments with a JSON claims body.
    #[error("token is malformed")]
    Malformed,
    /// Token signature does not verify against the given public key.
    #[error("token signature check failed")]
    BadSignature,
    /// Token expiry has passed.
    #[error("token is expired")]
    Expired,
    /// Key file could not be read or written.
    #[error("key file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Key file is not valid JSON.
    #[error("key file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Service identity keypair for VAPID authentication.
///
/// The private key is stored as the raw 32-byte scalar (base64url); the
/// public key as the uncompressed SEC1 point (65 bytes, base64url). The
/// public value is exactly what browsers expect as `applicationServerKey`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VapidKeys {
    /// Raw 32-byte P-256 private key scalar (base64url).
    private_key_b64: String,
    /// Uncompressed public key bytes (base64url, 65 bytes decoded).
    public_key_b64: String,
}

impl VapidKeys {
    /// Generate a fresh service identity.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        // SEC1 uncompressed public key (65 bytes: 0x04 || x || y)
        let public_bytes = verifying_key.to_encoded_point(false);

        Self {
            private_key_b64: BASE64URL.encode(signing_key.to_bytes().as_slice()),
            public_key_b64: BASE64URL.encode(public_bytes.as_bytes()),
        }
    }

    /// Reconstruct from base64url-encoded strings, validating both halves.
    pub fn from_base64url(public_key_b64: &str, private_key_b64: &str) -> Result<Self, VapidError> {
        let pub_bytes = BASE64URL
            .decode(public_key_b64)
            .map_err(|_| VapidError::InvalidPublicKey)?;
        if pub_bytes.len() != 65 || pub_bytes[0] != 0x04 {
            return Err(VapidError::InvalidPublicKey);
        }

        let priv_bytes = BASE64URL
            .decode(private_key_b64)
            .map_err(|_| VapidError::InvalidPrivateKey)?;
        if priv_bytes.len() != 32 {
            return Err(VapidError::InvalidPrivateKey);
        }
        SigningKey::from_bytes(priv_bytes.as_slice().into())
            .map_err(|_| VapidError::InvalidPrivateKey)?;

        Ok(Self {
            private_key_b64: private_key_b64.to_string(),
            public_key_b64: public_key_b64.to_string(),
        })
    }

    /// Load and validate a persisted identity.
    pub fn load_from(path: &Path) -> Result<Self, VapidError> {
        let content = std::fs::read_to_string(path)?;
        let stored: Self = serde_json::from_str(&content)?;
        Self::from_base64url(&stored.public_key_b64, &stored.private_key_b64)
    }

    /// Persist the identity with owner-only permissions.
    pub fn save_to(&self, path: &Path) -> Result<(), VapidError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Base64url-encoded uncompressed public key (65 bytes decoded).
    ///
    /// This is handed to browsers as the VAPID `applicationServerKey`.
    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    /// Uncompressed public key bytes (65 bytes).
    pub fn public_key_bytes(&self) -> Result<Vec<u8>, VapidError> {
        BASE64URL
            .decode(&self.public_key_b64)
            .map_err(|_| VapidError::InvalidPublicKey)
    }
}

/// Claims carried inside a delivery credential.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VapidClaims {
    /// Push service origin the token is scoped to.
    pub aud: String,
    /// Expiry as unix seconds.
    pub exp: i64,
    /// Contact address of the sending service.
    pub sub: String,
}

/// One signed, short-lived credential bound to a push-service origin.
///
/// Generated fresh per dispatch, never persisted or reused across
/// audiences.
#[derive(Clone, Debug)]
pub struct DeliveryCredential {
    token: String,
    public_key_b64: String,
}

impl DeliveryCredential {
    /// `Authorization` header value (RFC 8292 §3).
    pub fn authorization_header(&self) -> String {
        format!("vapid t={}, k={}", self.token, self.public_key_b64)
    }

    /// The compact JWT itself.
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Signs delivery credentials with the service identity.
#[derive(Clone)]
pub struct CredentialSigner {
    signing_key: SigningKey,
    public_key_b64: String,
    subject: String,
    token_ttl_secs: i64,
}

impl std::fmt::Debug for CredentialSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSigner")
            .field("subject", &self.subject)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl CredentialSigner {
    /// Build a signer from the service identity.
    ///
    /// `token_ttl_secs` is clamped into `1..=MAX_TOKEN_TTL_SECS`; tokens
    /// can never outlive the 24-hour protocol ceiling.
    pub fn new(keys: &VapidKeys, subject: &str, token_ttl_secs: i64) -> Result<Self, VapidError> {
        let priv_bytes = BASE64URL
            .decode(&keys.private_key_b64)
            .map_err(|_| VapidError::InvalidPrivateKey)?;
        if priv_bytes.len() != 32 {
            return Err(VapidError::InvalidPrivateKey);
        }
        let signing_key = SigningKey::from_bytes(priv_bytes.as_slice().into())
            .map_err(|_| VapidError::InvalidPrivateKey)?;

        Ok(Self {
            signing_key,
            public_key_b64: keys.public_key_b64.clone(),
            subject: subject.to_string(),
            token_ttl_secs: token_ttl_secs.clamp(1, MAX_TOKEN_TTL_SECS),
        })
    }

    /// Sign a credential for the push service behind `endpoint`.
    pub fn sign_for_endpoint(&self, endpoint: &str) -> Result<DeliveryCredential, VapidError> {
        self.sign_at(endpoint, Utc::now())
    }

    /// Deterministic signing core with the clock supplied by the caller.
    pub fn sign_at(
        &self,
        endpoint: &str,
        now: DateTime<Utc>,
    ) -> Result<DeliveryCredential, VapidError> {
        let aud = audience_of(endpoint)?;
        let claims = serde_json::json!({
            "aud": aud,
            "exp": now.timestamp() + self.token_ttl_secs,
            "sub": self.subject,
        });

        let signing_input = format!(
            "{}.{}",
            BASE64URL.encode(JWT_HEADER),
            BASE64URL.encode(claims.to_string())
        );
        let signature: Signature = self
            .signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|_| VapidError::Signing)?;

        Ok(DeliveryCredential {
            token: format!(
                "{}.{}",
                signing_input,
                BASE64URL.encode(signature.to_bytes().as_slice())
            ),
            public_key_b64: self.public_key_b64.clone(),
        })
    }
}

/// Verify a token against the service public key (65-byte SEC1 point).
///
/// Uses public material only; exercised by tests and usable to diagnose
/// push-service 401/403 responses.
pub fn verify_token(
    token: &str,
    public_key: &[u8],
    now: DateTime<Utc>,
) -> Result<VapidClaims, VapidError> {
    let mut segments = token.split('.');
    let (header_b64, claims_b64) = match (segments.next(), segments.next()) {
        (Some(h), Some(c)) if !h.is_empty() && !c.is_empty() => (h, c),
        _ => return Err(VapidError::Malformed),
    };
    let signature_b64 = match (segments.next(), segments.next()) {
        (Some(s), None) if !s.is_empty() => s,
        _ => return Err(VapidError::Malformed),
    };

    let verifying_key =
        VerifyingKey::from_sec1_bytes(public_key).map_err(|_| VapidError::InvalidPublicKey)?;
    let signature_bytes = BASE64URL
        .decode(signature_b64)
        .map_err(|_| VapidError::Malformed)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| VapidError::Malformed)?;

    let signing_input_len = header_b64.len() + 1 + claims_b64.len();
    verifying_key
        .verify(token[..signing_input_len].as_bytes(), &signature)
        .map_err(|_| VapidError::BadSignature)?;

    let claims_json = BASE64URL
        .decode(claims_b64)
        .map_err(|_| VapidError::Malformed)?;
    let claims: VapidClaims =
        serde_json::from_slice(&claims_json).map_err(|_| VapidError::Malformed)?;

    if claims.exp <= now.timestamp() {
        return Err(VapidError::Expired);
    }
    Ok(claims)
}

/// Audience origin for an endpoint: scheme + host, plus a non-default port.
fn audience_of(endpoint: &str) -> Result<String, VapidError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|_| VapidError::InvalidAudience(endpoint.to_string()))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(VapidError::InvalidAudience(endpoint.to_string()));
    }
    Ok(origin.ascii_serialization())
}
