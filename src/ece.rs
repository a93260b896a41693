//! Message sealing for Web Push (RFC 8291 encrypted content encoding).
//!
//! Each message is sealed for exactly one recipient: a fresh ephemeral
//! P-256 keypair performs ECDH against the subscription's `p256dh` key,
//! HKDF-SHA256 stretches the shared secret (mixed with the subscription's
//! `auth` secret and a random 16-byte salt) into an AES-128-GCM key and
//! nonce, and the padded plaintext is encrypted as a single record.
//!
//! Two content codings are supported:
//!
//! - `aes128gcm` (RFC 8188 + RFC 8291): parameters travel in a binary
//!   header block at the front of the body.
//! - `aesgcm` (draft-ietf-httpbis-encryption-encoding-04): parameters
//!   travel in `Encryption` and `Crypto-Key` request headers, and the
//!   record starts with a two-byte padding length.
//!
//! # Wire Format (aes128gcm body)
//!
//! ```text
//! +-----------+--------+-----------+------------------+------------------+
//! | salt (16) | rs (4) | idlen (1) | sender key (65)  | ciphertext + tag |
//! +-----------+--------+-----------+------------------+------------------+
//! ```

// Rust guideline compliant 2026-02

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use hkdf::Hkdf;
use p256::{
    ecdh,
    elliptic_curve::{rand_core::OsRng, sec1::ToEncodedPoint},
    PublicKey, SecretKey,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use crate::subscription::Subscription;

/// Single-record plaintext limit. Push services reject larger bodies.
pub const MAX_PLAINTEXT_LEN: usize = 4096;

/// Decoded length of a subscription auth secret.
pub const AUTH_SECRET_LEN: usize = 16;

/// Uncompressed SEC1 P-256 point length (0x04 prefix + x + y).
const P256_POINT_LEN: usize = 65;

/// Minimum `rs` value written into the aes128gcm header block. The actual
/// record may be larger for payloads near the plaintext limit.
const DEFAULT_RECORD_SIZE: u32 = 4096;

/// Delimiter appended to the final (here: only) aes128gcm record.
const LAST_RECORD_DELIMITER: u8 = 0x02;

/// Content coding used to seal push message payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// RFC 8291 coding; parameters in a self-describing binary body prefix.
    #[default]
    Aes128Gcm,
    /// Legacy draft coding; parameters in request headers.
    AesGcm,
}

impl ContentEncoding {
    /// Value for the `Content-Encoding` request header.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes128Gcm => "aes128gcm",
            Self::AesGcm => "aesgcm",
        }
    }

    /// Parse a configuration name ("aes128gcm" or "aesgcm").
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "aes128gcm" => Some(Self::Aes128Gcm),
            "aesgcm" => Some(Self::AesGcm),
            _ => None,
        }
    }
}

/// Sealing failures.
///
/// All of these are permanent for the subscription and payload at hand;
/// the broadcast layer skips the recipient and keeps going.
#[derive(Debug, Error)]
pub enum EceError {
    /// Payload exceeds the single-record limit.
    #[error("payload exceeds the 4096-byte single-record limit (got {0} bytes)")]
    PayloadTooLarge(usize),
    /// The stored p256dh value is not valid base64url.
    #[error("subscription p256dh key is not valid base64url: {0}")]
    KeyDecode(base64::DecodeError),
    /// The stored p256dh value does not decode to a P-256 point.
    #[error("subscription p256dh key is not an uncompressed P-256 point")]
    KeyFormat,
    /// The stored auth value is not valid base64url.
    #[error("subscription auth secret is not valid base64url: {0}")]
    AuthDecode(base64::DecodeError),
    /// The stored auth value has the wrong decoded length.
    #[error("subscription auth secret must be 16 bytes, got {0}")]
    AuthLength(usize),
    /// HKDF expansion failed.
    #[error("key derivation failed: {0}")]
    Derive(String),
    /// AES-GCM encryption failed.
    #[error("record encryption failed: {0}")]
    Encrypt(String),
}

/// One sealed message, ready for delivery to a single recipient.
///
/// Transient: lives for one dispatch attempt and is never persisted.
#[derive(Clone, Debug)]
pub struct SealedEnvelope {
    /// Content coding this envelope was sealed with.
    pub encoding: ContentEncoding,
    /// Request body. For [`ContentEncoding::Aes128Gcm`] this includes the
    /// binary header block; for [`ContentEncoding::AesGcm`] it is the bare
    /// ciphertext and the headers below carry the parameters.
    pub body: Vec<u8>,
    /// Ephemeral sender public key (uncompressed SEC1, 65 bytes).
    pub ephemeral_public: Vec<u8>,
    /// Per-message random salt.
    pub salt: [u8; 16],
}

impl SealedEnvelope {
    /// `Encryption` header value (aesgcm coding only).
    pub fn encryption_header(&self) -> String {
        format!("salt={}", BASE64URL.encode(self.salt))
    }

    /// `Crypto-Key` header value (aesgcm coding only).
    pub fn crypto_key_header(&self) -> String {
        format!("dh={}", BASE64URL.encode(&self.ephemeral_public))
    }
}

/// Seal `plaintext` for one subscription with a fresh ephemeral key and salt.
///
/// Ephemeral keys and salts are never reused across messages or
/// recipients. A zero-length plaintext is valid and produces a payload
/// that wakes the service worker without carrying data.
pub fn seal(
    subscription: &Subscription,
    plaintext: &[u8],
    encoding: ContentEncoding,
) -> Result<SealedEnvelope, EceError> {
    let client_public = decode_client_public(&subscription.p256dh)?;
    let auth_secret = decode_auth_secret(&subscription.auth)?;

    let ephemeral = SecretKey::random(&mut OsRng);
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);

    seal_with(&ephemeral, salt, &client_public, &auth_secret, plaintext, encoding)
}

/// Deterministic sealing core: every input supplied by the caller.
///
/// Given identical inputs the output bytes are identical, which is what
/// the known-answer tests below rely on.
fn seal_with(
    ephemeral: &SecretKey,
    salt: [u8; 16],
    client_public: &PublicKey,
    auth_secret: &[u8; AUTH_SECRET_LEN],
    plaintext: &[u8],
    encoding: ContentEncoding,
) -> Result<SealedEnvelope, EceError> {
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(EceError::PayloadTooLarge(plaintext.len()));
    }

    let shared = ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), client_public.as_affine());
    let ua_public = client_public.to_encoded_point(false);
    let as_public = ephemeral.public_key().to_encoded_point(false);

    match encoding {
        ContentEncoding::Aes128Gcm => {
            let (mut cek, nonce) = derive_aes128gcm(
                shared.raw_secret_bytes().as_slice(),
                auth_secret,
                ua_public.as_bytes(),
                as_public.as_bytes(),
                &salt,
            )?;

            // Single record: plaintext, delimiter, no padding
            let mut record = Vec::with_capacity(plaintext.len() + 1);
            record.extend_from_slice(plaintext);
            record.push(LAST_RECORD_DELIMITER);

            let ciphertext = encrypt_record(&cek, &nonce, &record)?;
            cek.zeroize();

            let rs = DEFAULT_RECORD_SIZE.max(ciphertext.len() as u32);
            let mut body =
                Vec::with_capacity(21 + P256_POINT_LEN + ciphertext.len());
            body.extend_from_slice(&salt);
            body.extend_from_slice(&rs.to_be_bytes());
            body.push(P256_POINT_LEN as u8);
            body.extend_from_slice(as_public.as_bytes());
            body.extend_from_slice(&ciphertext);

            Ok(SealedEnvelope {
                encoding,
                body,
                ephemeral_public: as_public.as_bytes().to_vec(),
                salt,
            })
        }
        ContentEncoding::AesGcm => {
            let (mut cek, nonce) = derive_aesgcm(
                shared.raw_secret_bytes().as_slice(),
                auth_secret,
                ua_public.as_bytes(),
                as_public.as_bytes(),
                &salt,
            )?;

            // Record starts with a two-byte padding length; we pad nothing
            let mut record = Vec::with_capacity(2 + plaintext.len());
            record.extend_from_slice(&0u16.to_be_bytes());
            record.extend_from_slice(plaintext);

            let body = encrypt_record(&cek, &nonce, &record)?;
            cek.zeroize();

            Ok(SealedEnvelope {
                encoding,
                body,
                ephemeral_public: as_public.as_bytes().to_vec(),
                salt,
            })
        }
    }
}

/// Derive the content encryption key and nonce for the aes128gcm coding
/// (RFC 8291 §3.3-3.4).
fn derive_aes128gcm(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), EceError> {
    let mut info = Vec::with_capacity(14 + ua_public.len() + as_public.len());
    info.extend_from_slice(b"WebPush: info\0");
    info.extend_from_slice(ua_public);
    info.extend_from_slice(as_public);

    let mut ikm = hkdf_derive(auth_secret, ecdh_secret, &info, 32)?;
    let cek = hkdf_derive(salt, &ikm, b"Content-Encoding: aes128gcm\0", 16)?;
    let nonce = hkdf_derive(salt, &ikm, b"Content-Encoding: nonce\0", 12)?;
    ikm.zeroize();

    Ok((cek, nonce))
}

/// Derive the content encryption key and nonce for the legacy aesgcm
/// coding (draft-04: context-string derivation).
fn derive_aesgcm(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), EceError> {
    let mut ikm = hkdf_derive(auth_secret, ecdh_secret, b"Content-Encoding: auth\0", 32)?;

    // context = "P-256" || 0x00 || len(ua_public) || ua_public || len(as_public) || as_public
    let mut context = Vec::with_capacity(6 + 2 + ua_public.len() + 2 + as_public.len());
    context.extend_from_slice(b"P-256\0");
    context.extend_from_slice(&(ua_public.len() as u16).to_be_bytes());
    context.extend_from_slice(ua_public);
    context.extend_from_slice(&(as_public.len() as u16).to_be_bytes());
    context.extend_from_slice(as_public);

    let mut cek_info = Vec::with_capacity(25 + context.len());
    cek_info.extend_from_slice(b"Content-Encoding: aesgcm\0");
    cek_info.extend_from_slice(&context);

    let mut nonce_info = Vec::with_capacity(24 + context.len());
    nonce_info.extend_from_slice(b"Content-Encoding: nonce\0");
    nonce_info.extend_from_slice(&context);

    let cek = hkdf_derive(salt, &ikm, &cek_info, 16)?;
    let nonce = hkdf_derive(salt, &ikm, &nonce_info, 12)?;
    ikm.zeroize();

    Ok((cek, nonce))
}

/// HKDF-SHA256 extract-and-expand (RFC 5869).
fn hkdf_derive(salt: &[u8], ikm: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>, EceError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut output = vec![0u8; length];
    hk.expand(info, &mut output)
        .map_err(|e| EceError::Derive(e.to_string()))?;
    Ok(output)
}

/// Encrypt one record under AES-128-GCM. The 16-byte tag is appended.
fn encrypt_record(cek: &[u8], nonce: &[u8], record: &[u8]) -> Result<Vec<u8>, EceError> {
    let cipher =
        Aes128Gcm::new_from_slice(cek).map_err(|e| EceError::Encrypt(e.to_string()))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), record)
        .map_err(|e| EceError::Encrypt(e.to_string()))
}

/// Decode a subscription's p256dh value into a P-256 public key.
fn decode_client_public(p256dh: &str) -> Result<PublicKey, EceError> {
    let bytes = b64url_decode(p256dh).map_err(EceError::KeyDecode)?;
    if bytes.len() != P256_POINT_LEN || bytes[0] != 0x04 {
        return Err(EceError::KeyFormat);
    }
    PublicKey::from_sec1_bytes(&bytes).map_err(|_| EceError::KeyFormat)
}

/// Decode a subscription's auth value into the 16-byte shared secret.
fn decode_auth_secret(auth: &str) -> Result<[u8; AUTH_SECRET_LEN], EceError> {
    let bytes = b64url_decode(auth).map_err(EceError::AuthDecode)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| EceError::AuthLength(len))
}

/// Some clients pad their base64url; strip padding before decoding.
fn b64url_decode(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64URL.decode(value.trim_end_matches('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8291 Appendix A test inputs
    const RFC_PLAINTEXT: &[u8] = b"When I grow up, I want to be a watermelon";
    const RFC_UA_PUBLIC: &str =
        "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4";
    const RFC_UA_PRIVATE: &str = "q1dXpw3UpT5VOmu_cf_v6ih07Aems3njxI-JWgLcM94";
    const RFC_AS_PRIVATE: &str = "yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw";
    const RFC_AUTH: &str = "BTBZMqHH6r4Tts7J_aSIgg";
    const RFC_SALT: &str = "DGv6ra1nlYgDCS1FRnbzlw";
    const RFC_MESSAGE: &str = "DGv6ra1nlYgDCS1FRnbzlwAAEABBBP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27ml\
                               mlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A_yl95bQpu6cVPT\
                               pK4Mqgkf1CXztLVBSt2Ks3oZwbuwXPXLWyouBWLVWGNWQexSgSxsj_Qulcy4a-fN";

    fn secret_key_from_b64(value: &str) -> SecretKey {
        let bytes = BASE64URL.decode(value).expect("base64url scalar");
        SecretKey::from_slice(&bytes).expect("P-256 scalar")
    }

    fn rfc_materials() -> (SecretKey, [u8; 16], PublicKey, [u8; AUTH_SECRET_LEN]) {
        let as_secret = secret_key_from_b64(RFC_AS_PRIVATE);
        let salt: [u8; 16] = BASE64URL
            .decode(RFC_SALT)
            .expect("salt base64url")
            .try_into()
            .expect("16-byte salt");
        let ua_public = decode_client_public(RFC_UA_PUBLIC).expect("ua public key");
        let auth = decode_auth_secret(RFC_AUTH).expect("auth secret");
        (as_secret, salt, ua_public, auth)
    }

    /// Fresh recipient keys plus a subscription carrying them, for tests
    /// that exercise the public `seal` entry point.
    fn test_recipient() -> (SecretKey, [u8; AUTH_SECRET_LEN], Subscription) {
        let ua_secret = SecretKey::random(&mut OsRng);
        let ua_public = ua_secret.public_key().to_encoded_point(false);
        let mut auth = [0u8; AUTH_SECRET_LEN];
        rand::rng().fill_bytes(&mut auth);

        let sub = Subscription {
            endpoint: "https://push.example.com/send/abc".to_string(),
            p256dh: BASE64URL.encode(ua_public.as_bytes()),
            auth: BASE64URL.encode(auth),
            owner_id: None,
        };
        (ua_secret, auth, sub)
    }

    /// Reference decryption for the aes128gcm coding: parse the binary
    /// header block, rerun the derivation from the recipient side, strip
    /// delimiter and padding.
    fn open_aes128gcm(
        ua_secret: &SecretKey,
        auth_secret: &[u8; AUTH_SECRET_LEN],
        body: &[u8],
    ) -> Vec<u8> {
        let salt = &body[..16];
        let key_len = usize::from(body[20]);
        let as_public_bytes = &body[21..21 + key_len];
        let ciphertext = &body[21 + key_len..];

        let as_public = PublicKey::from_sec1_bytes(as_public_bytes).expect("sender key");
        let ua_public = ua_secret.public_key().to_encoded_point(false);
        let shared =
            ecdh::diffie_hellman(ua_secret.to_nonzero_scalar(), as_public.as_affine());
        let (cek, nonce) = derive_aes128gcm(
            shared.raw_secret_bytes().as_slice(),
            auth_secret,
            ua_public.as_bytes(),
            as_public_bytes,
            salt,
        )
        .expect("derive");

        let cipher = Aes128Gcm::new_from_slice(&cek).expect("cek length");
        let mut record = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .expect("record decrypts");
        while record.last() == Some(&0) {
            record.pop();
        }
        assert_eq!(record.pop(), Some(LAST_RECORD_DELIMITER), "record delimiter");
        record
    }

    /// Reference decryption for the legacy aesgcm coding: parameters come
    /// from the envelope (header values on the wire), padding length from
    /// the record prefix.
    fn open_aesgcm(
        ua_secret: &SecretKey,
        auth_secret: &[u8; AUTH_SECRET_LEN],
        envelope: &SealedEnvelope,
    ) -> Vec<u8> {
        let as_public =
            PublicKey::from_sec1_bytes(&envelope.ephemeral_public).expect("sender key");
        let ua_public = ua_secret.public_key().to_encoded_point(false);
        let shared =
            ecdh::diffie_hellman(ua_secret.to_nonzero_scalar(), as_public.as_affine());
        let (cek, nonce) = derive_aesgcm(
            shared.raw_secret_bytes().as_slice(),
            auth_secret,
            ua_public.as_bytes(),
            &envelope.ephemeral_public,
            &envelope.salt,
        )
        .expect("derive");

        let cipher = Aes128Gcm::new_from_slice(&cek).expect("cek length");
        let record = cipher
            .decrypt(Nonce::from_slice(&nonce), envelope.body.as_slice())
            .expect("record decrypts");
        let pad_len = usize::from(u16::from_be_bytes(
            record[..2].try_into().expect("pad length prefix"),
        ));
        record[2 + pad_len..].to_vec()
    }

    #[test]
    fn test_aes128gcm_derivation_matches_rfc8291() {
        let (as_secret, salt, ua_public, auth) = rfc_materials();

        let shared =
            ecdh::diffie_hellman(as_secret.to_nonzero_scalar(), ua_public.as_affine());
        assert_eq!(
            BASE64URL.encode(shared.raw_secret_bytes()),
            "kyrL1jIIOHEzg3sM2ZWRHDRB62YACZhhSlknJ672kSs",
            "ECDH shared secret"
        );

        let ua_point = ua_public.to_encoded_point(false);
        let as_point = as_secret.public_key().to_encoded_point(false);

        let mut info = Vec::new();
        info.extend_from_slice(b"WebPush: info\0");
        info.extend_from_slice(ua_point.as_bytes());
        info.extend_from_slice(as_point.as_bytes());
        let ikm = hkdf_derive(&auth, shared.raw_secret_bytes().as_slice(), &info, 32)
            .expect("ikm");
        assert_eq!(
            BASE64URL.encode(&ikm),
            "S4lYMb_L0FxCeq0WhDx813KgSYqU26kOyzWUdsXYyrg",
            "input keying material"
        );

        let (cek, nonce) = derive_aes128gcm(
            shared.raw_secret_bytes().as_slice(),
            &auth,
            ua_point.as_bytes(),
            as_point.as_bytes(),
            &salt,
        )
        .expect("derive");
        assert_eq!(BASE64URL.encode(&cek), "oIhVW04MRdy2XN9CiKLxTg", "CEK");
        assert_eq!(BASE64URL.encode(&nonce), "4h_95klXJ5E_qnoN", "nonce");
    }

    #[test]
    fn test_seal_aes128gcm_matches_rfc8291_message() {
        let (as_secret, salt, ua_public, auth) = rfc_materials();

        let envelope = seal_with(
            &as_secret,
            salt,
            &ua_public,
            &auth,
            RFC_PLAINTEXT,
            ContentEncoding::Aes128Gcm,
        )
        .expect("seal");

        assert_eq!(
            BASE64URL.encode(&envelope.body),
            RFC_MESSAGE,
            "sealed message should reproduce RFC 8291 Appendix A byte for byte"
        );
    }

    #[test]
    fn test_rfc8291_message_opens_to_plaintext() {
        let ua_secret = secret_key_from_b64(RFC_UA_PRIVATE);
        let auth = decode_auth_secret(RFC_AUTH).expect("auth secret");
        let body = BASE64URL.decode(RFC_MESSAGE).expect("message base64url");

        let plaintext = open_aes128gcm(&ua_secret, &auth, &body);
        assert_eq!(plaintext, RFC_PLAINTEXT);
    }

    #[test]
    fn test_seal_is_deterministic_given_same_materials() {
        let (as_secret, salt, ua_public, auth) = rfc_materials();

        for encoding in [ContentEncoding::Aes128Gcm, ContentEncoding::AesGcm] {
            let a = seal_with(&as_secret, salt, &ua_public, &auth, b"hello", encoding)
                .expect("seal");
            let b = seal_with(&as_secret, salt, &ua_public, &auth, b"hello", encoding)
                .expect("seal");
            assert_eq!(a.body, b.body, "{} body", encoding.as_str());
            assert_eq!(a.ephemeral_public, b.ephemeral_public);
            assert_eq!(a.salt, b.salt);
        }
    }

    #[test]
    fn test_seal_uses_fresh_materials_per_message() {
        let (_, _, sub) = test_recipient();

        let a = seal(&sub, b"hello", ContentEncoding::Aes128Gcm).expect("seal");
        let b = seal(&sub, b"hello", ContentEncoding::Aes128Gcm).expect("seal");
        assert_ne!(a.salt, b.salt, "salt must be fresh per message");
        assert_ne!(
            a.ephemeral_public, b.ephemeral_public,
            "ephemeral key must be fresh per message"
        );
        assert_ne!(a.body, b.body);
    }

    #[test]
    fn test_roundtrip_boundary_payload_lengths() {
        let (ua_secret, auth, sub) = test_recipient();

        for len in [0usize, 1, MAX_PLAINTEXT_LEN] {
            let plaintext = vec![0x42u8; len];

            let sealed = seal(&sub, &plaintext, ContentEncoding::Aes128Gcm).expect("seal");
            assert_eq!(
                open_aes128gcm(&ua_secret, &auth, &sealed.body),
                plaintext,
                "aes128gcm roundtrip at {} bytes",
                len
            );

            let sealed = seal(&sub, &plaintext, ContentEncoding::AesGcm).expect("seal");
            assert_eq!(
                open_aesgcm(&ua_secret, &auth, &sealed),
                plaintext,
                "aesgcm roundtrip at {} bytes",
                len
            );
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let (_, _, sub) = test_recipient();
        let plaintext = vec![0u8; MAX_PLAINTEXT_LEN + 1];

        for encoding in [ContentEncoding::Aes128Gcm, ContentEncoding::AesGcm] {
            let err = seal(&sub, &plaintext, encoding).expect_err("must reject");
            assert!(
                matches!(err, EceError::PayloadTooLarge(n) if n == MAX_PLAINTEXT_LEN + 1),
                "got {err:?}"
            );
        }
    }

    #[test]
    fn test_malformed_p256dh_rejected() {
        let (_, _, mut sub) = test_recipient();

        sub.p256dh = "not.valid.base64url!".to_string();
        assert!(matches!(
            seal(&sub, b"x", ContentEncoding::Aes128Gcm),
            Err(EceError::KeyDecode(_))
        ));

        // Valid base64url, wrong decoded length
        sub.p256dh = BASE64URL.encode([4u8; 20]);
        assert!(matches!(
            seal(&sub, b"x", ContentEncoding::Aes128Gcm),
            Err(EceError::KeyFormat)
        ));

        // Right length and prefix, but not a point on the curve
        let mut bytes = [0xFFu8; P256_POINT_LEN];
        bytes[0] = 0x04;
        sub.p256dh = BASE64URL.encode(bytes);
        assert!(matches!(
            seal(&sub, b"x", ContentEncoding::Aes128Gcm),
            Err(EceError::KeyFormat)
        ));
    }

    #[test]
    fn test_malformed_auth_rejected() {
        let (_, _, mut sub) = test_recipient();

        sub.auth = "###".to_string();
        assert!(matches!(
            seal(&sub, b"x", ContentEncoding::Aes128Gcm),
            Err(EceError::AuthDecode(_))
        ));

        let (_, _, mut sub) = test_recipient();
        sub.auth = BASE64URL.encode([1u8; 12]);
        assert!(matches!(
            seal(&sub, b"x", ContentEncoding::Aes128Gcm),
            Err(EceError::AuthLength(12))
        ));
    }

    #[test]
    fn test_padded_base64url_accepted() {
        let (ua_secret, auth, mut sub) = test_recipient();
        sub.p256dh.push('=');
        sub.auth.push_str("==");

        let sealed = seal(&sub, b"ping", ContentEncoding::Aes128Gcm).expect("seal");
        assert_eq!(open_aes128gcm(&ua_secret, &auth, &sealed.body), b"ping");
    }

    #[test]
    fn test_aes128gcm_header_block_layout() {
        let (_, _, sub) = test_recipient();
        let sealed = seal(&sub, b"hi", ContentEncoding::Aes128Gcm).expect("seal");

        assert_eq!(&sealed.body[..16], &sealed.salt, "salt leads the body");
        let rs = u32::from_be_bytes(sealed.body[16..20].try_into().expect("rs field"));
        assert_eq!(rs, DEFAULT_RECORD_SIZE);
        assert_eq!(usize::from(sealed.body[20]), P256_POINT_LEN);
        assert_eq!(
            &sealed.body[21..21 + P256_POINT_LEN],
            sealed.ephemeral_public.as_slice()
        );
        // record (2 + delimiter) + tag
        assert_eq!(sealed.body.len(), 21 + P256_POINT_LEN + 2 + 1 + 16);
    }

    #[test]
    fn test_aesgcm_headers_carry_parameters() {
        let (_, _, sub) = test_recipient();
        let sealed = seal(&sub, b"hi", ContentEncoding::AesGcm).expect("seal");

        assert_eq!(
            sealed.encryption_header(),
            format!("salt={}", BASE64URL.encode(sealed.salt))
        );
        assert_eq!(
            sealed.crypto_key_header(),
            format!("dh={}", BASE64URL.encode(&sealed.ephemeral_public))
        );
        // pad-length prefix (2) + plaintext (2) + tag
        assert_eq!(sealed.body.len(), 2 + 2 + 16);
    }
}
