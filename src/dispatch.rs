//! Delivery of sealed envelopes to push services (RFC 8030).
//!
//! One dispatcher is shared by every worker in a broadcast. Each
//! delivery is a single `POST` to the subscription endpoint carrying
//! the encrypted body; the response status is folded into a
//! [`DeliveryOutcome`] so callers never branch on raw HTTP codes.
//! Retryable failures are retried in place with exponential backoff,
//! bounded by the configured attempt budget.

// Rust guideline compliant 2026-02

use crate::ece::{ContentEncoding, SealedEnvelope};
use crate::subscription::Subscription;
use crate::vapid::DeliveryCredential;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout. Push services answer fast; anything slower is
/// treated as a transport failure and retried.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// First backoff step after a retryable failure.
const BACKOFF_BASE_MS: u64 = 250;

/// Backoff ceiling.
const BACKOFF_MAX_MS: u64 = 4_000;

/// Dispatcher construction failures.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The HTTP client could not be built.
    #[error("HTTP client construction failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// Delivery priority hint forwarded to the push service (RFC 8030 §5.3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    /// Deliver only when the device is on power and network.
    VeryLow,
    /// Deliver on power or unmetered network.
    Low,
    /// Deliver without constraint.
    #[default]
    Normal,
    /// Deliver immediately, waking the device if needed.
    High,
}

impl Urgency {
    /// Wire value for the `Urgency` header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "very-low",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Parse a wire value, tolerating case and surrounding whitespace.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "very-low" => Some(Self::VeryLow),
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// What a delivery attempt means for the subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The push service accepted the message (2xx).
    Delivered,
    /// The subscription no longer exists (404 or 410) and must be
    /// removed from the store.
    Gone,
    /// Transient failure (429, 5xx, or a transport error). Worth
    /// retrying; the subscription stays.
    Retryable,
    /// The push service refused the request (other 4xx). The
    /// subscription stays; the message is dropped.
    Rejected,
}

/// Map a push-service response status onto a delivery outcome.
#[must_use]
pub fn classify(status: u16) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Delivered,
        404 | 410 => DeliveryOutcome::Gone,
        429 | 500..=599 => DeliveryOutcome::Retryable,
        _ => DeliveryOutcome::Rejected,
    }
}

/// Delivers sealed envelopes over HTTP with bounded retry.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    client: reqwest::Client,
    max_attempts: u32,
    default_ttl: u64,
}

impl Dispatcher {
    /// Build a dispatcher. `max_attempts` bounds total tries per
    /// delivery (minimum 1); `default_ttl` is the `TTL` header in
    /// seconds when the caller supplies none.
    pub fn new(max_attempts: u32, default_ttl: u64) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pushrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            max_attempts: max_attempts.max(1),
            default_ttl,
        })
    }

    /// Deliver one envelope, retrying retryable failures with backoff.
    ///
    /// Never returns an error: every failure mode collapses into a
    /// [`DeliveryOutcome`] so fan-out accounting stays total.
    pub async fn deliver(
        &self,
        subscription: &Subscription,
        envelope: &SealedEnvelope,
        credential: &DeliveryCredential,
        ttl: Option<u64>,
        urgency: Urgency,
    ) -> DeliveryOutcome {
        let mut attempt = 1;
        loop {
            let outcome = self
                .attempt(subscription, envelope, credential, ttl, urgency)
                .await;
            if outcome != DeliveryOutcome::Retryable || attempt >= self.max_attempts {
                return outcome;
            }

            let delay = backoff_delay(attempt);
            warn!(
                "[WebPush] Retryable failure for {} (attempt {attempt}/{}), backing off {}ms",
                endpoint_label(&subscription.endpoint),
                self.max_attempts,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        subscription: &Subscription,
        envelope: &SealedEnvelope,
        credential: &DeliveryCredential,
        ttl: Option<u64>,
        urgency: Urgency,
    ) -> DeliveryOutcome {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut request = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", ttl)
            .header("Content-Encoding", envelope.encoding.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(
                reqwest::header::AUTHORIZATION,
                credential.authorization_header(),
            );

        if urgency != Urgency::Normal {
            request = request.header("Urgency", urgency.as_str());
        }

        // aesgcm carries its salt and sender key out of band
        if envelope.encoding == ContentEncoding::AesGcm {
            request = request
                .header("Encryption", envelope.encryption_header())
                .header("Crypto-Key", envelope.crypto_key_header());
        }

        match request.body(envelope.body.clone()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let outcome = classify(status);
                debug!(
                    "[WebPush] {} answered {status} ({outcome:?})",
                    endpoint_label(&subscription.endpoint)
                );
                outcome
            }
            Err(e) => {
                warn!(
                    "[WebPush] Transport error for {}: {e}",
                    endpoint_label(&subscription.endpoint)
                );
                DeliveryOutcome::Retryable
            }
        }
    }
}

/// Backoff for the Nth consecutive failure: base * 2^(n-1), capped.
fn backoff_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(6);
    let multiplier = 1u64 << exponent;
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(multiplier).min(BACKOFF_MAX_MS))
}

/// Endpoint prefix for logs. Full endpoints are capability URLs and do
/// not belong in log files.
pub(crate) fn endpoint_label(endpoint: &str) -> &str {
    endpoint.get(..60).unwrap_or(endpoint)
}
