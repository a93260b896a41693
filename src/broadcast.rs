//! Concurrency-bounded broadcast fan-out.
//!
//! A broadcast snapshots the subscription store, seals the payload
//! once per recipient, and drives deliveries through a semaphore so a
//! large audience cannot exhaust sockets. The whole fan-out runs under
//! one deadline; workers still pending when it expires are aborted and
//! counted as retried. Subscriptions the push service reports gone are
//! deleted before the summary is returned, so every broadcast leaves
//! the store cleaner than it found it.

// Rust guideline compliant 2026-02

use crate::dispatch::{endpoint_label, DeliveryOutcome, Dispatcher, Urgency};
use crate::ece::{self, ContentEncoding};
use crate::store::{StoreError, SubscriptionStore};
use crate::subscription::Subscription;
use crate::vapid::CredentialSigner;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Broadcast failures that cannot be folded into per-recipient
/// accounting.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The subscription store failed while snapshotting or pruning.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-recipient accounting for one broadcast.
///
/// The four buckets always sum to the snapshot size: every
/// subscription present when the broadcast started lands in exactly
/// one of them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastSummary {
    /// Accepted by the push service.
    pub delivered: usize,
    /// Transient failures left in the store for a later broadcast,
    /// including workers abandoned at the deadline.
    pub retried: usize,
    /// Refused outright, or failed before dispatch (unusable keys).
    pub rejected: usize,
    /// Reported gone by the push service and deleted from the store.
    pub removed: usize,
}

impl BroadcastSummary {
    /// Total subscriptions accounted for.
    #[must_use]
    pub fn total(self) -> usize {
        self.delivered + self.retried + self.rejected + self.removed
    }
}

/// How one worker's pipeline ended.
enum PipelineOutcome {
    Delivery(DeliveryOutcome),
    SealingFailed,
    SigningFailed,
}

struct TaskResult {
    endpoint: String,
    outcome: PipelineOutcome,
}

/// Fans one payload out to every stored subscription.
#[derive(Clone)]
pub struct Broadcaster {
    store: Arc<dyn SubscriptionStore>,
    signer: CredentialSigner,
    dispatcher: Dispatcher,
    encoding: ContentEncoding,
    concurrency: usize,
    deadline: Duration,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("encoding", &self.encoding)
            .field("concurrency", &self.concurrency)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Broadcaster {
    /// Assemble a broadcaster. `concurrency` bounds in-flight
    /// deliveries (minimum 1); `deadline` bounds the whole fan-out.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        signer: CredentialSigner,
        dispatcher: Dispatcher,
        encoding: ContentEncoding,
        concurrency: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            signer,
            dispatcher,
            encoding,
            concurrency: concurrency.max(1),
            deadline,
        }
    }

    /// Broadcast with default TTL and normal urgency.
    pub async fn broadcast(&self, plaintext: &[u8]) -> Result<BroadcastSummary, BroadcastError> {
        self.broadcast_with(plaintext, None, Urgency::Normal).await
    }

    /// Broadcast `plaintext` to every stored subscription.
    ///
    /// The store is snapshotted up front; registrations and deletions
    /// that land mid-flight affect the next broadcast, not this one.
    pub async fn broadcast_with(
        &self,
        plaintext: &[u8],
        ttl: Option<u64>,
        urgency: Urgency,
    ) -> Result<BroadcastSummary, BroadcastError> {
        let subscriptions = self.store.list_all().await?;
        if subscriptions.is_empty() {
            info!("[Broadcast] No subscriptions registered, nothing to send");
            return Ok(BroadcastSummary::default());
        }

        let broadcast_id = Uuid::new_v4();
        let total = subscriptions.len();
        let started = std::time::Instant::now();
        info!(
            "[Broadcast] {broadcast_id}: fanning out to {total} subscriptions \
             (concurrency {}, deadline {:?})",
            self.concurrency, self.deadline
        );

        let plaintext: Arc<[u8]> = Arc::from(plaintext);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for subscription in subscriptions {
            let permits = Arc::clone(&semaphore);
            let plaintext = Arc::clone(&plaintext);
            let signer = self.signer.clone();
            let dispatcher = self.dispatcher.clone();
            let encoding = self.encoding;

            tasks.spawn(async move {
                let endpoint = subscription.endpoint.clone();
                let Ok(_permit) = permits.acquire_owned().await else {
                    // Semaphore closed under us; the delivery never ran
                    return TaskResult {
                        endpoint,
                        outcome: PipelineOutcome::Delivery(DeliveryOutcome::Retryable),
                    };
                };
                let outcome = run_pipeline(
                    &subscription,
                    &plaintext,
                    &signer,
                    &dispatcher,
                    encoding,
                    ttl,
                    urgency,
                )
                .await;
                TaskResult { endpoint, outcome }
            });
        }

        let deadline_at = tokio::time::Instant::now() + self.deadline;
        let mut summary = BroadcastSummary::default();
        let mut gone: Vec<String> = Vec::new();

        loop {
            let remaining = deadline_at.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, tasks.join_next()).await {
                Ok(Some(Ok(result))) => match result.outcome {
                    PipelineOutcome::Delivery(DeliveryOutcome::Delivered) => {
                        summary.delivered += 1;
                    }
                    PipelineOutcome::Delivery(DeliveryOutcome::Retryable) => {
                        summary.retried += 1;
                    }
                    PipelineOutcome::Delivery(DeliveryOutcome::Gone) => {
                        gone.push(result.endpoint);
                    }
                    PipelineOutcome::Delivery(DeliveryOutcome::Rejected)
                    | PipelineOutcome::SealingFailed
                    | PipelineOutcome::SigningFailed => {
                        summary.rejected += 1;
                    }
                },
                Ok(Some(Err(join_error))) => {
                    error!("[Broadcast] {broadcast_id}: worker crashed: {join_error}");
                    summary.retried += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    let abandoned = tasks.len();
                    tasks.abort_all();
                    summary.retried += abandoned;
                    warn!(
                        "[Broadcast] {broadcast_id}: deadline of {:?} expired, \
                         abandoning {abandoned} in-flight deliveries",
                        self.deadline
                    );
                    break;
                }
            }
        }

        for endpoint in &gone {
            self.store.delete_by_endpoint(endpoint).await?;
            info!(
                "[Broadcast] {broadcast_id}: removed stale subscription {}",
                endpoint_label(endpoint)
            );
        }
        summary.removed = gone.len();

        info!(
            "[Broadcast] {broadcast_id}: complete in {:?} \
             ({} delivered, {} retried, {} rejected, {} removed)",
            started.elapsed(),
            summary.delivered,
            summary.retried,
            summary.rejected,
            summary.removed
        );
        Ok(summary)
    }
}

/// Seal, sign, and deliver for one recipient. Failures before dispatch
/// count as rejections; only the push service can mark a subscription
/// gone or worth retrying.
async fn run_pipeline(
    subscription: &Subscription,
    plaintext: &[u8],
    signer: &CredentialSigner,
    dispatcher: &Dispatcher,
    encoding: ContentEncoding,
    ttl: Option<u64>,
    urgency: Urgency,
) -> PipelineOutcome {
    let envelope = match ece::seal(subscription, plaintext, encoding) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(
                "[Broadcast] Sealing failed for {}: {e}",
                endpoint_label(&subscription.endpoint)
            );
            return PipelineOutcome::SealingFailed;
        }
    };

    let credential = match signer.sign_for_endpoint(&subscription.endpoint) {
        Ok(credential) => credential,
        Err(e) => {
            warn!(
                "[Broadcast] Credential signing failed for {}: {e}",
                endpoint_label(&subscription.endpoint)
            );
            return PipelineOutcome::SigningFailed;
        }
    };

    PipelineOutcome::Delivery(
        dispatcher
            .deliver(subscription, &envelope, &credential, ttl, urgency)
            .await,
    )
}
