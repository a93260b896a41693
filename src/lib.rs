//! Pushrelay - standalone Web Push delivery service.
//!
//! This crate turns a notification event into per-recipient encrypted,
//! VAPID-authenticated Web Push messages (RFC 8030) delivered to every
//! registered browser subscription.
//!
//! # Architecture
//!
//! The delivery engine is a pipeline of small components, leaves first:
//!
//! - **Store** - durable table of subscriptions (endpoint + key material)
//! - **Sealer** - per-recipient payload encryption (RFC 8291)
//! - **Signer** - short-lived ES256 credentials proving sender identity (RFC 8292)
//! - **Dispatcher** - one recipient's HTTP exchange, outcome classification, retry
//! - **Broadcaster** - bounded concurrent fan-out across all subscriptions
//!
//! ```text
//! event ──> Broadcaster ──> list_all() ──┬─> seal ─> sign ─> dispatch ─┐
//!                                        ├─> seal ─> sign ─> dispatch ─┼─> summary
//!                                        └─> seal ─> sign ─> dispatch ─┘
//!                                             (per-subscription pipelines,
//!                                              failures isolated per recipient)
//! ```
//!
//! # Modules
//!
//! - [`subscription`] - Registration records and intake payload shapes
//! - [`store`] - Subscription persistence (SQLite / in-memory)
//! - [`ece`] - Message sealing (aes128gcm and legacy aesgcm codings)
//! - [`payload`] - Conventional notification shape for the operator CLI
//! - [`vapid`] - Service identity and credential signing
//! - [`dispatch`] - Push-service HTTP delivery and outcome classification
//! - [`broadcast`] - Concurrent fan-out and aggregate accounting
//! - [`server`] - HTTP intake API (register / trigger / public key)
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod ece;
pub mod payload;
pub mod server;
pub mod store;
pub mod subscription;
pub mod vapid;

// Re-export commonly used types
pub use broadcast::{BroadcastSummary, Broadcaster};
pub use config::Config;
pub use dispatch::{DeliveryOutcome, Dispatcher, Urgency};
pub use ece::{ContentEncoding, SealedEnvelope};
pub use payload::NotificationPayload;
pub use store::{MemorySubscriptionStore, SqliteSubscriptionStore, SubscriptionStore};
pub use subscription::Subscription;
pub use vapid::{CredentialSigner, VapidKeys};
