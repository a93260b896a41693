//! Subscription persistence.
//!
//! The store owns the canonical list of push subscriptions keyed by
//! endpoint URL. Two backings are provided: an in-memory map for tests
//! and short-lived tooling, and a SQLite database for the service
//! itself. Broadcast snapshots are taken through [`list_all`], so store
//! mutations during a fan-out never affect in-flight deliveries.
//!
//! [`list_all`]: SubscriptionStore::list_all

// Rust guideline compliant 2026-02

use crate::subscription::Subscription;
use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Store access failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing storage could not be reached or queried.
    #[error("subscription store unavailable: {0}")]
    Unavailable(String),
}

fn db_err(e: &rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Canonical registry of push subscriptions, keyed by endpoint.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a subscription, replacing any existing row for the same
    /// endpoint. Re-registration after a browser key rotation must win.
    async fn upsert(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// Snapshot every stored subscription, ordered by endpoint.
    async fn list_all(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Remove the subscription for `endpoint`. Removing an endpoint
    /// that is not present is a no-op, not an error.
    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral tooling.
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    inner: RwLock<HashMap<String, Subscription>>,
}

impl MemorySubscriptionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn upsert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .insert(subscription.endpoint.clone(), subscription.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, StoreError> {
        let guard = self.inner.read().await;
        let mut subscriptions: Vec<Subscription> = guard.values().cloned().collect();
        subscriptions.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        Ok(subscriptions)
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<(), StoreError> {
        self.inner.write().await.remove(endpoint);
        Ok(())
    }
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS subscriptions (
    endpoint   TEXT PRIMARY KEY,
    p256dh     TEXT NOT NULL,
    auth       TEXT NOT NULL,
    owner_id   TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

const UPSERT_SQL: &str = "
INSERT INTO subscriptions (endpoint, p256dh, auth, owner_id)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(endpoint) DO UPDATE SET
    p256dh = excluded.p256dh,
    auth = excluded.auth,
    owner_id = excluded.owner_id,
    updated_at = datetime('now')
";

/// SQLite-backed store used by the running service.
///
/// The connection lives behind a blocking mutex; every trait call hops
/// to the blocking pool so SQLite I/O never stalls the async runtime.
#[derive(Debug)]
pub struct SqliteSubscriptionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSubscriptionStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| db_err(&e))?;

        // WAL keeps readers unblocked while a registration commits
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| db_err(&e))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| db_err(&e))?;
        conn.execute_batch(SCHEMA_SQL).map_err(|e| db_err(&e))?;

        info!("[Store] Opened subscription database at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(
        conn: &Arc<Mutex<Connection>>,
    ) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        conn.lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<Mutex<Connection>>) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || op(&conn))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store worker failed: {e}")))?
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn upsert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let sub = subscription.clone();
        self.run_blocking(move |conn| {
            let conn = Self::lock_conn(conn)?;
            conn.execute(
                UPSERT_SQL,
                params![sub.endpoint, sub.p256dh, sub.auth, sub.owner_id],
            )
            .map_err(|e| db_err(&e))?;
            debug!("[Store] Upserted subscription for {}", sub.endpoint);
            Ok(())
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, StoreError> {
        self.run_blocking(|conn| {
            let conn = Self::lock_conn(conn)?;
            let mut stmt = conn
                .prepare(
                    "SELECT endpoint, p256dh, auth, owner_id
                     FROM subscriptions ORDER BY endpoint",
                )
                .map_err(|e| db_err(&e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Subscription {
                        endpoint: row.get(0)?,
                        p256dh: row.get(1)?,
                        auth: row.get(2)?,
                        owner_id: row.get(3)?,
                    })
                })
                .map_err(|e| db_err(&e))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| db_err(&e))
        })
        .await
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<(), StoreError> {
        let endpoint = endpoint.to_string();
        self.run_blocking(move |conn| {
            let conn = Self::lock_conn(conn)?;
            let removed = conn
                .execute(
                    "DELETE FROM subscriptions WHERE endpoint = ?1",
                    params![endpoint],
                )
                .map_err(|e| db_err(&e))?;
            if removed > 0 {
                debug!("[Store] Deleted subscription for {endpoint}");
            }
            Ok(())
        })
        .await
    }
}
