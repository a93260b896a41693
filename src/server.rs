//! HTTP intake for registrations and broadcasts.
//!
//! Two POST routes make up the public surface: `/api/subscriptions`
//! accepts the subscription object browsers produce, `/api/broadcast`
//! accepts an arbitrary JSON notification and fans it out. Broadcast
//! responses are deliberately opaque: callers learn `success`, the log
//! carries the per-recipient accounting. `/api/vapid` exposes the
//! public key browsers need to subscribe.

// Rust guideline compliant 2026-02

use crate::broadcast::Broadcaster;
use crate::dispatch::endpoint_label;
use crate::store::SubscriptionStore;
use crate::subscription::RegistrationRequest;
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, error, info};
use serde_json::json;
use std::sync::Arc;

/// Shared state behind every route.
pub struct AppState {
    store: Arc<dyn SubscriptionStore>,
    broadcaster: Broadcaster,
    public_key_b64: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Bundle the store, broadcaster, and public key for the router.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        broadcaster: Broadcaster,
        public_key_b64: String,
    ) -> Self {
        Self {
            store,
            broadcaster,
            public_key_b64,
        }
    }
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/subscriptions", post(register_subscription))
        .route("/api/broadcast", post(broadcast_notification))
        .route("/api/vapid", get(vapid_public_key))
        .with_state(state)
}

/// Bind `addr` and serve until interrupted.
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        "[Server] Listening on {}",
        listener.local_addr().context("listener has no address")?
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("[Server] Shutdown signal received"),
        Err(e) => error!("[Server] Failed to listen for shutdown signal: {e}"),
    }
}

async fn register_subscription(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("[Server] Rejected subscription payload: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid registration payload"})),
            );
        }
    };

    if let Err(e) = request.validate() {
        debug!("[Server] Rejected subscription: {e}");
        return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()})));
    }

    let subscription = request.into_subscription();
    match state.store.upsert(&subscription).await {
        Ok(()) => {
            info!(
                "[Server] Registered subscription {}",
                endpoint_label(&subscription.endpoint)
            );
            (StatusCode::CREATED, Json(json!({"success": true})))
        }
        Err(e) => {
            error!("[Server] Failed to store subscription: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false})),
            )
        }
    }
}

async fn broadcast_notification(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!("[Server] Rejected broadcast payload: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid notification payload"})),
            );
        }
    };

    let plaintext = match serde_json::to_vec(&body) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("[Server] Failed to serialize broadcast payload: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false})),
            );
        }
    };

    match state.broadcaster.broadcast(&plaintext).await {
        Ok(summary) => {
            info!(
                "[Server] Broadcast finished: {} delivered, {} retried, {} rejected, {} removed",
                summary.delivered, summary.retried, summary.rejected, summary.removed
            );
            (StatusCode::OK, Json(json!({"success": true})))
        }
        Err(e) => {
            // Callers get an opaque failure; the cause stays in the log
            error!("[Server] Broadcast failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false})),
            )
        }
    }
}

async fn vapid_public_key(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({"public_key": state.public_key_b64}))
}
