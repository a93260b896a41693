//! Service configuration.
//!
//! Settings live in a JSON file under the platform config directory
//! (override with `PUSHRELAY_CONFIG_DIR`) and every field can be
//! overridden per-process through `PUSHRELAY_*` environment variables.
//! A missing or unreadable file falls back to defaults; the service
//! identity keypair is the only thing startup refuses to improvise.

// Rust guideline compliant 2026-02

use crate::ece::ContentEncoding;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the delivery service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// VAPID subject claim: a `mailto:` or `https:` contact for this
    /// sender.
    pub subject: String,
    /// Socket address the HTTP intake listens on.
    pub bind: String,
    /// Path of the SQLite subscription database, or `none` for a
    /// non-persistent in-memory store.
    pub database: PathBuf,
    /// `TTL` header (seconds) when a broadcast does not supply one.
    pub default_ttl: u64,
    /// Total delivery attempts per subscription within one broadcast.
    pub max_retries: u32,
    /// In-flight delivery cap during fan-out.
    pub concurrency: usize,
    /// Whole-broadcast deadline in seconds.
    pub broadcast_deadline_secs: u64,
    /// Lifetime of signed delivery credentials in seconds.
    pub token_ttl_secs: i64,
    /// Payload coding offered to push services.
    pub content_encoding: ContentEncoding,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subject: "mailto:admin@example.com".to_string(),
            bind: "127.0.0.1:8030".to_string(),
            database: default_database_path(),
            default_ttl: 86_400,
            max_retries: 3,
            concurrency: 8,
            broadcast_deadline_secs: 30,
            token_ttl_secs: 43_200,
            content_encoding: ContentEncoding::default(),
        }
    }
}

impl Config {
    /// Load from disk, fall back to defaults, then apply environment
    /// overrides.
    #[must_use]
    pub fn load() -> Self {
        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                info!("[Config] Using defaults ({e})");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::path()?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("no config at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("config at {} is not valid JSON", path.display()))
    }

    /// Persist the current settings with owner-only permissions.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }

    /// Location of the config file itself.
    pub fn path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.json"))
    }

    /// Location of the persisted service identity keypair.
    pub fn keys_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("keys.json"))
    }

    /// Whole-broadcast deadline as a [`Duration`].
    #[must_use]
    pub fn broadcast_deadline(&self) -> Duration {
        Duration::from_secs(self.broadcast_deadline_secs)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(subject) = std::env::var("PUSHRELAY_SUBJECT") {
            self.subject = subject;
        }
        if let Ok(bind) = std::env::var("PUSHRELAY_BIND") {
            self.bind = bind;
        }
        if let Ok(database) = std::env::var("PUSHRELAY_DATABASE") {
            self.database = PathBuf::from(database);
        }
        override_parsed("PUSHRELAY_DEFAULT_TTL", &mut self.default_ttl);
        override_parsed("PUSHRELAY_MAX_RETRIES", &mut self.max_retries);
        override_parsed("PUSHRELAY_CONCURRENCY", &mut self.concurrency);
        override_parsed("PUSHRELAY_BROADCAST_DEADLINE", &mut self.broadcast_deadline_secs);
        override_parsed("PUSHRELAY_TOKEN_TTL", &mut self.token_ttl_secs);
        if let Ok(name) = std::env::var("PUSHRELAY_CONTENT_ENCODING") {
            match ContentEncoding::from_name(&name) {
                Some(encoding) => self.content_encoding = encoding,
                None => warn!("[Config] Ignoring unknown content encoding {name:?}"),
            }
        }
    }
}

fn override_parsed<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!("[Config] Ignoring invalid {key}={raw:?}"),
        }
    }
}

fn default_database_path() -> PathBuf {
    config_dir().map_or_else(
        |_| PathBuf::from("pushrelay.db"),
        |dir| dir.join("subscriptions.db"),
    )
}

/// Directory holding the config file, key file, and default database.
pub fn config_dir() -> Result<PathBuf> {
    // Tests get an isolated directory inside the crate
    #[cfg(test)]
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/pushrelay-test");

    #[cfg(not(test))]
    let base = match std::env::var_os("PUSHRELAY_CONFIG_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::config_dir()
            .context("Could not determine config directory")?
            .join("pushrelay"),
    };

    std::fs::create_dir_all(&base)
        .with_context(|| format!("Failed to create config directory {}", base.display()))?;
    Ok(base)
}
