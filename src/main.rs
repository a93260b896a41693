//! Pushrelay binary.
//!
//! `serve` runs the HTTP intake and delivery engine; `keygen`, `send`,
//! and `config` are operator tools around the same core. Startup fails
//! fast when the service identity is missing rather than minting a
//! throwaway keypair that would orphan every existing subscription.

// Rust guideline compliant 2026-02

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use mimalloc::MiMalloc;
use pushrelay::server::{self, AppState};
use pushrelay::{
    Broadcaster, Config, CredentialSigner, Dispatcher, MemorySubscriptionStore,
    NotificationPayload, SqliteSubscriptionStore, SubscriptionStore, Urgency, VapidKeys,
};
use std::sync::Arc;

// Use mimalloc as the global allocator per M-MIMALLOC-APPS
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "pushrelay", version, about = "Web Push delivery service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP intake and delivery service
    Serve {
        /// Socket address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Generate and persist the service identity keypair
    Keygen {
        /// Replace an existing keypair
        #[arg(long)]
        force: bool,
    },
    /// Send a notification to every stored subscription
    Send {
        /// Notification title
        #[arg(long)]
        title: String,
        /// Notification body text
        #[arg(long, default_value = "")]
        body: String,
        /// Icon URL shown with the notification
        #[arg(long)]
        icon: Option<String>,
        /// Delivery urgency: very-low, low, normal, or high
        #[arg(long, default_value = "normal")]
        urgency: String,
        /// TTL header in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => run_serve(bind),
        Commands::Keygen { force } => run_keygen(force),
        Commands::Send {
            title,
            body,
            icon,
            urgency,
            ttl,
        } => run_send(title, body, icon, &urgency, ttl),
        Commands::Config => run_config(),
    }
}

fn run_serve(bind_override: Option<String>) -> Result<()> {
    let config = Config::load();
    let (broadcaster, store, public_key) = assemble(&config)?;
    let state = Arc::new(AppState::new(store, broadcaster, public_key));
    let bind = bind_override.unwrap_or_else(|| config.bind.clone());

    info!("[Main] Pushrelay v{VERSION} starting");
    tokio::runtime::Runtime::new()
        .context("Failed to start async runtime")?
        .block_on(server::serve(state, &bind))
}

fn run_keygen(force: bool) -> Result<()> {
    let keys_path = Config::keys_path()?;
    if keys_path.exists() && !force {
        bail!(
            "Service identity already exists at {}. Pass --force to replace it \
             (existing browser subscriptions will stop working)",
            keys_path.display()
        );
    }

    let keys = VapidKeys::generate();
    keys.save_to(&keys_path)
        .with_context(|| format!("Failed to write {}", keys_path.display()))?;

    println!("Service identity written to {}", keys_path.display());
    println!(
        "Public key (applicationServerKey):\n{}",
        keys.public_key_base64url()
    );
    Ok(())
}

fn run_send(
    title: String,
    body: String,
    icon: Option<String>,
    urgency: &str,
    ttl: Option<u64>,
) -> Result<()> {
    let config = Config::load();
    let (broadcaster, _store, _public_key) = assemble(&config)?;
    let urgency = Urgency::from_name(urgency).with_context(|| {
        format!("Unknown urgency {urgency:?} (expected very-low, low, normal, or high)")
    })?;

    let payload = NotificationPayload {
        title,
        body,
        icon,
        data: serde_json::Map::new(),
    };
    let plaintext = payload
        .to_bytes()
        .context("Failed to encode notification payload")?;

    let summary = tokio::runtime::Runtime::new()
        .context("Failed to start async runtime")?
        .block_on(broadcaster.broadcast_with(&plaintext, ttl, urgency))?;

    println!(
        "Broadcast complete: {} delivered, {} retried, {} rejected, {} removed",
        summary.delivered, summary.retried, summary.rejected, summary.removed
    );
    Ok(())
}

fn run_config() -> Result<()> {
    let config = Config::load();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("Failed to render config")?
    );
    println!();
    println!("Config file:   {}", Config::path()?.display());
    println!("Identity file: {}", Config::keys_path()?.display());
    Ok(())
}

/// Build the delivery engine from config, failing fast when the
/// service identity is missing.
fn assemble(config: &Config) -> Result<(Broadcaster, Arc<dyn SubscriptionStore>, String)> {
    let keys_path = Config::keys_path()?;
    let keys = VapidKeys::load_from(&keys_path).with_context(|| {
        format!(
            "No usable service identity at {}. Run `pushrelay keygen` first",
            keys_path.display()
        )
    })?;
    let public_key = keys.public_key_base64url().to_string();

    let signer = CredentialSigner::new(&keys, &config.subject, config.token_ttl_secs)
        .context("Failed to build credential signer")?;
    let store: Arc<dyn SubscriptionStore> = if config.database.as_os_str() == "none" {
        info!("[Main] Using non-persistent in-memory subscription store");
        Arc::new(MemorySubscriptionStore::new())
    } else {
        Arc::new(SqliteSubscriptionStore::open(&config.database)?)
    };
    let dispatcher = Dispatcher::new(config.max_retries, config.default_ttl)
        .context("Failed to build HTTP dispatcher")?;
    let broadcaster = Broadcaster::new(
        Arc::clone(&store),
        signer,
        dispatcher,
        config.content_encoding,
        config.concurrency,
        config.broadcast_deadline(),
    );

    Ok((broadcaster, store, public_key))
}
