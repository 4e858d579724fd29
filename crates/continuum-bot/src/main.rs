//! Direct-message bot that keeps one conversation alive across restarts.
//!
//! Run with: `DISCORD_BOT_TOKEN=... cargo run -p continuum-bot`
//!
//! The gateway task forwards qualifying direct messages to the session
//! task, which records them in the context window. Gateway state and the
//! window are stored durably, so a restarted process picks up where the
//! last one stopped.

mod session;

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use continuum_context::{ContextConfig, ContextManager, DigestSummarizer};
use continuum_core::{Clock, DurableKv, SystemClock, TurnStore};
use continuum_gateway::{GatewayConfig, GatewayConnection, ReconnectPolicy, WsConnector, config::DEFAULT_API_BASE};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::session::Session;

#[derive(Parser)]
#[command(name = "continuum", version, about)]
struct Cli {
    /// Bot token sent in Identify
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// REST base used to discover the gateway URL
    #[arg(long, env = "CONTINUUM_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// SQLite database file [default: <data dir>/continuum/continuum.db]
    #[cfg(feature = "sqlite")]
    #[arg(long, env = "CONTINUUM_DB")]
    db: Option<std::path::PathBuf>,

    /// First reconnect delay in milliseconds
    #[arg(long, default_value_t = 1_000)]
    backoff_initial_ms: u64,

    /// Longest reconnect delay in milliseconds
    #[arg(long, default_value_t = 60_000)]
    backoff_max_ms: u64,

    /// Reconnect immediately after every close
    #[arg(long, conflicts_with_all = ["backoff_initial_ms", "backoff_max_ms"])]
    no_backoff: bool,

    /// Reconnect when a heartbeat goes unacknowledged
    #[arg(long)]
    require_heartbeat_ack: bool,

    /// Window length that triggers summarization
    #[arg(long, default_value_t = 50)]
    max_messages: usize,

    /// Seconds to wait for a summary before deferring the prune
    #[arg(long, default_value_t = 30)]
    summarize_timeout_secs: u64,
}

impl Cli {
    fn gateway_config(&self) -> GatewayConfig {
        let reconnect = if self.no_backoff {
            ReconnectPolicy::immediate()
        } else {
            ReconnectPolicy {
                initial_delay: Duration::from_millis(self.backoff_initial_ms),
                max_delay: Duration::from_millis(self.backoff_max_ms),
                ..ReconnectPolicy::default()
            }
        };
        GatewayConfig {
            api_base: self.api_base.clone(),
            require_heartbeat_ack: self.require_heartbeat_ack,
            ..GatewayConfig::new(self.token.clone())
        }
        .with_reconnect(reconnect)
    }

    fn context_config(&self) -> ContextConfig {
        ContextConfig {
            max_messages: self.max_messages,
            summarize_timeout: Duration::from_secs(self.summarize_timeout_secs),
            ..ContextConfig::default()
        }
    }
}

type Stores = (Arc<dyn DurableKv>, Arc<dyn TurnStore>);

#[cfg(feature = "sqlite")]
async fn open_stores(cli: &Cli) -> anyhow::Result<Stores> {
    use continuum_store::SqliteStore;

    let path = match &cli.db {
        Some(path) => path.clone(),
        None => dirs::data_dir()
            .context("no data directory on this platform; pass --db")?
            .join("continuum")
            .join("continuum.db"),
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    tracing::info!(path = %path.display(), "opening database");
    let store = Arc::new(
        SqliteStore::new(&format!("sqlite://{}", path.display()))
            .await
            .context("opening database")?,
    );
    let kv: Arc<dyn DurableKv> = store.clone();
    let turns: Arc<dyn TurnStore> = store;
    Ok((kv, turns))
}

#[cfg(not(feature = "sqlite"))]
#[allow(clippy::unused_async)]
async fn open_stores(_cli: &Cli) -> anyhow::Result<Stores> {
    use continuum_store::{MemoryKv, MemoryTurnStore};

    tracing::warn!("built without sqlite; state will not survive a restart");
    let kv: Arc<dyn DurableKv> = Arc::new(MemoryKv::new());
    let turns: Arc<dyn TurnStore> = Arc::new(MemoryTurnStore::new());
    Ok((kv, turns))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let (kv, turns) = open_stores(&cli).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let context = ContextManager::new(
        cli.context_config(),
        Arc::clone(&kv),
        turns,
        Arc::new(DigestSummarizer),
        Arc::clone(&clock),
    )
    .await
    .context("restoring context window")?;
    let session = Session::new(context, Arc::clone(&kv))
        .await
        .context("restoring session info")?;

    let (tx, rx) = mpsc::unbounded_channel();
    let session_task = tokio::spawn(session.run(rx));

    let config = cli.gateway_config();
    tracing::info!(?config, "starting gateway");
    let connector = WsConnector::new(config.api_base.clone());
    let mut gateway = GatewayConnection::new(config, connector, tx, kv, clock)
        .await
        .context("restoring gateway state")?;

    gateway.run(shutdown_signal()).await;

    // Dropping the connection closes the message queue and ends the session task.
    drop(gateway);
    session_task.await.context("session task panicked")?;
    Ok(())
}
