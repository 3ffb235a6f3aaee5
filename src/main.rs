use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use feedcord::api::{self, AppState};
use feedcord::config::Config;
use feedcord::discord::{ChannelCache, DiscordClient, Gateway};
use feedcord::feed::build_http_client;
use feedcord::relay::Relay;
use feedcord::scheduler::spawn_scheduler;
use feedcord::storage::Database;

#[derive(Parser, Debug)]
#[command(
    name = "feedcord",
    version,
    about = "Polls RSS/Atom feeds and relays new articles to Discord"
)]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "feedcord.toml")]
    config: PathBuf,

    /// SQLite database file (overrides database_path)
    #[arg(long, value_name = "FILE")]
    database: Option<String>,

    /// Management API listen address (overrides bind_address)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?
        .with_env();
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    tracing::debug!(config = ?config, "Effective configuration");

    let token = config.discord_token()?;

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database_path))?;

    // Client timeout must exceed the per-fetch timeout.
    let fetch_options = config.fetch_options();
    let http = build_http_client(fetch_options.timeout * 2)
        .context("Failed to build HTTP client")?;

    let cache = Arc::new(ChannelCache::new(config.channel_cache_capacity));
    let discord = DiscordClient::new(http.clone(), config.discord_api_base.clone(), token);
    let gateway = Gateway::new(discord, cache);
    let relay = Arc::new(Relay::new(db, http, gateway, fetch_options));

    let state = AppState {
        relay: relay.clone(),
        api_key: config.api_key().map(Arc::new),
        default_interval_ms: config.default_interval_ms,
    };

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind '{}'", config.bind_address))?;

    let scheduler = spawn_scheduler(relay, config.tick_interval());

    api::serve(listener, state, shutdown_signal())
        .await
        .context("Management API failed")?;

    if let Err(e) = scheduler.stop().await {
        tracing::warn!(error = %e, "Scheduler task ended abnormally");
    }

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
