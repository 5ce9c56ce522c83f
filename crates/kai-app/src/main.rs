//! Kaï application binary - composition root.
//!
//! `kai serve` (the default):
//! 1. Load configuration from TOML
//! 2. Open the SQLite-backed key-value store
//! 3. Build the Gemini gateway and the stream dispatcher
//! 4. Start the expiry purge loop
//! 5. Serve the axum API until Ctrl-C
//!
//! `kai ask` sends one message to a running server and prints the reply.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use kai_api::state::AppState;
use kai_chat::{GeminiGateway, StreamDispatcher};
use kai_client::{ChatClient, ChatView};
use kai_core::config::KaiConfig;
use kai_storage::{Database, KvStore, SqliteKvStore};

use crate::cli::{CliArgs, Command};

/// Periodically drop expired cache rows.
async fn purge_loop(kv: Arc<dyn KvStore>, interval_secs: u64) {
    tracing::info!(interval_secs, "Expiry purge loop started");

    let period = Duration::from_secs(interval_secs);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        interval.tick().await;
        match kv.purge_expired() {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Purged expired entries"),
            Err(e) => tracing::warn!(error = %e, "Expiry purge failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn serve(args: &CliArgs, mut config: KaiConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.server.port = args.resolve_port(config.server.port);

    let db_path = args.resolve_db_path(&config);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(path = %parent.display(), error = %e, "Failed to create data directory");
            return Err(e.into());
        }
    }

    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite store opened");
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(db));

    let api_key = args
        .resolve_api_key(&config)
        .ok_or("GEMINI_API_KEY is not set and no gemini.api_key is configured")?;
    let gateway = GeminiGateway::new(api_key, config.gemini.model.clone())?
        .with_base_url(config.gemini.base_url.clone());
    tracing::info!(model = %gateway.model(), "Gemini gateway ready");

    let dispatcher = StreamDispatcher::new(Arc::clone(&kv), Arc::new(gateway), &config.chat);
    let state = AppState::new(dispatcher, config.server.recent_ips_limit);

    let purge = (config.storage.purge_interval_secs > 0).then(|| {
        tokio::spawn(purge_loop(
            Arc::clone(&kv),
            config.storage.purge_interval_secs,
        ))
    });

    let result = kai_api::start_server(&config.server, state, shutdown_signal()).await;

    if let Some(handle) = purge {
        handle.abort();
    }
    tracing::info!("Server stopped");
    result.map_err(Into::into)
}

async fn ask(
    url: String,
    session: Option<String>,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = ChatClient::new(url);
    let mut view = match session {
        Some(sid) => ChatView::with_session(sid),
        None => ChatView::new(),
    };

    client.send(&mut view, message).await?;

    println!("{}", view.reply());
    if let Some(sid) = view.session_id() {
        eprintln!("session: {}", sid);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let config = KaiConfig::load_or_default(&config_file);

    let log_level = args.resolve_log_level(&config);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Kaï v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    match args.command {
        None | Some(Command::Serve) => serve(&args, config).await,
        Some(Command::Ask {
            ref message,
            ref session,
            ref url,
        }) => {
            let url = url.clone().unwrap_or_else(|| {
                format!("http://127.0.0.1:{}", args.resolve_port(config.server.port))
            });
            ask(url, session.clone(), message).await
        }
    }
}
