//! snippetbox server binary

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use snippetbox::config::SnippetboxConfig;
use snippetbox::session::SessionStore;
use snippetbox::state::AppState;
use snippetbox::{models, observability, routes};

#[derive(Parser)]
#[command(name = "snippetbox")]
#[command(version)]
#[command(about = "Snippet sharing server", long_about = None)]
struct Cli {
    /// HTTP network address, overrides `server.addr`
    #[arg(long, env = "SNIPPETBOX_ADDR")]
    addr: Option<String>,

    /// `SQLite` data source name, overrides `database.url`
    #[arg(long, env = "SNIPPETBOX_DSN")]
    dsn: Option<String>,

    /// Configuration file; defaults to ./snippetbox.toml when present
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("failed to read .env");
        }
    }

    let cli = Cli::parse();

    observability::init()?;
    observability::install_panic_hook();

    let mut config = SnippetboxConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.addr {
        config.server.addr = addr;
    }
    if let Some(dsn) = cli.dsn {
        config.database.url = dsn;
    }

    let pool = models::connect(&config.database)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))?;

    let addr = config.server.addr.clone();
    let cleanup_every = Duration::from_secs(config.session.cleanup_interval_secs.max(1));
    let state = AppState::new(config, pool.clone())?;

    let cleanup = tokio::spawn(session_cleanup(Arc::clone(&state.sessions), cleanup_every));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "starting server");

    axum::serve(
        listener,
        routes::app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cleanup.abort();
    pool.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn session_cleanup(store: Arc<dyn SessionStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match store.cleanup_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "expired sessions removed"),
            Err(err) => tracing::warn!(error = %err, "session cleanup failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
