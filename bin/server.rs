// Loft Ledger - Web Server
// JSON API with Axum over the SQLite record store

use anyhow::{Context, Result};
use clap::Parser;
use loft_ledger::api::{self, AppState};
use loft_ledger::config::{init_tracing, load_config};
use loft_ledger::open_database;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;

#[derive(Parser, Debug)]
#[command(name = "loft-server")]
#[command(about = "HTTP JSON API for Loft Ledger")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, default_value = "loft.toml", env = "LOFT_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(Some(args.config.as_path()))
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    init_tracing(&config);

    let db_path = PathBuf::from(&config.database.path);
    let conn = open_database(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    let app = api::router(AppState::new(conn)).layer(CorsLayer::permissive());

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(%addr, version = loft_ledger::VERSION, "loft server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("loft server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("received Ctrl+C, shutting down");
}
