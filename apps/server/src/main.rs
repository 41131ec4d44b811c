//! # Duka POS Server
//!
//! ```text
//! duka-server [--config <path>]
//!
//!   load ServerConfig ──► open SQLite + migrate ──► build gateway
//!          │                                             │
//!          └──────────────► AppState ◄───────────────────┘
//!                              │
//!                              ▼
//!                   axum::serve on server.bind:port
//!                   (graceful shutdown on Ctrl+C / SIGTERM)
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use duka_db::Database;
use duka_server::state::gateway_from_config;
use duka_server::{build_router, AppState, ServerConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,duka=debug,sqlx=warn,tower_http=info")),
        )
        .with_target(true)
        .init();

    let config_path = config_path_from_args(std::env::args().skip(1))?;
    let config = ServerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    info!(
        bind = %config.socket_addr(),
        database = %config.database.path.display(),
        mpesa_environment = %config.mpesa.environment,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("Failed to open database")?;

    let gateway = gateway_from_config(&config).context("Invalid M-Pesa configuration")?;
    let addr = config.socket_addr();
    let state = AppState::new(db.clone(), gateway, config);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Duka POS server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

fn config_path_from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Option<PathBuf>> {
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().context("--config needs a path")?;
                path = Some(PathBuf::from(value));
            }
            other => bail!("Unknown argument: {} (usage: duka-server [--config <path>])", other),
        }
    }
    Ok(path)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
