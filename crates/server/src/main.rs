//! Relto auth daemon binary.
//!
//! Owns process setup: configuration, logging, the database pool, and
//! graceful shutdown. The actual service is the `relto-daemon` worker;
//! connection handling attaches through its message channel.
//!
//! # Usage
//!
//! ```bash
//! relto-auth --database-url postgres://relto@localhost/relto
//!
//! RELTO_DATABASE_URL=postgres://relto@localhost/relto relto-auth
//! ```

mod config;

use std::io::IsTerminal;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Cli, Config, LogFormat};
use relto_daemon::{AuthMessage, AuthDaemon, NoGameLink, SessionTable};
use relto_sdl::DescriptorDb;

/// Top-level error for the server binary.
#[derive(Debug)]
enum ServerError {
    Config(String),
    Store(relto_store::StoreError),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Config(message) => write!(f, "config error: {message}"),
            ServerError::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();
    let config = cli.resolve().map_err(ServerError::Config)?;

    init_logging(&config);
    tracing::info!(game_server = %config.game_server_address, "Starting Relto auth daemon");
    if config.restrict_logins {
        tracing::warn!("Logins restricted to admin and beta-tester accounts");
    }

    let pool = relto_store::connect(&config.database_url).await.map_err(ServerError::Store)?;

    // The descriptor catalog is populated by the schema loader, an
    // external collaborator; an empty catalog just means no age has
    // global SDL state yet.
    let catalog = Arc::new(DescriptorDb::new());
    if catalog.is_empty() {
        tracing::warn!("Descriptor catalog is empty; SDL defaults will be empty blobs");
    }

    let state =
        relto_daemon::bootstrap(&pool, catalog.as_ref()).await.map_err(ServerError::Store)?;
    tracing::info!(
        all_players = state.all_players,
        global_states = state.global_states.len(),
        "Vault bootstrapped"
    );

    let sessions = SessionTable::new();
    let (daemon, daemon_tx) = AuthDaemon::new(
        pool,
        catalog,
        Arc::new(NoGameLink),
        sessions,
        state,
        config.restrict_logins,
    );
    let worker = tokio::spawn(daemon.run());

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    if daemon_tx.send(AuthMessage::Shutdown).is_err() {
        tracing::warn!("Daemon already stopped");
    }
    if let Err(err) = worker.await {
        tracing::error!(error = %err, "Daemon worker panicked");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        // If signal handlers cannot be installed the process cannot be
        // stopped cleanly; treat that as fatal.
        #[allow(clippy::expect_used)]
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[allow(clippy::expect_used)]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

/// Initializes the logging system based on configuration.
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match config.log_format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stdout().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
    }
}
