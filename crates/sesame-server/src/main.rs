use anyhow::{Context, Result};
use sesame_db::{create_pool_with, run_migrations};
use sesame_server::config::load_config;
use sesame_server::state::AppState;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting sesame auth server");

    let config_path =
        std::env::var("SESAME_CONFIG").unwrap_or_else(|_| "server-config.yaml".to_string());
    tracing::info!("Loading config from: {}", config_path);
    let config = load_config(&config_path)?;

    tracing::info!("Connecting to database...");
    let pool = create_pool_with(
        &config.db.url,
        config.db.max_connections,
        Duration::from_secs(config.db.acquire_timeout_secs),
    )
    .await
    .context("Failed to create database pool")?;

    tracing::info!("Running database migrations...");
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let listen = config.listen.clone();
    let sweeper_enabled = config.sweeper.enabled;
    let state = AppState::new(pool, config)?;

    let cancel_token = CancellationToken::new();
    let _sweeper = if sweeper_enabled {
        Some(sesame_server::sweeper::start(
            state.clone(),
            cancel_token.clone(),
        ))
    } else {
        tracing::info!("Session sweeper disabled");
        None
    };

    let app = sesame_server::web::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind to {}", listen))?;

    tracing::info!("Server listening on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping...");
    cancel_token.cancel();
}
