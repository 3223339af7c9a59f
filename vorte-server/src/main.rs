//! Vorte Server - REST API for WebAuthn challenge issuance
//!
//! - GET  /api/v1/webauthn/challenge - Issue a challenge (X-Fingerprint required)
//! - POST /api/v1/webauthn/register  - Complete a registration
//! - GET  /health, /ready            - Probes

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;
use vorte_server::{create_router_with_state, spawn_sweeper, AppState, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let state = AppState::from_config(&config)?;

    let sweeper = spawn_sweeper(state.service.clone(), config.sweep_interval());
    let app = create_router_with_state(&config, state)?;

    let addr = config.socket_addr();
    tracing::info!(
        %addr,
        allowed_origins = ?config.challenge.allowed_origins,
        rp_id = %config.challenge.production_apex,
        "Vorte server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
