//! Authority server - hosts the authoritative simulation
//!
//! This is the main entry point for the server. It handles:
//! - The fixed-rate authoritative tick loop
//! - WebSocket sessions that submit owner inputs and receive state
//! - Health and simulation-constant HTTP endpoints

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tick_prediction::app::AppState;
use tick_prediction::config::Config;
use tick_prediction::http::build_router;
use tick_prediction::server::{spawn_debug_stun, AuthorityLoop};
use tick_prediction::util::time::{init_server_time, unix_millis};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting authority server");
    info!("Server address: {}", config.server_addr);
    info!(
        tick_rate = config.simulation.tick_rate,
        move_speed = config.simulation.move_speed,
        divergence_check = ?config.simulation.divergence_check,
        reject_stale_inputs = config.simulation.reject_stale_inputs,
        "Simulation configured"
    );

    // Spawn the authoritative tick loop
    let (authority_loop, authority) = AuthorityLoop::new(config.simulation.clone(), unix_millis());
    tokio::spawn(authority_loop.run());

    if let Some(every) = config.simulation.debug_stun_every {
        info!(every_ticks = every.ticks(), "Debug stun timer enabled");
        spawn_debug_stun(authority.clone(), every.ticks(), config.simulation.tick_rate);
    }

    // Build router
    let state = AppState::new(config.clone(), authority);
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
