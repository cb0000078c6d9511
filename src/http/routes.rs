//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::{DivergenceCheck, Tick};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/simulation", get(simulation_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// CORS for the configured origins (comma-separated, `*` for any)
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    tick: Tick,
    sessions: usize,
    inputs_rate_limited: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        tick: state.authority.current_tick(),
        sessions: state.sessions.len(),
        inputs_rate_limited: state.sessions.total_limited(),
    })
}

// ============================================================================
// Simulation constants
// ============================================================================

/// Constants a client needs to predict identically to the server
#[derive(Serialize)]
struct SimulationResponse {
    tick_rate: u32,
    move_speed: f32,
    disable_duration_ticks: u32,
    position_epsilon_sq: f32,
    divergence_check: DivergenceCheck,
}

async fn simulation_handler(State(state): State<AppState>) -> Json<SimulationResponse> {
    let sim = &state.config.simulation;
    Json(SimulationResponse {
        tick_rate: sim.tick_rate,
        move_speed: sim.move_speed,
        disable_duration_ticks: sim.disable_duration.ticks(),
        position_epsilon_sq: sim.position_epsilon_sq,
        divergence_check: sim.divergence_check,
    })
}
