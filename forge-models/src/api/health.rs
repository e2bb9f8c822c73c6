//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the converter is missing
    pub status: String,
    /// Module name ("forge-models")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Whether GLB to FBX/OBJ conversion can run
    pub converter_available: bool,
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let converter_available = state.orchestrator.converter().is_available().await;

    Json(HealthResponse {
        status: if converter_available { "ok" } else { "degraded" }.to_string(),
        module: "forge-models".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        converter_available,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/api/health", get(health_check))
}
