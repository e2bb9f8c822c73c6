//! forge-models library interface
//!
//! Exposes the router, state and services for the binary and for
//! integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::services::{Orchestrator, PromptEnhancer, RobloxPublisher};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Submit / poll / download flow
    pub orchestrator: Arc<Orchestrator>,
    pub enhancer: Arc<PromptEnhancer>,
    pub publisher: Arc<RobloxPublisher>,
    /// Directory served under `/storage`
    pub storage_dir: PathBuf,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        orchestrator: Orchestrator,
        enhancer: PromptEnhancer,
        publisher: RobloxPublisher,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db,
            orchestrator: Arc::new(orchestrator),
            enhancer: Arc::new(enhancer),
            publisher: Arc::new(publisher),
            storage_dir: storage_dir.into(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let storage = ServeDir::new(&state.storage_dir);

    Router::new()
        .nest("/api/models", api::model_routes())
        .merge(api::health_routes())
        .nest_service("/storage", storage)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
