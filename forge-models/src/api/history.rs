//! Generation and conversion history

use axum::{extract::State, routing::get, Json, Router};

use super::{success, ApiResponse};
use crate::models::{AssetRecord, ConversionRecord};
use crate::{ApiResult, AppState};

/// GET /history
///
/// Last 50 generations, newest first.
pub async fn list_history(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<AssetRecord>>>> {
    Ok(success(state.orchestrator.history().await?))
}

/// GET /conversions
pub async fn list_conversions(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<ConversionRecord>>>> {
    Ok(success(state.orchestrator.conversions().await?))
}

/// Build history routes
pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/history", get(list_history))
        .route("/conversions", get(list_conversions))
}
