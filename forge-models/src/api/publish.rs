//! Roblox publishing endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use super::{success, ApiResponse};
use crate::services::PublishRequest;
use crate::{ApiError, ApiResult, AppState};

/// POST /upload-roblox request
#[derive(Debug, Deserialize)]
pub struct UploadRobloxRequest {
    #[serde(default)]
    pub model_url: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// POST /upload-roblox
///
/// `model_url` may be a provider URL or a materialized `/storage/...` path.
pub async fn upload_roblox(
    State(state): State<AppState>,
    payload: Result<Json<UploadRobloxRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let operation = state
        .publisher
        .publish(&PublishRequest {
            model_url: request.model_url,
            name: request.name,
            description: request.description,
        })
        .await?;

    Ok(success(operation))
}

/// Build publishing routes
pub fn publish_routes() -> Router<AppState> {
    Router::new().route("/upload-roblox", post(upload_roblox))
}
