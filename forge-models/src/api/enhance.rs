//! Prompt enhancement endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use super::{success, ApiResponse};
use crate::services::{EnhancedPrompt, PromptKind};
use crate::{ApiError, ApiResult, AppState};

/// POST /enhance-prompt request
#[derive(Debug, Deserialize)]
pub struct EnhanceRequest {
    #[serde(default)]
    pub prompt: String,
    pub provider: Option<String>,
    /// `model` (default) or `audio`
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// POST /enhance-prompt
pub async fn enhance_prompt(
    State(state): State<AppState>,
    payload: Result<Json<EnhanceRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<EnhancedPrompt>>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let result = state
        .enhancer
        .enhance(
            &request.prompt,
            request.provider.as_deref(),
            PromptKind::parse(request.kind.as_deref()),
        )
        .await?;

    Ok(success(result))
}

/// Build prompt enhancement routes
pub fn enhance_routes() -> Router<AppState> {
    Router::new().route("/enhance-prompt", post(enhance_prompt))
}
