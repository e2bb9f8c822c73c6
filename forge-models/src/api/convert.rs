//! Standalone model conversion
//!
//! `POST /convert` with multipart fields `model` (file) and `target_format`.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    response::Response,
    routing::post,
    Router,
};

use super::download::model_response;
use super::multipart_error;
use crate::{ApiError, ApiResult, AppState};

/// Largest accepted model upload
pub const MODEL_UPLOAD_LIMIT: usize = 100 * 1024 * 1024;

/// POST /convert
pub async fn convert_model(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let mut multipart =
        multipart.map_err(|_| ApiError::BadRequest("model file is required".to_string()))?;

    let mut model: Option<(String, Vec<u8>)> = None;
    let mut target_format: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "model" => {
                let file_name = field.file_name().unwrap_or("model").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                model = Some((file_name, bytes.to_vec()));
            }
            "target_format" => {
                target_format = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) = model
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("model file is required".to_string()))?;
    let target_format = target_format
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("target_format is required".to_string()))?;

    let file = state
        .orchestrator
        .convert_upload(&file_name, bytes, &target_format)
        .await?;

    tracing::info!(
        file = %file_name,
        to = %file.format,
        bytes = file.bytes.len(),
        "Uploaded model converted"
    );

    Ok(model_response(file))
}

/// Build conversion routes
pub fn convert_routes() -> Router<AppState> {
    Router::new().route(
        "/convert",
        post(convert_model).layer(DefaultBodyLimit::max(MODEL_UPLOAD_LIMIT)),
    )
}
