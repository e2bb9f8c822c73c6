//! Model download
//!
//! `GET /download/:task_id?provider=&subscription_key=&format=`
//!
//! Responds with the model bytes as an attachment. `format` defaults to GLB.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use super::{attachment, TaskQuery};
use crate::models::ModelFormat;
use crate::services::ModelFile;
use crate::{ApiError, ApiResult, AppState};

/// Binary attachment response for a model file
pub(crate) fn model_response(file: ModelFile) -> Response {
    (
        [
            (header::CONTENT_TYPE, file.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, attachment(&file.file_name)),
        ],
        file.bytes,
    )
        .into_response()
}

/// GET /download/:task_id
pub async fn download_model(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Response> {
    let provider = query.provider()?;
    let format = match query.format.as_deref().map(str::trim) {
        None | Some("") => ModelFormat::Glb,
        Some(value) => value
            .to_ascii_lowercase()
            .parse::<ModelFormat>()
            .map_err(ApiError::BadRequest)?,
    };
    let handle = query.handle(task_id);

    let file = state
        .orchestrator
        .download(provider, &handle, format)
        .await?;

    tracing::info!(
        provider = %provider,
        task_id = %handle.task_id,
        format = %format,
        bytes = file.bytes.len(),
        "Model download served"
    );

    Ok(model_response(file))
}

/// Build download routes
pub fn download_routes() -> Router<AppState> {
    Router::new().route("/download/:task_id", get(download_model))
}
