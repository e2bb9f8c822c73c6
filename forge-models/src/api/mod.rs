//! HTTP API handlers for forge-models
//!
//! Model routes are mounted under `/api/models`; health lives at
//! `/api/health`. Successful JSON responses use the `{success: true, data}`
//! envelope, failures go through [`ApiError`](crate::ApiError).

pub mod convert;
pub mod download;
pub mod enhance;
pub mod generate;
pub mod health;
pub mod history;
pub mod publish;
pub mod status;

pub use convert::convert_routes;
pub use download::download_routes;
pub use enhance::enhance_routes;
pub use generate::generate_routes;
pub use health::health_routes;
pub use history::history_routes;
pub use publish::publish_routes;
pub use status::status_routes;

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::models::ProviderKind;
use crate::providers::TaskHandle;
use crate::{ApiError, ApiResult, AppState};

/// All routes under `/api/models`
pub fn model_routes() -> Router<AppState> {
    Router::new()
        .merge(generate_routes())
        .merge(status_routes())
        .merge(download_routes())
        .merge(convert_routes())
        .merge(history_routes())
        .merge(enhance_routes())
        .merge(publish_routes())
}

/// `{success: true, data}` envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Query string shared by status and download
#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub provider: Option<String>,
    pub subscription_key: Option<String>,
    pub format: Option<String>,
}

impl TaskQuery {
    pub fn provider(&self) -> ApiResult<ProviderKind> {
        match self.provider.as_deref().map(str::trim) {
            None | Some("") => Err(ApiError::BadRequest(
                "provider query param is required (meshy, tripo, rodin, or replicate)".to_string(),
            )),
            provider => parse_provider(provider),
        }
    }

    pub fn handle(&self, task_id: String) -> TaskHandle {
        TaskHandle::new(task_id, self.subscription_key.clone())
    }
}

/// Parse a provider name from a body field
pub(crate) fn parse_provider(value: Option<&str>) -> ApiResult<ProviderKind> {
    match value.map(str::trim) {
        None | Some("") => Err(ApiError::BadRequest(
            "provider is required (meshy, tripo, rodin, or replicate)".to_string(),
        )),
        Some(value) => value.parse().map_err(ApiError::BadRequest),
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("upload is too large".to_string())
    } else {
        ApiError::BadRequest(format!("invalid multipart body: {}", err.body_text()))
    }
}

/// `Content-Disposition` value with a quote-safe file name
pub(crate) fn attachment(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_escapes_quotes() {
        assert_eq!(attachment("model.fbx"), "attachment; filename=\"model.fbx\"");
        assert_eq!(attachment("a\"b.obj"), "attachment; filename=\"a_b.obj\"");
    }

    #[test]
    fn test_task_query_provider() {
        let query = TaskQuery {
            provider: None,
            subscription_key: None,
            format: None,
        };
        assert!(matches!(query.provider(), Err(ApiError::BadRequest(_))));

        let query = TaskQuery {
            provider: Some("rodin".to_string()),
            subscription_key: Some("sub".to_string()),
            format: None,
        };
        assert_eq!(query.provider().unwrap(), ProviderKind::Rodin);
        assert_eq!(query.handle("uuid".to_string()).polling_key(), "sub");
    }
}
