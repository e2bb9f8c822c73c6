//! Error types for forge-models
//!
//! Every layer's error converts into [`ApiError`], which renders the
//! `{success: false, error, details?}` envelope with a status code chosen by
//! error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::providers::ProviderError;
use crate::services::{ConversionError, EnhanceError, OrchestratorError, PublishError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Upload exceeds the route's body limit (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Missing credential or dependency (503)
    #[error("{0}")]
    Unavailable(String),

    /// Remote service unreachable or answered garbage (502)
    #[error("{0}")]
    BadGateway(String),

    /// Remote service rejected the request; its status is passed through
    #[error("{message}")]
    Upstream {
        status: u16,
        message: String,
        details: String,
    },

    /// Operation failed inside this service (500), message is client-safe
    #[error("{0}")]
    Failed(String),

    /// Unexpected failure (500); detail is logged, not returned
    #[error("Internal server error: {0}")]
    Internal(String),

    /// forge-common error
    #[error("Common error: {0}")]
    Common(#[from] forge_common::Error),
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(msg) | ProviderError::Capability(msg) => {
                ApiError::BadRequest(msg)
            }
            ProviderError::Configuration(msg) => ApiError::Unavailable(msg),
            ProviderError::Upstream {
                message,
                status,
                body,
            } => ApiError::Upstream {
                status,
                message,
                details: body,
            },
            ProviderError::Network(msg) | ProviderError::Parse(msg) => ApiError::BadGateway(msg),
        }
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::Validation(msg) => ApiError::BadRequest(msg),
            ConversionError::Unavailable => ApiError::Unavailable(err.to_string()),
            ConversionError::TimedOut | ConversionError::Failed(_) => {
                ApiError::Failed(err.to_string())
            }
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Provider(e) => e.into(),
            OrchestratorError::Conversion(e) => e.into(),
            OrchestratorError::Store(e) => ApiError::Common(e),
            OrchestratorError::Validation(msg) => ApiError::BadRequest(msg),
            OrchestratorError::NotFound(msg) => ApiError::NotFound(msg),
            OrchestratorError::BadGateway(msg) => ApiError::BadGateway(msg),
        }
    }
}

impl From<EnhanceError> for ApiError {
    fn from(err: EnhanceError) -> Self {
        match err {
            EnhanceError::Validation(msg) => ApiError::BadRequest(msg),
            EnhanceError::Configuration => ApiError::Unavailable(err.to_string()),
            EnhanceError::Upstream {
                message,
                status,
                body,
            } => ApiError::Upstream {
                status,
                message,
                details: body,
            },
            EnhanceError::Network(_) | EnhanceError::EmptyResponse => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Validation(msg) => ApiError::BadRequest(msg),
            PublishError::Configuration => ApiError::Unavailable(err.to_string()),
            PublishError::Fetch(ref detail) => {
                tracing::warn!(error = %detail, "Model fetch for publishing failed");
                ApiError::BadGateway(err.to_string())
            }
            PublishError::Upstream {
                message,
                status,
                body,
            } => ApiError::Upstream {
                status,
                message,
                details: body,
            },
            PublishError::Network(_) => ApiError::BadGateway(err.to_string()),
        }
    }
}

/// Status for an upstream rejection: error statuses pass through, anything
/// else becomes 502
fn upstream_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() || code.is_server_error() => code,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg, None),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, None),
            ApiError::Upstream {
                status,
                message,
                details,
            } => (upstream_status(status), message, Some(details)),
            ApiError::Failed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            ApiError::Internal(ref detail) => {
                error!(error = %detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
            ApiError::Common(ref err) => {
                error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "success": false,
            "error": message,
        });
        if let Some(details) = details.filter(|d| !d.is_empty()) {
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upstream_status_mirrored_with_details() {
        let (status, body) = render(
            ProviderError::Upstream {
                message: "meshy api error: 402".to_string(),
                status: 402,
                body: "{\"message\":\"payment required\"}".to_string(),
            }
            .into(),
        )
        .await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "meshy api error: 402");
        assert_eq!(body["details"], "{\"message\":\"payment required\"}");
    }

    #[tokio::test]
    async fn test_non_error_upstream_status_is_bad_gateway() {
        let (status, _) = render(ApiError::Upstream {
            status: 200,
            message: "odd".to_string(),
            details: String::new(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_conversion_error_statuses() {
        let (status, _) = render(ConversionError::Unavailable.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = render(ConversionError::TimedOut.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "model conversion timed out");

        let (status, _) =
            render(ConversionError::Validation("unsupported output format: stl".into()).into())
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_errors_are_generic() {
        let (status, body) =
            render(forge_common::Error::Internal("tags column corrupt".to_string()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_capability_is_bad_request() {
        let (status, _) = render(
            ProviderError::Capability("replicate/trellis only supports image-to-3d mode".into())
                .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
