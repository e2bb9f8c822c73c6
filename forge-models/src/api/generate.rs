//! Generation submission endpoints
//!
//! - `POST /generate`: text-to-3D (JSON body)
//! - `POST /generate-image`: image-to-3D (multipart, `image` file field)

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        State,
    },
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use super::{multipart_error, non_empty, parse_provider, success, ApiResponse};
use crate::providers::{GenerationOptions, ImageInput, ALLOWED_IMAGE_TYPES};
use crate::services::{ImageRequest, SubmitResult, TextRequest};
use crate::{ApiError, ApiResult, AppState};

/// Largest accepted reference image
pub const IMAGE_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

/// Multipart framing allowance on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// POST /generate request
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
    pub provider: Option<String>,
    pub enhanced_prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub topology: Option<String>,
    pub target_polycount: Option<u32>,
    pub tier: Option<String>,
    pub format: Option<String>,
    pub quality: Option<String>,
}

/// POST /generate
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<SubmitResult>>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let prompt = non_empty(request.prompt)
        .ok_or_else(|| ApiError::BadRequest("prompt is required".to_string()))?;
    let provider = parse_provider(request.provider.as_deref())?;

    let result = state
        .orchestrator
        .submit_text(TextRequest {
            provider,
            prompt,
            enhanced_prompt: non_empty(request.enhanced_prompt),
            options: GenerationOptions {
                negative_prompt: non_empty(request.negative_prompt),
                tier: non_empty(request.tier),
                format: non_empty(request.format),
                quality: non_empty(request.quality),
                topology: non_empty(request.topology),
                target_polycount: request.target_polycount,
            },
        })
        .await?;

    Ok(success(result))
}

/// POST /generate-image
///
/// A missing image and an image of a disallowed type are both reported as
/// "image file is required", matching how the upload filter drops them.
pub async fn generate_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ApiResponse<SubmitResult>>> {
    // A body that is not multipart cannot carry the image
    let mut multipart =
        multipart.map_err(|_| ApiError::BadRequest("image file is required".to_string()))?;
    let mut image: Option<ImageInput> = None;
    let mut provider: Option<String> = None;
    let mut options = GenerationOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let mime = field.content_type().unwrap_or_default().to_string();
                let filename = field.file_name().unwrap_or("image").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.len() > IMAGE_UPLOAD_LIMIT {
                    return Err(ApiError::PayloadTooLarge(
                        "image exceeds the 10 MiB upload limit".to_string(),
                    ));
                }
                if ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) && !bytes.is_empty() {
                    image = Some(ImageInput {
                        bytes: bytes.to_vec(),
                        filename,
                        mime,
                    });
                }
            }
            _ => {
                let value = non_empty(Some(field.text().await.map_err(multipart_error)?));
                match name.as_str() {
                    "provider" => provider = value,
                    "negative_prompt" => options.negative_prompt = value,
                    "tier" => options.tier = value,
                    "format" => options.format = value,
                    "quality" => options.quality = value,
                    "topology" => options.topology = value,
                    "target_polycount" => {
                        options.target_polycount = value.and_then(|v| v.parse().ok())
                    }
                    _ => {}
                }
            }
        }
    }

    let image =
        image.ok_or_else(|| ApiError::BadRequest("image file is required".to_string()))?;
    let provider = parse_provider(provider.as_deref())?;

    let result = state
        .orchestrator
        .submit_image(ImageRequest {
            provider,
            image,
            options,
        })
        .await?;

    Ok(success(result))
}

/// Build generation routes
pub fn generate_routes() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate))
        .route(
            "/generate-image",
            post(generate_image)
                .layer(DefaultBodyLimit::max(IMAGE_UPLOAD_LIMIT + MULTIPART_OVERHEAD)),
        )
}
