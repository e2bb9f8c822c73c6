//! Meshy adapter
//!
//! Text-to-3D runs on the v2 API in `preview` mode; image-to-3D runs on the
//! v1 API with the image inlined as a data URL. Meshy reports a native
//! progress percentage and embeds result URLs in the status response.
//!
//! # API Reference
//! - Text: `POST /openapi/v2/text-to-3d`, `GET /openapi/v2/text-to-3d/{id}`
//! - Image: `POST /openapi/v1/image-to-3d`, `GET /openapi/v1/image-to-3d/{id}`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    network_error, parse_error, require_prompt, upstream_error, GenerationOptions, ImageInput,
    ModelUrls, ProviderAdapter, ProviderError, ProviderStatus, Submission, TaskHandle, TaskStatus,
};
use crate::models::ProviderKind;

const TEXT_API_URL: &str = "https://api.meshy.ai/openapi/v2/text-to-3d";
const IMAGE_API_URL: &str = "https://api.meshy.ai/openapi/v1/image-to-3d";

const AI_MODEL: &str = "meshy-6";
const DEFAULT_TOPOLOGY: &str = "triangle";
const DEFAULT_TARGET_POLYCOUNT: u32 = 30_000;

/// Map Meshy's task vocabulary onto canonical states
pub fn normalize_status(native: &str) -> TaskStatus {
    match native {
        "PENDING" => TaskStatus::Waiting,
        "IN_PROGRESS" => TaskStatus::Generating,
        "SUCCEEDED" => TaskStatus::Ready,
        "FAILED" | "CANCELED" => TaskStatus::Error,
        _ => TaskStatus::Waiting,
    }
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    progress: Option<u8>,
    #[serde(default)]
    model_urls: Option<ModelUrls>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

impl From<TaskResponse> for ProviderStatus {
    fn from(task: TaskResponse) -> Self {
        ProviderStatus {
            status: normalize_status(&task.status),
            progress: task.progress.unwrap_or(0).min(100),
            model_urls: task.model_urls.filter(|urls| !urls.is_empty()),
            thumbnail_url: task.thumbnail_url.filter(|url| !url.is_empty()),
        }
    }
}

/// Meshy text/image-to-3D client
pub struct MeshyAdapter {
    http_client: Client,
    api_key: Option<String>,
}

impl MeshyAdapter {
    pub fn new(http_client: Client, api_key: Option<String>) -> Self {
        Self {
            http_client,
            api_key,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_credential("MESHY_API_KEY"))?;
        Ok(request.bearer_auth(api_key))
    }

    async fn create(&self, url: &str, body: serde_json::Value) -> Result<Submission, ProviderError> {
        let response = self
            .authorize(self.http_client.post(url))?
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("meshy api request failed", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("meshy api error", response).await);
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| parse_error("failed to parse meshy response", e))?;

        debug!(task_id = %created.result, "Meshy task created");

        Ok(Submission {
            task_id: created.result,
            subscription_key: None,
        })
    }

    async fn fetch_task(&self, url: &str) -> Result<Option<TaskResponse>, ProviderError> {
        let response = self
            .authorize(self.http_client.get(url))?
            .send()
            .await
            .map_err(|e| network_error("meshy status request failed", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(upstream_error("meshy status error", response).await);
        }

        let task = response
            .json()
            .await
            .map_err(|e| parse_error("failed to parse meshy status", e))?;
        Ok(Some(task))
    }
}

#[async_trait]
impl ProviderAdapter for MeshyAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Meshy
    }

    async fn submit_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        let prompt = require_prompt(prompt)?;

        let mut body = json!({
            "mode": "preview",
            "prompt": prompt,
            "ai_model": AI_MODEL,
            "topology": options.topology.as_deref().unwrap_or(DEFAULT_TOPOLOGY),
            "target_polycount": options.target_polycount.unwrap_or(DEFAULT_TARGET_POLYCOUNT),
        });
        if let Some(negative) = options.negative_prompt.as_deref().map(str::trim) {
            if !negative.is_empty() {
                body["negative_prompt"] = json!(negative);
            }
        }

        self.create(TEXT_API_URL, body).await
    }

    async fn submit_image(
        &self,
        image: &ImageInput,
        options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        image.validate()?;

        let body = json!({
            "image_url": image.data_url(),
            "topology": options.topology.as_deref().unwrap_or(DEFAULT_TOPOLOGY),
            "target_polycount": options.target_polycount.unwrap_or(DEFAULT_TARGET_POLYCOUNT),
        });

        self.create(IMAGE_API_URL, body).await
    }

    /// Text tasks are looked up first; a 404 falls through to the image
    /// endpoint, so the client only ever needs to send `provider=meshy`.
    async fn get_status(&self, handle: &TaskHandle) -> Result<ProviderStatus, ProviderError> {
        let text_url = format!("{}/{}", TEXT_API_URL, handle.task_id);
        if let Some(task) = self.fetch_task(&text_url).await? {
            return Ok(task.into());
        }

        let image_url = format!("{}/{}", IMAGE_API_URL, handle.task_id);
        match self.fetch_task(&image_url).await? {
            Some(task) => Ok(task.into()),
            None => Err(ProviderError::Upstream {
                message: "meshy status error: 404".to_string(),
                status: 404,
                body: format!("task not found: {}", handle.task_id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(normalize_status("PENDING"), TaskStatus::Waiting);
        assert_eq!(normalize_status("IN_PROGRESS"), TaskStatus::Generating);
        assert_eq!(normalize_status("SUCCEEDED"), TaskStatus::Ready);
        assert_eq!(normalize_status("FAILED"), TaskStatus::Error);
        assert_eq!(normalize_status("CANCELED"), TaskStatus::Error);
    }

    #[test]
    fn test_unknown_status_is_waiting() {
        assert_eq!(normalize_status("EXPIRED"), TaskStatus::Waiting);
        assert_eq!(normalize_status(""), TaskStatus::Waiting);
    }

    #[test]
    fn test_task_response_keeps_native_progress() {
        let task: TaskResponse = serde_json::from_value(json!({
            "id": "018a",
            "status": "SUCCEEDED",
            "progress": 100,
            "model_urls": {
                "glb": "https://assets.meshy.ai/018a/model.glb",
                "usdz": "https://assets.meshy.ai/018a/model.usdz"
            },
            "thumbnail_url": "https://assets.meshy.ai/018a/preview.png"
        }))
        .unwrap();

        let status = ProviderStatus::from(task);
        assert_eq!(status.status, TaskStatus::Ready);
        assert_eq!(status.progress, 100);
        assert_eq!(
            status.model_urls.unwrap().glb.as_deref(),
            Some("https://assets.meshy.ai/018a/model.glb")
        );
        assert!(status.thumbnail_url.is_some());
    }

    #[test]
    fn test_in_progress_without_urls() {
        let task: TaskResponse = serde_json::from_value(json!({
            "status": "IN_PROGRESS",
            "progress": 37,
            "model_urls": {}
        }))
        .unwrap();

        let status = ProviderStatus::from(task);
        assert_eq!(status.status, TaskStatus::Generating);
        assert_eq!(status.progress, 37);
        assert_eq!(status.model_urls, None);
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let adapter = MeshyAdapter::new(Client::new(), None);
        let err = adapter
            .submit_text("a robot", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(ref m) if m == "MESHY_API_KEY not configured"));
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_network() {
        let adapter = MeshyAdapter::new(Client::new(), Some("key".to_string()));
        let err = adapter
            .submit_text("  ", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
