//! Rodin (Hyper3D) adapter
//!
//! Submissions are multipart forms. A submission returns the task uuid plus a
//! `subscription_key`; status is polled with the subscription key, and result
//! files are listed by a separate download call keyed by the task uuid.
//!
//! Rodin can emit GLB, FBX or OBJ natively. A download only goes through the
//! converter when the requested format is missing from the listing.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    network_error, parse_error, require_prompt, upstream_error, GenerationOptions, ImageInput,
    ProviderAdapter, ProviderError, ProviderStatus, ResultUrls, Submission, TaskHandle, TaskStatus,
};
use crate::models::{ModelFormat, ProviderKind};

const RODIN_API_URL: &str = "https://api.hyper3d.com/api/v2";

const DEFAULT_TIER: &str = "Regular";
const DEFAULT_FORMAT: &str = "glb";
const DEFAULT_QUALITY: &str = "medium";
const MATERIAL: &str = "PBR";

/// Map Rodin's job vocabulary onto canonical states
pub fn normalize_status(native: &str) -> TaskStatus {
    match native {
        "Waiting" => TaskStatus::Waiting,
        "Generating" => TaskStatus::Generating,
        "Done" => TaskStatus::Ready,
        "Failed" => TaskStatus::Error,
        _ => TaskStatus::Waiting,
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    jobs: Option<SubmitJobs>,
}

#[derive(Debug, Deserialize)]
struct SubmitJobs {
    #[serde(default)]
    subscription_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    list: Vec<DownloadItem>,
}

#[derive(Debug, Deserialize)]
struct DownloadItem {
    name: String,
    url: String,
}

impl From<StatusResponse> for ProviderStatus {
    fn from(response: StatusResponse) -> Self {
        // No jobs yet means the task is still queued
        let status = response
            .jobs
            .first()
            .map(|job| normalize_status(&job.status))
            .unwrap_or(TaskStatus::Waiting);
        ProviderStatus::pending(status, status.coarse_progress())
    }
}

/// Sort a download listing into model formats and a preview image
fn classify_results(items: Vec<DownloadItem>) -> ResultUrls {
    let mut result = ResultUrls::default();
    for item in items {
        let name = item.name.to_ascii_lowercase();
        if let Some(format) = ModelFormat::from_file_name(&name) {
            result.models.set(format, item.url);
        } else if name.ends_with(".webp") || name.ends_with(".png") {
            result.thumbnail = Some(item.url);
        }
    }
    result
}

fn rejection(context: &str, error: String) -> ProviderError {
    ProviderError::Upstream {
        message: format!("{}: {}", context, error),
        status: 400,
        body: error,
    }
}

/// Rodin text/image-to-3D client
pub struct RodinAdapter {
    http_client: Client,
    api_key: Option<String>,
}

impl RodinAdapter {
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
            .ok_or_else(|| ProviderError::missing_credential("RODIN_API_KEY"))?;
        Ok(request.bearer_auth(api_key))
    }

    /// Shared generation parameters appended to every submission form
    fn with_parameters(form: Form, options: &GenerationOptions) -> Form {
        form.text(
            "tier",
            options.tier.clone().unwrap_or_else(|| DEFAULT_TIER.to_string()),
        )
        .text(
            "geometry_file_format",
            options
                .format
                .clone()
                .unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
        )
        .text("material", MATERIAL)
        .text(
            "quality",
            options
                .quality
                .clone()
                .unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
        )
    }

    async fn submit(&self, form: Form, context: &str) -> Result<Submission, ProviderError> {
        // Credential check comes before any form is sent
        let request = self
            .authorize(self.http_client.post(format!("{}/rodin", RODIN_API_URL)))?
            .multipart(form);

        let response = request
            .send()
            .await
            .map_err(|e| network_error("rodin api request failed", e))?;

        if !response.status().is_success() {
            return Err(upstream_error(context, response).await);
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| parse_error("failed to parse rodin response", e))?;

        if let Some(error) = submitted.error {
            return Err(rejection("rodin error", error));
        }

        let task_id = submitted
            .uuid
            .filter(|uuid| !uuid.is_empty())
            .ok_or_else(|| ProviderError::Parse("rodin response missing uuid".to_string()))?;
        let subscription_key = submitted.jobs.and_then(|jobs| jobs.subscription_key);

        debug!(
            task_id = %task_id,
            has_subscription_key = subscription_key.is_some(),
            "Rodin task created"
        );

        Ok(Submission {
            task_id,
            subscription_key,
        })
    }
}

#[async_trait]
impl ProviderAdapter for RodinAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Rodin
    }

    async fn submit_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        let prompt = require_prompt(prompt)?;

        let mut form = Form::new().text("prompt", prompt.to_string());
        if let Some(negative) = options.negative_prompt.as_deref().map(str::trim) {
            if !negative.is_empty() {
                form = form.text("negative_prompt", negative.to_string());
            }
        }

        self.submit(Self::with_parameters(form, options), "rodin api error")
            .await
    }

    async fn submit_image(
        &self,
        image: &ImageInput,
        options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        image.validate()?;

        let part = Part::bytes(image.bytes.clone())
            .file_name(image.filename.clone())
            .mime_str(&image.mime)
            .map_err(|e| ProviderError::Validation(format!("invalid image type: {}", e)))?;
        let form = Form::new().part("images", part);

        self.submit(
            Self::with_parameters(form, options),
            "rodin image-to-3d error",
        )
        .await
    }

    async fn get_status(&self, handle: &TaskHandle) -> Result<ProviderStatus, ProviderError> {
        let response = self
            .authorize(self.http_client.post(format!("{}/status", RODIN_API_URL)))?
            .json(&json!({ "subscription_key": handle.polling_key() }))
            .send()
            .await
            .map_err(|e| network_error("rodin status request failed", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("rodin status error", response).await);
        }

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| parse_error("failed to parse rodin status", e))?;
        Ok(status.into())
    }

    fn status_embeds_urls(&self) -> bool {
        false
    }

    async fn get_result_urls(&self, handle: &TaskHandle) -> Result<ResultUrls, ProviderError> {
        let response = self
            .authorize(self.http_client.post(format!("{}/download", RODIN_API_URL)))?
            .json(&json!({ "task_uuid": handle.task_id }))
            .send()
            .await
            .map_err(|e| network_error("rodin download request failed", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("rodin download error", response).await);
        }

        let listing: DownloadResponse = response
            .json()
            .await
            .map_err(|e| parse_error("failed to parse rodin download listing", e))?;

        if let Some(error) = listing.error {
            return Err(rejection("rodin download error", error));
        }

        Ok(classify_results(listing.list))
    }
}
