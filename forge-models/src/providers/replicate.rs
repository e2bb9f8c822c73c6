//! Replicate adapter (TRELLIS image-to-3D)
//!
//! Only image-to-3D exists on this provider. The image is sent inline as a
//! data URL inside a prediction request pinned to a fixed model version.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    network_error, parse_error, upstream_error, GenerationOptions, ImageInput, ModelUrls,
    ProviderAdapter, ProviderError, ProviderStatus, Submission, TaskHandle, TaskStatus,
};
use crate::models::ProviderKind;

const REPLICATE_API_URL: &str = "https://api.replicate.com/v1";

/// Pinned TRELLIS model version
const TRELLIS_VERSION: &str = "e8f6c45206993f297372f5436b90350817bd9b4a0d52d2a76df50c1c8afa2b3c";

/// Map Replicate's prediction vocabulary onto canonical states
pub fn normalize_status(native: &str) -> TaskStatus {
    match native {
        "starting" => TaskStatus::Waiting,
        "processing" => TaskStatus::Generating,
        "succeeded" => TaskStatus::Ready,
        "failed" | "canceled" => TaskStatus::Error,
        _ => TaskStatus::Waiting,
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Option<PredictionOutput>,
}

#[derive(Debug, Deserialize)]
struct PredictionOutput {
    #[serde(default)]
    model_file: Option<String>,
    #[serde(default)]
    color_video: Option<String>,
}

impl From<Prediction> for ProviderStatus {
    fn from(prediction: Prediction) -> Self {
        let status = normalize_status(&prediction.status);
        let (model_urls, thumbnail_url) = match prediction.output {
            Some(output) => (
                output.model_file.map(|glb| ModelUrls {
                    glb: Some(glb),
                    ..ModelUrls::default()
                }),
                output.color_video,
            ),
            None => (None, None),
        };

        ProviderStatus {
            status,
            progress: status.coarse_progress(),
            model_urls,
            thumbnail_url,
        }
    }
}

/// TRELLIS input with the tuned sampling parameters
fn prediction_body(image_url: String) -> serde_json::Value {
    json!({
        "version": TRELLIS_VERSION,
        "input": {
            "images": [image_url],
            "generate_model": true,
            "generate_color": true,
            "generate_normal": false,
            "save_gaussian_ply": false,
            "mesh_simplify": 0.95,
            "texture_size": 1024,
            "ss_sampling_steps": 12,
            "ss_guidance_strength": 7.5,
            "slat_sampling_steps": 12,
            "slat_guidance_strength": 3,
            "randomize_seed": true,
        }
    })
}

/// Replicate prediction client
pub struct ReplicateAdapter {
    http_client: Client,
    api_key: Option<String>,
}

impl ReplicateAdapter {
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
            .ok_or_else(|| ProviderError::missing_credential("REPLICATE_API_KEY"))?;
        Ok(request.bearer_auth(api_key))
    }
}

#[async_trait]
impl ProviderAdapter for ReplicateAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Replicate
    }

    async fn submit_text(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        Err(ProviderError::Capability(
            "replicate/trellis only supports image-to-3d mode".to_string(),
        ))
    }

    async fn submit_image(
        &self,
        image: &ImageInput,
        _options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        image.validate()?;

        let response = self
            .authorize(
                self.http_client
                    .post(format!("{}/predictions", REPLICATE_API_URL)),
            )?
            .json(&prediction_body(image.data_url()))
            .send()
            .await
            .map_err(|e| network_error("replicate api request failed", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("replicate api error", response).await);
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| parse_error("failed to parse replicate response", e))?;

        debug!(task_id = %prediction.id, "Replicate prediction created");

        Ok(Submission {
            task_id: prediction.id,
            subscription_key: None,
        })
    }

    async fn get_status(&self, handle: &TaskHandle) -> Result<ProviderStatus, ProviderError> {
        let response = self
            .authorize(self.http_client.get(format!(
                "{}/predictions/{}",
                REPLICATE_API_URL, handle.task_id
            )))?
            .send()
            .await
            .map_err(|e| network_error("replicate status request failed", e))?;

        if !response.status().is_success() {
            return Err(upstream_error("replicate status error", response).await);
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| parse_error("failed to parse replicate status", e))?;
        Ok(prediction.into())
    }
}
