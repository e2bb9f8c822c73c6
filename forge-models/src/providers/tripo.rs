//! Tripo3D adapter
//!
//! JSON task API wrapped in a `{code, data}` envelope; a non-zero `code` on a
//! 2xx response is still a rejection. Image-to-3D is two calls: upload the
//! image to get a file token, then create an `image_to_model` task that
//! references it. Tripo has no progress percentage, so progress is the coarse
//! 0/50/100 scale.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    network_error, parse_error, require_prompt, upstream_error, GenerationOptions, ImageInput,
    ModelUrls, ProviderAdapter, ProviderError, ProviderStatus, Submission, TaskHandle, TaskStatus,
};
use crate::models::ProviderKind;

const TRIPO_API_URL: &str = "https://api.tripo3d.ai/v2/openapi";

/// Map Tripo's task vocabulary onto canonical states
pub fn normalize_status(native: &str) -> TaskStatus {
    match native {
        "submitted" => TaskStatus::Waiting,
        "processing" => TaskStatus::Generating,
        "success" => TaskStatus::Ready,
        "failed" => TaskStatus::Error,
        _ => TaskStatus::Waiting,
    }
}

/// `{code, message, data}` envelope around every Tripo response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, context: &str) -> Result<T, ProviderError> {
        if self.code != 0 {
            let message = self.message.unwrap_or_else(|| "unknown".to_string());
            return Err(ProviderError::Upstream {
                message: format!("{}: {}", context, message),
                status: 400,
                body: format!("code {}", self.code),
            });
        }
        self.data
            .ok_or_else(|| ProviderError::Parse(format!("{}: response missing data", context)))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    image_token: String,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Option<TaskOutput>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    pbr_model: Option<String>,
    #[serde(default)]
    rendered_image: Option<String>,
}

impl From<TaskData> for ProviderStatus {
    fn from(task: TaskData) -> Self {
        let status = normalize_status(&task.status);
        let (model_urls, thumbnail_url) = match task.output {
            Some(output) => {
                let glb = output.model.or(output.pbr_model);
                let urls = ModelUrls {
                    glb,
                    ..ModelUrls::default()
                };
                ((!urls.is_empty()).then_some(urls), output.rendered_image)
            }
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

/// Tripo file type for an upload's MIME type
fn file_type(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Tripo3D text/image-to-3D client
pub struct TripoAdapter {
    http_client: Client,
    api_key: Option<String>,
}

impl TripoAdapter {
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
            .ok_or_else(|| ProviderError::missing_credential("TRIPO_API_KEY"))?;
        Ok(request.bearer_auth(api_key))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| network_error(&format!("{} request failed", context), e))?;

        if !response.status().is_success() {
            return Err(upstream_error(context, response).await);
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| parse_error(&format!("failed to parse {} response", context), e))?;
        envelope.into_data(context)
    }

    async fn create_task(&self, body: serde_json::Value) -> Result<Submission, ProviderError> {
        let request = self
            .authorize(self.http_client.post(format!("{}/task", TRIPO_API_URL)))?
            .json(&body);
        let created: CreatedTask = self.send(request, "tripo api error").await?;

        debug!(task_id = %created.task_id, "Tripo task created");

        Ok(Submission {
            task_id: created.task_id,
            subscription_key: None,
        })
    }

    /// Upload an image and return the token used to reference it
    async fn upload_image(&self, image: &ImageInput) -> Result<String, ProviderError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.filename.clone())
            .mime_str(&image.mime)
            .map_err(|e| ProviderError::Validation(format!("invalid image type: {}", e)))?;
        let form = Form::new().part("file", part);

        let request = self
            .authorize(self.http_client.post(format!("{}/upload", TRIPO_API_URL)))?
            .multipart(form);
        let uploaded: UploadedImage = self.send(request, "tripo upload error").await?;
        Ok(uploaded.image_token)
    }
}

#[async_trait]
impl ProviderAdapter for TripoAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tripo
    }

    async fn submit_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        let prompt = require_prompt(prompt)?;

        let mut body = json!({
            "type": "text_to_model",
            "prompt": prompt,
        });
        if let Some(negative) = options.negative_prompt.as_deref().map(str::trim) {
            if !negative.is_empty() {
                body["negative_prompt"] = json!(negative);
            }
        }

        self.create_task(body).await
    }

    async fn submit_image(
        &self,
        image: &ImageInput,
        _options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        image.validate()?;

        let token = self.upload_image(image).await?;
        let body = json!({
            "type": "image_to_model",
            "file": { "type": file_type(&image.mime), "file_token": token },
        });

        self.create_task(body).await
    }

    async fn get_status(&self, handle: &TaskHandle) -> Result<ProviderStatus, ProviderError> {
        let request = self.authorize(
            self.http_client
                .get(format!("{}/task/{}", TRIPO_API_URL, handle.task_id)),
        )?;
        let task: TaskData = self.send(request, "tripo status error").await?;
        Ok(task.into())
    }
}
