//! Provider adapters
//!
//! One adapter per external 3D generation service. Each adapter hides its
//! provider's request encoding (JSON, multipart, upload-then-reference) and
//! status vocabulary behind [`ProviderAdapter`], so the orchestrator only sees
//! canonical [`TaskStatus`] values and [`ModelUrls`].
//!
//! Adapters never swallow errors: every failure is returned as a
//! [`ProviderError`] carrying enough information for the HTTP layer to pick
//! a status code.

pub mod meshy;
pub mod replicate;
pub mod rodin;
pub mod tripo;

use async_trait::async_trait;
use base64::Engine;
use forge_common::config::Credentials;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ModelFormat, ProviderKind};

pub use meshy::MeshyAdapter;
pub use replicate::ReplicateAdapter;
pub use rodin::RodinAdapter;
pub use tripo::TripoAdapter;

/// Timeout applied to every provider request
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Image types accepted for image-to-3D
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

// ============================================================================
// Errors
// ============================================================================

/// Failures reported by provider adapters
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Malformed or missing input (400)
    #[error("{0}")]
    Validation(String),

    /// Credential not configured (503)
    #[error("{0}")]
    Configuration(String),

    /// Provider answered with a non-success status
    #[error("{message}")]
    Upstream {
        message: String,
        status: u16,
        body: String,
    },

    /// Operation not offered by this provider (400)
    #[error("{0}")]
    Capability(String),

    /// Request never reached the provider or the connection failed (502)
    #[error("{0}")]
    Network(String),

    /// Provider response could not be decoded (502)
    #[error("{0}")]
    Parse(String),
}

impl ProviderError {
    fn missing_credential(env_var: &str) -> Self {
        ProviderError::Configuration(format!("{} not configured", env_var))
    }
}

/// Turn a non-success response into [`ProviderError::Upstream`]
pub(crate) async fn upstream_error(context: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProviderError::Upstream {
        message: format!("{}: {}", context, status),
        status,
        body,
    }
}

pub(crate) fn network_error(context: &str, err: reqwest::Error) -> ProviderError {
    ProviderError::Network(format!("{}: {}", context, err))
}

pub(crate) fn parse_error(context: &str, err: reqwest::Error) -> ProviderError {
    ProviderError::Parse(format!("{}: {}", context, err))
}

// ============================================================================
// Common contract types
// ============================================================================

/// Canonical task state shared by all providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Waiting,
    Generating,
    Ready,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Error)
    }

    /// Coarse percentage for providers without native progress
    ///
    /// Only three points exist (0/50/100); intermediate values are never
    /// interpolated, so these numbers are not comparable with native
    /// percentages.
    pub fn coarse_progress(self) -> u8 {
        match self {
            TaskStatus::Waiting | TaskStatus::Error => 0,
            TaskStatus::Generating => 50,
            TaskStatus::Ready => 100,
        }
    }
}

/// Result model URLs keyed by format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUrls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obj: Option<String>,
}

impl ModelUrls {
    pub fn get(&self, format: ModelFormat) -> Option<&str> {
        match format {
            ModelFormat::Glb => self.glb.as_deref(),
            ModelFormat::Fbx => self.fbx.as_deref(),
            ModelFormat::Obj => self.obj.as_deref(),
        }
    }

    pub fn set(&mut self, format: ModelFormat, url: String) {
        match format {
            ModelFormat::Glb => self.glb = Some(url),
            ModelFormat::Fbx => self.fbx = Some(url),
            ModelFormat::Obj => self.obj = Some(url),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.glb.is_none() && self.fbx.is_none() && self.obj.is_none()
    }
}

/// Named result artifacts from a separate listing call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultUrls {
    pub models: ModelUrls,
    pub thumbnail: Option<String>,
}

/// Normalized status of one provider task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub status: TaskStatus,
    /// 0-100; see [`TaskStatus::coarse_progress`] for providers without native progress
    pub progress: u8,
    pub model_urls: Option<ModelUrls>,
    pub thumbnail_url: Option<String>,
}

impl ProviderStatus {
    /// Status with no results yet
    pub fn pending(status: TaskStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            model_urls: None,
            thumbnail_url: None,
        }
    }
}

/// Identity of a submitted task, as re-supplied by the client on every poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub task_id: String,
    /// Secondary polling token (rodin only)
    pub subscription_key: Option<String>,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>, subscription_key: Option<String>) -> Self {
        Self {
            task_id: task_id.into(),
            subscription_key: subscription_key.filter(|k| !k.is_empty()),
        }
    }

    /// Token to poll with: subscription key when present, else the task id
    pub fn polling_key(&self) -> &str {
        self.subscription_key.as_deref().unwrap_or(&self.task_id)
    }
}

/// Successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub task_id: String,
    pub subscription_key: Option<String>,
}

/// Optional generation parameters; each adapter reads the ones it understands
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub negative_prompt: Option<String>,
    /// Quality tier (rodin)
    pub tier: Option<String>,
    /// Requested geometry format (rodin)
    pub format: Option<String>,
    pub quality: Option<String>,
    /// Mesh topology (meshy)
    pub topology: Option<String>,
    pub target_polycount: Option<u32>,
}

/// Uploaded reference image
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime: String,
}

impl ImageInput {
    /// Reject empty uploads and unsupported MIME types
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.bytes.is_empty() {
            return Err(ProviderError::Validation("image is required".to_string()));
        }
        if !ALLOWED_IMAGE_TYPES.contains(&self.mime.as_str()) {
            return Err(ProviderError::Validation(format!(
                "unsupported image type: {}. use {}",
                self.mime,
                ALLOWED_IMAGE_TYPES.join(", ")
            )));
        }
        Ok(())
    }

    /// Inline `data:` URL for providers that take an image URL
    pub fn data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime, encoded)
    }
}

/// Trim a prompt, rejecting empty ones
pub(crate) fn require_prompt(prompt: &str) -> Result<&str, ProviderError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Validation("prompt is required".to_string()));
    }
    Ok(trimmed)
}

// ============================================================================
// Adapter trait
// ============================================================================

/// Uniform contract over one external 3D generation service
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Submit a text-to-3D job
    async fn submit_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Submission, ProviderError>;

    /// Submit an image-to-3D job
    async fn submit_image(
        &self,
        image: &ImageInput,
        options: &GenerationOptions,
    ) -> Result<Submission, ProviderError>;

    /// Poll the job and normalize the answer
    ///
    /// Unrecognized native states come back as [`TaskStatus::Waiting`].
    async fn get_status(&self, handle: &TaskHandle) -> Result<ProviderStatus, ProviderError>;

    /// Whether [`get_status`](Self::get_status) embeds result URLs
    ///
    /// Providers returning `false` need [`get_result_urls`](Self::get_result_urls)
    /// once the task is ready.
    fn status_embeds_urls(&self) -> bool {
        true
    }

    /// List result artifacts in a second round-trip
    async fn get_result_urls(&self, _handle: &TaskHandle) -> Result<ResultUrls, ProviderError> {
        Err(ProviderError::Capability(format!(
            "{} reports result urls in its status response",
            self.kind()
        )))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Enum-keyed adapter lookup, built once at startup
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the four production adapters from configured credentials
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to create http client: {}", e)))?;

        Ok(Self::new()
            .with_adapter(Arc::new(MeshyAdapter::new(client.clone(), credentials.meshy.clone())))
            .with_adapter(Arc::new(TripoAdapter::new(client.clone(), credentials.tripo.clone())))
            .with_adapter(Arc::new(RodinAdapter::new(client.clone(), credentials.rodin.clone())))
            .with_adapter(Arc::new(ReplicateAdapter::new(
                client,
                credentials.replicate.clone(),
            ))))
    }

    /// Register (or replace) the adapter for its provider
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.adapters.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        write!(f, "ProviderRegistry({})", kinds.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(mime: &str, bytes: &[u8]) -> ImageInput {
        ImageInput {
            bytes: bytes.to_vec(),
            filename: "ref.png".to_string(),
            mime: mime.to_string(),
        }
    }

    #[test]
    fn test_image_validation() {
        assert!(image("image/png", b"png").validate().is_ok());
        assert!(image("image/webp", b"webp").validate().is_ok());
        assert!(matches!(
            image("image/gif", b"gif").validate(),
            Err(ProviderError::Validation(_))
        ));
        assert!(matches!(
            image("image/png", b"").validate(),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn test_data_url() {
        assert_eq!(image("image/png", b"abc").data_url(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_polling_key_prefers_subscription_key() {
        let handle = TaskHandle::new("uuid-1", Some("sub-1".to_string()));
        assert_eq!(handle.polling_key(), "sub-1");

        let handle = TaskHandle::new("uuid-1", Some(String::new()));
        assert_eq!(handle.polling_key(), "uuid-1");
        assert_eq!(handle.subscription_key, None);
    }

    #[test]
    fn test_coarse_progress() {
        assert_eq!(TaskStatus::Waiting.coarse_progress(), 0);
        assert_eq!(TaskStatus::Generating.coarse_progress(), 50);
        assert_eq!(TaskStatus::Ready.coarse_progress(), 100);
    }

    #[test]
    fn test_require_prompt() {
        assert_eq!(require_prompt("  a chair ").unwrap(), "a chair");
        assert!(matches!(require_prompt("   "), Err(ProviderError::Validation(_))));
    }

    #[test]
    fn test_registry_from_credentials_has_every_provider() {
        let registry = ProviderRegistry::from_credentials(&Credentials::default()).unwrap();
        for kind in ProviderKind::ALL {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }
}
