//! Generation orchestrator
//!
//! Composes the provider adapters, the asset store, local materialization and
//! the format converter into the submit / poll / download flow:
//!
//! ```text
//! submit ──► adapter.submit_* ──► insert record (generating)
//! poll   ──► adapter.get_status ──► ready?  ──► result urls ──► materialize ──► record (ready)
//!                                └► error?  ──► record (error)
//! download ──► local GLB | native URL | GLB + convert
//! ```
//!
//! The server keeps no per-task state: every poll re-supplies the provider,
//! task id and (for rodin) subscription key. No retries are attempted; a
//! failed task stays failed.

use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::converter::{parse_output_format, ConversionError, FormatConverter};
use super::fetcher::RemoteFetcher;
use super::materializer::{local_file, Materializer};
use crate::db::{assets, conversions, is_local_path, AssetUpdate};
use crate::models::{
    AssetRecord, AssetStatus, ConversionRecord, ModelFormat, NewAsset, ProviderKind,
};
use crate::providers::{
    GenerationOptions, ImageInput, ModelUrls, ProviderAdapter, ProviderError, ProviderRegistry,
    ProviderStatus, TaskHandle, TaskStatus,
};

/// Records returned by the history endpoints
pub const HISTORY_LIMIT: u32 = 50;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Store(#[from] forge_common::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// A provider-hosted file could not be downloaded
    #[error("{0}")]
    BadGateway(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

// ============================================================================
// Requests and responses
// ============================================================================

/// Text-to-3D submission
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub provider: ProviderKind,
    pub prompt: String,
    /// Sent to the provider in place of `prompt` when present
    pub enhanced_prompt: Option<String>,
    pub options: GenerationOptions,
}

/// Image-to-3D submission
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub provider: ProviderKind,
    pub image: ImageInput,
    pub options: GenerationOptions,
}

/// Returned to the client, which holds it for polling
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub task_id: String,
    pub subscription_key: Option<String>,
    pub asset_id: Uuid,
    pub provider: ProviderKind,
}

/// Normalized poll answer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub model_urls: Option<ModelUrls>,
    pub thumbnail_url: Option<String>,
}

/// Model bytes ready to send to the client
#[derive(Debug, Clone)]
pub struct ModelFile {
    pub bytes: Vec<u8>,
    pub format: ModelFormat,
    pub file_name: String,
}

impl ModelFile {
    fn named(bytes: Vec<u8>, stem: &str, format: ModelFormat) -> Self {
        Self {
            bytes,
            format,
            file_name: format!("{}.{}", stem, format.extension()),
        }
    }
}

fn option_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    db: SqlitePool,
    providers: ProviderRegistry,
    converter: Arc<dyn FormatConverter>,
    fetcher: Arc<dyn RemoteFetcher>,
    materializer: Materializer,
}

impl Orchestrator {
    pub fn new(
        db: SqlitePool,
        providers: ProviderRegistry,
        converter: Arc<dyn FormatConverter>,
        fetcher: Arc<dyn RemoteFetcher>,
        storage_dir: &Path,
    ) -> Self {
        let materializer = Materializer::new(storage_dir, Arc::clone(&fetcher));
        Self {
            db,
            providers,
            converter,
            fetcher,
            materializer,
        }
    }

    pub fn converter(&self) -> &Arc<dyn FormatConverter> {
        &self.converter
    }

    fn adapter(&self, provider: ProviderKind) -> Result<Arc<dyn ProviderAdapter>> {
        self.providers.get(provider).ok_or_else(|| {
            OrchestratorError::Provider(ProviderError::Configuration(format!(
                "{} provider is not available",
                provider
            )))
        })
    }

    // ------------------------------------------------------------------------
    // Submit
    // ------------------------------------------------------------------------

    /// Submit a text-to-3D job and record it
    ///
    /// Nothing is stored when the provider rejects the job.
    pub async fn submit_text(&self, request: TextRequest) -> Result<SubmitResult> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(OrchestratorError::Validation("prompt is required".to_string()));
        }

        let adapter = self.adapter(request.provider)?;
        let enhanced = option_text(request.enhanced_prompt.as_deref());
        let effective_prompt = enhanced.as_deref().unwrap_or(prompt);

        let submission = adapter
            .submit_text(effective_prompt, &request.options)
            .await?;

        let record = AssetRecord::from_new(NewAsset {
            name: NewAsset::name_from(prompt),
            prompt: prompt.to_string(),
            enhanced_prompt: enhanced,
            provider: request.provider,
            provider_task_id: submission.task_id.clone(),
            tags: vec![format!("provider:{}", request.provider)],
        });
        assets::insert_asset(&self.db, &record).await?;

        info!(
            provider = %request.provider,
            task_id = %submission.task_id,
            asset_id = %record.id,
            "Text-to-3D task submitted"
        );

        Ok(SubmitResult {
            task_id: submission.task_id,
            subscription_key: submission.subscription_key,
            asset_id: record.id,
            provider: request.provider,
        })
    }

    /// Submit an image-to-3D job and record it
    pub async fn submit_image(&self, request: ImageRequest) -> Result<SubmitResult> {
        let adapter = self.adapter(request.provider)?;

        let submission = adapter
            .submit_image(&request.image, &request.options)
            .await?;

        let file_name = request.image.filename.as_str();
        let record = AssetRecord::from_new(NewAsset {
            name: NewAsset::name_from(file_name),
            prompt: format!("image-to-3d: {}", file_name),
            enhanced_prompt: None,
            provider: request.provider,
            provider_task_id: submission.task_id.clone(),
            tags: vec![
                format!("provider:{}", request.provider),
                "image-to-3d".to_string(),
            ],
        });
        assets::insert_asset(&self.db, &record).await?;

        info!(
            provider = %request.provider,
            task_id = %submission.task_id,
            asset_id = %record.id,
            image = %file_name,
            "Image-to-3D task submitted"
        );

        Ok(SubmitResult {
            task_id: submission.task_id,
            subscription_key: submission.subscription_key,
            asset_id: record.id,
            provider: request.provider,
        })
    }

    // ------------------------------------------------------------------------
    // Poll
    // ------------------------------------------------------------------------

    /// Poll the provider and advance the stored record on terminal states
    pub async fn poll_status(
        &self,
        provider: ProviderKind,
        handle: &TaskHandle,
    ) -> Result<StatusReport> {
        let adapter = self.adapter(provider)?;
        let status = adapter.get_status(handle).await?;

        debug!(
            provider = %provider,
            task_id = %handle.task_id,
            status = ?status.status,
            progress = status.progress,
            "Polled provider"
        );

        let mut report = StatusReport {
            task_id: handle.task_id.clone(),
            status: status.status,
            progress: status.progress,
            model_urls: None,
            thumbnail_url: None,
        };

        match status.status {
            TaskStatus::Ready => {
                let (model_urls, thumbnail_url) =
                    self.complete(adapter.as_ref(), handle, status).await?;
                report.model_urls = model_urls;
                report.thumbnail_url = thumbnail_url;
            }
            TaskStatus::Error => {
                let touched = assets::update_by_task_id(
                    &self.db,
                    &handle.task_id,
                    &AssetUpdate::status(AssetStatus::Error),
                )
                .await?;
                warn!(
                    provider = %provider,
                    task_id = %handle.task_id,
                    records = touched,
                    "Generation failed"
                );
            }
            TaskStatus::Waiting | TaskStatus::Generating => {
                report.model_urls = status.model_urls;
                report.thumbnail_url = status.thumbnail_url;
            }
        }

        Ok(report)
    }

    /// Handle a `ready` poll: materialize results once, then report local paths
    async fn complete(
        &self,
        adapter: &dyn ProviderAdapter,
        handle: &TaskHandle,
        status: ProviderStatus,
    ) -> Result<(Option<ModelUrls>, Option<String>)> {
        let record = assets::find_by_task_id(&self.db, &handle.task_id).await?;

        // Once the model is local, a poll never lists, downloads or writes files
        if let Some(record) = &record {
            if is_local_path(&record.file_path) {
                debug!(task_id = %handle.task_id, "Model already in local storage");
                if record.status != AssetStatus::Ready {
                    assets::update_by_task_id(
                        &self.db,
                        &handle.task_id,
                        &AssetUpdate::status(AssetStatus::Ready),
                    )
                    .await?;
                }
                let urls = ModelUrls {
                    glb: Some(record.file_path.clone()),
                    ..ModelUrls::default()
                };
                let thumbnail = Some(record.thumbnail_path.clone())
                    .filter(|path| !path.is_empty())
                    .or(status.thumbnail_url);
                return Ok((Some(urls), thumbnail));
            }
        }

        let (mut model_urls, mut thumbnail_url) = if adapter.status_embeds_urls() {
            (status.model_urls, status.thumbnail_url)
        } else {
            let results = adapter.get_result_urls(handle).await?;
            (
                Some(results.models).filter(|urls| !urls.is_empty()),
                results.thumbnail,
            )
        };

        let Some(record) = record else {
            debug!(task_id = %handle.task_id, "No stored record for task, returning provider urls");
            return Ok((model_urls, thumbnail_url));
        };

        let paths = self
            .materializer
            .materialize(
                &handle.task_id,
                &record.file_path,
                &record.thumbnail_path,
                model_urls.as_ref().and_then(|urls| urls.glb.as_deref()),
                thumbnail_url.as_deref(),
            )
            .await;

        assets::update_by_task_id(
            &self.db,
            &handle.task_id,
            &AssetUpdate {
                status: AssetStatus::Ready,
                file_path: paths.file_path.clone(),
                thumbnail_path: paths.thumbnail_path.clone(),
            },
        )
        .await?;

        let local_model = paths
            .file_path
            .or_else(|| Some(record.file_path.clone()))
            .filter(|path| is_local_path(path));
        if let Some(local) = local_model {
            model_urls.get_or_insert_with(ModelUrls::default).glb = Some(local);
        }

        let local_thumbnail = paths
            .thumbnail_path
            .or_else(|| Some(record.thumbnail_path.clone()))
            .filter(|path| is_local_path(path));
        if local_thumbnail.is_some() {
            thumbnail_url = local_thumbnail;
        }

        info!(
            task_id = %handle.task_id,
            asset_id = %record.id,
            "Generation complete"
        );

        Ok((model_urls, thumbnail_url))
    }

    // ------------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------------

    /// Produce the model in `format`
    ///
    /// A materialized GLB is preferred over provider URLs. Formats the
    /// provider emits natively are fetched as-is; the rest are converted from
    /// GLB. With a local GLB, a native format the provider no longer lists
    /// (or serves) is converted from the local copy.
    pub async fn download(
        &self,
        provider: ProviderKind,
        handle: &TaskHandle,
        format: ModelFormat,
    ) -> Result<ModelFile> {
        let record = assets::find_by_task_id(&self.db, &handle.task_id).await?;
        let local_glb = record
            .as_ref()
            .and_then(|r| local_file(self.materializer.storage_dir(), &r.file_path));

        let local_bytes = match local_glb {
            Some(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(
                        task_id = %handle.task_id,
                        path = %path.display(),
                        error = %e,
                        "Local model unreadable, falling back to provider"
                    );
                    None
                }
            },
            None => None,
        };

        if let Some(bytes) = local_bytes {
            if format == ModelFormat::Glb {
                debug!(task_id = %handle.task_id, "Serving local model");
                return Ok(ModelFile::named(bytes, "model", format));
            }
            if !provider.needs_conversion(format) {
                if let Some(native) = self.fetch_native(provider, handle, format).await {
                    return Ok(ModelFile::named(native, "model", format));
                }
            }
            debug!(
                task_id = %handle.task_id,
                format = %format,
                "Converting local model for download"
            );
            let converted = self.converter.convert(&bytes, ModelFormat::Glb, format).await?;
            return Ok(ModelFile::named(converted, "model", format));
        }

        let urls = self.remote_model_urls(provider, handle).await?;

        if !provider.needs_conversion(format) {
            if let Some(url) = urls.get(format) {
                let bytes = self.fetch_model(&handle.task_id, url).await?;
                return Ok(ModelFile::named(bytes, "model", format));
            }
        }

        let glb_url = urls
            .glb
            .as_deref()
            .ok_or_else(|| OrchestratorError::NotFound("model file not found".to_string()))?;
        let glb = self.fetch_model(&handle.task_id, glb_url).await?;
        if format == ModelFormat::Glb {
            return Ok(ModelFile::named(glb, "model", format));
        }

        debug!(
            provider = %provider,
            task_id = %handle.task_id,
            format = %format,
            "Converting provider GLB for download"
        );
        let converted = self.converter.convert(&glb, ModelFormat::Glb, format).await?;
        Ok(ModelFile::named(converted, "model", format))
    }

    /// Native-format bytes from the provider, or `None` when the listing or
    /// the fetch does not produce them
    async fn fetch_native(
        &self,
        provider: ProviderKind,
        handle: &TaskHandle,
        format: ModelFormat,
    ) -> Option<Vec<u8>> {
        let urls = match self.remote_model_urls(provider, handle).await {
            Ok(urls) => urls,
            Err(e) => {
                debug!(task_id = %handle.task_id, error = %e, "Provider listing unavailable");
                return None;
            }
        };
        let url = urls.get(format)?;
        self.fetch_model(&handle.task_id, url).await.ok()
    }

    async fn remote_model_urls(
        &self,
        provider: ProviderKind,
        handle: &TaskHandle,
    ) -> Result<ModelUrls> {
        let adapter = self.adapter(provider)?;
        let urls = if adapter.status_embeds_urls() {
            adapter.get_status(handle).await?.model_urls
        } else {
            Some(adapter.get_result_urls(handle).await?.models)
        };

        urls.filter(|urls| !urls.is_empty())
            .ok_or_else(|| OrchestratorError::NotFound("model not ready yet".to_string()))
    }

    async fn fetch_model(&self, task_id: &str, url: &str) -> Result<Vec<u8>> {
        match self.fetcher.fetch(url).await {
            Ok(fetched) => Ok(fetched.bytes),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Model download from provider failed");
                Err(OrchestratorError::BadGateway(
                    "failed to download from provider".to_string(),
                ))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Standalone conversion and history
    // ------------------------------------------------------------------------

    /// Convert an uploaded model and log it to the conversion history
    pub async fn convert_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        target_format: &str,
    ) -> Result<ModelFile> {
        if bytes.is_empty() {
            return Err(OrchestratorError::Validation("model file is required".to_string()));
        }

        let from = ModelFormat::from_file_name(file_name).ok_or_else(|| {
            OrchestratorError::Validation(format!(
                "unsupported source format: {}. use glb, fbx, or obj",
                file_name
            ))
        })?;
        let to = parse_output_format(target_format)?;
        if from == to {
            return Err(OrchestratorError::Validation(format!(
                "model is already {}",
                to
            )));
        }

        let converted = self.converter.convert(&bytes, from, to).await?;

        let record = ConversionRecord::new(file_name, from, to, bytes.len());
        conversions::insert_conversion(&self.db, &record).await?;

        let stem = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or("model");
        Ok(ModelFile::named(converted, stem, to))
    }

    pub async fn history(&self) -> Result<Vec<AssetRecord>> {
        Ok(assets::list_recent(&self.db, HISTORY_LIMIT).await?)
    }

    pub async fn conversions(&self) -> Result<Vec<ConversionRecord>> {
        Ok(conversions::list_recent(&self.db, HISTORY_LIMIT).await?)
    }
}
