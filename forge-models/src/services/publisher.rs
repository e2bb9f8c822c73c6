//! Publishing models to Roblox Open Cloud
//!
//! The model is fetched from its URL (remote or `/storage/...`) and sent to
//! the asset-creation endpoint as a two-part multipart form: `request` carries
//! the JSON metadata, `fileContent` the model bytes.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::fetcher::RemoteFetcher;
use super::materializer::local_file;
use crate::db::is_local_path;

const ROBLOX_ASSETS_URL: &str = "https://apis.roblox.com/assets/v1/assets";

const DEFAULT_DISPLAY_NAME: &str = "Generated Model";
const DEFAULT_DESCRIPTION: &str = "AI-generated 3D model";

/// Publishing errors
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{0}")]
    Validation(String),

    #[error("ROBLOX_API_KEY not configured")]
    Configuration,

    /// Model file could not be read or downloaded
    #[error("failed to download model file")]
    Fetch(String),

    #[error("{message}")]
    Upstream {
        message: String,
        status: u16,
        body: String,
    },

    #[error("roblox request failed: {0}")]
    Network(String),
}

/// Upload request
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub model_url: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Upload encoding inferred from the model URL
fn upload_kind(model_url: &str) -> (&'static str, &'static str) {
    let lower = model_url.to_ascii_lowercase();
    if lower.contains(".glb") || lower.contains("gltf") {
        ("glb", "model/gltf-binary")
    } else {
        ("fbx", "model/fbx")
    }
}

fn metadata(request: &PublishRequest) -> serde_json::Value {
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    json!({
        "assetType": "Model",
        "displayName": non_empty(&request.name).unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
        "description": non_empty(&request.description).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        "creationContext": { "creator": { "userId": "self" } },
    })
}

/// Roblox Open Cloud asset uploader
pub struct RobloxPublisher {
    http_client: Client,
    api_key: Option<String>,
    fetcher: Arc<dyn RemoteFetcher>,
    storage_dir: PathBuf,
    endpoint: String,
}

impl RobloxPublisher {
    pub fn new(
        http_client: Client,
        api_key: Option<String>,
        fetcher: Arc<dyn RemoteFetcher>,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http_client,
            api_key,
            fetcher,
            storage_dir: storage_dir.into(),
            endpoint: ROBLOX_ASSETS_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn load_model(&self, model_url: &str) -> Result<Vec<u8>, PublishError> {
        if is_local_path(model_url) {
            let path = local_file(&self.storage_dir, model_url)
                .ok_or_else(|| PublishError::Fetch(format!("invalid local path: {}", model_url)))?;
            return tokio::fs::read(&path)
                .await
                .map_err(|e| PublishError::Fetch(e.to_string()));
        }

        self.fetcher
            .fetch(model_url)
            .await
            .map(|fetched| fetched.bytes)
            .map_err(|e| PublishError::Fetch(e.to_string()))
    }

    /// Upload the model; returns Roblox's operation document
    pub async fn publish(&self, request: &PublishRequest) -> Result<serde_json::Value, PublishError> {
        let model_url = request.model_url.trim();
        if model_url.is_empty() {
            return Err(PublishError::Validation("model_url is required".to_string()));
        }
        let api_key = self.api_key.as_deref().ok_or(PublishError::Configuration)?;

        let bytes = self.load_model(model_url).await?;
        let (ext, content_type) = upload_kind(model_url);
        let size = bytes.len();

        let request_part = Part::text(metadata(request).to_string())
            .mime_str("application/json")
            .map_err(|e| PublishError::Network(e.to_string()))?;
        let file_part = Part::bytes(bytes)
            .file_name(format!("model.{}", ext))
            .mime_str(content_type)
            .map_err(|e| PublishError::Network(e.to_string()))?;
        let form = Form::new()
            .part("request", request_part)
            .part("fileContent", file_part);

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Upstream {
                message: format!("roblox upload failed: {}", status),
                status,
                body,
            });
        }

        let operation: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PublishError::Network(format!("invalid response: {}", e)))?;

        info!(bytes = size, format = ext, "Model uploaded to Roblox");

        Ok(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fetcher::{FetchError, FetchedFile};
    use async_trait::async_trait;

    struct NoFetch;

    #[async_trait]
    impl RemoteFetcher for NoFetch {
        async fn fetch(&self, url: &str) -> Result<FetchedFile, FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn publisher(api_key: Option<&str>, storage: &std::path::Path) -> RobloxPublisher {
        RobloxPublisher::new(
            Client::new(),
            api_key.map(str::to_string),
            Arc::new(NoFetch),
            storage,
        )
    }

    #[test]
    fn test_upload_kind() {
        assert_eq!(upload_kind("/storage/models/a.glb"), ("glb", "model/gltf-binary"));
        assert_eq!(upload_kind("https://cdn/a.FBX"), ("fbx", "model/fbx"));
    }

    #[test]
    fn test_metadata_defaults() {
        let value = metadata(&PublishRequest {
            model_url: "x".to_string(),
            name: Some("  ".to_string()),
            description: None,
        });
        assert_eq!(value["displayName"], DEFAULT_DISPLAY_NAME);
        assert_eq!(value["assetType"], "Model");
        assert_eq!(value["creationContext"]["creator"]["userId"], "self");
    }

    #[tokio::test]
    async fn test_model_url_required() {
        let dir = tempfile::tempdir().unwrap();
        let err = publisher(Some("key"), dir.path())
            .publish(&PublishRequest {
                model_url: " ".to_string(),
                name: None,
                description: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "model_url is required");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = publisher(None, dir.path())
            .publish(&PublishRequest {
                model_url: "https://cdn/a.glb".to_string(),
                name: None,
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Configuration));
    }

    #[tokio::test]
    async fn test_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = publisher(Some("key"), dir.path())
            .publish(&PublishRequest {
                model_url: "/storage/models/missing.glb".to_string(),
                name: None,
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_publish_sends_multipart_with_api_key() {
        use axum::{extract::Multipart, http::HeaderMap, routing::post, Json, Router};

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::write(dir.path().join("models/t1.glb"), b"glTF-bytes").unwrap();

        let router = Router::new().route(
            "/assets",
            post(|headers: HeaderMap, mut multipart: Multipart| async move {
                assert_eq!(headers.get("x-api-key").unwrap(), "rbx-key");
                let mut names = Vec::new();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    names.push(field.name().unwrap_or_default().to_string());
                }
                assert_eq!(names, vec!["request", "fileContent"]);
                Json(json!({ "path": "operations/abc", "done": false }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let operation = publisher(Some("rbx-key"), dir.path())
            .with_endpoint(format!("http://{}/assets", addr))
            .publish(&PublishRequest {
                model_url: "/storage/models/t1.glb".to_string(),
                name: Some("Lantern".to_string()),
                description: None,
            })
            .await
            .unwrap();

        assert_eq!(operation["path"], "operations/abc");
    }
}
