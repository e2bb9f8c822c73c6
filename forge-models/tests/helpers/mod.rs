//! Test Helper Utilities
//!
//! Scripted provider adapters, a recording converter and an in-memory
//! fetcher, plus a router wired the same way `main` wires it.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

use forge_models::models::{ModelFormat, ProviderKind};
use forge_models::providers::{
    GenerationOptions, ImageInput, ModelUrls, ProviderAdapter, ProviderError, ProviderRegistry,
    ProviderStatus, ResultUrls, Submission, TaskHandle, TaskStatus,
};
use forge_models::services::{
    ConversionError, FetchError, FetchedFile, FormatConverter, Orchestrator, PromptEnhancer,
    RemoteFetcher, RobloxPublisher,
};
use forge_models::{build_router, AppState};

// ============================================================================
// Provider adapter
// ============================================================================

/// Adapter answering from a scripted status
pub struct MockAdapter {
    kind: ProviderKind,
    task_id: String,
    status: Mutex<ProviderStatus>,
    embeds_urls: bool,
    result_urls: Mutex<ResultUrls>,
    pub prompts: Mutex<Vec<String>>,
    pub status_calls: AtomicUsize,
    pub result_url_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(kind: ProviderKind, task_id: &str) -> Self {
        Self {
            kind,
            task_id: task_id.to_string(),
            status: Mutex::new(ProviderStatus::pending(TaskStatus::Generating, 50)),
            embeds_urls: true,
            result_urls: Mutex::new(ResultUrls::default()),
            prompts: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            result_url_calls: AtomicUsize::new(0),
        }
    }

    /// Rodin-style adapter: status carries no URLs
    pub fn listing(kind: ProviderKind, task_id: &str) -> Self {
        Self {
            embeds_urls: false,
            ..Self::new(kind, task_id)
        }
    }

    pub fn set_status(&self, status: ProviderStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_result_urls(&self, urls: ResultUrls) {
        *self.result_urls.lock().unwrap() = urls;
    }

    pub fn submitted_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn submit_text(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(Submission {
            task_id: self.task_id.clone(),
            subscription_key: None,
        })
    }

    async fn submit_image(
        &self,
        image: &ImageInput,
        _options: &GenerationOptions,
    ) -> Result<Submission, ProviderError> {
        image.validate()?;
        Ok(Submission {
            task_id: self.task_id.clone(),
            subscription_key: None,
        })
    }

    async fn get_status(&self, _handle: &TaskHandle) -> Result<ProviderStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().unwrap().clone())
    }

    fn status_embeds_urls(&self) -> bool {
        self.embeds_urls
    }

    async fn get_result_urls(&self, _handle: &TaskHandle) -> Result<ResultUrls, ProviderError> {
        self.result_url_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result_urls.lock().unwrap().clone())
    }
}

/// Ready status with embedded GLB and thumbnail URLs
pub fn ready_with_urls(glb: &str, thumbnail: &str) -> ProviderStatus {
    ProviderStatus {
        status: TaskStatus::Ready,
        progress: 100,
        model_urls: Some(ModelUrls {
            glb: Some(glb.to_string()),
            ..ModelUrls::default()
        }),
        thumbnail_url: Some(thumbnail.to_string()),
    }
}

// ============================================================================
// Converter
// ============================================================================

/// Converter recording every call; output is `converted:<to>`
pub struct MockConverter {
    available: bool,
    calls: Mutex<Vec<(ModelFormat, ModelFormat)>>,
}

impl MockConverter {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(ModelFormat, ModelFormat)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FormatConverter for MockConverter {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn convert(
        &self,
        _input: &[u8],
        from: ModelFormat,
        to: ModelFormat,
    ) -> Result<Vec<u8>, ConversionError> {
        self.calls.lock().unwrap().push((from, to));
        if !self.available {
            return Err(ConversionError::Unavailable);
        }
        Ok(format!("converted:{}", to).into_bytes())
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Serves registered URLs from memory and counts requests per URL
#[derive(Default)]
pub struct MockFetcher {
    files: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, bytes: &[u8], content_type: Option<&str>) {
        self.files.lock().unwrap().insert(
            url.to_string(),
            (bytes.to_vec(), content_type.map(str::to_string)),
        );
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

#[async_trait]
impl RemoteFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFile, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.files.lock().unwrap().get(url) {
            Some((bytes, content_type)) => Ok(FetchedFile {
                bytes: bytes.clone(),
                content_type: content_type.clone(),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

// ============================================================================
// Application
// ============================================================================

/// Router plus handles on everything the tests inspect
pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub storage: TempDir,
    pub converter: Arc<MockConverter>,
    pub fetcher: Arc<MockFetcher>,
}

/// Single-connection in-memory database with the schema applied
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    forge_common::db::create_tables(&pool).await.unwrap();
    pool
}

pub async fn create_test_app(adapters: Vec<Arc<MockAdapter>>) -> TestApp {
    create_test_app_with_converter(adapters, MockConverter::new(true)).await
}

pub async fn create_test_app_with_converter(
    adapters: Vec<Arc<MockAdapter>>,
    converter: MockConverter,
) -> TestApp {
    let pool = create_test_pool().await;
    let storage = TempDir::new().unwrap();
    let converter = Arc::new(converter);
    let fetcher = Arc::new(MockFetcher::new());

    let registry = adapters
        .into_iter()
        .fold(ProviderRegistry::new(), |registry, adapter| {
            registry.with_adapter(adapter)
        });

    let orchestrator = Orchestrator::new(
        pool.clone(),
        registry,
        converter.clone(),
        fetcher.clone(),
        storage.path(),
    );
    let client = reqwest::Client::new();
    let enhancer = PromptEnhancer::new(client.clone(), None);
    let publisher = RobloxPublisher::new(client, None, fetcher.clone(), storage.path());

    let state = AppState::new(pool.clone(), orchestrator, enhancer, publisher, storage.path());

    TestApp {
        app: build_router(state),
        pool,
        storage,
        converter,
        fetcher,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

// ============================================================================
// Bodies
// ============================================================================

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Hand-built multipart body
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "forge-test-boundary".to_string(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, mime: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, file_name, mime
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}
