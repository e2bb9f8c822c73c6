//! Service modules for 3D generation
//!
//! - `converter`: GLB to FBX/OBJ through the `assimp` CLI
//! - `fetcher`: download of provider-hosted result files
//! - `materializer`: copying results into local storage exactly once
//! - `orchestrator`: submit / poll / download flow
//! - `prompt_enhancer`: OpenRouter prompt rewriting
//! - `publisher`: Roblox Open Cloud upload

pub mod converter;
pub mod fetcher;
pub mod materializer;
pub mod orchestrator;
pub mod prompt_enhancer;
pub mod publisher;

pub use converter::{AssimpConverter, ConversionError, FormatConverter};
pub use fetcher::{FetchError, FetchedFile, HttpFetcher, RemoteFetcher};
pub use materializer::{MaterializedPaths, Materializer};
pub use orchestrator::{
    ImageRequest, ModelFile, Orchestrator, OrchestratorError, StatusReport, SubmitResult,
    TextRequest,
};
pub use prompt_enhancer::{EnhanceError, EnhancedPrompt, PromptEnhancer, PromptKind};
pub use publisher::{PublishError, PublishRequest, RobloxPublisher};
