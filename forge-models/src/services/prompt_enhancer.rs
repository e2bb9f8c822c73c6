//! Prompt enhancement through OpenRouter
//!
//! One chat-completion turn rewrites a rough idea into a generation-ready
//! prompt. The system prompt depends on what the prompt is for (3D model or
//! sound effect) and, for models, on the target provider.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";
const ENHANCE_MODEL: &str = "google/gemini-2.5-pro";
const TEMPERATURE: f64 = 0.7;

/// Prompt enhancement errors
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("{0}")]
    Validation(String),

    #[error("OPENROUTER_API_KEY not configured")]
    Configuration,

    #[error("{message}")]
    Upstream {
        message: String,
        status: u16,
        body: String,
    },

    #[error("openrouter request failed: {0}")]
    Network(String),

    /// Completion came back without text
    #[error("no response from openrouter")]
    EmptyResponse,
}

/// What the enhanced prompt will be used for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    #[default]
    Model,
    Audio,
}

impl PromptKind {
    /// Unknown kinds fall back to `Model`
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("audio") => PromptKind::Audio,
            _ => PromptKind::Model,
        }
    }
}

/// Build the system message for a prompt kind
pub fn system_prompt(kind: PromptKind, provider: Option<&str>) -> String {
    match kind {
        PromptKind::Model => {
            let provider_line = provider
                .filter(|p| !p.is_empty())
                .map(|p| format!("- Optimize wording for {} as the target provider.\n", p))
                .unwrap_or_default();
            format!(
                "You are a senior 3D model prompt engineer. Transform a rough user idea into a polished, production-ready prompt for AI 3D generation.\n\n\
                 Requirements:\n\
                 - Be thorough, specific, and coherent.\n\
                 - Include physical form, materials, texture detail, scale, and visual style.\n\
                 - Include model-readiness details useful for game/real-time use (clean topology, UV-ready surfaces, consistent proportions).\n\
                 - Keep it practical and directly usable by text-to-3D providers.\n\
                 {}\
                 - Return one complete prompt in 2-4 well-written sentences.\n\
                 - End on a complete sentence.\n\n\
                 Output ONLY the final enhanced prompt text. No bullets, labels, markdown, or explanation.",
                provider_line
            )
        }
        PromptKind::Audio => "You are a senior sound design prompt engineer for AI audio generation (ElevenLabs SFX). Transform a rough user idea into a polished, production-ready sound prompt.\n\n\
             Requirements:\n\
             - Be thorough, specific, and coherent.\n\
             - Include tone/timbre, envelope (attack/sustain/decay), intensity, environment, and perspective.\n\
             - Keep it practical and directly usable by an SFX generator.\n\
             - Return one complete prompt in 2-3 well-written sentences.\n\
             - End on a complete sentence.\n\n\
             Output ONLY the final enhanced prompt text. No bullets, labels, markdown, or explanation."
            .to_string(),
    }
}

/// Enhanced prompt plus the model's accounting
#[derive(Debug, Clone, Serialize)]
pub struct EnhancedPrompt {
    pub enhanced: String,
    pub model: Option<String>,
    pub usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter chat-completion client
pub struct PromptEnhancer {
    http_client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl PromptEnhancer {
    pub fn new(http_client: Client, api_key: Option<String>) -> Self {
        Self {
            http_client,
            api_key,
            base_url: OPENROUTER_API_URL.to_string(),
        }
    }

    /// Point the client at a different OpenRouter-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn enhance(
        &self,
        prompt: &str,
        provider: Option<&str>,
        kind: PromptKind,
    ) -> Result<EnhancedPrompt, EnhanceError> {
        let api_key = self.api_key.as_deref().ok_or(EnhanceError::Configuration)?;

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EnhanceError::Validation("prompt is required".to_string()));
        }

        debug!(kind = ?kind, provider = ?provider, "Enhancing prompt");

        let body = json!({
            "model": ENHANCE_MODEL,
            "messages": [
                { "role": "system", "content": system_prompt(kind, provider) },
                {
                    "role": "user",
                    "content": format!(
                        "Original prompt: {}\n\nRewrite this into a polished final prompt that is ready to paste and use.",
                        prompt
                    )
                }
            ],
            "temperature": TEMPERATURE,
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnhanceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EnhanceError::Upstream {
                message: format!("openrouter api error: {}", status),
                status,
                body,
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| EnhanceError::Network(format!("invalid response: {}", e)))?;

        let enhanced = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(EnhanceError::EmptyResponse)?;

        info!(
            model = ?completion.model,
            chars = enhanced.chars().count(),
            "Prompt enhanced"
        );

        Ok(EnhancedPrompt {
            enhanced,
            model: completion.model,
            usage: completion.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_system_prompt_mentions_provider() {
        let prompt = system_prompt(PromptKind::Model, Some("rodin"));
        assert!(prompt.contains("Optimize wording for rodin"));
        assert!(!system_prompt(PromptKind::Model, None).contains("Optimize wording"));
        assert!(system_prompt(PromptKind::Audio, Some("rodin")).contains("SFX"));
    }

    #[test]
    fn test_prompt_kind_parse() {
        assert_eq!(PromptKind::parse(Some("audio")), PromptKind::Audio);
        assert_eq!(PromptKind::parse(Some("video")), PromptKind::Model);
        assert_eq!(PromptKind::parse(None), PromptKind::Model);
    }

    #[tokio::test]
    async fn test_missing_key_checked_first() {
        let enhancer = PromptEnhancer::new(Client::new(), None);
        let err = enhancer.enhance("", None, PromptKind::Model).await.unwrap_err();
        assert!(matches!(err, EnhanceError::Configuration));
    }

    #[tokio::test]
    async fn test_enhance_against_local_endpoint() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], ENHANCE_MODEL);
                assert_eq!(body["messages"][0]["role"], "system");
                Json(json!({
                    "model": "google/gemini-2.5-pro",
                    "usage": { "total_tokens": 42 },
                    "choices": [{ "message": { "content": "  A weathered bronze lantern.  " } }]
                }))
            }),
        );
        let base_url = serve(router).await;

        let enhancer =
            PromptEnhancer::new(Client::new(), Some("sk-or-test".to_string())).with_base_url(base_url);
        let result = enhancer
            .enhance("lantern", Some("meshy"), PromptKind::Model)
            .await
            .unwrap();

        assert_eq!(result.enhanced, "A weathered bronze lantern.");
        assert_eq!(result.model.as_deref(), Some("google/gemini-2.5-pro"));
        assert_eq!(result.usage.unwrap()["total_tokens"], 42);
    }

    #[tokio::test]
    async fn test_empty_completion() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let base_url = serve(router).await;

        let enhancer =
            PromptEnhancer::new(Client::new(), Some("sk-or-test".to_string())).with_base_url(base_url);
        let err = enhancer
            .enhance("lantern", None, PromptKind::Model)
            .await
            .unwrap_err();
        assert!(matches!(err, EnhanceError::EmptyResponse));
    }
}
