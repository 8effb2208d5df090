//! Text model abstraction for the conversational layer
//!
//! The routing logic only needs "prompt in, text out", so everything about
//! transport lives behind [`TextModel`]. Two backends are provided: Ollama's
//! native generate endpoint for local models, and the OpenAI-compatible chat
//! completions shape that hosted providers and most local servers speak.

use crate::config::{ModelConfig, ModelProvider as ProviderKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Model errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Prompt-in, text-out language model.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create a text model from configuration
pub fn create_model(config: ModelConfig) -> Result<Box<dyn TextModel>, ModelError> {
    match config.provider {
        ProviderKind::Ollama => Ok(Box::new(OllamaModel::new(config))),
        ProviderKind::OpenAI => Ok(Box::new(ChatCompletionsModel::new(config)?)),
    }
}

// ============================================================================
// Ollama
// ============================================================================

pub struct OllamaModel {
    config: ModelConfig,
    client: Client,
}

impl OllamaModel {
    pub fn new(config: ModelConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl TextModel for OllamaModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.config.url);

        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::Model(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await?
            )));
        }

        let body: OllamaResponse = response.json().await?;
        Ok(body.response)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

pub struct ChatCompletionsModel {
    config: ModelConfig,
    client: Client,
    api_key: String,
}

impl ChatCompletionsModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| ModelError::Auth("API key not found".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Ok(Self {
            config,
            client,
            api_key,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[async_trait]
impl TextModel for ChatCompletionsModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.config.url);

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Connection(e.to_string()))?;

        if response.status() == 401 {
            return Err(ModelError::Auth("Invalid API key".to_string()));
        }

        if !response.status().is_success() {
            return Err(ModelError::Model(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await?
            )));
        }

        let body: ChatResponse = response.json().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("No choices in response".to_string()))?;

        Ok(choice.message.content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_model_requires_key_for_openai() {
        let config = ModelConfig {
            provider: ProviderKind::OpenAI,
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            create_model(config),
            Err(ModelError::Auth(_))
        ));
    }

    #[test]
    fn test_create_ollama_model() {
        let model = create_model(ModelConfig::default()).unwrap();
        assert_eq!(model.model_name(), ModelConfig::default().model);
    }
}
