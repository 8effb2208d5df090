//! Configuration system for rubberduck
//!
//! Supports loading configuration from:
//! 1. CLI --config argument
//! 2. ~/.config/rubberduck/config.{RUBBERDUCK_ENV}.json
//! 3. Default values
//!
//! Where RUBBERDUCK_ENV can be: production (default), development, test
//!
//! Environment variables override config file values:
//! - RUBBERDUCK_MODEL_URL
//! - RUBBERDUCK_MODEL
//! - RUBBERDUCK_ENCODER_DIR
//! - RUBBERDUCK_SOURCE_ROOT
//! - OPENAI_API_KEY

use crate::training::TrainerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Ollama,
    OpenAI,
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

/// Configuration for the conversational model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider type
    pub provider: ModelProvider,

    /// Base URL of the provider API
    #[serde(default = "default_model_url")]
    pub url: String,

    /// Model name
    pub model: String,

    /// API key (can be an environment variable name like "OPENAI_API_KEY")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top P sampling (0.0 - 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

fn default_model_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    0.6
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Ollama,
            url: default_model_url(),
            model: "qwen3:8b".to_string(),
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
        }
    }
}

impl ModelConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::Validation(format!(
                "Top P must be between 0.0 and 1.0, got {}",
                self.top_p
            )));
        }

        if self.url.is_empty() {
            return Err(ConfigError::Validation("URL cannot be empty".to_string()));
        }

        if self.model.is_empty() {
            return Err(ConfigError::Validation(
                "Model name cannot be empty".to_string(),
            ));
        }

        if self.provider != ModelProvider::Ollama && self.api_key.is_none() {
            return Err(ConfigError::Validation(format!(
                "API key required for {} provider",
                self.provider
            )));
        }

        Ok(())
    }

    /// Resolve API key from environment variable if needed
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.as_ref().and_then(|key| {
            // An all-caps key is treated as an env var name
            if key.chars().all(|c| c.is_uppercase() || c == '_') {
                std::env::var(key).ok()
            } else {
                Some(key.clone())
            }
        })
    }
}

/// Configuration for the dual encoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Directory holding config.json, tokenizer.json and model.safetensors
    pub model_dir: PathBuf,

    /// Number of trailing transformer layers left trainable during fine-tuning
    #[serde(default = "default_unfreeze_layers")]
    pub unfreeze_layers: usize,

    /// Token truncation length for both query and code texts
    #[serde(default = "default_encoder_max_tokens")]
    pub max_tokens: usize,
}

fn default_unfreeze_layers() -> usize {
    crate::encoder::bert::DEFAULT_UNFREEZE_LAYERS
}

fn default_encoder_max_tokens() -> usize {
    crate::encoder::MAX_TOKENS
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/encoder"),
            unfreeze_layers: default_unfreeze_layers(),
            max_tokens: default_encoder_max_tokens(),
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "encoder.model_dir cannot be empty".to_string(),
            ));
        }
        if self.unfreeze_layers == 0 {
            return Err(ConfigError::Validation(
                "encoder.unfreeze_layers must be at least 1".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "encoder.max_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Conversational model used for routing and replies
    #[serde(default)]
    pub model: ModelConfig,

    /// Dual encoder used to embed queries and code chunks
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Fine-tuning hyperparameters
    #[serde(default)]
    pub trainer: TrainerConfig,

    /// Directory scanned for source documents on refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,

    /// Where training checkpoints are written
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            encoder: EncoderConfig::default(),
            trainer: TrainerConfig::default(),
            source_root: None,
            checkpoint_dir: default_checkpoint_dir(),
            debug: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration with standard priority:
    /// 1. Explicit path
    /// 2. ~/.config/rubberduck/config.{RUBBERDUCK_ENV}.json
    /// 3. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            if path.exists() {
                tracing::info!("Loading config from: {:?}", path);
                return Self::from_file(path);
            } else {
                return Err(ConfigError::Validation(format!(
                    "Config file not found: {:?}",
                    path
                )));
            }
        }

        let env = std::env::var("RUBBERDUCK_ENV").unwrap_or_else(|_| "production".to_string());

        if let Some(config_dir) = Self::config_dir() {
            let config_path = config_dir.join(format!("config.{}.json", env));

            if config_path.exists() {
                tracing::info!("Loading config from: {:?}", config_path);
                return Self::from_file(&config_path);
            }
        }

        tracing::info!("Using default configuration with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RUBBERDUCK_MODEL_URL") {
            self.model.url = url;
        }

        if let Ok(model) = std::env::var("RUBBERDUCK_MODEL") {
            self.model.model = model;
        }

        if let Ok(dir) = std::env::var("RUBBERDUCK_ENCODER_DIR") {
            self.encoder.model_dir = PathBuf::from(dir);
        }

        if let Ok(root) = std::env::var("RUBBERDUCK_SOURCE_ROOT") {
            self.source_root = Some(PathBuf::from(root));
        }

        // API keys are resolved on-demand via resolve_api_key()
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.encoder.validate()?;

        if self.trainer.epochs == 0 {
            return Err(ConfigError::Validation(
                "trainer.epochs must be greater than 0".to_string(),
            ));
        }
        if self.trainer.batch_size == 0 {
            return Err(ConfigError::Validation(
                "trainer.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.trainer.temperature <= 0.0 {
            return Err(ConfigError::Validation(
                "trainer.temperature must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("rubberduck"))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.provider, ModelProvider::Ollama);
        assert_eq!(config.encoder.unfreeze_layers, 4);
    }

    #[test]
    fn test_model_config_validation() {
        let mut config = ModelConfig::default();
        assert!(config.validate().is_ok());

        config.temperature = 3.0;
        assert!(config.validate().is_err());

        config.temperature = 0.7;
        config.top_p = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = ModelConfig {
            provider: ModelProvider::OpenAI,
            api_key: None,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_encoder_config_validation() {
        let mut config = EncoderConfig::default();
        assert!(config.validate().is_ok());

        config.unfreeze_layers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_trainer_epochs_rejected() {
        let mut config = AppConfig::default();
        config.trainer.epochs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.trainer.batch_size, config.trainer.batch_size);
    }

    #[test]
    fn test_save_then_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.test.json");

        let mut config = AppConfig::default();
        config.model.model = "qwen3:4b".to_string();
        config.encoder.max_tokens = 96;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.model.model, "qwen3:4b");
        assert_eq!(loaded.encoder.max_tokens, 96);
    }

    #[test]
    fn test_resolve_literal_api_key() {
        let config = ModelConfig {
            api_key: Some("sk-literal-key".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-literal-key"));
    }
}
