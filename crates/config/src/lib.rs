//! Configuration loading, validation, and management for Chatweave.
//!
//! Loads configuration from `~/.chatweave/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use chatweave_core::message::Message;
use chatweave_core::provider::{ProviderRequest, ResponseFormat, ToolDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chatweave/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fallback API key for providers without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider used when none is named explicitly
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Per-request chat settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}

/// Settings applied to every completion request of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// How many tool turns a single conversation may take before giving up
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// `{ type = "json_object" }` switches on JSON mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    /// Seconds before a single completion request is abandoned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

fn default_model() -> String {
    "gpt-3.5-turbo-0125".into()
}
fn default_recursion_limit() -> u32 {
    4
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            top_p: None,
            frequency_penalty: None,
            max_tokens: None,
            seed: None,
            recursion_limit: default_recursion_limit(),
            stop: Vec::new(),
            response_format: None,
            timeout_secs: None,
        }
    }
}

impl ChatConfig {
    /// Build the request for one completion call.
    pub fn to_request(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        stream: bool,
    ) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            max_tokens: self.max_tokens,
            seed: self.seed,
            tools,
            stream,
            stop: self.stop.clone(),
            response_format: self.response_format,
            timeout_secs: self.timeout_secs,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "chat.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(ConfigError::ValidationError(
                    "chat.top_p must be between 0.0 and 1.0".into(),
                ));
            }
        }
        if let Some(penalty) = self.frequency_penalty {
            if !(-2.0..=2.0).contains(&penalty) {
                return Err(ConfigError::ValidationError(
                    "chat.frequency_penalty must be between -2.0 and 2.0".into(),
                ));
            }
        }
        if let Some(timeout) = self.timeout_secs {
            if !(timeout.is_finite() && timeout > 0.0) {
                return Err(ConfigError::ValidationError(
                    "chat.timeout_secs must be a positive number".into(),
                ));
            }
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "chat.model must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's base URL (proxies, self-hosted gateways)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("chat", &self.chat)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path, then apply environment
    /// overrides:
    ///
    /// - `CHATWEAVE_API_KEY`: fallback key for every provider
    /// - `OPENAI_API_KEY`, `MISTRAL_API_KEY`: per-provider keys
    /// - `CHATWEAVE_PROVIDER`: default provider
    /// - `OPENAI_MODEL`, `OPENAI_TEMPERATURE`, `OPENAI_SEED`: chat settings
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup("CHATWEAVE_API_KEY") {
            self.api_key = Some(key);
        }

        for (provider, var) in [("openai", "OPENAI_API_KEY"), ("mistral", "MISTRAL_API_KEY")] {
            if let Some(key) = lookup(var) {
                let entry = self.providers.entry(provider.to_string()).or_default();
                if entry.api_key.is_none() {
                    entry.api_key = Some(key);
                }
            }
        }

        if let Some(provider) = lookup("CHATWEAVE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("OPENAI_MODEL") {
            self.chat.model = model;
        }

        if let Some(raw) = lookup("OPENAI_TEMPERATURE") {
            self.chat.temperature = raw.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "OPENAI_TEMPERATURE".into(),
                value: raw.clone(),
            })?;
        }

        if let Some(raw) = lookup("OPENAI_SEED") {
            self.chat.seed = Some(raw.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "OPENAI_SEED".into(),
                value: raw.clone(),
            })?);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatweave")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.chat.validate()?;
        if self.default_provider.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_provider must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the API key for `provider`: its own key, else the shared one.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            chat: ChatConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for chatweave_core::Error {
    fn from(err: ConfigError) -> Self {
        chatweave_core::Error::Config {
            message: err.to_string(),
        }
    }
}
