//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions` in the OpenAI shape.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling
//! - Model listing and health checks

use std::time::Duration;

use async_trait::async_trait;
use chatweave_core::error::ProviderError;
use chatweave_core::provider::*;
use tracing::{debug, warn};

use crate::sse;
use crate::wire::{ApiResponse, Dialect};

/// An OpenAI-compatible LLM provider.
///
/// This handles the vast majority of LLM providers since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    dialect: Dialect,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_dialect(name, base_url, api_key, Dialect::OpenAi)
    }

    pub(crate) fn with_dialect(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        dialect: Dialect,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            dialect,
            client,
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_completion(
        &self,
        request: &ProviderRequest,
        stream: bool,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.dialect.request_body(request, stream);

        debug!(
            provider = %self.name,
            model = %request.model,
            stream,
            tools = request.tools.len(),
            "Sending completion request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }
        if let Some(timeout) = request_timeout(request) {
            builder = builder.timeout(timeout);
        }

        let response = builder.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        check_status(response, &request.model).await
    }
}

/// Per-request timeout, if one was configured and is representable.
fn request_timeout(request: &ProviderRequest) -> Option<Duration> {
    request
        .timeout_secs
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Map non-success HTTP statuses to provider errors.
async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> std::result::Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if status == 404 {
        return Err(ProviderError::ModelNotFound(model.to_string()));
    }

    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let response = self.post_completion(&request, false).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Ok(api_response.into_response())
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.post_completion(&request, true).await?;
        Ok(sse::spawn_reader(response, self.dialect, self.name.clone()))
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(model_ids(&body))
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

fn model_ids(body: &serde_json::Value) -> Vec<String> {
    body["data"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|m| m["id"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_timeout_follows_settings() {
        let mut request = ProviderRequest {
            model: "m".into(),
            messages: vec![],
            temperature: 0.0,
            top_p: None,
            frequency_penalty: None,
            max_tokens: None,
            seed: None,
            tools: vec![],
            stream: false,
            stop: vec![],
            response_format: None,
            timeout_secs: None,
        };
        assert_eq!(request_timeout(&request), None);

        request.timeout_secs = Some(1.5);
        assert_eq!(request_timeout(&request), Some(Duration::from_millis(1500)));

        request.timeout_secs = Some(-1.0);
        assert_eq!(request_timeout(&request), None);
    }

    #[test]
    fn openrouter_constructor() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url().contains("openrouter.ai"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("custom", "http://localhost:8000/v1/", "k");
        assert_eq!(provider.base_url(), "http://localhost:8000/v1");
        assert_eq!(provider.dialect, Dialect::OpenAi);
    }

    #[test]
    fn model_listing_reads_ids() {
        let body = serde_json::json!({
            "data": [{"id": "gpt-4o"}, {"id": "gpt-4o-mini"}, {"object": "model"}]
        });
        assert_eq!(model_ids(&body), vec!["gpt-4o", "gpt-4o-mini"]);
        assert!(model_ids(&serde_json::json!({})).is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        // port 9 (discard) on localhost is closed in test environments
        let provider = OpenAiCompatProvider::new("local", "http://127.0.0.1:9/v1", "k");
        let request = ProviderRequest {
            model: "m".into(),
            messages: vec![chatweave_core::Message::user("hi")],
            temperature: 0.0,
            top_p: None,
            frequency_penalty: None,
            max_tokens: None,
            seed: None,
            tools: vec![],
            stream: false,
            stop: vec![],
            response_format: None,
            timeout_secs: Some(5.0),
        };
        let err = provider.complete(request).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Network(_) | ProviderError::Timeout(_)
        ));
    }
}
