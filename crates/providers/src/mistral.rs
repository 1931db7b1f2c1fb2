//! Mistral provider.
//!
//! Mistral speaks the OpenAI wire format with two differences that matter to
//! the chat loops: streamed tool calls arrive whole and are keyed by id
//! (every fragment reports `index: 0`), and the seed field is `random_seed`.

use async_trait::async_trait;
use chatweave_core::error::ProviderError;
use chatweave_core::provider::*;

use crate::openai_compat::OpenAiCompatProvider;
use crate::wire::Dialect;

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

pub struct MistralProvider {
    inner: OpenAiCompatProvider,
}

impl MistralProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            inner: OpenAiCompatProvider::with_dialect("mistral", base_url, api_key, Dialect::Mistral),
        }
    }

    pub fn base_url(&self) -> &str {
        self.inner.base_url()
    }
}

#[async_trait]
impl Provider for MistralProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.inner.complete(request).await
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        self.inner.stream(request).await
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        self.inner.list_models().await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint() {
        let provider = MistralProvider::new("key");
        assert_eq!(provider.name(), "mistral");
        assert_eq!(provider.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn custom_endpoint() {
        let provider = MistralProvider::with_base_url("http://localhost:9000/v1/", "key");
        assert_eq!(provider.base_url(), "http://localhost:9000/v1");
    }
}
