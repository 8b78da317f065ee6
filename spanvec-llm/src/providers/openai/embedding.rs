//! OpenAI embedding provider

use super::client::OpenAIClient;
use super::types::{EmbeddingRequest, EmbeddingResponse};
use crate::providers::invalid_response;
use crate::EmbeddingProvider;
use async_trait::async_trait;
use spanvec_core::{EmbeddingVector, SpanvecResult};

/// OpenAI embedding provider using text-embedding-3-small or a custom model.
pub struct OpenAIEmbeddingProvider {
    client: OpenAIClient,
    model: String,
    dimensions: i32,
}

impl OpenAIEmbeddingProvider {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-3-small")
    /// * `dimensions` - Requested embedding dimensions
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimensions: i32) -> Self {
        Self::with_client(OpenAIClient::new(api_key, 60), model, dimensions)
    }

    /// Build on an existing client (custom base URL or pacing).
    pub fn with_client(client: OpenAIClient, model: impl Into<String>, dimensions: i32) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }

    /// Create provider with default text-embedding-3-small model.
    pub fn with_default_model(api_key: impl Into<String>) -> Self {
        Self::new(api_key, "text-embedding-3-small", 1536)
    }

    async fn request(&self, input: Vec<String>) -> SpanvecResult<Vec<EmbeddingVector>> {
        let expected = input.len();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input,
            dimensions: Some(self.dimensions),
        };

        let response: EmbeddingResponse = self.client.request("embeddings", request).await?;
        if response.data.len() != expected {
            return Err(invalid_response(
                "openai",
                format!("Expected {} embeddings but got {}", expected, response.data.len()),
            ));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data
            .into_iter()
            .map(|d| EmbeddingVector::new(d.embedding, self.model.clone()))
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> SpanvecResult<EmbeddingVector> {
        self.request(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response("openai", "No embedding data in response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> SpanvecResult<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts.iter().map(|s| s.to_string()).collect())
            .await
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAIEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIEmbeddingProvider")
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let provider = OpenAIEmbeddingProvider::with_client(
            OpenAIClient::new("sk-test", 60).with_base_url("http://127.0.0.1:9"),
            "text-embedding-3-small",
            8,
        );
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_request_failure() {
        let provider = OpenAIEmbeddingProvider::with_client(
            OpenAIClient::new("sk-test", 60).with_base_url("http://127.0.0.1:9"),
            "text-embedding-3-small",
            8,
        );
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            spanvec_core::SpanvecError::Llm(spanvec_core::LlmError::RequestFailed { status: 0, .. })
        ));
    }

    #[test]
    fn test_default_model() {
        let provider = OpenAIEmbeddingProvider::with_default_model("sk-test");
        assert_eq!(provider.model_id(), "text-embedding-3-small");
        assert_eq!(provider.dimensions(), 1536);
    }
}
