//! Ollama embedding provider (local models)

use super::types::{EmbeddingRequest, EmbeddingResponse, ListModelsResponse};
use crate::providers::{invalid_response, request_failed};
use crate::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use spanvec_core::{EmbeddingVector, SpanvecError, SpanvecResult, VectorError};

const PROVIDER: &str = "ollama";

/// Ollama embedding provider for locally served models.
pub struct OllamaEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: i32,
}

impl OllamaEmbeddingProvider {
    /// Create a new Ollama embedding provider.
    ///
    /// # Arguments
    /// * `base_url` - Ollama server URL (e.g., "http://localhost:11434")
    /// * `model` - Model name (e.g., "nomic-embed-text")
    /// * `dimensions` - Embedding dimensions the model produces
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimensions: i32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        }
    }

    /// Create provider with default nomic-embed-text model.
    pub fn with_default_model(base_url: impl Into<String>) -> Self {
        Self::new(base_url, "nomic-embed-text", 768)
    }

    /// Check whether the configured model is pulled on the server.
    pub async fn check_model_available(&self) -> SpanvecResult<bool> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            request_failed(PROVIDER, 0, format!("Failed to connect to Ollama: {}", e))
        })?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let list: ListModelsResponse = response.json().await.map_err(|e| {
            invalid_response(PROVIDER, format!("Failed to parse models list: {}", e))
        })?;

        Ok(list.models.iter().any(|m| m.name.contains(&self.model)))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> SpanvecResult<EmbeddingVector> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(provider = PROVIDER, url = %url, error = %e, "Embedding request failed");
                request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(
                provider = PROVIDER,
                model = %self.model,
                status = status.as_u16(),
                error = %error_text,
                "Embedding request rejected"
            );
            return Err(request_failed(PROVIDER, status.as_u16() as i32, error_text));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))?;

        let vector = EmbeddingVector::new(body.embedding, self.model.clone());
        if vector.dimensions != self.dimensions {
            tracing::warn!(
                model = %self.model,
                expected = self.dimensions,
                got = vector.dimensions,
                "Embedding dimensions do not match configuration"
            );
            return Err(SpanvecError::Vector(VectorError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.dimensions,
            }));
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[&str]) -> SpanvecResult<Vec<EmbeddingVector>> {
        // No batch endpoint; sequential requests keep ordering trivially.
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OllamaEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spanvec_core::LlmError;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = OllamaEmbeddingProvider::new("http://localhost:11434/", "m", 8);
        assert_eq!(provider.base_url, "http://localhost:11434");
        assert_eq!(provider.dimensions(), 8);
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_request_failure() {
        let provider = OllamaEmbeddingProvider::new("http://127.0.0.1:9", "m", 8);
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            SpanvecError::Llm(LlmError::RequestFailed { status: 0, .. })
        ));
    }

    #[test]
    fn test_default_model() {
        let provider = OllamaEmbeddingProvider::with_default_model("http://localhost:11434");
        assert_eq!(provider.model_id(), "nomic-embed-text");
        assert_eq!(provider.dimensions(), 768);
    }
}
