//! LLM provider implementations
//!
//! Concrete implementations of the EmbeddingProvider and
//! DocumentationProvider traits for hosted and local services.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaEmbeddingProvider;
pub use openai::{OpenAIClient, OpenAIDocumentationProvider, OpenAIEmbeddingProvider};

use spanvec_core::{LlmError, SpanvecError};

pub(crate) fn request_failed(
    provider: &str,
    status: i32,
    message: impl Into<String>,
) -> SpanvecError {
    SpanvecError::Llm(LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> SpanvecError {
    SpanvecError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> SpanvecError {
    SpanvecError::Llm(LlmError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    })
}
