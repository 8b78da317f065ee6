//! OpenAI documentation provider
//!
//! Asks a chat model for a one-paragraph search description and a
//! step-by-step sequence narrative of a wrapped function.

use super::client::OpenAIClient;
use super::types::{CompletionRequest, CompletionResponse, Message, ResponseFormat};
use crate::providers::invalid_response;
use crate::{documentation_prompt, DocumentationProvider};
use async_trait::async_trait;
use serde::Deserialize;
use spanvec_core::{
    DefinitionDraft, GeneratedDocumentation, LlmError, SpanvecError, SpanvecResult,
};

const SYSTEM_PROMPT: &str = "You document source code for semantic search. \
    Given a function, reply with a JSON object with exactly two string fields: \
    \"search_description\" (one paragraph: what the function does and when to use it) and \
    \"sequence_narrative\" (the ordered steps the function performs).";

/// OpenAI documentation provider using chat completions.
pub struct OpenAIDocumentationProvider {
    client: OpenAIClient,
    model: String,
}

impl OpenAIDocumentationProvider {
    /// Create a new OpenAI documentation provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "gpt-4o-mini")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(OpenAIClient::new(api_key, 60), model)
    }

    pub fn with_client(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Create provider with default gpt-4o-mini model.
    pub fn with_default_model(api_key: impl Into<String>) -> Self {
        Self::new(api_key, "gpt-4o-mini")
    }
}

#[derive(Deserialize)]
struct DocumentationJson {
    search_description: String,
    sequence_narrative: String,
}

/// Parse the model reply, tolerating a fenced ```json block.
pub(crate) fn parse_documentation(
    function: &str,
    reply: &str,
) -> SpanvecResult<GeneratedDocumentation> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let parsed: DocumentationJson = serde_json::from_str(body).map_err(|e| {
        tracing::warn!(function, error = %e, "Documentation reply is not valid JSON");
        SpanvecError::Llm(LlmError::DocumentationFailed {
            function: function.to_string(),
            reason: format!("reply is not the expected JSON object: {}", e),
        })
    })?;

    if parsed.search_description.trim().is_empty() {
        return Err(SpanvecError::Llm(LlmError::DocumentationFailed {
            function: function.to_string(),
            reason: "empty search_description".to_string(),
        }));
    }

    Ok(GeneratedDocumentation {
        search_description: parsed.search_description.trim().to_string(),
        sequence_narrative: parsed.sequence_narrative.trim().to_string(),
    })
}

#[async_trait]
impl DocumentationProvider for OpenAIDocumentationProvider {
    async fn document(&self, draft: &DefinitionDraft) -> SpanvecResult<GeneratedDocumentation> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: documentation_prompt(draft),
                },
            ],
            max_tokens: Some(600),
            temperature: Some(0.2),
            response_format: Some(ResponseFormat::json_object()),
        };

        let response: CompletionResponse =
            self.client.request("chat/completions", request).await?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| invalid_response("openai", "No completion in response"))?;

        parse_documentation(&draft.qualified_name, &reply)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAIDocumentationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIDocumentationProvider")
            .field("model", &self.model)
            .finish()
    }
}
