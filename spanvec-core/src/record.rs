//! Persisted record types: function definitions and execution records

use crate::{
    compute_content_hash, function_id, EmbeddingVector, FunctionId, ResolvedTagSet, Timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// FUNCTION DEFINITIONS
// ============================================================================

/// Where a definition's search description and narrative came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentationOrigin {
    /// Supplied by the engineer at wrap time (or absent)
    Authored,
    /// Produced by a documentation provider on flush
    Generated { model_id: String },
}

/// Static description of a wrapped function, before documentation is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionDraft {
    /// `module::path::function`
    pub qualified_name: String,
    pub module_path: String,
    pub function_name: String,
    pub source_code: Option<String>,
    pub docstring: Option<String>,
    pub search_description: Option<String>,
    pub sequence_narrative: Option<String>,
}

impl DefinitionDraft {
    pub fn new(module_path: impl Into<String>, function_name: impl Into<String>) -> Self {
        let module_path = module_path.into();
        let function_name = function_name.into();
        let qualified_name = if module_path.is_empty() {
            function_name.clone()
        } else {
            format!("{}::{}", module_path, function_name)
        };
        Self {
            qualified_name,
            module_path,
            function_name,
            source_code: None,
            docstring: None,
            search_description: None,
            sequence_narrative: None,
        }
    }

    /// SHA-256 over every static property, hex encoded.
    pub fn content_hash(&self) -> String {
        let material = [
            self.qualified_name.as_str(),
            self.source_code.as_deref().unwrap_or(""),
            self.docstring.as_deref().unwrap_or(""),
            self.search_description.as_deref().unwrap_or(""),
            self.sequence_narrative.as_deref().unwrap_or(""),
        ]
        .join("\u{1f}");
        hex::encode(compute_content_hash(material.as_bytes()))
    }

    /// Commit the draft as an authored definition.
    pub fn into_definition(self, created_at: Timestamp) -> FunctionDefinition {
        self.finish(DocumentationOrigin::Authored, created_at)
    }

    /// Commit the draft with generated documentation replacing the authored fields.
    pub fn with_generated(
        mut self,
        docs: GeneratedDocumentation,
        model_id: impl Into<String>,
        created_at: Timestamp,
    ) -> FunctionDefinition {
        self.search_description = Some(docs.search_description);
        self.sequence_narrative = Some(docs.sequence_narrative);
        self.finish(
            DocumentationOrigin::Generated {
                model_id: model_id.into(),
            },
            created_at,
        )
    }

    fn finish(self, documentation: DocumentationOrigin, created_at: Timestamp) -> FunctionDefinition {
        let content_hash = self.content_hash();
        FunctionDefinition {
            function_id: function_id(&self.qualified_name),
            qualified_name: self.qualified_name,
            module_path: self.module_path,
            function_name: self.function_name,
            source_code: self.source_code,
            docstring: self.docstring,
            search_description: self.search_description,
            sequence_narrative: self.sequence_narrative,
            documentation,
            content_hash,
            vector: None,
            created_at,
        }
    }
}

/// Output of a documentation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocumentation {
    pub search_description: String,
    pub sequence_narrative: String,
}

/// Write-once static record of a wrapped function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub function_id: FunctionId,
    pub qualified_name: String,
    pub module_path: String,
    pub function_name: String,
    pub source_code: Option<String>,
    pub docstring: Option<String>,
    pub search_description: Option<String>,
    pub sequence_narrative: Option<String>,
    pub documentation: DocumentationOrigin,
    pub content_hash: String,
    /// Embedding of [`search_text`](Self::search_text), when an embedder is configured
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vector: Option<EmbeddingVector>,
    pub created_at: Timestamp,
}

impl FunctionDefinition {
    /// Text used for keyword and vector search over definitions.
    pub fn search_text(&self) -> String {
        [
            Some(self.qualified_name.as_str()),
            self.search_description.as_deref(),
            self.sequence_narrative.as_deref(),
            self.docstring.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n")
    }
}

// ============================================================================
// EXECUTION RECORDS
// ============================================================================

/// Outcome of a wrapped call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Error => "ERROR",
        }
    }
}

/// Failure details, present iff the status is `ERROR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub error_code: String,
    pub error_message: String,
}

/// Cache-hit details, present iff the call was served from the semantic cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHitInfo {
    pub score: f32,
    /// Execution whose stored return value was reused
    pub source_execution_id: Uuid,
}

/// One record per wrapped call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub function_name: String,
    pub function_id: FunctionId,
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub started_at: Timestamp,
    pub duration_ms: f64,
    pub status: ExecutionStatus,
    /// Set iff `status` is `ERROR`
    pub failure: Option<ExecutionFailure>,
    pub arguments: Option<serde_json::Value>,
    pub return_value: Option<serde_json::Value>,
    pub tags: ResolvedTagSet,
    pub cache_hit: Option<CacheHitInfo>,
    /// Embedding of the argument comparison text (successes) or error message (failures)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vector: Option<EmbeddingVector>,
    /// Temporal ordering key; strictly increasing within the process
    pub completed_at: Timestamp,
}

impl ExecutionRecord {
    pub fn error_code(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.error_code.as_str())
    }

    pub fn is_cache_hit(&self) -> bool {
        self.cache_hit.is_some()
    }

    /// Whether this record's return value may be served by the semantic cache.
    pub fn is_cache_source(&self) -> bool {
        self.status == ExecutionStatus::Success
            && self.return_value.is_some()
            && self.cache_hit.is_none()
    }

    /// Check the status/failure pairing.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            ExecutionStatus::Success => self.failure.is_none(),
            ExecutionStatus::Error => self.failure.is_some() && self.cache_hit.is_none(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{completion_timestamp, new_execution_id};
    use chrono::Utc;

    fn draft() -> DefinitionDraft {
        let mut d = DefinitionDraft::new("billing::invoices", "total");
        d.source_code = Some("fn total() {}".to_string());
        d
    }

    fn record(status: ExecutionStatus) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: new_execution_id(),
            function_name: "billing::invoices::total".to_string(),
            function_id: function_id("billing::invoices::total"),
            trace_id: Uuid::now_v7(),
            span_id: Uuid::now_v7(),
            parent_span_id: None,
            started_at: Utc::now(),
            duration_ms: 1.5,
            status,
            failure: None,
            arguments: None,
            return_value: Some(serde_json::json!(42)),
            tags: ResolvedTagSet::new(),
            cache_hit: None,
            vector: None,
            completed_at: completion_timestamp(),
        }
    }

    #[test]
    fn test_draft_qualified_name() {
        assert_eq!(draft().qualified_name, "billing::invoices::total");
        assert_eq!(DefinitionDraft::new("", "main").qualified_name, "main");
    }

    #[test]
    fn test_content_hash_changes_with_source() {
        let a = draft();
        let mut b = draft();
        b.source_code = Some("fn total() { 1 }".to_string());
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash(), draft().content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_with_generated_records_origin() {
        let def = draft().with_generated(
            GeneratedDocumentation {
                search_description: "Sums invoice lines".to_string(),
                sequence_narrative: "Loads lines then adds them".to_string(),
            },
            "gpt-4o-mini",
            Utc::now(),
        );
        assert_eq!(def.search_description.as_deref(), Some("Sums invoice lines"));
        assert_eq!(
            def.documentation,
            DocumentationOrigin::Generated {
                model_id: "gpt-4o-mini".to_string()
            }
        );
        assert_eq!(def.function_id, function_id("billing::invoices::total"));
        assert!(def.search_text().contains("Sums invoice lines"));
    }

    #[test]
    fn test_status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Success).unwrap(),
            "\"SUCCESS\""
        );
        assert_eq!(ExecutionStatus::Error.as_str(), "ERROR");
    }

    #[test]
    fn test_cache_source_rules() {
        let ok = record(ExecutionStatus::Success);
        assert!(ok.is_cache_source());

        let mut hit = ok.clone();
        hit.cache_hit = Some(CacheHitInfo {
            score: 0.99,
            source_execution_id: ok.execution_id,
        });
        assert!(!hit.is_cache_source());

        let mut no_value = ok.clone();
        no_value.return_value = None;
        assert!(!no_value.is_cache_source());
    }

    #[test]
    fn test_consistency_requires_failure_iff_error() {
        let ok = record(ExecutionStatus::Success);
        assert!(ok.is_consistent());

        let mut err = record(ExecutionStatus::Error);
        assert!(!err.is_consistent());
        err.failure = Some(ExecutionFailure {
            error_code: "INVALID_INPUT".to_string(),
            error_message: "bad".to_string(),
        });
        assert!(err.is_consistent());
        assert_eq!(err.error_code(), Some("INVALID_INPUT"));
    }
}
