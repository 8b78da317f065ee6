//! SPANVEC Test Utilities
//!
//! Centralized test infrastructure for the SPANVEC workspace:
//! - Mock embedding and documentation providers
//! - Proptest generators for record types
//! - Test fixtures for common scenarios
//! - Custom assertions for SPANVEC-specific validation

// Re-export the reference store from its source crate
pub use spanvec_storage::InMemoryVectorStore;

// Re-export core types for convenience
pub use spanvec_core::{
    compute_content_hash, completion_timestamp, function_id, CacheHitInfo, ConfigError,
    DefinitionDraft, EmbeddingVector, ExecutionFailure, ExecutionRecord, ExecutionStatus,
    FailureMapping, FunctionDefinition, GeneratedDocumentation, LlmError, PropertyDefinition,
    PropertySchema, PropertyType, ResolvedTagSet, SpanvecConfig, SpanvecError, SpanvecResult,
    StorageError, TagValue, Timestamp, ValidationError, VectorError,
};
pub use spanvec_llm::{DocumentationProvider, EmbeddingProvider};

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

/// Mock embedding provider for testing (async).
///
/// Deterministic: the same text always yields the same unit vector.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    model_id: String,
    dimensions: i32,
}

impl MockEmbeddingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: i32) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
        }
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut data = vec![0.0f32; self.dimensions as usize];

        for (i, byte) in text.bytes().enumerate() {
            let idx = i % self.dimensions as usize;
            data[idx] += (byte as f32) / 255.0;
        }

        let norm: f32 = data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut data {
                *x /= norm;
            }
        }

        data
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> SpanvecResult<EmbeddingVector> {
        let data = self.generate_embedding(text);
        Ok(EmbeddingVector::new(data, self.model_id.clone()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> SpanvecResult<Vec<EmbeddingVector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Embedding provider driven by substring rules.
///
/// The first rule whose pattern occurs in the text decides the vector;
/// texts matching no rule get the fallback. Counts every call.
#[derive(Debug)]
pub struct ScriptedEmbeddingProvider {
    rules: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
    calls: AtomicUsize,
}

impl ScriptedEmbeddingProvider {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    /// Map texts containing `pattern` to `vector`.
    pub fn when(mut self, pattern: impl Into<String>, vector: Vec<f32>) -> Self {
        self.rules.push((pattern.into(), vector));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbeddingProvider {
    async fn embed(&self, text: &str) -> SpanvecResult<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = self
            .rules
            .iter()
            .find(|(pattern, _)| text.contains(pattern.as_str()))
            .map(|(_, vector)| vector.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Ok(EmbeddingVector::new(data, "scripted"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> SpanvecResult<Vec<EmbeddingVector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimensions(&self) -> i32 {
        self.fallback.len() as i32
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Embedding provider that always fails.
#[derive(Debug, Default)]
pub struct FailingEmbeddingProvider {
    calls: AtomicUsize,
}

impl FailingEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _text: &str) -> SpanvecResult<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SpanvecError::Llm(LlmError::EmbeddingFailed {
            reason: "embedding backend unreachable".to_string(),
        }))
    }

    async fn embed_batch(&self, texts: &[&str]) -> SpanvecResult<Vec<EmbeddingVector>> {
        match texts.first() {
            Some(text) => self.embed(text).await.map(|v| vec![v]),
            None => Ok(Vec::new()),
        }
    }

    fn dimensions(&self) -> i32 {
        2
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

/// Mock documentation provider for testing (async).
///
/// Fails the first `failures` calls, then succeeds.
#[derive(Debug, Default)]
pub struct MockDocumentationProvider {
    failures: usize,
    calls: AtomicUsize,
}

impl MockDocumentationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentationProvider for MockDocumentationProvider {
    async fn document(&self, draft: &DefinitionDraft) -> SpanvecResult<GeneratedDocumentation> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(SpanvecError::Llm(LlmError::DocumentationFailed {
                function: draft.qualified_name.clone(),
                reason: "mock failure".to_string(),
            }));
        }
        Ok(GeneratedDocumentation {
            search_description: format!("Generated description of {}", draft.qualified_name),
            sequence_narrative: format!("1. {} runs", draft.function_name),
        })
    }

    fn model_id(&self) -> &str {
        "mock-docs"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating SPANVEC record types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-2030
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a qualified function name like `billing::total`.
    pub fn arb_function_name() -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", "[a-z_]{1,12}").prop_map(|(module, func)| format!("{}::{}", module, func))
    }

    pub fn arb_property_type() -> impl Strategy<Value = PropertyType> {
        prop_oneof![
            Just(PropertyType::Text),
            Just(PropertyType::Int),
            Just(PropertyType::Number),
            Just(PropertyType::Boolean),
            Just(PropertyType::Date),
            Just(PropertyType::TextArray),
            Just(PropertyType::IntArray),
        ]
    }

    pub fn arb_tag_value() -> impl Strategy<Value = TagValue> {
        prop_oneof![
            any::<bool>().prop_map(TagValue::Bool),
            any::<i64>().prop_map(TagValue::Int),
            (-1.0e6f64..1.0e6).prop_map(TagValue::Number),
            "[a-zA-Z0-9 _-]{0,24}".prop_map(TagValue::Text),
            prop::collection::vec("[a-z]{1,8}", 0..4).prop_map(TagValue::TextList),
            prop::collection::vec(any::<i64>(), 0..4).prop_map(TagValue::IntList),
        ]
    }

    /// Generate a small JSON value of the shape captured arguments take.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,10}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Generate an EmbeddingVector with specified dimensions.
    pub fn arb_embedding_vector(dimensions: usize) -> impl Strategy<Value = EmbeddingVector> {
        prop::collection::vec(-1.0f32..1.0f32, dimensions)
            .prop_map(|data| EmbeddingVector::new(data, "test-model"))
    }

    pub fn arb_execution_status() -> impl Strategy<Value = ExecutionStatus> {
        prop_oneof![Just(ExecutionStatus::Success), Just(ExecutionStatus::Error)]
    }

    /// Generate a status-consistent ExecutionRecord.
    pub fn arb_execution_record() -> impl Strategy<Value = ExecutionRecord> {
        (
            arb_function_name(),
            arb_execution_status(),
            arb_timestamp(),
            0.0f64..10_000.0,
            prop::option::of(arb_json_value()),
            prop::option::of(arb_json_value()),
            "[A-Z_]{1,16}",
        )
            .prop_map(|(function_name, status, started_at, duration_ms, args, ret, code)| {
                let failure = (status == ExecutionStatus::Error).then(|| ExecutionFailure {
                    error_code: code,
                    error_message: "generated failure".to_string(),
                });
                ExecutionRecord {
                    execution_id: Uuid::now_v7(),
                    function_id: function_id(&function_name),
                    function_name,
                    trace_id: Uuid::now_v7(),
                    span_id: Uuid::now_v7(),
                    parent_span_id: None,
                    started_at,
                    duration_ms,
                    status,
                    failure,
                    arguments: args,
                    return_value: ret,
                    tags: ResolvedTagSet::new(),
                    cache_hit: None,
                    vector: None,
                    completed_at: completion_timestamp(),
                }
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde_json::Value;

    /// Config with the defaults, synchronous writes and no files.
    pub fn minimal_config() -> SpanvecConfig {
        SpanvecConfig {
            async_logging: false,
            ..SpanvecConfig::default()
        }
    }

    /// Schema declaring `run_id`, `team` (text), `priority` (int) and
    /// `labels` (text[]).
    pub fn sample_schema() -> PropertySchema {
        PropertySchema::from_definitions([
            ("run_id", PropertyDefinition::new(PropertyType::Text)),
            ("team", PropertyDefinition::new(PropertyType::Text)),
            ("priority", PropertyDefinition::new(PropertyType::Int)),
            ("labels", PropertyDefinition::new(PropertyType::TextArray)),
        ])
    }

    /// Mapping `ValueError -> INVALID_INPUT`, `TimeoutError -> UPSTREAM_TIMEOUT`.
    pub fn sample_failure_mapping() -> FailureMapping {
        FailureMapping::from_entries([
            ("ValueError", "INVALID_INPUT"),
            ("TimeoutError", "UPSTREAM_TIMEOUT"),
        ])
    }

    /// A successful record that can serve as a cache source.
    pub fn success_record(
        function_name: &str,
        arguments: Value,
        return_value: Value,
        vector: Option<Vec<f32>>,
    ) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: Uuid::now_v7(),
            function_name: function_name.to_string(),
            function_id: function_id(function_name),
            trace_id: Uuid::now_v7(),
            span_id: Uuid::now_v7(),
            parent_span_id: None,
            started_at: Utc::now(),
            duration_ms: 12.5,
            status: ExecutionStatus::Success,
            failure: None,
            arguments: Some(arguments),
            return_value: Some(return_value),
            tags: ResolvedTagSet::new(),
            cache_hit: None,
            vector: vector.map(|data| EmbeddingVector::new(data, "test-model")),
            completed_at: completion_timestamp(),
        }
    }

    /// A failed record with the given code.
    pub fn error_record(function_name: &str, error_code: &str, message: &str) -> ExecutionRecord {
        let mut record = success_record(function_name, Value::Null, Value::Null, None);
        record.status = ExecutionStatus::Error;
        record.arguments = None;
        record.return_value = None;
        record.failure = Some(ExecutionFailure {
            error_code: error_code.to_string(),
            error_message: message.to_string(),
        });
        record
    }

    /// Create a normalized unit vector embedding.
    pub fn unit_embedding(dimensions: usize, axis: usize) -> EmbeddingVector {
        let mut data = vec![0.0f32; dimensions];
        if axis < dimensions {
            data[axis] = 1.0;
        }
        EmbeddingVector::new(data, "test-model")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for SPANVEC-specific validation.

    use super::*;
    use std::collections::HashMap;

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &SpanvecResult<T>) {
        match result {
            Err(SpanvecError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &SpanvecResult<T>) {
        match result {
            Err(SpanvecError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &SpanvecResult<T>) {
        match result {
            Err(SpanvecError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a SpanvecResult is a DimensionMismatch vector error.
    #[track_caller]
    pub fn assert_dimension_mismatch<T: std::fmt::Debug>(
        result: &SpanvecResult<T>,
        expected: i32,
        got: i32,
    ) {
        match result {
            Err(SpanvecError::Vector(VectorError::DimensionMismatch { expected: e, got: g })) => {
                assert_eq!(*e, expected, "Wrong expected dimension");
                assert_eq!(*g, got, "Wrong got dimension");
            }
            other => panic!(
                "Expected DimensionMismatch({}, {}), got: {:?}",
                expected, got, other
            ),
        }
    }

    /// Assert status/failure pairing and cache-hit shape of a record.
    #[track_caller]
    pub fn assert_record_consistent(record: &ExecutionRecord) {
        assert!(
            record.is_consistent(),
            "Record {} has status {:?} but failure {:?}",
            record.execution_id,
            record.status,
            record.failure
        );
        if record.is_cache_hit() {
            assert!(record.vector.is_none(), "Cache-hit record carries a vector");
        }
    }

    /// Assert that records form well-ordered trees: every parent span
    /// belongs to the same trace and completes after each of its children.
    #[track_caller]
    pub fn assert_trace_tree(records: &[ExecutionRecord]) {
        let by_span: HashMap<Uuid, &ExecutionRecord> =
            records.iter().map(|r| (r.span_id, r)).collect();
        for record in records {
            let Some(parent_span) = record.parent_span_id else {
                continue;
            };
            let parent = by_span
                .get(&parent_span)
                .unwrap_or_else(|| panic!("Parent span {} not recorded", parent_span));
            assert_eq!(parent.trace_id, record.trace_id, "Child left its parent's trace");
            assert!(
                parent.completed_at > record.completed_at,
                "Parent {} completed before child {}",
                parent.function_name,
                record.function_name
            );
        }
    }

    /// Assert that an EmbeddingVector is valid.
    #[track_caller]
    pub fn assert_valid_embedding(embedding: &EmbeddingVector) {
        assert!(
            embedding.is_valid(),
            "Invalid embedding: dimensions={}, data.len()={}",
            embedding.dimensions,
            embedding.data.len()
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
