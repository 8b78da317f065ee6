//! Property-Based Tests for tag typing and record search
//!
//! **Property 1: Typed tags**
//! A call-specific tag survives preparation exactly when its value coerces
//! to the declared property type, and then holds the coerced value.
//!
//! **Property 2: Status filter**
//! Filtering execution records on `status` returns exactly the records with
//! that status, newest first.

use proptest::prelude::*;
use serde_json::json;
use spanvec_core::{PropertyDefinition, PropertySchema, SpanvecError, SpanvecResult, TagValue};
use spanvec_llm::EmbeddingProvider;
use spanvec_pipeline::{GlobalTags, Searcher, TagResolver};
use spanvec_storage::{InMemoryVectorStore, VectorStore};
use spanvec_test_utils::assertions::{assert_storage_error, assert_validation_error};
use spanvec_test_utils::fixtures::{self, unit_embedding};
use spanvec_test_utils::generators::{arb_execution_record, arb_property_type, arb_tag_value};
use spanvec_test_utils::ScriptedEmbeddingProvider;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_call_tags_keep_only_coercible_values(
        data_type in arb_property_type(),
        value in arb_tag_value(),
    ) {
        // "NaN" parses as a number and never compares equal
        prop_assume!(!matches!(
            &value,
            TagValue::Text(s) if s.trim().parse::<f64>().map_or(false, |n| !n.is_finite())
        ));
        let schema = PropertySchema::from_definitions([("k", PropertyDefinition::new(data_type))]);
        let resolver = TagResolver::new(Arc::new(schema), GlobalTags::empty());

        let mut tags = BTreeMap::new();
        tags.insert("k".to_string(), value.clone());
        let prepared = resolver.prepare_call_tags("props::typed", tags);

        match data_type.coerce("k", value) {
            Ok(coerced) => prop_assert_eq!(prepared.get("k"), Some(&coerced)),
            Err(e) => {
                let as_result: SpanvecResult<TagValue> = Err(SpanvecError::from(e));
                assert_validation_error(&as_result);
                prop_assert!(prepared.is_empty());
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_status_filter_is_exact(records in prop::collection::vec(arb_execution_record(), 1..20)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = Arc::new(InMemoryVectorStore::new());
            for record in &records {
                store
                    .put_execution(record)
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
            let searcher = Searcher::new(store, None);

            let mut filters = BTreeMap::new();
            filters.insert("status".to_string(), json!("ERROR"));
            let failures = searcher
                .search_execution_records(100, filters, None, false)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let expected = records.iter().filter(|r| r.failure.is_some()).count();
            prop_assert_eq!(failures.len(), expected);
            prop_assert!(failures.iter().all(|r| r.error_code().is_some()));
            for pair in failures.windows(2) {
                prop_assert!(pair[0].completed_at >= pair[1].completed_at);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[tokio::test]
async fn test_unavailable_store_reports_storage_error() {
    let store = InMemoryVectorStore::new();
    store.set_unavailable(true);
    let record = fixtures::error_record("m::f", "BOOM", "boom");
    assert_storage_error(&store.put_execution(&record).await);
}

#[tokio::test]
async fn test_error_search_ranks_by_message_similarity() {
    let store = Arc::new(InMemoryVectorStore::new());
    let mut timeout = fixtures::error_record("net::fetch", "UPSTREAM_TIMEOUT", "upstream timed out");
    timeout.vector = Some(unit_embedding(2, 0));
    let mut denied = fixtures::error_record("net::fetch", "DENIED", "permission denied");
    denied.vector = Some(unit_embedding(2, 1));
    store.put_execution(&timeout).await.unwrap();
    store.put_execution(&denied).await.unwrap();

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(ScriptedEmbeddingProvider::new(vec![0.0, 1.0]).when("timeout", vec![1.0, 0.0]));
    let searcher = Searcher::new(store, Some(embedder));

    let results = searcher
        .search_errors_by_message("timeout talking to the upstream", 2, BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(results[0].item.execution_id, timeout.execution_id);
    assert!(results[0].score.unwrap() > 0.99);
}
