//! Search entry points over definitions and execution records.

use serde_json::Value;
use spanvec_core::{ExecutionRecord, ExecutionStatus, FunctionDefinition, SpanvecResult};
use spanvec_llm::EmbeddingProvider;
use spanvec_storage::{Scored, VectorQuery, VectorStore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Query front-end for a vector store.
#[derive(Clone)]
pub struct Searcher {
    store: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl Searcher {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { store, embedder }
    }

    /// Find definitions matching a natural-language query.
    ///
    /// Uses vector search when an embedder is configured and falls back to
    /// keyword scoring otherwise, or when embedding the query fails.
    pub async fn search_function_definitions(
        &self,
        query: &str,
        limit: usize,
    ) -> SpanvecResult<Vec<Scored<FunctionDefinition>>> {
        let request = match &self.embedder {
            Some(embedder) => match embedder.embed(query).await {
                Ok(vector) => VectorQuery::nearest(vector, limit),
                Err(e) => {
                    tracing::warn!(error = %e, "Query embedding failed, using keyword search");
                    VectorQuery::keyword(query, limit)
                }
            },
            None => VectorQuery::keyword(query, limit),
        };
        self.store.query_definitions(&request).await
    }

    /// Blend vector and keyword relevance. `alpha` is the weight of the
    /// vector score, clamped to `[0, 1]`.
    pub async fn search_function_definitions_hybrid(
        &self,
        query: &str,
        limit: usize,
        alpha: f32,
    ) -> SpanvecResult<Vec<Scored<FunctionDefinition>>> {
        let Some(embedder) = &self.embedder else {
            return self
                .store
                .query_definitions(&VectorQuery::keyword(query, limit))
                .await;
        };
        let vector = embedder.embed(query).await?;
        self.store
            .query_definitions(&VectorQuery::hybrid(query, vector, alpha, limit))
            .await
    }

    /// List execution records.
    ///
    /// # Arguments
    /// * `filters` - Equality filters on record fields or tag keys
    /// * `sort_by` - Field to sort on; `None` sorts by completion time, newest first
    pub async fn search_execution_records(
        &self,
        limit: usize,
        filters: BTreeMap<String, Value>,
        sort_by: Option<&str>,
        sort_ascending: bool,
    ) -> SpanvecResult<Vec<ExecutionRecord>> {
        let mut request = VectorQuery::new(limit);
        request.filters = filters;
        if let Some(field) = sort_by {
            request = request.sort_by(field, sort_ascending);
        }
        let results = self.store.query_executions(&request).await?;
        Ok(results.into_iter().map(|s| s.item).collect())
    }

    /// Failures whose error message is semantically close to `query`.
    pub async fn search_errors_by_message(
        &self,
        query: &str,
        limit: usize,
        filters: BTreeMap<String, Value>,
    ) -> SpanvecResult<Vec<Scored<ExecutionRecord>>> {
        let mut request = match &self.embedder {
            Some(embedder) => VectorQuery::nearest(embedder.embed(query).await?, limit),
            None => VectorQuery::keyword(query, limit),
        };
        request.filters = filters;
        let request = request.filter("status", ExecutionStatus::Error.as_str());
        self.store.query_executions(&request).await
    }
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("embedder", &self.embedder.as_ref().map(|e| e.model_id().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use spanvec_core::DefinitionDraft;
    use spanvec_storage::InMemoryVectorStore;
    use spanvec_test_utils::{fixtures, MockEmbeddingProvider};

    async fn seeded_store() -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        let mut summarize = DefinitionDraft::new("reports", "summarize");
        summarize.search_description = Some("Summarize quarterly financial reports".to_string());
        let mut resize = DefinitionDraft::new("images", "resize");
        resize.search_description = Some("Resize an image to a thumbnail".to_string());
        for draft in [summarize, resize] {
            store
                .put_definition(&draft.into_definition(Utc::now()))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_keyword_fallback_without_embedder() {
        let searcher = Searcher::new(seeded_store().await, None);
        let results = searcher
            .search_function_definitions("quarterly reports", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.qualified_name, "reports::summarize");
    }

    #[tokio::test]
    async fn test_vector_search_skips_unembedded_definitions() {
        let searcher = Searcher::new(
            seeded_store().await,
            Some(Arc::new(MockEmbeddingProvider::new("mock", 8))),
        );
        let results = searcher
            .search_function_definitions("quarterly reports", 5)
            .await
            .unwrap();
        assert!(results.is_empty());

        let hybrid = searcher
            .search_function_definitions_hybrid("thumbnail image", 5, 0.5)
            .await
            .unwrap();
        assert_eq!(hybrid[0].item.qualified_name, "images::resize");
    }

    #[tokio::test]
    async fn test_execution_filters_and_sort() {
        let store = Arc::new(InMemoryVectorStore::new());
        let first = fixtures::success_record("m::f", json!({"x": 1}), json!(1), None);
        let failed = fixtures::error_record("m::f", "UPSTREAM_TIMEOUT", "timed out");
        let other = fixtures::success_record("m::g", json!({"x": 2}), json!(2), None);
        for record in [&first, &failed, &other] {
            store.put_execution(record).await.unwrap();
        }
        let searcher = Searcher::new(store, None);

        let newest_first = searcher
            .search_execution_records(10, BTreeMap::new(), None, false)
            .await
            .unwrap();
        assert_eq!(newest_first[0].execution_id, other.execution_id);

        let oldest_first = searcher
            .search_execution_records(10, BTreeMap::new(), Some("completed_at"), true)
            .await
            .unwrap();
        assert_eq!(oldest_first[0].execution_id, first.execution_id);

        let errors = searcher
            .search_execution_records(
                10,
                BTreeMap::from([("error_code".to_string(), json!("UPSTREAM_TIMEOUT"))]),
                None,
                false,
            )
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].execution_id, failed.execution_id);

        let by_message = searcher
            .search_errors_by_message("timed out", 5, BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(by_message.len(), 1);
    }
}
