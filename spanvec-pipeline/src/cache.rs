//! Semantic cache decision engine.
//!
//! Arguments are rendered into comparison text scoped to the function name,
//! embedded, and compared against the stored vectors of that function's
//! previous successful, non-hit executions. The best match at or above the
//! threshold is a hit; ties go to the most recently completed record.

use serde_json::Value;
use spanvec_core::{EmbeddingVector, ExecutionStatus, SpanvecResult, MASK};
use spanvec_llm::{EmbeddingCache, EmbeddingProvider};
use spanvec_storage::{VectorQuery, VectorStore};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// ARGUMENT SERIALIZATION
// ============================================================================

/// Turns captured arguments into the text that is embedded for comparison.
pub trait ArgumentSerializer: Send + Sync {
    fn comparison_text(&self, function_name: &str, arguments: &Value) -> String;
}

/// Default serializer.
///
/// Renders `Function Context: <name>` followed by one line per argument:
/// positional values for arrays, `key: value` for objects (keys sorted).
/// Masked values are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextualSerializer;

impl ContextualSerializer {
    fn render(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn is_masked(value: &Value) -> bool {
        value.as_str() == Some(MASK)
    }
}

impl ArgumentSerializer for ContextualSerializer {
    fn comparison_text(&self, function_name: &str, arguments: &Value) -> String {
        let mut lines = vec![format!("Function Context: {}", function_name)];
        match arguments {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    let value = &map[key.as_str()];
                    if !Self::is_masked(value) {
                        lines.push(format!("{}: {}", key, Self::render(value)));
                    }
                }
            }
            Value::Array(items) => {
                lines.extend(
                    items
                        .iter()
                        .filter(|v| !Self::is_masked(v))
                        .map(Self::render),
                );
            }
            Value::Null => {}
            scalar => lines.push(Self::render(scalar)),
        }
        lines.join("\n")
    }
}

// ============================================================================
// CACHE DECISION
// ============================================================================

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheDecision {
    /// A prior result may be reused.
    Hit {
        value: Value,
        score: f32,
        source_execution_id: Uuid,
    },
    Miss,
}

impl CacheDecision {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheDecision::Hit { .. })
    }
}

/// Decides whether a call can be served from a prior execution.
pub struct SemanticCache {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    embeddings: Arc<EmbeddingCache>,
    serializer: Arc<dyn ArgumentSerializer>,
    candidate_limit: usize,
}

impl SemanticCache {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        embeddings: Arc<EmbeddingCache>,
        serializer: Arc<dyn ArgumentSerializer>,
        candidate_limit: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            embeddings,
            serializer,
            candidate_limit: candidate_limit.max(1),
        }
    }

    /// Embed the comparison text of `arguments` for `function_name`.
    ///
    /// Identical texts are embedded once per process.
    pub async fn embed_arguments(
        &self,
        function_name: &str,
        arguments: &Value,
    ) -> SpanvecResult<EmbeddingVector> {
        let text = self.serializer.comparison_text(function_name, arguments);
        self.embeddings
            .get_or_embed(self.embedder.as_ref(), &text)
            .await
    }

    /// Look up the best prior result for an already-embedded input.
    pub async fn lookup(
        &self,
        function_name: &str,
        query: &EmbeddingVector,
        threshold: f32,
    ) -> SpanvecResult<CacheDecision> {
        let request = VectorQuery::nearest(query.clone(), self.candidate_limit)
            .for_function(function_name)
            .filter("status", ExecutionStatus::Success.as_str())
            .filter("cache_hit", false);
        let candidates = self.store.query_executions(&request).await?;

        let best = candidates
            .into_iter()
            .filter(|c| c.item.function_name == function_name && c.item.is_cache_source())
            .filter_map(|c| c.score.map(|score| (score, c.item)))
            .filter(|(score, _)| *score >= threshold)
            .max_by(|(sa, a), (sb, b)| {
                sa.partial_cmp(sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.completed_at.cmp(&b.completed_at))
            });

        Ok(match best {
            Some((score, record)) => match record.return_value {
                Some(value) => CacheDecision::Hit {
                    value,
                    score,
                    source_execution_id: record.execution_id,
                },
                None => CacheDecision::Miss,
            },
            None => CacheDecision::Miss,
        })
    }

    /// Embed `arguments` and look them up in one step.
    pub async fn decide(
        &self,
        function_name: &str,
        arguments: &Value,
        threshold: f32,
    ) -> SpanvecResult<CacheDecision> {
        let query = self.embed_arguments(function_name, arguments).await?;
        self.lookup(function_name, &query, threshold).await
    }
}

impl std::fmt::Debug for SemanticCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticCache")
            .field("embedder", &self.embedder.model_id())
            .field("candidate_limit", &self.candidate_limit)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spanvec_storage::InMemoryVectorStore;
    use spanvec_test_utils::{fixtures, ScriptedEmbeddingProvider};

    fn cache(store: Arc<InMemoryVectorStore>, embedder: ScriptedEmbeddingProvider) -> SemanticCache {
        SemanticCache::new(
            store,
            Arc::new(embedder),
            Arc::new(EmbeddingCache::new(64)),
            Arc::new(ContextualSerializer),
            10,
        )
    }

    #[test]
    fn test_contextual_text_object_and_masking() {
        let text = ContextualSerializer.comparison_text(
            "reports::summarize",
            &json!({"text": "Q3 grew", "api_key": MASK, "limit": 3}),
        );
        assert_eq!(
            text,
            "Function Context: reports::summarize\nlimit: 3\ntext: Q3 grew"
        );
    }

    #[test]
    fn test_contextual_text_positional() {
        let text = ContextualSerializer.comparison_text("m::f", &json!(["a", 2, null]));
        assert_eq!(text, "Function Context: m::f\na\n2\nnull");
    }

    #[test]
    fn test_text_scoped_by_function() {
        let args = json!({"x": 1});
        assert_ne!(
            ContextualSerializer.comparison_text("m::f", &args),
            ContextualSerializer.comparison_text("m::g", &args)
        );
    }

    #[tokio::test]
    async fn test_hit_at_or_above_threshold() {
        let store = Arc::new(InMemoryVectorStore::new());
        let source = fixtures::success_record("m::f", json!({"x": "a"}), json!("cached"), Some(vec![1.0, 0.0]));
        store.put_execution(&source).await.unwrap();

        let engine = cache(store, ScriptedEmbeddingProvider::new(vec![0.96, 0.28]));
        match engine.decide("m::f", &json!({"x": "b"}), 0.95).await.unwrap() {
            CacheDecision::Hit {
                value,
                score,
                source_execution_id,
            } => {
                assert_eq!(value, json!("cached"));
                assert!((score - 0.96).abs() < 1e-4);
                assert_eq!(source_execution_id, source.execution_id);
            }
            CacheDecision::Miss => panic!("expected a hit"),
        }
    }

    #[tokio::test]
    async fn test_miss_below_threshold() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .put_execution(&fixtures::success_record("m::f", json!({}), json!(1), Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        let engine = cache(store, ScriptedEmbeddingProvider::new(vec![0.0, 1.0]));
        let decision = engine.decide("m::f", &json!({}), 0.5).await.unwrap();
        assert!(!decision.is_hit());
    }

    #[tokio::test]
    async fn test_never_crosses_functions_or_uses_hits_or_errors() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .put_execution(&fixtures::success_record("m::other", json!({}), json!(1), Some(vec![1.0, 0.0])))
            .await
            .unwrap();

        let mut hit = fixtures::success_record("m::f", json!({}), json!(2), Some(vec![1.0, 0.0]));
        hit.cache_hit = Some(spanvec_core::CacheHitInfo {
            score: 1.0,
            source_execution_id: Uuid::now_v7(),
        });
        store.put_execution(&hit).await.unwrap();

        let mut failed = fixtures::error_record("m::f", "BOOM", "boom");
        failed.vector = Some(EmbeddingVector::new(vec![1.0, 0.0], "test-model"));
        store.put_execution(&failed).await.unwrap();

        let engine = cache(store, ScriptedEmbeddingProvider::new(vec![1.0, 0.0]));
        let decision = engine.decide("m::f", &json!({}), 0.5).await.unwrap();
        assert_eq!(decision, CacheDecision::Miss);
    }

    #[tokio::test]
    async fn test_tie_broken_by_latest_completion() {
        let store = Arc::new(InMemoryVectorStore::new());
        let older = fixtures::success_record("m::f", json!({}), json!("old"), Some(vec![1.0, 0.0]));
        let newer = fixtures::success_record("m::f", json!({}), json!("new"), Some(vec![1.0, 0.0]));
        store.put_execution(&newer).await.unwrap();
        store.put_execution(&older).await.unwrap();

        let engine = cache(store, ScriptedEmbeddingProvider::new(vec![1.0, 0.0]));
        match engine.decide("m::f", &json!({}), 0.9).await.unwrap() {
            CacheDecision::Hit { value, .. } => assert_eq!(value, json!("new")),
            CacheDecision::Miss => panic!("expected a hit"),
        }
    }

    #[tokio::test]
    async fn test_higher_score_beats_recency() {
        let store = Arc::new(InMemoryVectorStore::new());
        let closer = fixtures::success_record("m::f", json!({}), json!("closer"), Some(vec![1.0, 0.0]));
        let later = fixtures::success_record("m::f", json!({}), json!("later"), Some(vec![0.96, 0.28]));
        store.put_execution(&closer).await.unwrap();
        store.put_execution(&later).await.unwrap();

        let engine = cache(store, ScriptedEmbeddingProvider::new(vec![1.0, 0.0]));
        match engine.decide("m::f", &json!({}), 0.9).await.unwrap() {
            CacheDecision::Hit { value, .. } => assert_eq!(value, json!("closer")),
            CacheDecision::Miss => panic!("expected a hit"),
        }
    }

    #[tokio::test]
    async fn test_identical_text_embedded_once() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(ScriptedEmbeddingProvider::new(vec![1.0, 0.0]));
        let engine = SemanticCache::new(
            store,
            embedder.clone(),
            Arc::new(EmbeddingCache::new(64)),
            Arc::new(ContextualSerializer),
            10,
        );
        engine.embed_arguments("m::f", &json!({"x": 1})).await.unwrap();
        engine.embed_arguments("m::f", &json!({"x": 1})).await.unwrap();
        assert_eq!(embedder.calls(), 1);
    }
}
