//! SPANVEC LLM - Provider Abstraction Layer
//!
//! Provider-agnostic traits for embeddings and function documentation.
//! The interception pipeline depends only on these traits; concrete HTTP
//! providers live under [`providers`].

pub mod providers;

use async_trait::async_trait;
use spanvec_core::{
    compute_content_hash, DefinitionDraft, EmbeddingVector, GeneratedDocumentation, SpanvecResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

// ============================================================================
// EMBEDDING PROVIDER TRAIT
// ============================================================================

/// Trait for embedding providers.
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct LocalEmbedder { /* ... */ }
///
/// #[async_trait]
/// impl EmbeddingProvider for LocalEmbedder {
///     async fn embed(&self, text: &str) -> SpanvecResult<EmbeddingVector> {
///         // Run the model
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    ///
    /// # Arguments
    /// * `text` - The text to embed
    ///
    /// # Returns
    /// * `Ok(EmbeddingVector)` - The embedding vector
    /// * `Err(SpanvecError::Llm)` - If embedding fails
    async fn embed(&self, text: &str) -> SpanvecResult<EmbeddingVector>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// # Returns
    /// * `Ok(Vec<EmbeddingVector>)` - Embedding vectors in same order as input
    /// * `Err(SpanvecError::Llm)` - If embedding fails
    async fn embed_batch(&self, texts: &[&str]) -> SpanvecResult<Vec<EmbeddingVector>>;

    /// Get the number of dimensions this provider produces.
    fn dimensions(&self) -> i32;

    /// Get the model identifier for this provider.
    fn model_id(&self) -> &str;
}

// ============================================================================
// DOCUMENTATION PROVIDER TRAIT
// ============================================================================

/// Trait for providers that write a function's search description and
/// sequence narrative from its static properties.
///
/// Only ever invoked from an explicit registrar flush.
#[async_trait]
pub trait DocumentationProvider: Send + Sync {
    /// Generate documentation for a function draft.
    ///
    /// # Returns
    /// * `Ok(GeneratedDocumentation)` - Description and narrative
    /// * `Err(SpanvecError::Llm)` - If generation fails
    async fn document(&self, draft: &DefinitionDraft) -> SpanvecResult<GeneratedDocumentation>;

    /// Get the model identifier for this provider.
    fn model_id(&self) -> &str;
}

/// Build the user prompt describing a function draft.
pub fn documentation_prompt(draft: &DefinitionDraft) -> String {
    let mut prompt = format!("Function: {}\n", draft.qualified_name);
    if let Some(doc) = &draft.docstring {
        prompt.push_str(&format!("Docstring:\n{}\n", doc));
    }
    if let Some(source) = &draft.source_code {
        prompt.push_str(&format!("Source:\n{}\n", source));
    }
    prompt
}

// ============================================================================
// EMBEDDING CACHE
// ============================================================================

/// Cache for embedding vectors to avoid redundant provider calls.
/// Keyed by the SHA-256 of model id and text. Thread-safe via RwLock.
pub struct EmbeddingCache {
    cache: RwLock<HashMap<[u8; 32], EmbeddingVector>>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a new embedding cache with specified maximum size.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key for a text embedded by a given model.
    pub fn key(model_id: &str, text: &str) -> [u8; 32] {
        let mut material = Vec::with_capacity(model_id.len() + text.len() + 1);
        material.extend_from_slice(model_id.as_bytes());
        material.push(0x1f);
        material.extend_from_slice(text.as_bytes());
        compute_content_hash(&material)
    }

    pub fn get(&self, hash: &[u8; 32]) -> Option<EmbeddingVector> {
        self.cache.read().ok()?.get(hash).cloned()
    }

    /// Insert an embedding. If the cache is full, this is a no-op.
    pub fn insert(&self, hash: [u8; 32], embedding: EmbeddingVector) {
        if let Ok(mut cache) = self.cache.write() {
            if cache.len() < self.max_size {
                cache.insert(hash, embedding);
            }
        }
    }

    /// Return the cached embedding for `text`, embedding it on a miss.
    ///
    /// The lock is never held across the provider call.
    pub async fn get_or_embed(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
    ) -> SpanvecResult<EmbeddingVector> {
        let key = Self::key(provider.model_id(), text);
        if let Some(hit) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = provider.embed(text).await?;
        self.insert(key, vector.clone());
        Ok(vector)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
