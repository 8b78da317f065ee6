//! Definition registration.
//!
//! Definitions are written once per qualified name. Functions wrapped with
//! `auto` documentation are queued here and only documented and committed
//! when [`DeferredRegistrar::flush`] is called explicitly.

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use spanvec_core::{DefinitionDraft, FunctionDefinition, SpanvecError, SpanvecResult, StorageError};
use spanvec_llm::{DocumentationProvider, EmbeddingProvider};
use spanvec_storage::VectorStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

/// Write a definition, embedding its search text when an embedder is
/// configured. An embedding failure stores the definition without a vector.
///
/// # Returns
/// * `Ok(true)` - The definition was written
/// * `Ok(false)` - A definition with this qualified name already existed
pub async fn register_definition(
    store: &dyn VectorStore,
    embedder: Option<&dyn EmbeddingProvider>,
    mut definition: FunctionDefinition,
) -> SpanvecResult<bool> {
    if let Some(embedder) = embedder {
        match embedder.embed(&definition.search_text()).await {
            Ok(vector) => definition.vector = Some(vector),
            Err(e) => tracing::warn!(
                function = %definition.qualified_name,
                error = %e,
                "Definition embedding failed, storing without vector"
            ),
        }
    }
    let written = store.put_definition(&definition).await?;
    if written {
        tracing::debug!(function = %definition.qualified_name, "Function definition registered");
    }
    Ok(written)
}

/// A flush failure for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushFailure {
    pub function: String,
    pub reason: String,
}

/// Outcome of [`DeferredRegistrar::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Definitions written by this flush
    pub committed: Vec<String>,
    /// Already present in the store; nothing written
    pub already_registered: Vec<String>,
    /// Returned to the pending set
    pub failed: Vec<FlushFailure>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.already_registered.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct RegistrarState {
    pending: BTreeMap<String, DefinitionDraft>,
    in_flight: HashSet<String>,
    committed: HashSet<String>,
}

enum Outcome {
    Written,
    Existing,
    Failed(DefinitionDraft, String),
}

/// Two-phase registrar: `enqueue` now, document and commit on `flush`.
pub struct DeferredRegistrar {
    store: Arc<dyn VectorStore>,
    documenter: Option<Arc<dyn DocumentationProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    state: Mutex<RegistrarState>,
}

impl DeferredRegistrar {
    pub fn new(
        store: Arc<dyn VectorStore>,
        documenter: Option<Arc<dyn DocumentationProvider>>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            store,
            documenter,
            embedder,
            state: Mutex::new(RegistrarState::default()),
        }
    }

    fn lock(&self) -> SpanvecResult<std::sync::MutexGuard<'_, RegistrarState>> {
        self.state
            .lock()
            .map_err(|_| SpanvecError::Storage(StorageError::LockPoisoned))
    }

    /// Queue a draft for documentation.
    ///
    /// Returns `false` when the function is already pending, being flushed
    /// or committed.
    pub fn enqueue(&self, draft: DefinitionDraft) -> SpanvecResult<bool> {
        let mut state = self.lock()?;
        let name = &draft.qualified_name;
        if state.committed.contains(name)
            || state.in_flight.contains(name)
            || state.pending.contains_key(name)
        {
            return Ok(false);
        }
        state.pending.insert(name.clone(), draft);
        Ok(true)
    }

    pub fn is_pending(&self, qualified_name: &str) -> bool {
        self.lock()
            .map(|s| s.pending.contains_key(qualified_name) || s.in_flight.contains(qualified_name))
            .unwrap_or(false)
    }

    pub fn is_committed(&self, qualified_name: &str) -> bool {
        self.lock()
            .map(|s| s.committed.contains(qualified_name))
            .unwrap_or(false)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Document and commit every pending draft.
    ///
    /// Safe to call concurrently with `enqueue` and with itself: drafts are
    /// moved to an in-flight set under the lock, so each is processed by
    /// exactly one flush. Failed drafts return to the pending set.
    pub async fn flush(&self) -> SpanvecResult<FlushReport> {
        let batch: Vec<DefinitionDraft> = {
            let mut state = self.lock()?;
            let drafts: Vec<DefinitionDraft> =
                std::mem::take(&mut state.pending).into_values().collect();
            for draft in &drafts {
                state.in_flight.insert(draft.qualified_name.clone());
            }
            drafts
        };

        if batch.is_empty() {
            return Ok(FlushReport::default());
        }
        if self.documenter.is_none() {
            tracing::warn!(
                count = batch.len(),
                "No documentation provider configured, committing authored documentation"
            );
        }

        let outcomes = join_all(batch.into_iter().map(|draft| self.commit(draft))).await;

        // The in-flight drafts must be settled even if another thread
        // panicked while holding the lock.
        let mut report = FlushReport::default();
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Registrar lock poisoned during flush, recovering state");
            poisoned.into_inner()
        });
        for (name, outcome) in outcomes {
            state.in_flight.remove(&name);
            match outcome {
                Outcome::Written => {
                    state.committed.insert(name.clone());
                    report.committed.push(name);
                }
                Outcome::Existing => {
                    state.committed.insert(name.clone());
                    report.already_registered.push(name);
                }
                Outcome::Failed(draft, reason) => {
                    state.pending.entry(name.clone()).or_insert(draft);
                    report.failed.push(FlushFailure {
                        function: name,
                        reason,
                    });
                }
            }
        }
        drop(state);

        tracing::info!(
            committed = report.committed.len(),
            already_registered = report.already_registered.len(),
            failed = report.failed.len(),
            "Deferred registration flushed"
        );
        Ok(report)
    }

    async fn commit(&self, draft: DefinitionDraft) -> (String, Outcome) {
        let name = draft.qualified_name.clone();
        let definition = match &self.documenter {
            Some(documenter) => match documenter.document(&draft).await {
                Ok(docs) => draft
                    .clone()
                    .with_generated(docs, documenter.model_id(), Utc::now()),
                Err(e) => {
                    tracing::warn!(function = %name, error = %e, "Documentation generation failed");
                    return (name, Outcome::Failed(draft, e.to_string()));
                }
            },
            None => draft.clone().into_definition(Utc::now()),
        };

        let outcome = match register_definition(
            self.store.as_ref(),
            self.embedder.as_deref(),
            definition,
        )
        .await
        {
            Ok(true) => Outcome::Written,
            Ok(false) => Outcome::Existing,
            Err(e) => {
                tracing::warn!(function = %name, error = %e, "Definition write failed");
                Outcome::Failed(draft, e.to_string())
            }
        };
        (name, outcome)
    }
}

impl std::fmt::Debug for DeferredRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredRegistrar")
            .field("documenter", &self.documenter.as_ref().map(|d| d.model_id().to_string()))
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
