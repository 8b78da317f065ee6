//! In-memory vector store

use crate::query::{evaluate, Scored, VectorQuery};
use crate::{VectorStore, EXECUTIONS};
use async_trait::async_trait;
use spanvec_core::{
    ExecutionRecord, FunctionDefinition, SpanvecError, SpanvecResult, StorageError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// In-memory vector store.
///
/// Locks are taken only to copy a snapshot or apply a write; scoring runs
/// on the snapshot with no lock held.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVectorStore {
    definitions: Arc<RwLock<HashMap<String, FunctionDefinition>>>,
    executions: Arc<RwLock<HashMap<Uuid, ExecutionRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store: every operation fails with
    /// `StorageError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        if let Ok(mut defs) = self.definitions.write() {
            defs.clear();
        }
        if let Ok(mut execs) = self.executions.write() {
            execs.clear();
        }
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn execution_count(&self) -> usize {
        self.executions.read().map(|e| e.len()).unwrap_or(0)
    }

    /// All execution records in ascending completion order.
    pub fn executions(&self) -> SpanvecResult<Vec<ExecutionRecord>> {
        let mut records = self.execution_snapshot()?;
        records.sort_by_key(|r| r.completed_at);
        Ok(records)
    }

    fn check_available(&self) -> SpanvecResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SpanvecError::Storage(StorageError::Unavailable {
                reason: "in-memory store marked unavailable".to_string(),
            }));
        }
        Ok(())
    }

    fn execution_snapshot(&self) -> SpanvecResult<Vec<ExecutionRecord>> {
        let execs = self
            .executions
            .read()
            .map_err(|_| SpanvecError::Storage(StorageError::LockPoisoned))?;
        Ok(execs.values().cloned().collect())
    }

    fn definition_snapshot(&self) -> SpanvecResult<Vec<FunctionDefinition>> {
        let defs = self
            .definitions
            .read()
            .map_err(|_| SpanvecError::Storage(StorageError::LockPoisoned))?;
        Ok(defs.values().cloned().collect())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn put_definition(&self, definition: &FunctionDefinition) -> SpanvecResult<bool> {
        self.check_available()?;
        let mut defs = self
            .definitions
            .write()
            .map_err(|_| SpanvecError::Storage(StorageError::LockPoisoned))?;
        if defs.contains_key(&definition.qualified_name) {
            return Ok(false);
        }
        defs.insert(definition.qualified_name.clone(), definition.clone());
        Ok(true)
    }

    async fn get_definition(
        &self,
        qualified_name: &str,
    ) -> SpanvecResult<Option<FunctionDefinition>> {
        self.check_available()?;
        let defs = self
            .definitions
            .read()
            .map_err(|_| SpanvecError::Storage(StorageError::LockPoisoned))?;
        Ok(defs.get(qualified_name).cloned())
    }

    async fn put_execution(&self, record: &ExecutionRecord) -> SpanvecResult<()> {
        self.check_available()?;
        let mut execs = self
            .executions
            .write()
            .map_err(|_| SpanvecError::Storage(StorageError::LockPoisoned))?;
        if execs.contains_key(&record.execution_id) {
            return Err(SpanvecError::Storage(StorageError::WriteFailed {
                collection: EXECUTIONS.to_string(),
                reason: format!("execution {} already exists", record.execution_id),
            }));
        }
        execs.insert(record.execution_id, record.clone());
        Ok(())
    }

    async fn put_executions(&self, records: &[ExecutionRecord]) -> SpanvecResult<()> {
        self.check_available()?;
        let mut execs = self
            .executions
            .write()
            .map_err(|_| SpanvecError::Storage(StorageError::LockPoisoned))?;
        for record in records {
            execs.entry(record.execution_id).or_insert_with(|| record.clone());
        }
        Ok(())
    }

    async fn query_definitions(
        &self,
        query: &VectorQuery,
    ) -> SpanvecResult<Vec<Scored<FunctionDefinition>>> {
        self.check_available()?;
        let snapshot = self.definition_snapshot()?;
        Ok(evaluate(query, snapshot))
    }

    async fn query_executions(
        &self,
        query: &VectorQuery,
    ) -> SpanvecResult<Vec<Scored<ExecutionRecord>>> {
        self.check_available()?;
        let snapshot = self.execution_snapshot()?;
        Ok(evaluate(query, snapshot))
    }

    async fn delete_executions(&self, execution_ids: &[Uuid]) -> SpanvecResult<usize> {
        self.check_available()?;
        let mut execs = self
            .executions
            .write()
            .map_err(|_| SpanvecError::Storage(StorageError::LockPoisoned))?;
        Ok(execution_ids
            .iter()
            .filter(|id| execs.remove(id).is_some())
            .count())
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use spanvec_core::{
        completion_timestamp, function_id, ExecutionStatus, ResolvedTagSet,
    };

    fn record(function: &str) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: Uuid::now_v7(),
            function_name: function.to_string(),
            function_id: function_id(function),
            trace_id: Uuid::now_v7(),
            span_id: Uuid::now_v7(),
            parent_span_id: None,
            started_at: chrono::Utc::now(),
            duration_ms: 0.0,
            status: ExecutionStatus::Success,
            failure: None,
            arguments: None,
            return_value: None,
            tags: ResolvedTagSet::new(),
            cache_hit: None,
            vector: None,
            completed_at: completion_timestamp(),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Queries never return more than `limit` items, and ascending sort
        /// on completion time is monotonic.
        #[test]
        fn prop_limit_and_sort_respected(count in 0usize..30, limit in 1usize..20) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let hits = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                for _ in 0..count {
                    store.put_execution(&record("m::f")).await.unwrap();
                }
                store
                    .query_executions(&VectorQuery::new(limit).sort_by("completed_at", true))
                    .await
                    .unwrap()
            });
            prop_assert_eq!(hits.len(), count.min(limit));
            prop_assert!(hits
                .windows(2)
                .all(|w| w[0].item.completed_at < w[1].item.completed_at));
        }
    }
}
