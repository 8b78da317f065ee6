//! SPANVEC Storage - Vector Store Trait and In-Memory Implementation
//!
//! Defines the vector store boundary consumed by the cache decision engine,
//! the record writers and the search entry points. The in-memory store is
//! the reference implementation used by tests and embedded deployments.

pub mod batch;
pub mod export;
pub mod memory;
pub mod query;

pub use batch::{BatchWriter, BatchWriterStats};
pub use export::{archive_executions, export_golden_dataset, ExportReport, GoldenExample};
pub use memory::InMemoryVectorStore;
pub use query::{Queryable, Scored, Similarity, SortSpec, VectorQuery};

use async_trait::async_trait;
use spanvec_core::{ExecutionRecord, FunctionDefinition, SpanvecResult};
use uuid::Uuid;

/// Collection name for function definitions.
pub const DEFINITIONS: &str = "definitions";
/// Collection name for execution records.
pub const EXECUTIONS: &str = "executions";

// ============================================================================
// VECTOR STORE TRAIT
// ============================================================================

/// Async vector store for definitions and execution records.
///
/// Implementations must not hold locks across awaits; callers may invoke
/// every method concurrently from independent call trees.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a definition if none exists for its qualified name.
    ///
    /// # Returns
    /// * `Ok(true)` - The definition was written
    /// * `Ok(false)` - A definition already existed; nothing changed
    async fn put_definition(&self, definition: &FunctionDefinition) -> SpanvecResult<bool>;

    /// Get a definition by qualified name.
    async fn get_definition(&self, qualified_name: &str)
        -> SpanvecResult<Option<FunctionDefinition>>;

    /// Insert one execution record.
    async fn put_execution(&self, record: &ExecutionRecord) -> SpanvecResult<()>;

    /// Insert a batch of execution records.
    async fn put_executions(&self, records: &[ExecutionRecord]) -> SpanvecResult<()> {
        for record in records {
            self.put_execution(record).await?;
        }
        Ok(())
    }

    /// Query definitions.
    async fn query_definitions(
        &self,
        query: &VectorQuery,
    ) -> SpanvecResult<Vec<Scored<FunctionDefinition>>>;

    /// Query execution records.
    async fn query_executions(
        &self,
        query: &VectorQuery,
    ) -> SpanvecResult<Vec<Scored<ExecutionRecord>>>;

    /// Delete execution records by id, returning how many existed.
    async fn delete_executions(&self, execution_ids: &[Uuid]) -> SpanvecResult<usize>;
}
