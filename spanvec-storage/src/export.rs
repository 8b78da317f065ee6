//! Golden dataset export
//!
//! Successful, non-cache-hit executions with both arguments and return value
//! captured are written as JSON lines `{"input": ..., "output": ...}` in
//! ascending completion order.

use crate::{VectorQuery, VectorStore, EXECUTIONS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spanvec_core::{ExecutionStatus, SpanvecError, SpanvecResult, StorageError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

/// One exported input/output pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenExample {
    pub input: Value,
    pub output: Value,
}

/// Outcome of an export run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    /// Lines written
    pub exported: usize,
    /// Successful records lacking captured arguments or return value
    pub skipped: usize,
    /// Records removed from the store after export
    pub deleted: usize,
}

fn write_failed(reason: impl std::fmt::Display) -> SpanvecError {
    SpanvecError::Storage(StorageError::WriteFailed {
        collection: "golden-export".to_string(),
        reason: reason.to_string(),
    })
}

/// Export the golden dataset of one function to `writer`.
///
/// # Arguments
/// * `store` - Source of execution records
/// * `function_name` - Qualified function name to export
/// * `writer` - JSONL sink
/// * `clear_after_export` - Delete the exported records from the store
pub async fn export_golden_dataset<W: Write>(
    store: &dyn VectorStore,
    function_name: &str,
    mut writer: W,
    clear_after_export: bool,
) -> SpanvecResult<ExportReport> {
    let query = VectorQuery::new(usize::MAX)
        .for_function(function_name)
        .filter("status", ExecutionStatus::Success.as_str())
        .filter("cache_hit", false)
        .sort_by("completed_at", true);
    let records = store.query_executions(&query).await?;

    let mut report = ExportReport::default();
    let mut exported_ids: Vec<Uuid> = Vec::new();

    for scored in records {
        let record = scored.item;
        let (Some(input), Some(output)) = (record.arguments, record.return_value) else {
            report.skipped += 1;
            continue;
        };
        let example = GoldenExample { input, output };
        serde_json::to_writer(&mut writer, &example).map_err(write_failed)?;
        writer.write_all(b"\n").map_err(write_failed)?;
        exported_ids.push(record.execution_id);
        report.exported += 1;
    }
    writer.flush().map_err(write_failed)?;

    if clear_after_export && !exported_ids.is_empty() {
        report.deleted = store.delete_executions(&exported_ids).await?;
    }

    tracing::info!(
        function = function_name,
        collection = EXECUTIONS,
        exported = report.exported,
        skipped = report.skipped,
        deleted = report.deleted,
        "Golden dataset exported"
    );
    Ok(report)
}

/// Export the golden dataset of one function to a file, creating parent
/// directories as needed. An existing file is overwritten.
pub async fn archive_executions(
    store: &dyn VectorStore,
    function_name: &str,
    path: impl AsRef<Path>,
    clear_after_export: bool,
) -> SpanvecResult<ExportReport> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_failed)?;
    }
    let file = File::create(path).map_err(write_failed)?;
    export_golden_dataset(store, function_name, BufWriter::new(file), clear_after_export).await
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryVectorStore;
    use chrono::Utc;
    use serde_json::json;
    use spanvec_core::{
        completion_timestamp, function_id, CacheHitInfo, ExecutionFailure, ExecutionRecord,
        ResolvedTagSet,
    };

    fn record(function: &str, args: Option<Value>, ret: Option<Value>) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: Uuid::now_v7(),
            function_name: function.to_string(),
            function_id: function_id(function),
            trace_id: Uuid::now_v7(),
            span_id: Uuid::now_v7(),
            parent_span_id: None,
            started_at: Utc::now(),
            duration_ms: 1.0,
            status: ExecutionStatus::Success,
            failure: None,
            arguments: args,
            return_value: ret,
            tags: ResolvedTagSet::new(),
            cache_hit: None,
            vector: None,
            completed_at: completion_timestamp(),
        }
    }

    async fn seeded() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store
            .put_execution(&record("m::f", Some(json!({"idx": 1})), Some(json!(10))))
            .await
            .unwrap();
        store
            .put_execution(&record("m::f", Some(json!({"idx": 2})), Some(json!(20))))
            .await
            .unwrap();
        // Skipped: no captured return value.
        store
            .put_execution(&record("m::f", Some(json!({"idx": 3})), None))
            .await
            .unwrap();

        let mut failed = record("m::f", Some(json!({"idx": 4})), None);
        failed.status = ExecutionStatus::Error;
        failed.failure = Some(ExecutionFailure {
            error_code: "BOOM".to_string(),
            error_message: "boom".to_string(),
        });
        store.put_execution(&failed).await.unwrap();

        let mut hit = record("m::f", Some(json!({"idx": 1})), Some(json!(10)));
        hit.cache_hit = Some(CacheHitInfo {
            score: 0.99,
            source_execution_id: Uuid::now_v7(),
        });
        store.put_execution(&hit).await.unwrap();

        store
            .put_execution(&record("m::g", Some(json!({})), Some(json!(0))))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_export_writes_ordered_jsonl() {
        let store = seeded().await;
        let mut out = Vec::new();
        let report = export_golden_dataset(&store, "m::f", &mut out, false)
            .await
            .unwrap();

        assert_eq!(report.exported, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted, 0);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<GoldenExample> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0].input, json!({"idx": 1}));
        assert_eq!(lines[0].output, json!(10));
        assert_eq!(lines[1].output, json!(20));
        assert_eq!(store.execution_count(), 6);
    }

    #[tokio::test]
    async fn test_export_clear_deletes_only_exported() {
        let store = seeded().await;
        let report = export_golden_dataset(&store, "m::f", std::io::sink(), true)
            .await
            .unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(store.execution_count(), 4);
    }

    #[tokio::test]
    async fn test_archive_creates_file() {
        let store = seeded().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("archive.jsonl");
        let report = archive_executions(&store, "m::f", &path, false).await.unwrap();
        assert_eq!(report.exported, 2);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_export_unknown_function_is_empty() {
        let store = seeded().await;
        let mut out = Vec::new();
        let report = export_golden_dataset(&store, "m::missing", &mut out, true)
            .await
            .unwrap();
        assert_eq!(report, ExportReport::default());
        assert!(out.is_empty());
    }
}
