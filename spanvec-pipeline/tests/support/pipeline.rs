#![allow(dead_code)]

use spanvec_core::{FailureMapping, PropertySchema};
use spanvec_llm::EmbeddingProvider;
use spanvec_pipeline::{
    AlertSink, ClassifiableError, GlobalTags, Interceptor, InterceptorBuilder, MemoryAlerter,
};
use spanvec_storage::InMemoryVectorStore;
use spanvec_test_utils::fixtures;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A business error with no code of its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value: {0}")]
pub struct ValueError(pub String);

impl ClassifiableError for ValueError {}

/// A business error that is not in the sample mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("quota exhausted")]
pub struct QuotaExceeded;

impl ClassifiableError for QuotaExceeded {}

/// A business error that may carry its own code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("payment failed")]
pub struct PaymentError {
    pub code: Option<String>,
}

impl ClassifiableError for PaymentError {
    fn error_code(&self) -> Option<String> {
        self.code.clone()
    }
}

/// Everything a pipeline test needs.
pub struct Harness {
    pub store: Arc<InMemoryVectorStore>,
    pub alerts: Arc<MemoryAlerter>,
    pub interceptor: Interceptor,
}

/// Builder preloaded with the sample schema and mapping, no process-wide
/// tags and an in-memory alert sink.
pub fn builder(store: Arc<InMemoryVectorStore>, alerts: Arc<MemoryAlerter>) -> InterceptorBuilder {
    let sink: Arc<dyn AlertSink> = alerts;
    InterceptorBuilder::new(store)
        .schema(fixtures::sample_schema())
        .failure_mapping(fixtures::sample_failure_mapping())
        .global_tags(GlobalTags::empty())
        .alert_sink(sink)
}

pub fn harness() -> Harness {
    harness_with(|b| b)
}

pub fn harness_with_embedder(embedder: Arc<dyn EmbeddingProvider>) -> Harness {
    harness_with(move |b| b.embedder(embedder))
}

pub fn harness_with<F>(configure: F) -> Harness
where
    F: FnOnce(InterceptorBuilder) -> InterceptorBuilder,
{
    let store = Arc::new(InMemoryVectorStore::new());
    let alerts = Arc::new(MemoryAlerter::new());
    let interceptor = configure(builder(store.clone(), alerts.clone()))
        .build()
        .expect("interceptor builds");
    Harness {
        store,
        alerts,
        interceptor,
    }
}

pub fn empty_schema() -> PropertySchema {
    PropertySchema::empty()
}

pub fn empty_mapping() -> FailureMapping {
    FailureMapping::empty()
}

/// Counts how many times a function body actually ran.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
