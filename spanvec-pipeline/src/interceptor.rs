//! Call Interceptor
//!
//! Wraps an async function so every call is traced, tagged, optionally
//! served from the semantic cache, and recorded as exactly one execution
//! record. The wrapped function's own result or error always reaches the
//! caller unchanged; storage, embedding and alert failures are logged and
//! skipped.

use crate::alert::{AlertDispatcher, AlertPayload, AlertSink, LogAlerter, WebhookAlerter};
use crate::cache::{ArgumentSerializer, CacheDecision, ContextualSerializer, SemanticCache};
use crate::classify::{error_chain, ClassifiableError, ErrorClassifier};
use crate::registrar::{register_definition, DeferredRegistrar, FlushReport};
use crate::search::Searcher;
use crate::tags::{GlobalTags, TagResolver};
use crate::trace::TraceContext;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use spanvec_core::{
    completion_timestamp, function_id, new_execution_id, BatchConfig, CacheHitInfo, ConfigError,
    DefinitionDraft, EmbeddingVector, ExecutionFailure, ExecutionRecord, ExecutionStatus,
    FailureMapping, FunctionId, PropertySchema, ResolvedTagSet, SensitiveFields, SpanvecConfig,
    SpanvecResult, TagValue, Timestamp,
};
use spanvec_llm::{DocumentationProvider, EmbeddingCache, EmbeddingProvider};
use spanvec_storage::{BatchWriter, BatchWriterStats, VectorStore};
use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

// ============================================================================
// FUNCTION SOURCE
// ============================================================================

/// Static identity of a wrapped function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSource {
    pub module_path: String,
    pub name: String,
    pub source_code: Option<String>,
    pub docstring: Option<String>,
}

impl FunctionSource {
    pub fn new(module_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            name: name.into(),
            source_code: None,
            docstring: None,
        }
    }

    pub fn with_source_code(mut self, source_code: impl Into<String>) -> Self {
        self.source_code = Some(source_code.into());
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn qualified_name(&self) -> String {
        self.draft().qualified_name
    }

    fn draft(&self) -> DefinitionDraft {
        let mut draft = DefinitionDraft::new(self.module_path.clone(), self.name.clone());
        draft.source_code = self.source_code.clone();
        draft.docstring = self.docstring.clone();
        draft
    }
}

/// Build a [`FunctionSource`] for a function in the calling module.
///
/// ```ignore
/// let source = function_source!(summarize);
/// let source = function_source!(summarize, "Summarize a report.");
/// ```
#[macro_export]
macro_rules! function_source {
    ($name:ident) => {
        $crate::FunctionSource::new(module_path!(), stringify!($name))
    };
    ($name:ident, $doc:expr) => {
        $crate::FunctionSource::new(module_path!(), stringify!($name)).with_docstring($doc)
    };
}

// ============================================================================
// WRAP OPTIONS
// ============================================================================

/// Per-function interception options.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapOptions {
    pub search_description: Option<String>,
    pub sequence_narrative: Option<String>,
    /// Generate documentation on the next registrar flush instead of
    /// registering the authored fields at first call
    pub auto: bool,
    /// Serve similar calls from stored (masked) return values
    pub semantic_cache: bool,
    /// Required when `semantic_cache` is set, in `[0, 1]`
    pub cache_threshold: Option<f32>,
    pub capture_arguments: bool,
    pub capture_return_value: bool,
    /// Capture arguments and return values for regression replay
    pub replay: bool,
    pub tags: BTreeMap<String, TagValue>,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            search_description: None,
            sequence_narrative: None,
            auto: false,
            semantic_cache: false,
            cache_threshold: None,
            capture_arguments: true,
            capture_return_value: false,
            replay: false,
            tags: BTreeMap::new(),
        }
    }
}

impl WrapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_description(mut self, description: impl Into<String>) -> Self {
        self.search_description = Some(description.into());
        self
    }

    pub fn sequence_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.sequence_narrative = Some(narrative.into());
        self
    }

    pub fn auto(mut self) -> Self {
        self.auto = true;
        self
    }

    /// Enable the semantic cache with a similarity threshold.
    ///
    /// A hit returns the return value as it was stored, after masking, so
    /// sensitive fields come back as [`spanvec_core::MASK`]. Do not cache
    /// functions whose callers read such fields from the result.
    pub fn semantic_cache(mut self, threshold: f32) -> Self {
        self.semantic_cache = true;
        self.cache_threshold = Some(threshold);
        self
    }

    pub fn capture_arguments(mut self, capture: bool) -> Self {
        self.capture_arguments = capture;
        self
    }

    pub fn capture_return_value(mut self, capture: bool) -> Self {
        self.capture_return_value = capture;
        self
    }

    pub fn replay(mut self) -> Self {
        self.replay = true;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Validate option combinations.
    ///
    /// # Returns
    /// * `Err(ConfigError::MissingRequired)` - Cache enabled without a threshold
    /// * `Err(ConfigError::InvalidValue)` - Threshold outside `[0, 1]`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.semantic_cache {
            return Ok(());
        }
        match self.cache_threshold {
            None => Err(ConfigError::MissingRequired {
                field: "cache_threshold".to_string(),
            }),
            Some(t) if !(0.0..=1.0).contains(&t) => Err(ConfigError::InvalidValue {
                field: "cache_threshold".to_string(),
                value: t.to_string(),
                reason: "threshold must be between 0 and 1".to_string(),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Everything the interceptor needs about one wrapped function.
#[derive(Debug)]
struct WrappedFunction {
    name: String,
    function_id: FunctionId,
    draft: DefinitionDraft,
    auto: bool,
    call_tags: ResolvedTagSet,
    capture_arguments: bool,
    capture_return: bool,
    cache_threshold: Option<f32>,
    registered: AtomicBool,
}

// ============================================================================
// INTERCEPTOR
// ============================================================================

enum RecordSink {
    Inline,
    Batched(BatchWriter),
}

struct InterceptorInner {
    store: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    embeddings: Arc<EmbeddingCache>,
    cache: Option<SemanticCache>,
    tags: TagResolver,
    classifier: ErrorClassifier,
    sensitive: SensitiveFields,
    alerts: AlertDispatcher,
    registrar: DeferredRegistrar,
    sink: RecordSink,
    record_cache_hits: bool,
}

/// Shared interception pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<InterceptorInner>,
}

/// Builder for [`Interceptor`].
pub struct InterceptorBuilder {
    store: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    documenter: Option<Arc<dyn DocumentationProvider>>,
    schema: PropertySchema,
    global_tags: Option<GlobalTags>,
    failure_mapping: FailureMapping,
    sensitive: SensitiveFields,
    ignored_error_codes: Vec<String>,
    alert_sink: Arc<dyn AlertSink>,
    serializer: Arc<dyn ArgumentSerializer>,
    record_cache_hits: bool,
    candidate_limit: usize,
    embedding_cache_size: usize,
    batch: Option<BatchConfig>,
}

impl InterceptorBuilder {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        let defaults = SpanvecConfig::default();
        Self {
            store,
            embedder: None,
            documenter: None,
            schema: PropertySchema::empty(),
            global_tags: None,
            failure_mapping: FailureMapping::empty(),
            sensitive: SensitiveFields::new(&defaults.sensitive_fields),
            ignored_error_codes: Vec::new(),
            alert_sink: Arc::new(LogAlerter),
            serializer: Arc::new(ContextualSerializer),
            record_cache_hits: defaults.record_cache_hits,
            candidate_limit: defaults.cache_candidate_limit,
            embedding_cache_size: defaults.embedding_cache_size,
            batch: None,
        }
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn documenter(mut self, documenter: Arc<dyn DocumentationProvider>) -> Self {
        self.documenter = Some(documenter);
        self
    }

    pub fn schema(mut self, schema: PropertySchema) -> Self {
        self.schema = schema;
        self
    }

    /// Process-wide tags. When not given, they are read from the environment
    /// at build time.
    pub fn global_tags(mut self, tags: GlobalTags) -> Self {
        self.global_tags = Some(tags);
        self
    }

    pub fn failure_mapping(mut self, mapping: FailureMapping) -> Self {
        self.failure_mapping = mapping;
        self
    }

    pub fn sensitive_fields(mut self, fields: SensitiveFields) -> Self {
        self.sensitive = fields;
        self
    }

    pub fn ignored_error_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_error_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = sink;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn ArgumentSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn record_cache_hits(mut self, record: bool) -> Self {
        self.record_cache_hits = record;
        self
    }

    pub fn candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn embedding_cache_size(mut self, size: usize) -> Self {
        self.embedding_cache_size = size;
        self
    }

    /// Write records through a background batch writer.
    pub fn batch(mut self, config: BatchConfig) -> Self {
        self.batch = Some(config);
        self
    }

    /// Build the interceptor.
    ///
    /// With batching enabled this must run inside a tokio runtime, which the
    /// writer task is spawned on.
    pub fn build(self) -> SpanvecResult<Interceptor> {
        let schema = Arc::new(self.schema);
        let global = self
            .global_tags
            .unwrap_or_else(|| GlobalTags::from_env(&schema));
        let tags = TagResolver::new(schema, global);

        let embeddings = Arc::new(EmbeddingCache::new(self.embedding_cache_size));
        let cache = self.embedder.as_ref().map(|embedder| {
            SemanticCache::new(
                Arc::clone(&self.store),
                Arc::clone(embedder),
                Arc::clone(&embeddings),
                Arc::clone(&self.serializer),
                self.candidate_limit,
            )
        });

        let sink = match self.batch {
            Some(config) => {
                if config.threshold == 0 || config.queue_capacity == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "batch".to_string(),
                        value: format!("{:?}", config),
                        reason: "threshold and queue_capacity must be greater than 0".to_string(),
                    }
                    .into());
                }
                if config.flush_interval.is_zero() {
                    return Err(ConfigError::InvalidValue {
                        field: "batch.flush_interval".to_string(),
                        value: format!("{:?}", config.flush_interval),
                        reason: "flush interval must be greater than 0".to_string(),
                    }
                    .into());
                }
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(ConfigError::IncompatibleOptions {
                        option_a: "async_logging".to_string(),
                        option_b: "no tokio runtime".to_string(),
                    }
                    .into());
                }
                RecordSink::Batched(BatchWriter::start(Arc::clone(&self.store), &config))
            }
            None => RecordSink::Inline,
        };

        let registrar =
            DeferredRegistrar::new(Arc::clone(&self.store), self.documenter, self.embedder.clone());
        let alerts = AlertDispatcher::new(self.alert_sink, self.ignored_error_codes);

        tracing::info!(
            schema_keys = tags.schema().len(),
            global_tags = tags.global().len(),
            failure_mappings = self.failure_mapping.len(),
            embedder = self.embedder.as_ref().map(|e| e.model_id()).unwrap_or("none"),
            alert_sink = alerts.sink_name(),
            batched = matches!(sink, RecordSink::Batched(_)),
            "Interceptor initialized"
        );

        Ok(Interceptor {
            inner: Arc::new(InterceptorInner {
                store: self.store,
                embedder: self.embedder,
                embeddings,
                cache,
                tags,
                classifier: ErrorClassifier::new(self.failure_mapping),
                sensitive: self.sensitive,
                alerts,
                registrar,
                sink,
                record_cache_hits: self.record_cache_hits,
            }),
        })
    }
}

impl Interceptor {
    pub fn builder(store: Arc<dyn VectorStore>) -> InterceptorBuilder {
        InterceptorBuilder::new(store)
    }

    /// Start-up path: validate the config, load the schema and failure
    /// mapping files and apply every setting to a builder. Providers are
    /// attached by the caller before `build`.
    ///
    /// # Returns
    /// * `Err(SpanvecError::Config)` - Invalid config, a configured schema
    ///   file that is missing, or a malformed schema or mapping file
    pub fn from_config(
        config: &SpanvecConfig,
        store: Arc<dyn VectorStore>,
    ) -> SpanvecResult<InterceptorBuilder> {
        config.validate()?;

        let schema = match &config.schema_path {
            Some(path) => PropertySchema::load(path)?,
            None => PropertySchema::empty(),
        };
        let mapping = match &config.failure_mapping_path {
            Some(path) => FailureMapping::load(path)?,
            None => FailureMapping::empty(),
        };
        let sink: Arc<dyn AlertSink> = match WebhookAlerter::from_config(&config.alert) {
            Some(webhook) => Arc::new(webhook),
            None => Arc::new(LogAlerter),
        };

        let mut builder = InterceptorBuilder::new(store)
            .schema(schema)
            .failure_mapping(mapping)
            .sensitive_fields(SensitiveFields::new(&config.sensitive_fields))
            .ignored_error_codes(config.ignored_error_codes.iter().cloned())
            .alert_sink(sink)
            .record_cache_hits(config.record_cache_hits)
            .candidate_limit(config.cache_candidate_limit)
            .embedding_cache_size(config.embedding_cache_size);
        if config.async_logging {
            builder = builder.batch(config.batch.clone());
        }
        Ok(builder)
    }

    /// Wrap an async function.
    ///
    /// Call-specific tags are validated here, once; offending keys are
    /// dropped with a warning. Requesting the semantic cache without an
    /// embedding provider disables the cache with a warning.
    ///
    /// # Returns
    /// * `Err(SpanvecError::Config)` - If the options are invalid
    pub fn wrap<F, Fut, A, R, E>(
        &self,
        source: FunctionSource,
        options: WrapOptions,
        func: F,
    ) -> SpanvecResult<Intercepted<F, A, R, E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        A: Serialize,
        R: Serialize + DeserializeOwned,
        E: ClassifiableError,
    {
        options.validate()?;

        let mut draft = source.draft();
        draft.search_description = options.search_description;
        draft.sequence_narrative = options.sequence_narrative;
        let name = draft.qualified_name.clone();

        let cache_threshold = if options.semantic_cache && self.inner.cache.is_none() {
            tracing::warn!(
                function = %name,
                "Semantic cache requested without an embedding provider, caching disabled"
            );
            None
        } else {
            options.cache_threshold.filter(|_| options.semantic_cache)
        };

        let call_tags = self.inner.tags.prepare_call_tags(&name, options.tags);

        Ok(Intercepted {
            interceptor: self.clone(),
            function: Arc::new(WrappedFunction {
                function_id: function_id(&name),
                name,
                draft,
                auto: options.auto,
                call_tags,
                capture_arguments: options.capture_arguments || options.replay,
                capture_return: options.capture_return_value
                    || options.semantic_cache
                    || options.replay,
                cache_threshold,
                registered: AtomicBool::new(false),
            }),
            func: Arc::new(func),
            _marker: PhantomData,
        })
    }

    /// Write every buffered record and wait for pending alerts.
    pub async fn flush(&self) -> SpanvecResult<()> {
        if let RecordSink::Batched(writer) = &self.inner.sink {
            writer.flush().await?;
        }
        self.inner.alerts.settle().await;
        Ok(())
    }

    /// Document and commit every function wrapped with `auto`.
    pub async fn flush_definitions(&self) -> SpanvecResult<FlushReport> {
        self.inner.registrar.flush().await
    }

    /// Drain and stop the batch writer and wait for pending alerts.
    pub async fn shutdown(&self) -> SpanvecResult<()> {
        if let RecordSink::Batched(writer) = &self.inner.sink {
            writer.shutdown().await?;
        }
        self.inner.alerts.settle().await;
        Ok(())
    }

    pub fn registrar(&self) -> &DeferredRegistrar {
        &self.inner.registrar
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.inner.store)
    }

    /// Search front-end over the same store and embedder.
    pub fn searcher(&self) -> Searcher {
        Searcher::new(self.store(), self.inner.embedder.clone())
    }

    pub fn tags(&self) -> &TagResolver {
        &self.inner.tags
    }

    /// Batch writer counters, when batching is enabled.
    pub fn writer_stats(&self) -> Option<BatchWriterStats> {
        match &self.inner.sink {
            RecordSink::Batched(writer) => Some(writer.stats()),
            RecordSink::Inline => None,
        }
    }

    async fn ensure_registered(&self, function: &WrappedFunction) {
        if function.registered.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = &self.inner;
        let result = if function.auto {
            inner.registrar.enqueue(function.draft.clone()).map(|_| ())
        } else {
            let definition = function.draft.clone().into_definition(Utc::now());
            register_definition(inner.store.as_ref(), inner.embedder.as_deref(), definition)
                .await
                .map(|_| ())
        };
        if let Err(e) = result {
            function.registered.store(false, Ordering::Release);
            tracing::warn!(
                function = %function.name,
                error = %e,
                "Function registration failed, will retry on next call"
            );
        }
    }

    async fn write(&self, record: ExecutionRecord) {
        let execution_id = record.execution_id;
        let function = record.function_name.clone();
        let result = match &self.inner.sink {
            RecordSink::Inline => self.inner.store.put_execution(&record).await,
            RecordSink::Batched(writer) => writer.submit(record),
        };
        if let Err(e) = result {
            tracing::warn!(
                function = %function,
                execution_id = %execution_id,
                error = %e,
                "Execution record write failed"
            );
        }
    }

    fn capture<T: Serialize + ?Sized>(&self, function: &str, what: &str, value: &T) -> Option<Value> {
        match serde_json::to_value(value) {
            Ok(value) => Some(self.inner.sensitive.mask(&value)),
            Err(e) => {
                tracing::warn!(function = %function, what, error = %e, "Value capture failed");
                None
            }
        }
    }

    async fn embed_error(&self, function: &str, message: &str) -> Option<EmbeddingVector> {
        let embedder = self.inner.embedder.as_ref()?;
        match self
            .inner
            .embeddings
            .get_or_embed(embedder.as_ref(), message)
            .await
        {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!(function = %function, error = %e, "Error message embedding failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field(
                "embedder",
                &self.inner.embedder.as_ref().map(|e| e.model_id().to_string()),
            )
            .field("cache", &self.inner.cache)
            .field("alerts", &self.inner.alerts)
            .field("registrar", &self.inner.registrar)
            .field("record_cache_hits", &self.inner.record_cache_hits)
            .finish()
    }
}

// ============================================================================
// INTERCEPTED CALLABLE
// ============================================================================

/// A wrapped function. Call it exactly like the original.
pub struct Intercepted<F, A, R, E> {
    interceptor: Interceptor,
    function: Arc<WrappedFunction>,
    func: Arc<F>,
    _marker: PhantomData<fn(A) -> Result<R, E>>,
}

impl<F, A, R, E> Clone for Intercepted<F, A, R, E> {
    fn clone(&self) -> Self {
        Self {
            interceptor: self.interceptor.clone(),
            function: Arc::clone(&self.function),
            func: Arc::clone(&self.func),
            _marker: PhantomData,
        }
    }
}

/// Values shared by every record of one call.
struct CallFrame<'a> {
    context: &'a TraceContext,
    started_at: Timestamp,
    clock: Instant,
    arguments: Option<Value>,
    tags: ResolvedTagSet,
}

impl<F, A, R, E> Intercepted<F, A, R, E>
where
    A: Serialize,
    R: Serialize + DeserializeOwned,
    E: ClassifiableError,
{
    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn function_id(&self) -> FunctionId {
        self.function.function_id
    }

    /// Invoke the wrapped function.
    ///
    /// Returns exactly what the function returns, except that a cache hit
    /// substitutes a stored return value without running the body.
    pub async fn call<Fut>(&self, args: A) -> Result<R, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.interceptor.ensure_registered(&self.function).await;

        let context = TraceContext::enter();
        let span = tracing::debug_span!(
            "wrapped_call",
            function = %self.function.name,
            trace_id = %context.trace_id(),
            span_id = %context.span_id(),
        );
        context
            .clone()
            .scope(self.run(args, &context).instrument(span))
            .await
    }

    async fn run<Fut>(&self, args: A, context: &TraceContext) -> Result<R, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let interceptor = &self.interceptor;
        let inner = &interceptor.inner;
        let function = &self.function;
        let started_at = Utc::now();
        let clock = Instant::now();

        let wants_vector = function.capture_return && inner.cache.is_some();
        let masked_args = if function.capture_arguments || wants_vector {
            interceptor.capture(&function.name, "arguments", &args)
        } else {
            None
        };

        let input_vector = match (&inner.cache, &masked_args) {
            (Some(cache), Some(arguments)) if wants_vector => {
                match cache.embed_arguments(&function.name, arguments).await {
                    Ok(vector) => Some(vector),
                    Err(e) => {
                        tracing::warn!(
                            function = %function.name,
                            error = %e,
                            "Argument embedding failed, cache skipped"
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        let frame = CallFrame {
            context,
            started_at,
            clock,
            arguments: masked_args.filter(|_| function.capture_arguments),
            tags: inner.tags.resolve(&function.call_tags),
        };

        if let (Some(threshold), Some(cache), Some(vector)) =
            (function.cache_threshold, &inner.cache, &input_vector)
        {
            let decision = cache
                .lookup(&function.name, vector, threshold)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(function = %function.name, error = %e, "Cache lookup failed");
                    CacheDecision::Miss
                });
            if let CacheDecision::Hit {
                value,
                score,
                source_execution_id,
            } = decision
            {
                match serde_json::from_value::<R>(value.clone()) {
                    Ok(result) => {
                        tracing::debug!(
                            function = %function.name,
                            score,
                            source = %source_execution_id,
                            "Semantic cache hit"
                        );
                        if inner.record_cache_hits {
                            let mut record = self.record(&frame, ExecutionStatus::Success);
                            record.return_value = Some(value);
                            record.cache_hit = Some(CacheHitInfo {
                                score,
                                source_execution_id,
                            });
                            interceptor.write(record).await;
                        }
                        return Ok(result);
                    }
                    Err(e) => tracing::warn!(
                        function = %function.name,
                        source = %source_execution_id,
                        error = %e,
                        "Cached value does not deserialize, executing"
                    ),
                }
            }
        }

        let outcome = (self.func)(args).await;

        match &outcome {
            Ok(value) => {
                let mut record = self.record(&frame, ExecutionStatus::Success);
                if function.capture_return {
                    record.return_value = interceptor.capture(&function.name, "return value", value);
                }
                record.vector = input_vector;
                interceptor.write(record).await;
            }
            Err(error) => {
                let error_code = inner.classifier.classify(error);
                let error_message = error.to_string();
                let stack_trace = error_chain(error);
                let vector = interceptor.embed_error(&function.name, &error_message).await;

                let mut record = self.record(&frame, ExecutionStatus::Error);
                record.failure = Some(ExecutionFailure {
                    error_code: error_code.clone(),
                    error_message: error_message.clone(),
                });
                record.vector = vector;
                let payload = AlertPayload {
                    function_name: function.name.clone(),
                    error_code: error_code.clone(),
                    error_message,
                    execution_id: record.execution_id,
                    trace_id: context.trace_id(),
                    span_id: context.span_id(),
                    tags: record.tags.clone(),
                    arguments: record.arguments.clone(),
                    stack_trace,
                    occurred_at: record.completed_at,
                };
                interceptor.write(record).await;

                if inner.alerts.should_alert(&error_code) && context.claim_alert() {
                    inner.alerts.dispatch(payload);
                }
            }
        }

        outcome
    }

    fn record(&self, frame: &CallFrame<'_>, status: ExecutionStatus) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: new_execution_id(),
            function_name: self.function.name.clone(),
            function_id: self.function.function_id,
            trace_id: frame.context.trace_id(),
            span_id: frame.context.span_id(),
            parent_span_id: frame.context.parent_span_id(),
            started_at: frame.started_at,
            duration_ms: frame.clock.elapsed().as_secs_f64() * 1000.0,
            status,
            failure: None,
            arguments: frame.arguments.clone(),
            return_value: None,
            tags: frame.tags.clone(),
            cache_hit: None,
            vector: None,
            completed_at: completion_timestamp(),
        }
    }
}

impl<F, A, R, E> std::fmt::Debug for Intercepted<F, A, R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intercepted")
            .field("function", &self.function.name)
            .field("cache_threshold", &self.function.cache_threshold)
            .field("capture_arguments", &self.function.capture_arguments)
            .field("capture_return", &self.function.capture_return)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
