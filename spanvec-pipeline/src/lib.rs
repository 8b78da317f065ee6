//! SPANVEC Pipeline - Execution Interception
//!
//! Wraps async functions so every call is traced into a call tree, tagged
//! under the property schema, optionally served from a semantic cache, and
//! recorded in the vector store. Failures are classified into stable error
//! codes and alerted once per trace.
//!
//! # Example
//! ```ignore
//! let interceptor = Interceptor::from_config(&SpanvecConfig::from_env(), store)?
//!     .embedder(embedder)
//!     .build()?;
//!
//! let summarize = interceptor.wrap(
//!     function_source!(summarize),
//!     WrapOptions::new().semantic_cache(0.95).tag("team", "reports"),
//!     |text: String| async move { summarize(&text).await },
//! )?;
//!
//! let summary = summarize.call("quarterly results grew".to_string()).await?;
//! ```

pub mod alert;
pub mod cache;
pub mod classify;
pub mod interceptor;
pub mod registrar;
pub mod search;
pub mod tags;
pub mod telemetry;
pub mod trace;

pub use alert::{
    sign_payload, AlertDispatcher, AlertPayload, AlertSink, LogAlerter, MemoryAlerter,
    WebhookAlerter,
};
pub use cache::{ArgumentSerializer, CacheDecision, ContextualSerializer, SemanticCache};
pub use classify::{error_chain, short_type_name, ClassifiableError, CodedError, ErrorClassifier};
pub use interceptor::{FunctionSource, Intercepted, Interceptor, InterceptorBuilder, WrapOptions};
pub use registrar::{register_definition, DeferredRegistrar, FlushFailure, FlushReport};
pub use search::Searcher;
pub use tags::{resolve_tags, GlobalTags, TagResolver};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use trace::{propagate, TraceContext};

pub use spanvec_core::{SpanvecConfig, SpanvecError, SpanvecResult};
