//! Error types for SPANVEC operations

use thiserror::Error;
use uuid::Uuid;

/// Vector store and record writer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Vector store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Write to {collection} failed: {reason}")]
    WriteFailed { collection: String, reason: String },

    #[error("Query on {collection} failed: {reason}")]
    QueryFailed { collection: String, reason: String },

    #[error("Record not found in {collection} with id {id}")]
    NotFound { collection: String, id: Uuid },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Record queue full (capacity {capacity}), record dropped")]
    QueueFull { capacity: usize },

    #[error("Record writer is shut down")]
    WriterClosed,
}

/// Embedding and documentation provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No LLM provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("Documentation generation for {function} failed: {reason}")]
    DocumentationFailed { function: String, reason: String },
}

/// Validation errors. Never fatal to a wrapped call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Tag key '{key}' is not declared in the property schema")]
    UnknownTagKey { key: String },

    #[error("Tag '{key}' expected {expected}: {reason}")]
    TagTypeMismatch {
        key: String,
        expected: String,
        reason: String,
    },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors. Fatal at startup, never raised per call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Malformed configuration file {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("{component} is already initialized")]
    AlreadyInitialized { component: String },
}

/// Vector operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: i32, got: i32 },

    #[error("Invalid vector: {reason}")]
    InvalidVector { reason: String },

    #[error("Model mismatch: expected {expected}, got {got}")]
    ModelMismatch { expected: String, got: String },
}

/// Alert channel errors. Logged, never raised to a caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("Alert delivery to {endpoint} failed after {attempts} attempts: {reason}")]
    DeliveryFailed {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    #[error("Alert payload serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Master error type for all SPANVEC errors.
#[derive(Debug, Clone, Error)]
pub enum SpanvecError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),
}

impl SpanvecError {
    /// Whether this error belongs to the infrastructure side of the pipeline.
    ///
    /// Infrastructure errors are contained by the interceptor: the side effect
    /// is skipped and the wrapped call continues untouched.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            SpanvecError::Storage(_)
                | SpanvecError::Llm(_)
                | SpanvecError::Vector(_)
                | SpanvecError::Alert(_)
        )
    }
}

/// Result type alias for SPANVEC operations.
pub type SpanvecResult<T> = Result<T, SpanvecError>;

// =============================================================================
// TESTS
// =============================================================================
