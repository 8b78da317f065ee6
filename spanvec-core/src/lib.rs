//! SPANVEC Core - Record Types
//!
//! Pure data structures shared by every SPANVEC crate: identifiers, the
//! error taxonomy, configuration, the property schema, the failure mapping
//! and the persisted record types. No I/O beyond loading config files.

pub mod config;
pub mod embedding;
pub mod error;
pub mod failure;
pub mod mask;
pub mod record;
pub mod schema;

pub use config::{AlertConfig, BatchConfig, SpanvecConfig};
pub use embedding::EmbeddingVector;
pub use error::{
    AlertError, ConfigError, LlmError, SpanvecError, SpanvecResult, StorageError,
    ValidationError, VectorError,
};
pub use failure::FailureMapping;
pub use mask::{SensitiveFields, MASK};
pub use record::{
    CacheHitInfo, DefinitionDraft, DocumentationOrigin, ExecutionFailure, ExecutionRecord,
    ExecutionStatus, FunctionDefinition, GeneratedDocumentation,
};
pub use schema::{PropertyDefinition, PropertySchema, PropertyType, ResolvedTagSet, TagValue};

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Deterministic function identifier (UUIDv5 of the qualified name).
pub type FunctionId = Uuid;

/// SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 execution/span/trace identifier (timestamp-sortable).
pub fn new_execution_id() -> Uuid {
    Uuid::now_v7()
}

/// Stable identifier for a qualified function name.
pub fn function_id(qualified_name: &str) -> FunctionId {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, qualified_name.as_bytes())
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

// ============================================================================
// COMPLETION CLOCK
// ============================================================================

static LAST_COMPLETION_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Wall-clock completion timestamp, strictly increasing across the process.
///
/// Two records completed in the same microsecond still receive distinct,
/// ordered timestamps, so a parent that finishes after its children always
/// sorts after them.
pub fn completion_timestamp() -> Timestamp {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_COMPLETION_MICROS.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_COMPLETION_MICROS.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                return Utc
                    .timestamp_micros(next)
                    .single()
                    .unwrap_or_else(Utc::now);
            }
            Err(observed) => last = observed,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_id_is_deterministic() {
        assert_eq!(function_id("a::b"), function_id("a::b"));
        assert_ne!(function_id("a::b"), function_id("a::c"));
    }

    #[test]
    fn test_execution_ids_are_unique() {
        let a = new_execution_id();
        let b = new_execution_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_hash_known_value() {
        let hash = compute_content_hash(b"");
        assert_eq!(
            hex::encode(hash),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_completion_timestamps_strictly_increase() {
        let stamps: Vec<_> = (0..1000).map(|_| completion_timestamp()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_completion_timestamps_strictly_increase_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| completion_timestamp()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Distinct qualified names never share a function id.
        #[test]
        fn prop_function_id_injective(a in "[a-z_:]{1,40}", b in "[a-z_:]{1,40}") {
            prop_assume!(a != b);
            prop_assert_ne!(function_id(&a), function_id(&b));
        }

        /// Masking never leaves a sensitive value in place.
        #[test]
        fn prop_mask_hides_sensitive_values(secret in "[a-zA-Z0-9]{1,32}", other in "[a-z]{1,16}") {
            let fields = SensitiveFields::new(["password"]);
            let value = serde_json::json!({"password": secret.clone(), "user": other.clone()});
            let masked = fields.mask(&value);
            prop_assert_eq!(masked["password"].as_str(), Some(MASK));
            prop_assert_eq!(masked["user"].as_str(), Some(other.as_str()));
        }
    }
}
