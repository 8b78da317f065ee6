//! Configuration types
//!
//! All runtime knobs are read from `SPANVEC_*` environment variables with
//! fallback to the defaults below. Process-wide tag values are not part of
//! this struct: they are keyed by schema key and resolved by the pipeline.

use crate::{ConfigError, SpanvecError, SpanvecResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Background batch writer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Flush once this many records are buffered
    pub threshold: usize,
    /// Flush at least this often while records are buffered
    pub flush_interval: Duration,
    /// Bounded queue size; records beyond it are dropped
    pub queue_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            flush_interval: Duration::from_secs(2),
            queue_capacity: 10_000,
        }
    }
}

/// Alert channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
    /// HMAC-SHA256 signing secret for webhook payloads
    pub webhook_secret: Option<String>,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_secret: None,
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Master configuration for the interception pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanvecConfig {
    /// Custom property schema file. Unset means an empty schema.
    pub schema_path: Option<PathBuf>,
    /// Failure mapping file. Unset or missing means an empty mapping.
    pub failure_mapping_path: Option<PathBuf>,
    /// Field names masked in captured values
    pub sensitive_fields: Vec<String>,
    /// Error codes that are recorded but never alerted
    pub ignored_error_codes: Vec<String>,
    /// Write execution records through the background batch writer
    pub async_logging: bool,
    pub batch: BatchConfig,
    /// Write a lightweight execution record on cache hits
    pub record_cache_hits: bool,
    /// Nearest neighbours fetched per cache lookup
    pub cache_candidate_limit: usize,
    /// Capacity of the in-process embedding cache
    pub embedding_cache_size: usize,
    pub alert: AlertConfig,
}

impl Default for SpanvecConfig {
    fn default() -> Self {
        Self {
            schema_path: None,
            failure_mapping_path: None,
            sensitive_fields: ["password", "api_key", "token", "secret"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignored_error_codes: Vec::new(),
            async_logging: false,
            batch: BatchConfig::default(),
            record_cache_hits: true,
            cache_candidate_limit: 10,
            embedding_cache_size: 1024,
            alert: AlertConfig::default(),
        }
    }
}

impl SpanvecConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `SPANVEC_SCHEMA_PATH`: Property schema file
    /// - `SPANVEC_FAILURE_MAPPING_PATH`: Failure mapping file
    /// - `SPANVEC_SENSITIVE_FIELDS`: Comma list (default: password,api_key,token,secret)
    /// - `SPANVEC_IGNORED_ERROR_CODES`: Comma list (default: empty)
    /// - `SPANVEC_ASYNC_LOGGING`: Use the batch writer (default: false)
    /// - `SPANVEC_BATCH_THRESHOLD`: Records per batch (default: 20)
    /// - `SPANVEC_FLUSH_INTERVAL_MS`: Batch flush interval (default: 2000)
    /// - `SPANVEC_QUEUE_CAPACITY`: Batch queue capacity (default: 10000)
    /// - `SPANVEC_RECORD_CACHE_HITS`: Write hit records (default: true)
    /// - `SPANVEC_CACHE_CANDIDATE_LIMIT`: Cache lookup neighbours (default: 10)
    /// - `SPANVEC_EMBEDDING_CACHE_SIZE`: Embedding cache entries (default: 1024)
    /// - `SPANVEC_ALERT_WEBHOOK_URL`: Alert webhook endpoint
    /// - `SPANVEC_ALERT_WEBHOOK_SECRET`: Alert signing secret
    /// - `SPANVEC_ALERT_MAX_ATTEMPTS`: Delivery attempts (default: 3)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str| lookup(key).and_then(|s| parse_bool(&s));
        let list = |key: &str| {
            lookup(key).map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
        };

        Self {
            schema_path: lookup("SPANVEC_SCHEMA_PATH").map(PathBuf::from),
            failure_mapping_path: lookup("SPANVEC_FAILURE_MAPPING_PATH").map(PathBuf::from),
            sensitive_fields: list("SPANVEC_SENSITIVE_FIELDS").unwrap_or(defaults.sensitive_fields),
            ignored_error_codes: list("SPANVEC_IGNORED_ERROR_CODES")
                .unwrap_or(defaults.ignored_error_codes),
            async_logging: flag("SPANVEC_ASYNC_LOGGING").unwrap_or(defaults.async_logging),
            batch: BatchConfig {
                threshold: parse_var(&lookup, "SPANVEC_BATCH_THRESHOLD").unwrap_or(defaults.batch.threshold),
                flush_interval: parse_var(&lookup, "SPANVEC_FLUSH_INTERVAL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.batch.flush_interval),
                queue_capacity: parse_var(&lookup, "SPANVEC_QUEUE_CAPACITY")
                    .unwrap_or(defaults.batch.queue_capacity),
            },
            record_cache_hits: flag("SPANVEC_RECORD_CACHE_HITS")
                .unwrap_or(defaults.record_cache_hits),
            cache_candidate_limit: parse_var(&lookup, "SPANVEC_CACHE_CANDIDATE_LIMIT")
                .unwrap_or(defaults.cache_candidate_limit),
            embedding_cache_size: parse_var(&lookup, "SPANVEC_EMBEDDING_CACHE_SIZE")
                .unwrap_or(defaults.embedding_cache_size),
            alert: AlertConfig {
                webhook_url: lookup("SPANVEC_ALERT_WEBHOOK_URL").filter(|s| !s.trim().is_empty()),
                webhook_secret: lookup("SPANVEC_ALERT_WEBHOOK_SECRET")
                    .filter(|s| !s.is_empty()),
                max_attempts: parse_var(&lookup, "SPANVEC_ALERT_MAX_ATTEMPTS")
                    .unwrap_or(defaults.alert.max_attempts),
                initial_backoff: defaults.alert.initial_backoff,
            },
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - batch threshold, queue capacity and flush interval are positive
    /// - batch threshold does not exceed queue capacity
    /// - cache candidate limit is positive
    /// - alert attempts >= 1 and the webhook URL is http(s)
    /// - a webhook secret is only given together with a webhook URL
    pub fn validate(&self) -> SpanvecResult<()> {
        if self.batch.threshold == 0 {
            return Err(invalid("batch.threshold", "0", "threshold must be greater than 0"));
        }

        if self.batch.queue_capacity == 0 {
            return Err(invalid(
                "batch.queue_capacity",
                "0",
                "queue_capacity must be greater than 0",
            ));
        }

        if self.batch.threshold > self.batch.queue_capacity {
            return Err(invalid(
                "batch.threshold",
                &self.batch.threshold.to_string(),
                "threshold must not exceed queue_capacity",
            ));
        }

        if self.batch.flush_interval.is_zero() {
            return Err(invalid(
                "batch.flush_interval",
                &format!("{:?}", self.batch.flush_interval),
                "flush_interval must be positive",
            ));
        }

        if self.cache_candidate_limit == 0 {
            return Err(invalid(
                "cache_candidate_limit",
                "0",
                "cache_candidate_limit must be greater than 0",
            ));
        }

        if self.alert.max_attempts == 0 {
            return Err(invalid(
                "alert.max_attempts",
                "0",
                "at least one delivery attempt is required",
            ));
        }

        if let Some(url) = &self.alert.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    "alert.webhook_url",
                    url,
                    "webhook_url must start with http:// or https://",
                ));
            }
        } else if self.alert.webhook_secret.is_some() {
            return Err(SpanvecError::Config(ConfigError::IncompatibleOptions {
                option_a: "alert.webhook_secret".to_string(),
                option_b: "missing alert.webhook_url".to_string(),
            }));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> SpanvecError {
    SpanvecError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = SpanvecConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.record_cache_hits);
        assert!(!config.async_logging);
        assert!(config.sensitive_fields.contains(&"password".to_string()));
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = SpanvecConfig::from_lookup(lookup_from(&[
            ("SPANVEC_SCHEMA_PATH", "/etc/spanvec/schema.json"),
            ("SPANVEC_IGNORED_ERROR_CODES", "TIMEOUT, ,RETRYABLE"),
            ("SPANVEC_ASYNC_LOGGING", "true"),
            ("SPANVEC_BATCH_THRESHOLD", "5"),
            ("SPANVEC_FLUSH_INTERVAL_MS", "250"),
            ("SPANVEC_RECORD_CACHE_HITS", "0"),
            ("SPANVEC_ALERT_WEBHOOK_URL", "https://hooks.local/alerts"),
        ]));

        assert_eq!(
            config.schema_path,
            Some(PathBuf::from("/etc/spanvec/schema.json"))
        );
        assert_eq!(config.ignored_error_codes, vec!["TIMEOUT", "RETRYABLE"]);
        assert!(config.async_logging);
        assert_eq!(config.batch.threshold, 5);
        assert_eq!(config.batch.flush_interval, Duration::from_millis(250));
        assert!(!config.record_cache_hits);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let config = SpanvecConfig::from_lookup(lookup_from(&[
            ("SPANVEC_BATCH_THRESHOLD", "lots"),
            ("SPANVEC_ASYNC_LOGGING", "maybe"),
        ]));
        assert_eq!(config.batch.threshold, BatchConfig::default().threshold);
        assert!(!config.async_logging);
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = SpanvecConfig::default();
        config.batch.threshold = 0;
        let err = config.validate().unwrap_err();
        match err {
            SpanvecError::Config(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "batch.threshold");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_threshold_above_capacity() {
        let mut config = SpanvecConfig::default();
        config.batch.threshold = 100;
        config.batch.queue_capacity = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_webhook_url() {
        let mut config = SpanvecConfig::default();
        config.alert.webhook_url = Some("ftp://nope".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_secret_without_url() {
        let mut config = SpanvecConfig::default();
        config.alert.webhook_secret = Some("s3cret".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            SpanvecError::Config(ConfigError::IncompatibleOptions { .. })
        ));
    }
}
