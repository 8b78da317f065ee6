//! Alert channel for failed executions.
//!
//! Delivery is fire-and-forget: the dispatcher spawns the send and the
//! wrapped call re-raises immediately. Failures are logged, never raised.
//! Outside a tokio runtime there is nothing to spawn on, so the alert is
//! logged and dropped.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use spanvec_core::{AlertConfig, AlertError, ResolvedTagSet, Timestamp};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Alert sent for a failed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub function_name: String,
    pub error_code: String,
    pub error_message: String,
    pub execution_id: Uuid,
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub tags: ResolvedTagSet,
    /// Captured (masked) arguments of the failing call
    pub arguments: Option<Value>,
    /// The error and its `source()` chain
    pub stack_trace: String,
    pub occurred_at: Timestamp,
}

/// Destination for alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), AlertError>;

    fn name(&self) -> &str;
}

// ============================================================================
// WEBHOOK SINK
// ============================================================================

/// Generate HMAC-SHA256 signature for a payload, hex encoded.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, AlertError> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
        AlertError::Serialization {
            reason: format!("Failed to initialize HMAC: {}", e),
        }
    })?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// POSTs alerts as JSON, signed when a secret is configured, retrying with
/// exponential backoff.
pub struct WebhookAlerter {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl WebhookAlerter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            secret: None,
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }

    /// Build from config; `None` when no webhook URL is configured.
    pub fn from_config(config: &AlertConfig) -> Option<Self> {
        let url = config.webhook_url.as_ref()?;
        let mut alerter =
            Self::new(url.clone()).with_retry(config.max_attempts, config.initial_backoff);
        if let Some(secret) = &config.webhook_secret {
            alerter = alerter.with_secret(secret.clone());
        }
        Some(alerter)
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, initial_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookAlerter {
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        let body = serde_json::to_vec(payload).map_err(|e| AlertError::Serialization {
            reason: e.to_string(),
        })?;
        let signature = match &self.secret {
            Some(secret) => Some(sign_payload(&body, secret)?),
            None => None,
        };

        let mut delay = self.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let mut request = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("X-Spanvec-Execution-ID", payload.execution_id.to_string())
                .header("User-Agent", "SPANVEC-Alert/1.0");
            if let Some(signature) = &signature {
                request = request.header("X-Spanvec-Signature", format!("sha256={}", signature));
            }

            match request.body(body.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(
                        endpoint = %self.url,
                        execution_id = %payload.execution_id,
                        status = %response.status(),
                        "Alert delivered"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!("status {}", response.status());
                    tracing::warn!(
                        endpoint = %self.url,
                        execution_id = %payload.execution_id,
                        status = %response.status(),
                        attempt,
                        "Alert delivery failed with non-2xx status"
                    );
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        endpoint = %self.url,
                        execution_id = %payload.execution_id,
                        error = %e,
                        attempt,
                        "Alert delivery failed"
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(AlertError::DeliveryFailed {
            endpoint: self.url.clone(),
            attempts: self.max_attempts,
            reason: last_error,
        })
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

impl std::fmt::Debug for WebhookAlerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAlerter")
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

// ============================================================================
// LOCAL SINKS
// ============================================================================

/// Writes alerts to the log. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

#[async_trait]
impl AlertSink for LogAlerter {
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        tracing::error!(
            function = %payload.function_name,
            error_code = %payload.error_code,
            trace_id = %payload.trace_id,
            span_id = %payload.span_id,
            error = %payload.error_message,
            "Wrapped function failed"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Keeps alerts in memory, for embedding applications that forward them
/// through their own channel.
#[derive(Debug, Default)]
pub struct MemoryAlerter {
    payloads: Mutex<Vec<AlertPayload>>,
}

impl MemoryAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far.
    pub fn payloads(&self) -> Vec<AlertPayload> {
        self.payloads.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Remove and return received alerts.
    pub fn take(&self) -> Vec<AlertPayload> {
        self.payloads
            .lock()
            .map(|mut p| std::mem::take(&mut *p))
            .unwrap_or_default()
    }
}

#[async_trait]
impl AlertSink for MemoryAlerter {
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        match self.payloads.lock() {
            Ok(mut payloads) => {
                payloads.push(payload.clone());
                Ok(())
            }
            Err(_) => Err(AlertError::DeliveryFailed {
                endpoint: "memory".to_string(),
                attempts: 1,
                reason: "alert buffer lock poisoned".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Spawns alert deliveries and filters ignored codes.
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    ignored_codes: BTreeSet<String>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl AlertDispatcher {
    pub fn new<I, S>(sink: Arc<dyn AlertSink>, ignored_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sink,
            ignored_codes: ignored_codes.into_iter().map(Into::into).collect(),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Whether a failure with this code may alert at all.
    pub fn should_alert(&self, error_code: &str) -> bool {
        !self.ignored_codes.contains(error_code)
    }

    /// Deliver in the background on the current tokio runtime.
    ///
    /// Returns `false` when no runtime is running and the alert was dropped.
    pub fn dispatch(&self, payload: AlertPayload) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(
                    sink = self.sink.name(),
                    function = %payload.function_name,
                    error_code = %payload.error_code,
                    execution_id = %payload.execution_id,
                    "No tokio runtime, alert dropped"
                );
                return false;
            }
        };

        let sink = Arc::clone(&self.sink);
        let handle = runtime.spawn(async move {
            if let Err(e) = sink.deliver(&payload).await {
                tracing::error!(
                    sink = sink.name(),
                    function = %payload.function_name,
                    error_code = %payload.error_code,
                    error = %e,
                    "Alert delivery failed"
                );
            }
        });

        match self.in_flight.lock() {
            Ok(mut in_flight) => {
                in_flight.retain(|h| !h.is_finished());
                in_flight.push(handle);
            }
            Err(_) => tracing::warn!("Alert tracking lock poisoned, delivery not tracked"),
        }
        true
    }

    /// Wait for every alert dispatched so far.
    pub async fn settle(&self) {
        let handles = match self.in_flight.lock() {
            Ok(mut in_flight) => std::mem::take(&mut *in_flight),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Alert task terminated abnormally");
            }
        }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("sink", &self.sink.name())
            .field("ignored_codes", &self.ignored_codes)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn payload(code: &str) -> AlertPayload {
        AlertPayload {
            function_name: "m::f".to_string(),
            error_code: code.to_string(),
            error_message: "boom".to_string(),
            execution_id: Uuid::now_v7(),
            trace_id: Uuid::now_v7(),
            span_id: Uuid::now_v7(),
            tags: ResolvedTagSet::new(),
            arguments: None,
            stack_trace: "boom".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_sign_payload() {
        let signature = sign_payload(b"test payload", "supersecretkey123").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(signature, sign_payload(b"test payload", "other").unwrap());
    }

    #[test]
    fn test_from_config_requires_url() {
        assert!(WebhookAlerter::from_config(&AlertConfig::default()).is_none());
        let config = AlertConfig {
            webhook_url: Some("https://hooks.example.com/alerts".to_string()),
            webhook_secret: Some("s3cret".to_string()),
            ..AlertConfig::default()
        };
        let alerter = WebhookAlerter::from_config(&config).unwrap();
        assert_eq!(alerter.url(), "https://hooks.example.com/alerts");
        assert!(format!("{:?}", alerter).contains("[REDACTED]"));
        assert!(!format!("{:?}", alerter).contains("s3cret"));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_reports_failure() {
        let alerter = WebhookAlerter::new("http://127.0.0.1:9/alerts")
            .with_retry(2, Duration::from_millis(1));
        let err = alerter.deliver(&payload("BOOM")).await.unwrap_err();
        match err {
            AlertError::DeliveryFailed { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_and_settle() {
        let sink = Arc::new(MemoryAlerter::new());
        let dispatcher = AlertDispatcher::new(sink.clone(), ["IGNORED"]);
        assert!(dispatcher.should_alert("BOOM"));
        assert!(!dispatcher.should_alert("IGNORED"));

        assert!(dispatcher.dispatch(payload("BOOM")));
        dispatcher.settle().await;
        assert_eq!(sink.payloads().len(), 1);
        assert_eq!(sink.take()[0].error_code, "BOOM");
        assert!(sink.payloads().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_is_contained() {
        let dispatcher = AlertDispatcher::new(
            Arc::new(
                WebhookAlerter::new("http://127.0.0.1:9/alerts")
                    .with_retry(1, Duration::from_millis(1)),
            ),
            Vec::<String>::new(),
        );
        dispatcher.dispatch(payload("BOOM"));
        dispatcher.settle().await;
    }

    #[test]
    fn test_dispatch_without_runtime_drops_alert() {
        let sink = Arc::new(MemoryAlerter::new());
        let dispatcher = AlertDispatcher::new(sink.clone(), Vec::<String>::new());
        assert!(!dispatcher.dispatch(payload("BOOM")));
        assert!(sink.payloads().is_empty());
    }
}
