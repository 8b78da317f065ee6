//! OpenAI HTTP client with request pacing

use super::types::ApiError;
use crate::providers::{invalid_response, rate_limited, request_failed};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use spanvec_core::SpanvecResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client.
///
/// Concurrency is capped by a semaphore and consecutive requests are spaced
/// by at least `60s / requests_per_minute`.
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    in_flight: Arc<Semaphore>,
    last_request_ms: Arc<AtomicU64>,
    min_interval_ms: u64,
    started: Instant,
}

impl OpenAIClient {
    /// Create a new OpenAI client.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `requests_per_minute` - Request budget used for pacing
    pub fn new(api_key: impl Into<String>, requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            in_flight: Arc::new(Semaphore::new(rpm.min(16) as usize)),
            last_request_ms: Arc::new(AtomicU64::new(0)),
            min_interval_ms: (60_000 / rpm as u64).max(10),
            started: Instant::now(),
        }
    }

    /// Point the client at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `endpoint` and decode the JSON response.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Req,
    ) -> SpanvecResult<Res> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("Rate limiter closed: {}", e)))?;

        let now_ms = self.started.elapsed().as_millis() as u64;
        let last_ms = self.last_request_ms.swap(now_ms, Ordering::AcqRel);
        let elapsed = now_ms.saturating_sub(last_ms);
        if last_ms != 0 && elapsed < self.min_interval_ms {
            let wait_ms = self.min_interval_ms - elapsed;
            tracing::debug!(provider = PROVIDER, endpoint, wait_ms, "Pacing provider request");
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(provider = PROVIDER, endpoint, error = %e, "Provider request failed");
                request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)));
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ApiError>(&error_text)
            .map(|e| e.error.message)
            .unwrap_or(error_text);

        tracing::warn!(
            provider = PROVIDER,
            endpoint,
            status = status.as_u16(),
            retry_after_ms,
            error = %message,
            "Provider returned an error status"
        );
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => rate_limited(PROVIDER, retry_after_ms),
            _ => request_failed(PROVIDER, status.as_u16() as i32, message),
        })
    }
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("min_interval_ms", &self.min_interval_ms)
            .finish()
    }
}
