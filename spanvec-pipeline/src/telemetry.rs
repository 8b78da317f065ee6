//! Tracing subscriber initialization
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a JSON or
//! human-readable `fmt` layer. Embedding applications that install their own
//! subscriber skip this entirely.

use once_cell::sync::OnceCell;
use spanvec_core::{ConfigError, SpanvecResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INITIALIZED: OnceCell<TelemetryConfig> = OnceCell::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "text" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
    /// Service name attached to the startup event
    pub service_name: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Filter directives used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: std::env::var("SPANVEC_LOG_FORMAT")
                .ok()
                .and_then(|s| LogFormat::parse(&s))
                .unwrap_or(LogFormat::Json),
            service_name: std::env::var("SPANVEC_SERVICE_NAME")
                .unwrap_or_else(|_| "spanvec".to_string()),
            environment: std::env::var("SPANVEC_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            default_filter: "spanvec=info".to_string(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// # Returns
/// * `Err(ConfigError::AlreadyInitialized)` - If a global subscriber is
///   already installed, by this function or anyone else
pub fn init_tracing(config: &TelemetryConfig) -> SpanvecResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let (json, pretty) = match config.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|_| ConfigError::AlreadyInitialized {
            component: "tracing subscriber".to_string(),
        })?;

    let _ = INITIALIZED.set(config.clone());

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        format = ?config.log_format,
        "Telemetry initialized"
    );
    Ok(())
}

/// The configuration of a successful [`init_tracing`] call, if any.
pub fn active_config() -> Option<&'static TelemetryConfig> {
    INITIALIZED.get()
}
