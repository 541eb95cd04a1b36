//! Logging initialization, adapted from the ADK workspace's
//! `adk-telemetry::init` module: an `EnvFilter` driven by `RUST_LOG` (or a
//! per-service default), a single console `fmt` layer, and a `Once` guard
//! so repeated calls from tests are harmless.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub default_level: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), default_level: "info".to_string() }
    }

    pub fn from_env(service_name: impl Into<String>) -> Self {
        let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        Self { service_name: service_name.into(), default_level }
    }
}

/// Initialize the global tracing subscriber. Safe to call more than once
/// per process (e.g. from multiple integration tests); only the first call
/// takes effect.
pub fn init(config: TelemetryConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_level.clone()));

        let fmt_layer =
            tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(true).with_line_number(true);

        tracing_subscriber::registry().with(filter).with(fmt_layer).init();

        tracing::info!(service.name = %config.service_name, "telemetry initialized");
    });
}

/// Convenience wrapper for binaries: `common_telemetry::init_default("gateway")`.
pub fn init_default(service_name: &str) {
    init(TelemetryConfig::from_env(service_name));
}
