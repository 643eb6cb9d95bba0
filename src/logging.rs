//! # Structured Logging Module
//!
//! Environment-aware structured logging for command invocations and
//! execution-tree transitions.

use crate::config::TelemetryConfig;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging using the environment-derived level
pub fn init_structured_logging() {
    let telemetry = TelemetryConfig {
        log_level: get_log_level(&get_environment()).to_string(),
        json_output: false,
    };
    init_with_config(&telemetry);
}

/// Initialize structured logging from telemetry settings
///
/// `RUST_LOG` wins over the configured level. Safe to call more than once.
pub fn init_with_config(telemetry: &TelemetryConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(telemetry.log_level.clone()));

        let layer = if telemetry.json_output {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // Embedders may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %get_environment(),
            level = %telemetry.log_level,
            json = telemetry.json_output,
            "Structured logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("ENGINE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}
