/*!
 * Logging functionality for Relayline.
 *
 * This module provides tracing setup and span helpers so that both engine
 * directions log with consistent fields.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "relayline_engine=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    init_with_options(filter, false)
}

/// Initialize the logging system from the `[logging]` configuration section
///
/// `debug` raises the level to `debug` regardless of the configured level.
pub fn init_from_config(config: &LoggingConfig, debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { config.level.as_str() };
    init_with_options(level, config.json_format)
}

/// Initialize the logging system, optionally emitting JSON lines
///
/// `RUST_LOG` takes precedence over `filter` when set. Events go to stderr.
pub fn init_with_options(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a new span for a component
///
/// # Arguments
///
/// * `name` - The name of the component
/// * `service` - The service the component belongs to, if any
pub fn component_span(name: &str, service: Option<&str>) -> Span {
    match service {
        Some(service) => tracing::info_span!("component", name = %name, service = %service),
        None => tracing::info_span!("component", name = %name),
    }
}

/// Create a new span for an operation
pub fn operation_span(name: &str, component: &str) -> Span {
    tracing::debug_span!("operation", name = %name, component = %component)
}
