/*!
 * Prelude module for Relayline Core.
 *
 * This module re-exports commonly used types and functions from the Relayline Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{MessageEnvelope, NULL_VALUE};

// Re-export config types
pub use crate::config::{BusBackend, BusConfig, Config, ConfigBuilder, ServiceConfig};

// Re-export utility functions
pub use crate::utils::{millis_to_duration, now_millis, spawn_and_log, with_timeout};

// Re-export logging helpers
pub use crate::logging::{component_span, operation_span};
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
