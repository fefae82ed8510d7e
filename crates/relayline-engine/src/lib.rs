/*!
 * Relayline Engine
 *
 * This crate turns a device's protocol into bus traffic and back: response
 * definitions map protocol lines to published envelopes, command definitions
 * map bus messages to protocol commands.
 */

#![warn(missing_docs)]

// Re-export core types
pub use relayline_core::prelude;
pub use relayline_core::types::{MessageEnvelope, NULL_VALUE};

pub mod command;
pub mod definition;
pub mod error;
pub mod hex;
pub mod loop_detector;
pub mod matcher;
pub mod response;
pub mod service;
pub mod sink;
pub mod types;

// Re-export main types for convenience
pub use command::{CommandEngine, PAYLOAD_TOKEN};
pub use definition::{CommandDefinition, EndWith, ResponseDefinition, ServiceDefinition};
pub use error::{Error, Result};
pub use loop_detector::{detect_pubsub_loops, detect_pubsub_loops_with_prefix, LoopReport};
pub use matcher::{match_line, CompiledResponse, Match};
pub use response::ResponseEngine;
pub use service::Service;
pub use sink::{CommandSink, RenderedCommand};
pub use types::{EngineFlags, ServiceOptions};

/// Relayline engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
