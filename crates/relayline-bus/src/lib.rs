/*!
 * Relayline Bus
 *
 * This crate provides the publish/subscribe abstraction the Relayline engines
 * talk to, together with an in-process broker and a Redis broker.
 */

#![warn(missing_docs)]

pub mod broker;
pub mod brokers;
pub mod error;

pub use broker::{Broker, BusMessage, MessageStream};
pub use brokers::{from_config, MemoryBroker};
#[cfg(feature = "redis")]
pub use brokers::RedisBroker;
pub use error::{BusError, Result};

/// Relayline bus crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
