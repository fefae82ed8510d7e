/*!
 * Broker implementations for Relayline.
 */
use std::sync::Arc;

use relayline_core::config::{BusBackend, BusConfig};

use crate::broker::Broker;
use crate::error::Result;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryBroker;

#[cfg(feature = "redis")]
pub use self::redis::RedisBroker;

/// Build the broker selected by the `[bus]` configuration section
///
/// The returned broker is not connected yet.
pub fn from_config(config: &BusConfig) -> Result<Arc<dyn Broker>> {
    match config.backend {
        BusBackend::Memory => Ok(Arc::new(MemoryBroker::new())),
        #[cfg(feature = "redis")]
        BusBackend::Redis => Ok(Arc::new(RedisBroker::from_config(config)?)),
        #[cfg(not(feature = "redis"))]
        BusBackend::Redis => Err(crate::error::BusError::UnsupportedBackend(
            "redis".to_string(),
        )),
    }
}
