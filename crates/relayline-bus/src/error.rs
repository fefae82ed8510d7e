/*!
 * Error types for the Relayline bus crate.
 */
use thiserror::Error;

/// Error type for bus operations
#[derive(Error, Debug)]
pub enum BusError {
    /// The broker connection has not been established
    #[error("Broker not connected")]
    NotConnected,

    /// Establishing the broker connection failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// A publish was rejected by the broker
    #[error("Publish error: {0}")]
    Publish(String),

    /// A subscription could not be created
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// The configured backend is not compiled in
    #[error("Unsupported bus backend: {0}")]
    UnsupportedBackend(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] relayline_core::error::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

