/*!
 * Error types for the Relayline engine crate.
 */
use thiserror::Error;

/// Error type for Relayline engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// A definition could not be compiled (bad regex, bad hex tokens, empty channel)
    #[error("Definition error: {0}")]
    Definition(String),

    /// An incoming envelope could not be parsed
    #[error("Envelope error: {0}")]
    Envelope(String),

    /// A rendered command could not be handed to the sink
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Bus error
    #[error("Bus error: {0}")]
    Bus(#[from] relayline_bus::BusError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] relayline_core::error::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for Relayline engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new definition error
    pub fn definition<S: AsRef<str>>(msg: S) -> Self {
        Error::Definition(msg.as_ref().to_string())
    }

    /// Create a new envelope error
    pub fn envelope<S: AsRef<str>>(msg: S) -> Self {
        Error::Envelope(msg.as_ref().to_string())
    }

    /// Create a new delivery error
    pub fn delivery<S: AsRef<str>>(msg: S) -> Self {
        Error::Delivery(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Definition(format!("invalid regular expression: {}", err))
    }
}
