/*!
 * Delivery of rendered commands to the device side.
 */
use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// A protocol command ready to be written to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedCommand {
    /// Text command, terminator included
    Text(String),
    /// Raw bytes decoded from hex tokens
    Bytes(Bytes),
}

impl RenderedCommand {
    /// The bytes to put on the wire
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RenderedCommand::Text(text) => text.as_bytes(),
            RenderedCommand::Bytes(bytes) => bytes,
        }
    }

    /// The text form, for text commands
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RenderedCommand::Text(text) => Some(text),
            RenderedCommand::Bytes(_) => None,
        }
    }
}

impl fmt::Display for RenderedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderedCommand::Text(text) => write!(f, "{:?}", text),
            RenderedCommand::Bytes(bytes) => write!(f, "{}", crate::hex::render(bytes)),
        }
    }
}

/// Receiver of rendered commands
pub trait CommandSink: Send + Sync {
    /// Hand one command to the device side
    fn deliver(&self, command: RenderedCommand) -> Result<()>;
}

impl<F> CommandSink for F
where
    F: Fn(RenderedCommand) -> Result<()> + Send + Sync,
{
    fn deliver(&self, command: RenderedCommand) -> Result<()> {
        self(command)
    }
}

impl CommandSink for mpsc::UnboundedSender<RenderedCommand> {
    fn deliver(&self, command: RenderedCommand) -> Result<()> {
        self.send(command)
            .map_err(|_| Error::delivery("command receiver dropped"))
    }
}
