/*!
 * Broker definitions for Relayline.
 *
 * The engines never talk to a concrete bus. They publish through, and receive
 * from, anything implementing [`Broker`].
 */
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// A message received from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// The channel the message arrived on
    pub channel: String,
    /// The raw payload
    pub payload: Bytes,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new<C: Into<String>, P: Into<Bytes>>(channel: C, payload: P) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Stream of messages for the channels passed to [`Broker::subscribe`]
pub type MessageStream = mpsc::UnboundedReceiver<BusMessage>;

/// A publish/subscribe broker connection
#[async_trait]
pub trait Broker: Send + Sync + Debug {
    /// Get the broker name
    fn name(&self) -> &'static str;

    /// Establish the connection
    async fn connect(&self) -> Result<()>;

    /// Whether `connect` has succeeded and `close` has not been called
    fn is_connected(&self) -> bool;

    /// Publish a payload to a channel
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()>;

    /// Subscribe to a set of channels
    ///
    /// Messages published on any of `channels` after this call returns are
    /// delivered on the returned stream.
    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream>;

    /// Drop every subscription created by this broker
    async fn unsubscribe_all(&self) -> Result<()>;

    /// Release the connection
    async fn close(&self) -> Result<()>;
}
