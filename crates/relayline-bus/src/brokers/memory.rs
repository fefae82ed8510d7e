/*!
 * In-process broker.
 *
 * Every publish is fanned out over a `tokio::sync::broadcast` channel and each
 * subscription filters it down to the channels it asked for.
 */
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::broker::{Broker, BusMessage, MessageStream};
use crate::error::{BusError, Result};

/// Maximum number of messages buffered for a slow subscriber
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Loopback broker living entirely inside the process
#[derive(Debug)]
pub struct MemoryBroker {
    sender: broadcast::Sender<BusMessage>,
    connected: AtomicBool,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryBroker {
    /// Create a new, not yet connected, memory broker
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a memory broker with a specific buffer capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            connected: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Observe every message published on any channel
    pub fn tap(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    fn track(&self, handle: JoinHandle<()>) -> Result<()> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| BusError::Other("Failed to lock subscriptions".to_string()))?;
        subscriptions.push(handle);
        Ok(())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        info!("Memory broker connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        match self.sender.send(BusMessage::new(channel, payload)) {
            Ok(n) => trace!("Published to {} on {} receivers", channel, n),
            Err(_) => trace!("No receivers for {}", channel),
        }
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        let wanted: HashSet<String> = channels.iter().cloned().collect();
        let mut rx = self.sender.subscribe();
        let (tx, stream) = mpsc::unbounded_channel();

        debug!("Subscribing to {} channels", wanted.len());
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if wanted.contains(&message.channel) && tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber lagged, {} messages dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.track(handle)?;

        Ok(stream)
    }

    async fn unsubscribe_all(&self) -> Result<()> {
        let handles = {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .map_err(|_| BusError::Other("Failed to lock subscriptions".to_string()))?;
            std::mem::take(&mut *subscriptions)
        };

        debug!("Unsubscribing {} subscriptions", handles.len());
        for handle in handles {
            handle.abort();
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.unsubscribe_all().await?;
        self.connected.store(false, Ordering::SeqCst);
        info!("Memory broker closed");
        Ok(())
    }
}
