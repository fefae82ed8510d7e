/*!
 * Redis publish/subscribe broker.
 *
 * Publishing goes through a shared `ConnectionManager`; every subscription
 * opens its own pub/sub connection and pumps it into an mpsc stream.
 */
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use relayline_core::config::BusConfig;
use relayline_core::error::Error as CoreError;
use relayline_core::utils::{millis_to_duration, with_timeout};

use crate::broker::{Broker, BusMessage, MessageStream};
use crate::error::{BusError, Result};

/// Broker backed by a Redis server
pub struct RedisBroker {
    url: String,
    client_name: String,
    connect_timeout: Duration,
    client: Client,
    connection: RwLock<Option<ConnectionManager>>,
    connected: AtomicBool,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBroker")
            .field("url", &self.url)
            .field("client_name", &self.client_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RedisBroker {
    /// Create a broker for `url` without connecting
    pub fn new(url: &str, client_name: String, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| BusError::Connection(format!("Invalid redis url {}: {}", url, e)))?;

        Ok(Self {
            url: url.to_string(),
            client_name,
            connect_timeout,
            client,
            connection: RwLock::new(None),
            connected: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Create a broker from the `[bus]` configuration section
    pub fn from_config(config: &BusConfig) -> Result<Self> {
        let client_name = format!("{}{}", config.client_id_prefix, uuid::Uuid::new_v4());
        Self::new(
            &config.url,
            client_name,
            millis_to_duration(config.connect_timeout_ms),
        )
    }

    /// The generated client name
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    async fn manager(&self) -> Result<ConnectionManager> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(BusError::NotConnected)
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

/// `CLIENT SETNAME <name>`
fn client_setname(name: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("CLIENT");
    cmd.arg("SETNAME").arg(name);
    cmd
}

#[async_trait]
impl Broker for RedisBroker {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn connect(&self) -> Result<()> {
        debug!("Connecting to redis at {} as {}", self.url, self.client_name);

        let client = self.client.clone();
        let mut manager = with_timeout(self.connect_timeout, async move {
            ConnectionManager::new(client)
                .await
                .map_err(|e| CoreError::runtime(format!("redis connection failed: {}", e)))
        })
        .await
        .map_err(|e| BusError::Connection(e.to_string()))?;

        // Only the initial connection is named; a reconnect comes back anonymous.
        let named: redis::RedisResult<()> = client_setname(&self.client_name)
            .query_async(&mut manager)
            .await;
        if let Err(e) = named {
            warn!("Failed to set redis client name {}: {}", self.client_name, e);
        }

        *self.connection.write().await = Some(manager);
        self.connected.store(true, Ordering::SeqCst);
        info!("redis client connected to {}", self.url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        let mut manager = self.manager().await?;
        let receivers: i64 = manager
            .publish(channel, &payload[..])
            .await
            .map_err(|e| BusError::Publish(format!("{}: {}", channel, e)))?;
        trace!("Published to {} on {} receivers", channel, receivers);
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        for channel in channels {
            pubsub
                .subscribe(channel.as_str())
                .await
                .map_err(|e| BusError::Subscribe(format!("{}: {}", channel, e)))?;
        }
        debug!("Subscribed to {} redis channels", channels.len());

        let (tx, stream) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let message = BusMessage::new(
                    msg.get_channel_name(),
                    Bytes::copy_from_slice(msg.get_payload_bytes()),
                );
                if tx.send(message).is_err() {
                    break;
                }
            }
            warn!("redis subscription stream ended");
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

        debug!("Unsubscribing from all channels");
        // Dropping the pub/sub connection ends its subscriptions.
        for handle in handles {
            handle.abort();
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.unsubscribe_all().await?;
        self.connection.write().await.take();
        self.connected.store(false, Ordering::SeqCst);
        info!("redis client closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = RedisBroker::new("not-a-url", "test".to_string(), Duration::from_secs(1));
        assert!(matches!(result, Err(BusError::Connection(_))));
    }

    #[test]
    fn test_from_config_generates_client_name() {
        let config = BusConfig::default();
        let broker = RedisBroker::from_config(&config).unwrap();
        assert!(broker.client_name().starts_with("relayline-"));
        assert!(!broker.is_connected());
    }

    #[test]
    fn test_client_setname_command() {
        let packed = client_setname("relayline-1").get_packed_command();
        assert_eq!(
            packed,
            b"*3\r\n$6\r\nCLIENT\r\n$7\r\nSETNAME\r\n$11\r\nrelayline-1\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let broker =
            RedisBroker::new("redis://127.0.0.1:6379", "test".to_string(), Duration::from_secs(1))
                .unwrap();
        let result = broker.publish("lights", Bytes::from_static(b"on")).await;
        assert!(matches!(result, Err(BusError::NotConnected)));
    }
}
