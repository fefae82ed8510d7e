/*!
 * The service facade.
 *
 * A [`Service`] owns one device's definition tables and the two engines built
 * from them. It removes pubsub loops before anything runs, publishes protocol
 * lines through the [`ResponseEngine`] and, once started, forwards bus
 * messages on command channels to the [`CommandEngine`].
 */
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use relayline_bus::Broker;
use relayline_core::logging::component_span;

use crate::command::CommandEngine;
use crate::definition::ServiceDefinition;
use crate::error::Result;
use crate::loop_detector::{detect_pubsub_loops_with_prefix, LoopReport};
use crate::response::ResponseEngine;
use crate::sink::CommandSink;
use crate::types::ServiceOptions;

/// A running protocol service bound to a broker
#[derive(Debug)]
pub struct Service {
    /// Service name, used as envelope origin and channel prefix
    name: String,
    /// Options the service was built with
    options: ServiceOptions,
    /// Shared broker
    broker: Arc<dyn Broker>,
    /// Outbound engine
    responses: ResponseEngine,
    /// Inbound engine, absent without a command sink
    commands: Option<Arc<CommandEngine>>,
    /// Responses removed at construction
    loop_report: LoopReport,
    /// Background task handles
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Running flag
    running: RwLock<bool>,
}

impl Service {
    /// Build a service from its definition tables
    ///
    /// Responses sharing a channel with a command are dropped with a warning.
    /// Without a `sink` the service can publish but never subscribes.
    pub fn new(
        definition: ServiceDefinition,
        options: ServiceOptions,
        broker: Arc<dyn Broker>,
        sink: Option<Arc<dyn CommandSink>>,
    ) -> Self {
        let ServiceDefinition {
            service_name,
            service_commands,
            mut service_responses,
        } = definition;

        let prefix = options.flags.channel_prefix(&service_name);
        let loop_report = detect_pubsub_loops_with_prefix(
            &service_commands,
            &mut service_responses,
            prefix.as_deref(),
        );

        let responses = ResponseEngine::new(
            &service_name,
            service_responses,
            broker.clone(),
            options.flags.clone(),
            options.debug,
        );

        let commands = sink.map(|sink| {
            Arc::new(CommandEngine::new(
                &service_name,
                service_commands,
                sink,
                options.flags.clone(),
                options.debug,
            ))
        });

        Self {
            name: service_name,
            options,
            broker,
            responses,
            commands,
            loop_report,
            tasks: Mutex::new(Vec::new()),
            running: RwLock::new(false),
        }
    }

    /// Service name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options the service was built with
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// The broker this service talks to
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Responses removed by the loop check
    pub fn loop_report(&self) -> &LoopReport {
        &self.loop_report
    }

    /// The outbound engine
    pub fn response_engine(&self) -> &ResponseEngine {
        &self.responses
    }

    /// The inbound engine, when a sink was supplied
    pub fn command_engine(&self) -> Option<&CommandEngine> {
        self.commands.as_deref()
    }

    /// Whether [`Service::start`] has run
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Bus channels the service subscribes to, in declaration order
    ///
    /// With prefix stripping enabled these carry the `<service><separator>`
    /// prefix. Empty when the service has no command sink.
    pub fn channels(&self) -> Vec<String> {
        let Some(engine) = &self.commands else {
            return Vec::new();
        };

        let prefix = self.options.flags.channel_prefix(&self.name);
        engine
            .channels()
            .into_iter()
            .map(|channel| match &prefix {
                Some(prefix) => format!("{}{}", prefix, channel),
                None => channel,
            })
            .collect()
    }

    /// Connect the broker if needed and start forwarding command messages
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.write().await;
        if *running {
            return Ok(());
        }

        if !self.broker.is_connected() {
            self.broker.connect().await?;
        }

        match &self.commands {
            Some(engine) => {
                let channels = self.channels();
                if channels.is_empty() {
                    debug!("Service {} has no command channels to subscribe to", self.name);
                } else {
                    let handle = self.start_subscriber(engine.clone(), &channels).await?;
                    self.tasks.lock().await.push(handle);
                }
            }
            None => warn!("Cannot create subscriber for {}: no command sink", self.name),
        }

        *running = true;
        info!(
            "Service {} started on {} broker ({} responses, {} command channels)",
            self.name,
            self.broker.name(),
            self.responses.responses().len(),
            self.channels().len()
        );
        Ok(())
    }

    async fn start_subscriber(
        &self,
        engine: Arc<CommandEngine>,
        channels: &[String],
    ) -> Result<JoinHandle<()>> {
        let mut stream = self.broker.subscribe(channels).await?;
        info!("Subscribed to channels: {}", channels.join(", "));

        let span = component_span("subscriber", Some(&self.name));
        Ok(tokio::spawn(
            async move {
                while let Some(message) = stream.recv().await {
                    engine.handle(&message.channel, &message.payload);
                }
                debug!("Subscription stream closed");
            }
            .instrument(span),
        ))
    }

    /// Publish a protocol line through the response table
    pub async fn publish(&self, line: &str) -> usize {
        self.responses.publish(line).await
    }

    /// Publish `value` on `channel` directly
    pub async fn publish_direct(&self, channel: &str, value: Option<String>) -> Result<()> {
        self.responses.publish_direct(channel, value).await
    }

    /// Handle a raw bus message as if it arrived on `channel`
    pub fn handle(&self, channel: &str, payload: &[u8]) -> usize {
        match &self.commands {
            Some(engine) => engine.handle(channel, payload),
            None => {
                warn!("Cannot handle message on {}: no command sink", channel.trim());
                0
            }
        }
    }

    /// Stop forwarding, unsubscribe and close the broker
    pub async fn shutdown(&self) -> Result<()> {
        let mut running = self.running.write().await;

        {
            let mut tasks = self.tasks.lock().await;
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        if self.broker.is_connected() {
            if let Err(e) = self.broker.unsubscribe_all().await {
                warn!("Failed to unsubscribe service {}: {}", self.name, e);
            }
            self.broker.close().await?;
        }

        *running = false;
        info!("Service {} stopped", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CommandDefinition, EndWith, ResponseDefinition};
    use crate::sink::RenderedCommand;
    use crate::types::EngineFlags;
    use bytes::Bytes;
    use relayline_bus::MemoryBroker;
    use relayline_core::types::MessageEnvelope;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn projector() -> ServiceDefinition {
        ServiceDefinition::new(
            "projector",
            vec![
                CommandDefinition::new("projector.power", "PWR #PAYLOAD#", EndWith::R),
                CommandDefinition::new("projector.raw", "0x41 0x42", EndWith::None).with_hex(true),
            ],
            vec![
                ResponseDefinition::regex("projector.lamp", r"LAMP=(\d+)", EndWith::R),
                ResponseDefinition::literal("projector.power", "PWR", EndWith::R),
            ],
        )
    }

    fn service_with_sink(
        definition: ServiceDefinition,
        options: ServiceOptions,
    ) -> (Service, Arc<MemoryBroker>, mpsc::UnboundedReceiver<RenderedCommand>) {
        let broker = Arc::new(MemoryBroker::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Service::new(definition, options, broker.clone(), Some(Arc::new(tx)));
        (service, broker, rx)
    }

    async fn next_command(rx: &mut mpsc::UnboundedReceiver<RenderedCommand>) -> RenderedCommand {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for command")
            .expect("sink closed")
    }

    fn envelope(value: &str) -> Bytes {
        MessageEnvelope::new("panel", Some(value.to_string()), false)
            .encode()
            .unwrap()
    }

    #[test]
    fn test_loop_is_removed_at_construction() {
        let (service, _broker, _rx) = service_with_sink(projector(), ServiceOptions::default());

        assert_eq!(service.loop_report().removed.len(), 1);
        assert_eq!(service.loop_report().removed[0].channel, "projector.power");
        assert_eq!(service.response_engine().responses().len(), 1);
    }

    #[test]
    fn test_channels() {
        let (service, _broker, _rx) = service_with_sink(projector(), ServiceOptions::default());
        assert_eq!(service.channels(), ["projector.power", "projector.raw"]);

        let broker = Arc::new(MemoryBroker::new());
        let service = Service::new(projector(), ServiceOptions::default(), broker, None);
        assert!(service.channels().is_empty());
        assert!(service.command_engine().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_bus_message_reaches_sink() {
        let (service, broker, mut rx) = service_with_sink(projector(), ServiceOptions::default());
        service.start().await.unwrap();
        assert!(service.is_running().await);

        broker.publish("projector.power", envelope("ON")).await.unwrap();
        assert_eq!(next_command(&mut rx).await.as_text(), Some("PWR ON\r"));

        broker.publish("projector.raw", envelope("x")).await.unwrap();
        assert_eq!(next_command(&mut rx).await.as_bytes(), b"AB");

        service.shutdown().await.unwrap();
        assert!(!service.is_running().await);
        assert!(!broker.is_connected());
    }

    #[test_log::test(tokio::test)]
    async fn test_prefixed_channels_are_subscribed() {
        let options = ServiceOptions {
            debug: true,
            flags: EngineFlags {
                channel_prefix_stripping: true,
                ..EngineFlags::default()
            },
        };
        let definition = ServiceDefinition::new(
            "amp",
            vec![CommandDefinition::new("volume", "VOL #PAYLOAD#", EndWith::Rn)],
            vec![
                ResponseDefinition::regex("amp.volume", r"VOL=(\d+)", EndWith::Rn),
                ResponseDefinition::regex("amp.level", r"LVL=(\d+)", EndWith::Rn),
            ],
        );
        let (service, broker, mut rx) = service_with_sink(definition, options);
        assert_eq!(service.channels(), ["amp.volume"]);
        assert_eq!(service.loop_report().removed.len(), 1);
        assert_eq!(service.loop_report().removed[0].channel, "amp.volume");
        assert_eq!(service.response_engine().responses().len(), 1);

        service.start().await.unwrap();
        broker.publish("amp.volume", envelope("12")).await.unwrap();
        assert_eq!(next_command(&mut rx).await.as_text(), Some("VOL 12\r\n"));

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_round_trip_between_services() {
        let broker = Arc::new(MemoryBroker::new());

        let device = Service::new(
            ServiceDefinition::new(
                "projector",
                Vec::new(),
                vec![ResponseDefinition::regex("projector.lamp", r"LAMP=(\d+)", EndWith::R).with_persist(true)],
            ),
            ServiceOptions::default(),
            broker.clone(),
            None,
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let display = Service::new(
            ServiceDefinition::new(
                "display",
                vec![CommandDefinition::new("projector.lamp", "LAMP HOURS #PAYLOAD#", EndWith::N)],
                Vec::new(),
            ),
            ServiceOptions::default(),
            broker.clone(),
            Some(Arc::new(tx)),
        );

        device.start().await.unwrap();
        display.start().await.unwrap();

        assert_eq!(device.publish("LAMP=1200\r").await, 1);
        assert_eq!(next_command(&mut rx).await.as_text(), Some("LAMP HOURS 1200\n"));

        display.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_without_sink_still_publishes() {
        let broker = Arc::new(MemoryBroker::new());
        let mut tap = broker.tap();
        let service = Service::new(projector(), ServiceOptions::default(), broker.clone(), None);

        service.start().await.unwrap();
        assert!(broker.is_connected());
        assert_eq!(service.handle("projector.power", &envelope("ON")), 0);

        service
            .publish_direct("projector.status", Some("ready".to_string()))
            .await
            .unwrap();
        let message = tap.try_recv().unwrap();
        assert_eq!(message.channel, "projector.status");
    }

    #[tokio::test]
    async fn test_handle_without_start() {
        let (service, _broker, mut rx) = service_with_sink(projector(), ServiceOptions::default());
        assert_eq!(service.handle(" projector.power ", &envelope("OFF")), 1);
        assert_eq!(rx.try_recv().unwrap().as_text(), Some("PWR OFF\r"));
    }

    #[tokio::test]
    async fn test_publish_before_start_is_dropped() {
        let (service, _broker, _rx) = service_with_sink(projector(), ServiceOptions::default());
        assert_eq!(service.publish("LAMP=5\r").await, 0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (service, _broker, _rx) = service_with_sink(projector(), ServiceOptions::default());
        service.start().await.unwrap();
        service.start().await.unwrap();
        assert_eq!(service.tasks.lock().await.len(), 1);
        service.shutdown().await.unwrap();
    }
}
