/*!
 * Inbound direction: bus messages to protocol commands.
 *
 * A message on a channel is matched against the command table by exact
 * channel name. Matching commands are rendered and handed to the
 * [`CommandSink`], last declared first. The first command using `#PAYLOAD#`
 * ends processing of the message, whether or not it could be sent.
 */
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use relayline_core::types::MessageEnvelope;

use crate::definition::CommandDefinition;
use crate::error::{Error, Result};
use crate::hex;
use crate::sink::{CommandSink, RenderedCommand};
use crate::types::EngineFlags;

/// Placeholder replaced by the envelope value
pub const PAYLOAD_TOKEN: &str = "#PAYLOAD#";

/// Whether `command` substitutes the message value into its pattern
pub fn takes_payload(command: &CommandDefinition) -> bool {
    command.pattern.contains(PAYLOAD_TOKEN)
}

/// Turns bus messages into protocol commands
pub struct CommandEngine {
    service_name: String,
    commands: Vec<CommandDefinition>,
    sink: Arc<dyn CommandSink>,
    flags: EngineFlags,
    debug: bool,
}

impl std::fmt::Debug for CommandEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEngine")
            .field("service_name", &self.service_name)
            .field("commands", &self.commands.len())
            .field("flags", &self.flags)
            .finish()
    }
}

impl CommandEngine {
    /// Create an engine delivering to `sink`
    pub fn new(
        service_name: &str,
        commands: Vec<CommandDefinition>,
        sink: Arc<dyn CommandSink>,
        flags: EngineFlags,
        debug: bool,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            commands,
            sink,
            flags,
            debug,
        }
    }

    /// The command table, in declaration order
    pub fn commands(&self) -> &[CommandDefinition] {
        &self.commands
    }

    /// Distinct channels the command table listens on, in first-seen order
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();
        for command in &self.commands {
            if !channels.contains(&command.channel) {
                channels.push(command.channel.clone());
            }
        }
        channels
    }

    /// Map an incoming channel name to the name used in the command table
    pub fn normalize_channel<'a>(&self, channel: &'a str) -> &'a str {
        let channel = channel.trim();
        match self.flags.channel_prefix(&self.service_name) {
            Some(prefix) => channel.strip_prefix(prefix.as_str()).unwrap_or(channel),
            None => channel,
        }
    }

    /// Handle a raw bus message
    ///
    /// Returns the number of commands delivered. Undecodable payloads are
    /// logged and dropped.
    pub fn handle(&self, channel: &str, payload: &[u8]) -> usize {
        match Self::decode(payload) {
            Ok(envelope) => self.handle_envelope(channel, &envelope),
            Err(e) => {
                warn!("Ignoring message on {}: {}", channel.trim(), e);
                0
            }
        }
    }

    /// Decode a bus payload into an envelope
    pub fn decode(payload: &[u8]) -> Result<MessageEnvelope> {
        MessageEnvelope::decode(payload).map_err(|e| match e {
            relayline_core::error::Error::Envelope(msg) => Error::envelope(msg),
            other => Error::envelope(other.to_string()),
        })
    }

    /// Handle an already decoded envelope
    pub fn handle_envelope(&self, channel: &str, envelope: &MessageEnvelope) -> usize {
        let channel = self.normalize_channel(channel);
        if self.debug {
            debug!(
                "Message on channel: {} with value: {}",
                channel,
                envelope.value.as_deref().unwrap_or("null")
            );
        }

        let mut delivered = 0;
        for command in self.commands.iter().rev().filter(|c| c.channel == channel) {
            match self.render(command, envelope.value.as_deref()) {
                Ok(Some(rendered)) => {
                    if self.deliver(command, rendered) {
                        delivered += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Cannot render command '{}': {}", command.display_name(), e),
            }

            // A payload command ends processing of the message.
            if takes_payload(command) {
                break;
            }
        }

        delivered
    }

    fn deliver(&self, command: &CommandDefinition, rendered: RenderedCommand) -> bool {
        if self.debug {
            debug!("Sending command '{}': {}", command.display_name(), rendered);
        }
        match self.sink.deliver(rendered) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to deliver command '{}': {}", command.display_name(), e);
                false
            }
        }
    }

    /// Render one command for `value`
    ///
    /// `Ok(None)` means nothing is sent: the pattern expects a payload and
    /// the message carried none.
    pub fn render(&self, command: &CommandDefinition, value: Option<&str>) -> Result<Option<RenderedCommand>> {
        let text = command.end_with.append_to(&command.pattern);

        let text = if text.contains(PAYLOAD_TOKEN) {
            match value {
                Some(value) => text.replace(PAYLOAD_TOKEN, value),
                None => {
                    if self.debug {
                        debug!(
                            "Command '{}' expects a payload but the message has none",
                            command.display_name()
                        );
                    }
                    return Ok(None);
                }
            }
        } else {
            text
        };

        if self.flags.supports_hex && command.use_hex {
            let bytes = hex::parse_tokens(&text)?;
            Ok(Some(RenderedCommand::Bytes(Bytes::from(bytes))))
        } else {
            Ok(Some(RenderedCommand::Text(text)))
        }
    }
}
