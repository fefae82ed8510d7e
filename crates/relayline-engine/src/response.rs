/*!
 * Outbound direction: protocol lines to bus messages.
 *
 * Every line is tested against the whole response table. Matches are
 * published in reverse declaration order, so the last declared response
 * reaches the bus first.
 */
use std::sync::Arc;

use tracing::{debug, warn, Instrument};

use relayline_bus::Broker;
use relayline_core::logging::operation_span;
use relayline_core::types::{MessageEnvelope, NULL_VALUE};

use crate::definition::ResponseDefinition;
use crate::error::Result;
use crate::matcher::CompiledResponse;
use crate::types::EngineFlags;

/// Publishes envelopes for protocol lines that match the response table
#[derive(Debug)]
pub struct ResponseEngine {
    service_name: String,
    responses: Vec<CompiledResponse>,
    broker: Arc<dyn Broker>,
    flags: EngineFlags,
    debug: bool,
}

impl ResponseEngine {
    /// Compile `responses` and bind them to `broker`
    pub fn new(
        service_name: &str,
        responses: Vec<ResponseDefinition>,
        broker: Arc<dyn Broker>,
        flags: EngineFlags,
        debug: bool,
    ) -> Self {
        let responses = responses
            .into_iter()
            .map(|definition| CompiledResponse::compile(definition, flags.supports_hex))
            .collect();

        Self {
            service_name: service_name.to_string(),
            responses,
            broker,
            flags,
            debug,
        }
    }

    /// The compiled response table, in declaration order
    pub fn responses(&self) -> &[CompiledResponse] {
        &self.responses
    }

    /// Matching responses in declaration order, with the value each would publish
    ///
    /// Literal matches carry `"null"`. Regex matches carry their capture, or
    /// nothing when the pattern captured nothing (or an empty string).
    pub fn evaluate(&self, line: &str) -> Vec<(&ResponseDefinition, Option<String>)> {
        self.responses
            .iter()
            .filter_map(|response| {
                let result = response.matches(line);
                if !result.matched {
                    return None;
                }

                let definition = response.definition();
                let value = if definition.use_regular_expression {
                    result.captured.filter(|captured| !captured.is_empty())
                } else {
                    Some(NULL_VALUE.to_string())
                };
                Some((definition, value))
            })
            .collect()
    }

    /// Publish an envelope for every response matching `line`
    ///
    /// Returns the number of envelopes the broker accepted.
    pub async fn publish(&self, line: &str) -> usize {
        if !self.broker.is_connected() {
            warn!("Cannot publish message until connected to the bus");
            return 0;
        }

        let span = operation_span("publish", &self.service_name);
        async {
            let mut published = 0;

            for (definition, value) in self.evaluate(line).into_iter().rev() {
                let Some(value) = value else {
                    if self.debug {
                        debug!(
                            "Response '{}' matched without a captured value, nothing published",
                            definition.display_name()
                        );
                    }
                    continue;
                };

                let envelope =
                    self.flags
                        .envelope(&self.service_name, Some(value), definition.persist);
                match self.send(&definition.channel, &envelope).await {
                    Ok(()) => published += 1,
                    Err(e) => warn!("Exception publishing message to {}: {}", definition.channel, e),
                }
            }

            published
        }
        .instrument(span)
        .await
    }

    /// Publish `value` on `channel` without consulting the response table
    pub async fn publish_direct(&self, channel: &str, value: Option<String>) -> Result<()> {
        let envelope = if self.flags.envelope_has_metadata {
            MessageEnvelope::direct(&self.service_name, value)
        } else {
            MessageEnvelope {
                value,
                ..MessageEnvelope::default()
            }
        };
        self.send(channel, &envelope).await
    }

    async fn send(&self, channel: &str, envelope: &MessageEnvelope) -> Result<()> {
        if self.debug {
            debug!(
                "Publishing to channel: {} with value: {}",
                channel,
                envelope.value.as_deref().unwrap_or("null")
            );
        }
        let payload = envelope.encode()?;
        self.broker.publish(channel, payload).await?;
        Ok(())
    }
}
