//! Common types used throughout the Relayline engine.

use relayline_core::config::ServiceConfig;
use relayline_core::types::MessageEnvelope;

/// Behaviour switches covering the differences between engine revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFlags {
    /// Honour `useHex` on definitions
    pub supports_hex: bool,
    /// Include `published` and `origin` in outgoing envelopes
    pub envelope_has_metadata: bool,
    /// Strip `<service><separator>` from incoming channel names
    pub channel_prefix_stripping: bool,
    /// Separator used by prefix stripping
    pub channel_prefix_separator: String,
}

impl Default for EngineFlags {
    fn default() -> Self {
        Self {
            supports_hex: true,
            envelope_has_metadata: true,
            channel_prefix_stripping: false,
            channel_prefix_separator: ".".to_string(),
        }
    }
}

impl EngineFlags {
    /// Build the envelope for an outgoing value according to these flags
    pub fn envelope(&self, origin: &str, value: Option<String>, persist: bool) -> MessageEnvelope {
        if self.envelope_has_metadata {
            MessageEnvelope::new(origin, value, persist)
        } else {
            MessageEnvelope::bare(value, persist)
        }
    }

    /// The channel prefix for `service`, when stripping is enabled
    pub fn channel_prefix(&self, service: &str) -> Option<String> {
        if self.channel_prefix_stripping && !service.is_empty() {
            Some(format!("{}{}", service, self.channel_prefix_separator))
        } else {
            None
        }
    }
}

/// Options for a [`crate::service::Service`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Emit per-message diagnostics
    pub debug: bool,
    /// Engine behaviour switches
    pub flags: EngineFlags,
}

impl From<&ServiceConfig> for ServiceOptions {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            debug: config.debug,
            flags: EngineFlags {
                supports_hex: config.supports_hex,
                envelope_has_metadata: config.envelope_has_metadata,
                channel_prefix_stripping: config.channel_prefix_stripping,
                channel_prefix_separator: config.channel_prefix_separator.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_follows_metadata_flag() {
        let flags = EngineFlags::default();
        let envelope = flags.envelope("amp", Some("3".to_string()), true);
        assert_eq!(envelope.origin.as_deref(), Some("amp"));
        assert!(envelope.published.is_some());

        let flags = EngineFlags {
            envelope_has_metadata: false,
            ..EngineFlags::default()
        };
        let envelope = flags.envelope("amp", Some("3".to_string()), true);
        assert_eq!(envelope.origin, None);
        assert_eq!(envelope.published, None);
        assert_eq!(envelope.persist, Some(true));
    }

    #[test]
    fn test_channel_prefix() {
        let flags = EngineFlags::default();
        assert_eq!(flags.channel_prefix("amp"), None);

        let flags = EngineFlags {
            channel_prefix_stripping: true,
            channel_prefix_separator: ":".to_string(),
            ..EngineFlags::default()
        };
        assert_eq!(flags.channel_prefix("amp").as_deref(), Some("amp:"));
        assert_eq!(flags.channel_prefix(""), None);
    }

    #[test]
    fn test_options_from_config() {
        let config = ServiceConfig {
            debug: true,
            supports_hex: false,
            ..ServiceConfig::default()
        };
        let options = ServiceOptions::from(&config);
        assert!(options.debug);
        assert!(!options.flags.supports_hex);
        assert!(options.flags.envelope_has_metadata);
    }
}
