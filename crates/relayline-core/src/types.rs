/*!
 * Core data types for Relayline.
 *
 * This module defines the message envelope that travels over the bus in both
 * directions: the response side encodes it, the command side decodes it.
 */
use bytes::Bytes;
use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::now_millis;

/// Value published for literal matches that carry no payload
pub const NULL_VALUE: &str = "null";

/// The JSON payload carried on a bus channel
///
/// Wire shape: `{"published": <ms>, "origin": <string>, "value": <string|null>, "persist": <bool>}`.
/// `published` and `origin` are absent when the service runs without envelope
/// metadata, and `persist` is absent for direct publishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Publish time in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<i64>,

    /// Name of the publishing service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// The payload
    #[serde(default, deserialize_with = "deserialize_value")]
    pub value: Option<String>,

    /// Persistence hint for downstream consumers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,
}

impl MessageEnvelope {
    /// Create a fully populated envelope stamped with the current time
    pub fn new<O: Into<String>>(origin: O, value: Option<String>, persist: bool) -> Self {
        Self {
            published: Some(now_millis()),
            origin: Some(origin.into()),
            value,
            persist: Some(persist),
        }
    }

    /// Create an envelope carrying only `value` and `persist`
    pub fn bare(value: Option<String>, persist: bool) -> Self {
        Self {
            published: None,
            origin: None,
            value,
            persist: Some(persist),
        }
    }

    /// Create an envelope for a direct publish (no `persist` field)
    pub fn direct<O: Into<String>>(origin: O, value: Option<String>) -> Self {
        Self {
            published: Some(now_millis()),
            origin: Some(origin.into()),
            value,
            persist: None,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn encode(&self) -> Result<Bytes> {
        let json = serde_json::to_vec(self)
            .map_err(|e| Error::envelope(format!("Failed to encode envelope: {}", e)))?;
        Ok(Bytes::from(json))
    }

    /// Parse an envelope from JSON bytes
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::envelope(format!("Failed to decode envelope: {}", e)))
    }

    /// Whether the payload is null or absent
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

// Scalar payloads from other publishers are accepted in their textual form.
fn deserialize_value<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "unsupported envelope value: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_envelope_shape() {
        let envelope = MessageEnvelope::new("projector", Some("42".to_string()), true);
        let json: serde_json::Value = serde_json::from_slice(&envelope.encode().unwrap()).unwrap();

        assert!(json["published"].as_i64().unwrap() > 0);
        assert_eq!(json["origin"], "projector");
        assert_eq!(json["value"], "42");
        assert_eq!(json["persist"], true);
    }

    #[test]
    fn test_bare_envelope_has_no_metadata() {
        let envelope = MessageEnvelope::bare(Some(NULL_VALUE.to_string()), false);
        let json = String::from_utf8(envelope.encode().unwrap().to_vec()).unwrap();
        assert_eq!(json, r#"{"value":"null","persist":false}"#);
    }

    #[test]
    fn test_direct_envelope_omits_persist() {
        let envelope = MessageEnvelope::direct("projector", Some("on".to_string()));
        let json: serde_json::Value = serde_json::from_slice(&envelope.encode().unwrap()).unwrap();
        assert!(json.get("persist").is_none());
        assert_eq!(json["value"], "on");
    }

    #[test]
    fn test_null_value_is_serialized() {
        let envelope = MessageEnvelope::bare(None, true);
        let json = String::from_utf8(envelope.encode().unwrap().to_vec()).unwrap();
        assert_eq!(json, r#"{"value":null,"persist":true}"#);
    }

    #[test]
    fn test_decode_scalar_values() {
        let envelope = MessageEnvelope::decode(br#"{"value": 5}"#).unwrap();
        assert_eq!(envelope.value.as_deref(), Some("5"));

        let envelope = MessageEnvelope::decode(br#"{"value": true}"#).unwrap();
        assert_eq!(envelope.value.as_deref(), Some("true"));

        let envelope = MessageEnvelope::decode(br#"{"value": null}"#).unwrap();
        assert!(envelope.is_null());

        let envelope = MessageEnvelope::decode(b"{}").unwrap();
        assert!(envelope.is_null());
        assert_eq!(envelope.persist, None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            MessageEnvelope::decode(b"not json"),
            Err(Error::Envelope(_))
        ));
        assert!(MessageEnvelope::decode(br#"{"value": [1, 2]}"#).is_err());
    }
}
