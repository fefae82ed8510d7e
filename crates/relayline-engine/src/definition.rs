/*!
 * Response and command definition tables.
 *
 * A service is described by a JSON document:
 *
 * ```json
 * {
 *   "serviceName": "projector",
 *   "serviceCommands": [
 *     { "channel": "projector.power", "pattern": "PWR #PAYLOAD#", "endWith": "r" }
 *   ],
 *   "serviceResponses": [
 *     { "channel": "projector.lamp", "pattern": "LAMP=(\\d+)", "endWith": "r",
 *       "useRegularExpression": true, "persist": true }
 *   ]
 * }
 * ```
 */
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Expected trailing control sequence of a protocol line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndWith {
    /// No terminator
    #[default]
    #[serde(alias = "")]
    None,
    /// Carriage return
    R,
    /// Line feed
    N,
    /// Carriage return followed by line feed
    Rn,
}

impl EndWith {
    /// The terminator characters
    pub fn terminator(self) -> &'static str {
        match self {
            EndWith::None => "",
            EndWith::R => "\r",
            EndWith::N => "\n",
            EndWith::Rn => "\r\n",
        }
    }

    /// Append the terminator to `text`
    pub fn append_to(self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 2);
        out.push_str(text);
        out.push_str(self.terminator());
        out
    }

    /// Whether `line` ends the way this terminator requires
    ///
    /// `None` accepts only lines that end in neither `\r` nor `\n`.
    pub fn is_satisfied_by(self, line: &str) -> bool {
        match self {
            EndWith::None => !line.ends_with('\r') && !line.ends_with('\n'),
            EndWith::R => line.ends_with('\r'),
            EndWith::N => line.ends_with('\n'),
            EndWith::Rn => line.ends_with("\r\n"),
        }
    }
}

impl FromStr for EndWith {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "none" => Ok(EndWith::None),
            "r" => Ok(EndWith::R),
            "n" => Ok(EndWith::N),
            "rn" => Ok(EndWith::Rn),
            other => Err(Error::definition(format!("unknown endWith '{}'", other))),
        }
    }
}

// A missing, null or unrecognised terminator falls back to `none` so one bad
// entry does not reject the whole table.
fn deserialize_end_with<'de, D>(deserializer: D) -> std::result::Result<EndWith, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(EndWith::None),
        Some(serde_json::Value::String(s)) => Ok(s.parse().unwrap_or_else(|e| {
            warn!("{}, treating it as none", e);
            EndWith::None
        })),
        Some(other) => {
            warn!("unknown endWith {}, treating it as none", other);
            Ok(EndWith::None)
        }
    }
}

impl fmt::Display for EndWith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndWith::None => "none",
            EndWith::R => "r",
            EndWith::N => "n",
            EndWith::Rn => "rn",
        };
        write!(f, "{}", name)
    }
}

/// Outbound definition: a protocol line pattern and the channel to publish on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDefinition {
    /// Bus channel to publish to
    pub channel: String,

    /// Literal text, regular expression source, or hex byte tokens
    #[serde(default)]
    pub pattern: String,

    /// Expected line terminator
    #[serde(default, deserialize_with = "deserialize_end_with")]
    pub end_with: EndWith,

    /// Treat `pattern` as a regular expression
    #[serde(default)]
    pub use_regular_expression: bool,

    /// Match against the hexadecimal form of the line
    #[serde(default)]
    pub use_hex: bool,

    /// Carried into the envelope for downstream consumers
    #[serde(default)]
    pub persist: bool,

    /// Display name used in diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

impl ResponseDefinition {
    /// A literal definition
    pub fn literal<C: Into<String>, P: Into<String>>(channel: C, pattern: P, end_with: EndWith) -> Self {
        Self {
            channel: channel.into(),
            pattern: pattern.into(),
            end_with,
            use_regular_expression: false,
            use_hex: false,
            persist: false,
            friendly_name: None,
        }
    }

    /// A regular-expression definition
    pub fn regex<C: Into<String>, P: Into<String>>(channel: C, pattern: P, end_with: EndWith) -> Self {
        Self {
            use_regular_expression: true,
            ..Self::literal(channel, pattern, end_with)
        }
    }

    /// A hex byte-sequence definition
    pub fn hex<C: Into<String>, P: Into<String>>(channel: C, pattern: P) -> Self {
        Self {
            use_hex: true,
            ..Self::literal(channel, pattern, EndWith::None)
        }
    }

    /// Set the hex flag
    pub fn with_hex(mut self, use_hex: bool) -> Self {
        self.use_hex = use_hex;
        self
    }

    /// Set the persist flag
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Set the display name
    pub fn with_friendly_name<S: Into<String>>(mut self, name: S) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Friendly name, falling back to the channel
    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.channel)
    }
}

/// Inbound definition: a channel and the protocol string to send for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDefinition {
    /// Bus channel, matched exactly
    pub channel: String,

    /// Command template, may contain `#PAYLOAD#`
    #[serde(default)]
    pub pattern: String,

    /// Terminator appended to the rendered command
    #[serde(default, deserialize_with = "deserialize_end_with")]
    pub end_with: EndWith,

    /// Send the rendered command as raw bytes parsed from hex tokens
    #[serde(default)]
    pub use_hex: bool,

    /// Display name used in diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

impl CommandDefinition {
    /// A text command
    pub fn new<C: Into<String>, P: Into<String>>(channel: C, pattern: P, end_with: EndWith) -> Self {
        Self {
            channel: channel.into(),
            pattern: pattern.into(),
            end_with,
            use_hex: false,
            friendly_name: None,
        }
    }

    /// Set the hex flag
    pub fn with_hex(mut self, use_hex: bool) -> Self {
        self.use_hex = use_hex;
        self
    }

    /// Set the display name
    pub fn with_friendly_name<S: Into<String>>(mut self, name: S) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Friendly name, falling back to the channel
    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.channel)
    }
}

/// A complete service description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Service identifier, used as the envelope origin
    #[serde(default)]
    pub service_name: String,

    /// Inbound command table
    #[serde(default)]
    pub service_commands: Vec<CommandDefinition>,

    /// Outbound response table
    #[serde(default)]
    pub service_responses: Vec<ResponseDefinition>,
}

impl ServiceDefinition {
    /// Create a service definition
    pub fn new<S: Into<String>>(
        service_name: S,
        service_commands: Vec<CommandDefinition>,
        service_responses: Vec<ResponseDefinition>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            service_commands,
            service_responses,
        }
    }

    /// Parse and validate a service definition from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load and validate a service definition from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading service definition from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Every definition needs a non-blank channel
    pub fn validate(&self) -> Result<()> {
        if let Some(index) = self
            .service_commands
            .iter()
            .position(|c| c.channel.trim().is_empty())
        {
            return Err(Error::definition(format!(
                "serviceCommands[{}] has an empty channel",
                index
            )));
        }
        if let Some(index) = self
            .service_responses
            .iter()
            .position(|r| r.channel.trim().is_empty())
        {
            return Err(Error::definition(format!(
                "serviceResponses[{}] has an empty channel",
                index
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_with_terminators() {
        assert_eq!(EndWith::None.append_to("PWR"), "PWR");
        assert_eq!(EndWith::R.append_to("PWR"), "PWR\r");
        assert_eq!(EndWith::N.append_to("PWR"), "PWR\n");
        assert_eq!(EndWith::Rn.append_to("PWR"), "PWR\r\n");
    }

    #[test]
    fn test_end_with_check() {
        assert!(EndWith::None.is_satisfied_by("OK"));
        assert!(!EndWith::None.is_satisfied_by("OK\r"));
        assert!(!EndWith::None.is_satisfied_by("OK\n"));
        assert!(!EndWith::None.is_satisfied_by("OK\r\n"));

        assert!(EndWith::R.is_satisfied_by("OK\r"));
        assert!(!EndWith::R.is_satisfied_by("OK\r\n"));

        assert!(EndWith::N.is_satisfied_by("OK\n"));
        assert!(!EndWith::N.is_satisfied_by("OK"));

        assert!(EndWith::Rn.is_satisfied_by("OK\r\n"));
        assert!(!EndWith::Rn.is_satisfied_by("OK\n"));
        assert!(!EndWith::Rn.is_satisfied_by("OK\r"));
    }

    #[test]
    fn test_parse_service_definition() {
        let json = r#"{
            "serviceName": "projector",
            "serviceCommands": [
                { "channel": "projector.power", "pattern": "PWR #PAYLOAD#", "endWith": "r" },
                { "channel": "projector.raw", "pattern": "0x02 0x50", "useHex": true }
            ],
            "serviceResponses": [
                { "channel": "projector.lamp", "pattern": "LAMP=(\\d+)", "endWith": "rn",
                  "useRegularExpression": true, "persist": true, "friendlyName": "Lamp hours" },
                { "channel": "projector.ready", "pattern": "READY", "endWith": "" }
            ]
        }"#;

        let definition = ServiceDefinition::from_json_str(json).unwrap();
        assert_eq!(definition.service_name, "projector");

        let power = &definition.service_commands[0];
        assert_eq!(power.end_with, EndWith::R);
        assert!(!power.use_hex);
        assert!(definition.service_commands[1].use_hex);
        assert_eq!(definition.service_commands[1].end_with, EndWith::None);

        let lamp = &definition.service_responses[0];
        assert!(lamp.use_regular_expression);
        assert!(lamp.persist);
        assert_eq!(lamp.end_with, EndWith::Rn);
        assert_eq!(lamp.display_name(), "Lamp hours");

        let ready = &definition.service_responses[1];
        assert_eq!(ready.end_with, EndWith::None);
        assert_eq!(ready.display_name(), "projector.ready");
    }

    #[test]
    fn test_missing_channel_is_rejected() {
        let json = r#"{ "serviceCommands": [ { "pattern": "PWR ON" } ] }"#;
        assert!(matches!(
            ServiceDefinition::from_json_str(json),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_blank_channel_is_rejected() {
        let json = r#"{ "serviceResponses": [ { "channel": "  ", "pattern": "OK" } ] }"#;
        assert!(matches!(
            ServiceDefinition::from_json_str(json),
            Err(Error::Definition(_))
        ));
    }

    #[test]
    fn test_unknown_end_with_falls_back_to_none() {
        let json = r#"{
            "serviceName": "amp",
            "serviceCommands": [ { "channel": "a", "pattern": "X", "endWith": "crlf" } ],
            "serviceResponses": [
                { "channel": "ok", "pattern": "OK", "endWith": "r" },
                { "channel": "upper", "pattern": "OK", "endWith": "CR" },
                { "channel": "null", "pattern": "OK", "endWith": null },
                { "channel": "number", "pattern": "OK", "endWith": 13 }
            ]
        }"#;

        let definition = ServiceDefinition::from_json_str(json).unwrap();
        assert_eq!(definition.service_commands[0].end_with, EndWith::None);

        let terminators: Vec<_> = definition
            .service_responses
            .iter()
            .map(|r| r.end_with)
            .collect();
        assert_eq!(
            terminators,
            [EndWith::R, EndWith::None, EndWith::None, EndWith::None]
        );
    }

    #[test]
    fn test_end_with_from_str() {
        assert_eq!("rn".parse::<EndWith>().unwrap(), EndWith::Rn);
        assert_eq!("".parse::<EndWith>().unwrap(), EndWith::None);
        assert!(matches!("CR".parse::<EndWith>(), Err(Error::Definition(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(&path, r#"{ "serviceName": "amp" }"#).unwrap();

        let definition = ServiceDefinition::from_file(&path).unwrap();
        assert_eq!(definition.service_name, "amp");
        assert!(definition.service_commands.is_empty());

        assert!(matches!(
            ServiceDefinition::from_file(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
