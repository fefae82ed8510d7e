//! Startup check for publish/subscribe feedback loops.
//!
//! A response publishing on a channel that a command listens to would feed
//! the service its own output. The command table wins: such responses are
//! removed before either engine starts.

use tracing::warn;

use crate::definition::{CommandDefinition, ResponseDefinition};

/// Responses removed by [`detect_pubsub_loops`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// The removed responses, in their original order
    pub removed: Vec<ResponseDefinition>,
}

impl LoopReport {
    /// Whether any loop was found
    pub fn is_clean(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Remove every response whose channel equals a command channel
pub fn detect_pubsub_loops(
    commands: &[CommandDefinition],
    responses: &mut Vec<ResponseDefinition>,
) -> LoopReport {
    detect_pubsub_loops_with_prefix(commands, responses, None)
}

/// Like [`detect_pubsub_loops`], also matching the `prefix`ed command channels
///
/// With channel prefix stripping the service subscribes to
/// `<prefix><channel>`, so a response on that name loops as well.
pub fn detect_pubsub_loops_with_prefix(
    commands: &[CommandDefinition],
    responses: &mut Vec<ResponseDefinition>,
    prefix: Option<&str>,
) -> LoopReport {
    let mut report = LoopReport::default();
    if commands.is_empty() || responses.is_empty() {
        return report;
    }

    let listened: Vec<String> = commands
        .iter()
        .flat_map(|command| {
            let prefixed = prefix.map(|prefix| format!("{}{}", prefix, command.channel));
            std::iter::once(command.channel.clone()).chain(prefixed)
        })
        .collect();

    responses.retain(|response| {
        let looped = listened.contains(&response.channel);
        if looped {
            warn!(
                "Potential pubsub loop detected! Removing response: {} with duplicate channel: {}",
                response.display_name(),
                response.channel
            );
            report.removed.push(response.clone());
        }
        !looped
    });

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::EndWith;

    #[test]
    fn test_removes_response_sharing_command_channel() {
        let commands = vec![CommandDefinition::new("X", "PWR #PAYLOAD#", EndWith::R)];
        let mut responses = vec![
            ResponseDefinition::literal("A", "OK", EndWith::R),
            ResponseDefinition::literal("X", "PWR", EndWith::R).with_friendly_name("echo"),
            ResponseDefinition::literal("B", "ERR", EndWith::R),
        ];

        let report = detect_pubsub_loops(&commands, &mut responses);

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].display_name(), "echo");
        let channels: Vec<_> = responses.iter().map(|r| r.channel.as_str()).collect();
        assert_eq!(channels, ["A", "B"]);
    }

    #[test]
    fn test_adjacent_duplicates_are_all_removed() {
        let commands = vec![
            CommandDefinition::new("X", "a", EndWith::None),
            CommandDefinition::new("Y", "b", EndWith::None),
        ];
        let mut responses = vec![
            ResponseDefinition::literal("X", "1", EndWith::None),
            ResponseDefinition::literal("X", "2", EndWith::None),
            ResponseDefinition::literal("Y", "3", EndWith::None),
            ResponseDefinition::literal("Z", "4", EndWith::None),
        ];

        let report = detect_pubsub_loops(&commands, &mut responses);

        assert_eq!(report.removed.len(), 3);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].channel, "Z");
    }

    #[test]
    fn test_prefixed_command_channel_is_a_loop() {
        let commands = vec![CommandDefinition::new("volume", "VOL #PAYLOAD#", EndWith::Rn)];
        let mut responses = vec![
            ResponseDefinition::literal("amp.volume", "VOL", EndWith::Rn),
            ResponseDefinition::literal("volume", "VOL", EndWith::Rn),
            ResponseDefinition::literal("amp.mute", "MUTE", EndWith::Rn),
        ];

        let report = detect_pubsub_loops_with_prefix(&commands, &mut responses, Some("amp."));

        assert_eq!(report.removed.len(), 2);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].channel, "amp.mute");

        let mut responses = vec![ResponseDefinition::literal("amp.volume", "VOL", EndWith::Rn)];
        assert!(detect_pubsub_loops(&commands, &mut responses).is_clean());
    }

    #[test]
    fn test_unrelated_tables_untouched() {
        let commands = vec![CommandDefinition::new("in", "a", EndWith::None)];
        let mut responses = vec![ResponseDefinition::literal("out", "1", EndWith::None)];
        let before = responses.clone();

        let report = detect_pubsub_loops(&commands, &mut responses);

        assert!(report.is_clean());
        assert_eq!(responses, before);
    }
}
