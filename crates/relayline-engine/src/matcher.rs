/*!
 * Pattern matching for response definitions.
 *
 * Each [`ResponseDefinition`] is compiled once into a [`CompiledResponse`].
 * Matching a line never mutates the definition: the captured payload is
 * returned in the [`Match`].
 */
use regex::Regex;
use tracing::warn;

use crate::definition::{EndWith, ResponseDefinition};
use crate::error::Result;
use crate::hex;

/// Outcome of testing one line against one definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    /// Whether the definition matched
    pub matched: bool,
    /// First capture group, when the pattern has one and it participated
    pub captured: Option<String>,
}

impl Match {
    /// No match
    pub fn none() -> Self {
        Self::default()
    }

    /// A successful match
    pub fn found(captured: Option<String>) -> Self {
        Self {
            matched: true,
            captured,
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Exact comparison with the pattern plus its terminator
    Literal(String),
    /// Regex run against the trimmed line, or its hex rendering
    Regex { regex: Regex, on_hex: bool },
    /// Exact comparison with decoded bytes
    Bytes(Vec<u8>),
    /// The definition failed to compile and never matches
    Invalid(String),
}

/// A response definition prepared for matching
#[derive(Debug, Clone)]
pub struct CompiledResponse {
    definition: ResponseDefinition,
    matcher: Matcher,
}

impl CompiledResponse {
    /// Compile a definition, failing on a malformed regex or hex pattern
    ///
    /// When `supports_hex` is false the definition's `useHex` flag is ignored.
    pub fn try_compile(definition: ResponseDefinition, supports_hex: bool) -> Result<Self> {
        let use_hex = supports_hex && definition.use_hex;

        let matcher = match (definition.use_regular_expression, use_hex) {
            (true, on_hex) => Matcher::Regex {
                regex: Regex::new(&definition.pattern)?,
                on_hex,
            },
            (false, true) => Matcher::Bytes(hex::parse_tokens(&definition.pattern)?),
            (false, false) => Matcher::Literal(definition.end_with.append_to(&definition.pattern)),
        };

        Ok(Self {
            definition,
            matcher,
        })
    }

    /// Compile a definition, keeping it as a never-matching entry on error
    pub fn compile(definition: ResponseDefinition, supports_hex: bool) -> Self {
        match Self::try_compile(definition.clone(), supports_hex) {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(
                    "Response '{}' on channel {} will never match: {}",
                    definition.display_name(),
                    definition.channel,
                    e
                );
                Self {
                    definition,
                    matcher: Matcher::Invalid(e.to_string()),
                }
            }
        }
    }

    /// The source definition
    pub fn definition(&self) -> &ResponseDefinition {
        &self.definition
    }

    /// Compile error, if the definition is unusable
    pub fn compile_error(&self) -> Option<&str> {
        match &self.matcher {
            Matcher::Invalid(reason) => Some(reason),
            _ => None,
        }
    }

    /// Test `line` against this definition
    pub fn matches(&self, line: &str) -> Match {
        match &self.matcher {
            Matcher::Literal(expected) => {
                if line == expected {
                    Match::found(None)
                } else {
                    Match::none()
                }
            }
            Matcher::Bytes(expected) => {
                if line.as_bytes() == expected.as_slice() {
                    Match::found(None)
                } else {
                    Match::none()
                }
            }
            Matcher::Regex { regex, on_hex } => {
                if !self.definition.end_with.is_satisfied_by(line) {
                    return Match::none();
                }
                if *on_hex {
                    match_regex(regex, &hex::render(line.as_bytes()))
                } else {
                    match_regex(regex, line)
                }
            }
            Matcher::Invalid(_) => Match::none(),
        }
    }
}

fn match_regex(regex: &Regex, subject: &str) -> Match {
    let subject = subject.trim();
    if subject.is_empty() {
        return Match::none();
    }

    match regex.captures(subject) {
        Some(captures) => {
            let captured = captures.get(1).map(|m| m.as_str().to_string());
            Match::found(captured)
        }
        None => Match::none(),
    }
}

/// Test one line against one definition without precompiling it
pub fn match_line(line: &str, definition: &ResponseDefinition, supports_hex: bool) -> Result<Match> {
    let compiled = CompiledResponse::try_compile(definition.clone(), supports_hex)?;
    Ok(compiled.matches(line))
}

/// Whether `line` carries the terminator `end_with` expects
pub fn check_end_with(line: &str, end_with: EndWith) -> bool {
    end_with.is_satisfied_by(line)
}
