//! Hex token helpers shared by both directions.
//!
//! Token lists look like `"0x02 0x50 0x57"`. A token with a `0x` prefix is
//! read in base 16, a bare token in base 10 (`"41"` is byte 41, not 0x41).

use crate::error::{Error, Result};

/// Render bytes as space-separated lowercase `0x`-prefixed tokens
pub fn render(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:#04x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a whitespace-separated token list into bytes
///
/// Surrounding whitespace, including line terminators, is ignored.
pub fn parse_tokens(text: &str) -> Result<Vec<u8>> {
    text.split_ascii_whitespace().map(parse_token).collect()
}

fn parse_token(token: &str) -> Result<u8> {
    let (digits, radix) = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(digits) => (digits, 16),
        None => (token, 10),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(Error::definition(format!("invalid byte token '{}'", token)));
    }

    u8::from_str_radix(digits, radix)
        .map_err(|_| Error::definition(format!("byte token '{}' does not fit in a byte", token)))
}
