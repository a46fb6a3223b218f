//! Message Codec - Tagged-value wire format
//! =========================================
//!
//! The race server exchanges plain UTF-8 text made of parenthesized groups.
//! Each group carries a tag followed by zero or more numbers:
//!
//! ```text
//! (angle 0.003)(curLapTime -0.982)(track 4.9 5.1 7.3 ...)(gear 0)
//! ```
//!
//! Encoding is pure and infallible. Decoding skips any text that sits
//! outside a group (the server mixes in tokens such as `***identified***`)
//! and rejects unbalanced or nested parentheses, empty groups, and values
//! that are not numbers.
//!
//! Duplicate tags within one payload keep the position of their first
//! occurrence and the values of their last one.

use std::fmt::{self, Write as _};
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Malformed wire text. Offsets are byte offsets into the decoded text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unclosed group starting at byte {offset}")]
    UnclosedGroup { offset: usize },

    #[error("Nested group at byte {offset}")]
    NestedGroup { offset: usize },

    #[error("Unmatched ')' at byte {offset}")]
    UnmatchedClose { offset: usize },

    #[error("Group at byte {offset} has no tag")]
    MissingTag { offset: usize },

    #[error("Tag '{tag}' has non-numeric value '{token}'")]
    InvalidNumber { tag: String, token: String },
}

// =============================================================================
// WIRE MESSAGE
// =============================================================================

/// Ordered mapping from tag to an ordered list of numbers.
///
/// Messages are tiny (a few dozen tags at most), so lookups scan a vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireMessage {
    entries: Vec<(String, Vec<f64>)>,
}

impl WireMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the values for `tag`.
    ///
    /// A replaced tag keeps its original position. Returns the previous values.
    pub fn insert(&mut self, tag: impl Into<String>, values: Vec<f64>) -> Option<Vec<f64>> {
        let tag = tag.into();
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, existing)) => Some(std::mem::replace(existing, values)),
            None => {
                self.entries.push((tag, values));
                None
            }
        }
    }

    /// Builder form of [`WireMessage::insert`].
    pub fn with(mut self, tag: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(tag, values);
        self
    }

    /// Builder shorthand for a single-valued tag.
    pub fn with_value(self, tag: impl Into<String>, value: f64) -> Self {
        self.with(tag, vec![value])
    }

    /// Returns all values for `tag`.
    pub fn get(&self, tag: &str) -> Option<&[f64]> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_slice())
    }

    /// Returns the first value for `tag`.
    pub fn first(&self, tag: &str) -> Option<f64> {
        self.get(tag).and_then(|v| v.first().copied())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates tags and values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v.as_slice()))
    }

    /// Iterates tags in insertion order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }
}

impl<T: Into<String>> FromIterator<(T, Vec<f64>)> for WireMessage {
    fn from_iter<I: IntoIterator<Item = (T, Vec<f64>)>>(iter: I) -> Self {
        let mut msg = WireMessage::new();
        for (tag, values) in iter {
            msg.insert(tag, values);
        }
        msg
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

impl FromStr for WireMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

// =============================================================================
// ENCODE / DECODE
// =============================================================================

/// Renders a message as wire text.
///
/// Numbers use the shortest decimal form that parses back to the same
/// value, so integral values carry no fractional part (`30`, `-90`).
/// Tags are written verbatim and must not contain whitespace or parentheses.
pub fn encode(message: &WireMessage) -> String {
    let mut out = String::with_capacity(message.len() * 16);
    for (tag, values) in message.iter() {
        out.push('(');
        out.push_str(tag);
        for value in values {
            // Writing into a String cannot fail
            let _ = write!(out, " {value}");
        }
        out.push(')');
    }
    out
}

/// Parses wire text into a message.
///
/// Text outside of groups is ignored.
pub fn decode(text: &str) -> Result<WireMessage, ProtocolError> {
    let mut message = WireMessage::new();
    let mut open: Option<usize> = None;

    for (offset, ch) in text.char_indices() {
        match (ch, open) {
            ('(', None) => open = Some(offset),
            ('(', Some(_)) => return Err(ProtocolError::NestedGroup { offset }),
            (')', None) => return Err(ProtocolError::UnmatchedClose { offset }),
            (')', Some(start)) => {
                let (tag, values) = parse_group(&text[start + 1..offset], start)?;
                message.insert(tag, values);
                open = None;
            }
            _ => {}
        }
    }

    if let Some(offset) = open {
        return Err(ProtocolError::UnclosedGroup { offset });
    }
    Ok(message)
}

fn parse_group(interior: &str, offset: usize) -> Result<(&str, Vec<f64>), ProtocolError> {
    let mut tokens = interior.split_whitespace();
    let tag = tokens.next().ok_or(ProtocolError::MissingTag { offset })?;

    let values = tokens
        .map(|token| {
            token.parse::<f64>().map_err(|_| ProtocolError::InvalidNumber {
                tag: tag.to_string(),
                token: token.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((tag, values))
}
