//! Error types: small structs/enums with a hand-written `Display`, no
//! `thiserror`/`anyhow`.

use crate::config_set::ATNConfigSet;
use std::fmt::{Display, Formatter};

/// §7 deserialization failure (`InvalidArgument` kind): unknown state or
/// transition type, version mismatch, or a `verifyATN` invariant violation.
#[derive(Debug, Clone)]
pub struct ATNDeserializeError {
    message: String,
}

impl ATNDeserializeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
    pub fn version_mismatch(found: u32, expected: u32) -> Self {
        Self::new(format!(
            "version mismatch: serialized ATN is version {}, runtime expects {}",
            found, expected
        ))
    }
    pub fn unknown_state_type(tag: u32) -> Self {
        Self::new(format!("unknown ATN state type tag {}", tag))
    }
    pub fn unknown_transition_type(tag: u32) -> Self {
        Self::new(format!("unknown transition type tag {}", tag))
    }
    pub fn unknown_action_type(tag: u32) -> Self {
        Self::new(format!("unknown lexer action type tag {}", tag))
    }
    pub fn invariant(message: String) -> Self {
        Self::new(format!("ATN invariant violated: {}", message))
    }
    pub fn truncated() -> Self {
        Self::new("serialized ATN data ended unexpectedly")
    }
}

impl Display for ATNDeserializeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvalidArgument: {}", self.message)
    }
}
impl std::error::Error for ATNDeserializeError {}

/// §7.2: the parser's `computeReachSet` yielded an empty reach set at the
/// current token. Carries the dead-end configs so an error strategy
/// upstream can build a richer diagnostic.
#[derive(Debug)]
pub struct NoViableAltError {
    pub start_index: usize,
    pub offending_index: usize,
    pub dead_end_configs: ATNConfigSet,
}

impl Display for NoViableAltError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NoViableAlt: no viable alternative at input index {} (decision started at {})",
            self.offending_index, self.start_index
        )
    }
}
impl std::error::Error for NoViableAltError {}

/// §7.1: no live lexer configuration admits the current character and no
/// prior accept state exists.
#[derive(Debug)]
pub struct LexerNoViableAltError {
    pub start_index: usize,
}

impl Display for LexerNoViableAltError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LexerNoViableAlt: token recognition failed starting at index {}",
            self.start_index
        )
    }
}
impl std::error::Error for LexerNoViableAltError {}
