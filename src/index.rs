//! Small newtype wrappers for the various index spaces the runtime juggles
//! (state numbers, rule numbers, decision numbers, token types). Kept
//! distinct so a rule index can never be passed where a state number is
//! expected.

use std::fmt::{Display, Formatter};

macro_rules! index_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self(v)
            }
        }
        impl From<$name> for usize {
            fn from(v: $name) -> Self {
                v.0
            }
        }
        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_newtype!(StateIndex);
index_newtype!(RuleIndex);
index_newtype!(DecisionIndex);

/// Token/character type. `-1` is EOF (matching the wire format's convention),
/// so this is a signed 32-bit value rather than a newtype over `usize`.
pub type TokenType = i32;

pub const EOF: TokenType = -1;
