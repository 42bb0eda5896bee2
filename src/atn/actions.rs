//! Lexer action descriptors (§3.1 `lexerActions`) and the executor that
//! replays them once a token has been recognized (§4.8).

use crate::index::RuleIndex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LexerAction {
    Channel(i32),
    Custom { rule_index: RuleIndex, action_index: i32 },
    Mode(i32),
    More,
    PopMode,
    PushMode(i32),
    Skip,
    Type(i32),
}

impl LexerAction {
    /// Whether the action's effect depends on the current input position
    /// (only `Custom`, which ends up invoking `Recognizer::action`, does;
    /// the others just mutate the lexer's own mode/channel/type state).
    pub fn is_position_dependent(&self) -> bool {
        matches!(self, LexerAction::Custom { .. })
    }
}

/// An ordered list of actions to execute for one token, together with the
/// offset (relative to the token's start) each action carries (§4.8 "Action
/// handling"). A position-dependent action's offset is fixed the moment
/// closure crosses its `Action` transition (mirroring the reference
/// runtime's `LexerIndexedCustomAction`, built once per action at that
/// point rather than recomputed from the eventual match length); every
/// other action's offset is always `0` and unused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LexerActionExecutor {
    pub actions: Vec<Arc<LexerAction>>,
    pub offsets: Vec<i32>,
}

impl LexerActionExecutor {
    pub fn new(actions: Vec<Arc<LexerAction>>) -> Self {
        let offsets = vec![0; actions.len()];
        Self { actions, offsets }
    }

    /// Append `action`, producing a new executor. Used while closing over
    /// an Action transition mid-token; `offset` is the number of input
    /// symbols consumed since the token started at the moment this
    /// transition is crossed, recorded now rather than guessed at accept
    /// time from the final match length.
    pub fn append(base: Option<&Arc<LexerActionExecutor>>, action: Arc<LexerAction>, offset: i32) -> Arc<Self> {
        let mut actions = base.map_or_else(Vec::new, |e| e.actions.clone());
        let mut offsets = base.map_or_else(Vec::new, |e| e.offsets.clone());
        actions.push(action.clone());
        offsets.push(if action.is_position_dependent() { offset } else { 0 });
        Arc::new(Self { actions, offsets })
    }
}
