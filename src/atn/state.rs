use crate::index::{DecisionIndex, RuleIndex, StateIndex};
use crate::atn::transition::Transition;

/// The BlockStart sub-kinds of §3.2 — a plain `(a|b)`, a `(a|b)*`, or a
/// `(a|b)+`. They share the BlockStart invariant (an `end_state` link to a
/// BlockEnd) but differ in which loop-construct states point back to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStartKind {
    Basic,
    Plus,
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ATNStateType {
    Basic,
    RuleStart,
    RuleStop,
    BlockStart(BlockStartKind),
    BlockEnd,
    PlusLoopback,
    StarLoopEntry,
    StarLoopback,
    LoopEnd,
    TokensStart,
}

impl ATNStateType {
    pub fn is_decision(&self) -> bool {
        matches!(
            self,
            ATNStateType::BlockStart(_)
                | ATNStateType::PlusLoopback
                | ATNStateType::StarLoopEntry
                | ATNStateType::TokensStart
        )
    }
}

/// One node of the ATN graph. `transitions` is the outgoing edge list;
/// `epsilon_only_transitions` and the variant-specific links are populated
/// by the deserializer (§4.9) and frozen afterward — the ATN is read-only
/// once built (§3.1).
#[derive(Debug, Clone)]
pub struct ATNState {
    pub state_number: StateIndex,
    pub rule_index: RuleIndex,
    pub state_type: ATNStateType,
    pub transitions: Vec<Transition>,
    pub epsilon_only_transitions: bool,
    pub non_greedy: bool,

    /// Decision index for decision states (BlockStart/PlusLoopback/
    /// StarLoopEntry/TokensStart); `None` otherwise.
    pub decision: Option<DecisionIndex>,
    /// `StarLoopEntry` flagged by `markPrecedenceDecisions` (§4.9) as the
    /// entry point of a left-recursion-eliminated rule's operator loop.
    pub is_precedence_decision: bool,

    /// BlockStart -> its BlockEnd.
    pub end_state: Option<StateIndex>,
    /// BlockEnd -> its BlockStart.
    pub start_state: Option<StateIndex>,
    /// PlusLoopback/StarLoopback -> the loop-entry state it returns to;
    /// LoopEnd -> the loopback state that targets it.
    pub loop_back_state: Option<StateIndex>,
}

impl ATNState {
    pub fn new(state_number: StateIndex, rule_index: RuleIndex, state_type: ATNStateType) -> Self {
        Self {
            state_number,
            rule_index,
            state_type,
            transitions: Vec::new(),
            epsilon_only_transitions: false,
            non_greedy: false,
            decision: None,
            is_precedence_decision: false,
            end_state: None,
            start_state: None,
            loop_back_state: None,
        }
    }

    pub fn is_decision(&self) -> bool {
        self.state_type.is_decision()
    }

    pub fn add_transition(&mut self, t: Transition) {
        if self.transitions.is_empty() {
            self.epsilon_only_transitions = t.is_epsilon();
        } else {
            debug_assert_eq!(
                self.epsilon_only_transitions,
                t.is_epsilon(),
                "cannot mix epsilon and non-epsilon transitions on state {}",
                self.state_number
            );
        }
        self.transitions.push(t);
    }
}
