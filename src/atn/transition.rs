use crate::index::{RuleIndex, StateIndex, TokenType};
use crate::interval_set::IntervalSet;

/// `-1` sentinel meaning "not a left-recursive-rule return at precedence 0".
pub const NO_PRECEDENCE_RETURN: i32 = -1;

/// The tagged union of §3.3. `matches` is the only behaviour every
/// terminal-carrying variant needs; epsilon variants never match a symbol.
#[derive(Debug, Clone)]
pub enum Transition {
    Epsilon {
        target: StateIndex,
        /// Set on the synthetic RuleStop -> caller-followState edge the
        /// deserializer emits for a left-recursive rule returning at
        /// precedence 0 (§4.9 step 8). `NO_PRECEDENCE_RETURN` otherwise.
        outermost_precedence_return: i32,
    },
    Atom {
        target: StateIndex,
        label: TokenType,
    },
    Range {
        target: StateIndex,
        from: TokenType,
        to: TokenType,
    },
    Set {
        target: StateIndex,
        set: IntervalSet,
    },
    NotSet {
        target: StateIndex,
        set: IntervalSet,
    },
    Wildcard {
        target: StateIndex,
    },
    Rule {
        /// Always a RuleStart state.
        target: StateIndex,
        rule_index: RuleIndex,
        precedence: i32,
        follow_state: StateIndex,
    },
    Predicate {
        target: StateIndex,
        rule_index: RuleIndex,
        pred_index: usize,
        is_ctx_dependent: bool,
    },
    PrecedencePredicate {
        target: StateIndex,
        precedence: i32,
    },
    Action {
        target: StateIndex,
        rule_index: RuleIndex,
        action_index: i32,
    },
}

impl Transition {
    pub fn target(&self) -> StateIndex {
        match self {
            Transition::Epsilon { target, .. }
            | Transition::Atom { target, .. }
            | Transition::Range { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::PrecedencePredicate { target, .. }
            | Transition::Action { target, .. } => *target,
        }
    }

    /// Non-epsilon "terminal" transitions are the only ones that ever carry
    /// a label set; everything else (Epsilon, Rule, Predicate,
    /// PrecedencePredicate, Action) is taken without consuming input.
    pub fn is_epsilon(&self) -> bool {
        !matches!(
            self,
            Transition::Atom { .. }
                | Transition::Range { .. }
                | Transition::Set { .. }
                | Transition::NotSet { .. }
                | Transition::Wildcard { .. }
        )
    }

    /// §3.3 `matches(symbol, minVocab, maxVocab)`.
    pub fn matches(&self, symbol: TokenType, min_vocab: TokenType, max_vocab: TokenType) -> bool {
        match self {
            Transition::Atom { label, .. } => symbol == *label,
            Transition::Range { from, to, .. } => symbol >= *from && symbol <= *to,
            Transition::Set { set, .. } => set.contains(symbol),
            Transition::NotSet { set, .. } => {
                symbol >= min_vocab && symbol <= max_vocab && !set.contains(symbol)
            }
            Transition::Wildcard { .. } => symbol >= min_vocab && symbol <= max_vocab,
            _ => false,
        }
    }

    /// The label set a terminal transition admits, used by the LL(1)
    /// analyzer to compute FIRST sets without simulating a match for every
    /// symbol in the vocabulary.
    pub fn label(&self, min_vocab: TokenType, max_vocab: TokenType) -> Option<IntervalSet> {
        match self {
            Transition::Atom { label, .. } => Some(IntervalSet::single(*label)),
            Transition::Range { from, to, .. } => Some(IntervalSet::of(*from, *to)),
            Transition::Set { set, .. } => Some(set.clone()),
            Transition::NotSet { set, .. } => Some(set.complement(min_vocab, max_vocab)),
            Transition::Wildcard { .. } => Some(IntervalSet::of(min_vocab, max_vocab)),
            _ => None,
        }
    }
}
