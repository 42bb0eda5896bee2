//! §4: FIRST-set computation used for error-recovery hints and for the
//! ATN's own `next_tokens` convenience query. This is a small, conservative
//! analyzer — it does not attempt full LL(*) lookahead; `ParserATNSimulator`
//! is what actually drives prediction.

use crate::atn::state::ATNStateType;
use crate::atn::transition::Transition;
use crate::atn::ATN;
use crate::index::{StateIndex, EOF};
use crate::interval_set::IntervalSet;
use std::collections::HashSet;

pub struct LL1Analyzer;

impl LL1Analyzer {
    /// FIRST(state) within state's own rule body: follow epsilon closures
    /// and collect the label sets of every terminal transition reachable
    /// without crossing a rule boundary. If the closure can reach the
    /// rule's stop state, EOF is conservatively added (matching the
    /// reference analyzer's "could match nothing, so anything that follows
    /// is possible" behaviour at the top level).
    pub fn first_of_state(atn: &ATN, state: StateIndex) -> IntervalSet {
        let mut result = IntervalSet::new();
        let mut visited = HashSet::new();
        Self::first_closure(atn, state, &mut result, &mut visited);
        result
    }

    fn first_closure(atn: &ATN, state: StateIndex, result: &mut IntervalSet, visited: &mut HashSet<StateIndex>) {
        if !visited.insert(state) {
            return;
        }
        let node = atn.state(state);
        if node.state_type == ATNStateType::RuleStop {
            result.add_one(EOF);
            return;
        }
        for t in &node.transitions {
            match t {
                Transition::Epsilon { target, .. } => Self::first_closure(atn, *target, result, visited),
                Transition::Rule { target, follow_state, .. } => {
                    Self::first_closure(atn, *target, result, visited);
                    // If the invoked rule is nullable this under-approximates
                    // by not continuing into follow_state; acceptable for an
                    // error-hint analyzer rather than an exhaustive FIRST set.
                    let _ = follow_state;
                }
                Transition::Predicate { target, .. }
                | Transition::PrecedencePredicate { target, .. }
                | Transition::Action { target, .. } => Self::first_closure(atn, *target, result, visited),
                terminal => {
                    if let Some(label) = terminal.label(atn.min_vocab(), atn.max_vocab()) {
                        result.add_set(&label);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::atn::state::{ATNState, ATNStateType};
    use crate::atn::transition::Transition;
    use crate::atn::{GrammarType, RuleInfo, ATN};
    use crate::index::{RuleIndex, StateIndex};

    fn tiny_atn() -> ATN {
        // s0 --'a'--> s1 (RuleStop)
        let mut s0 = ATNState::new(StateIndex(0), RuleIndex(0), ATNStateType::Basic);
        let s1 = ATNState::new(StateIndex(1), RuleIndex(0), ATNStateType::RuleStop);
        s0.add_transition(Transition::Atom { target: StateIndex(1), label: 7 });
        ATN {
            grammar_type: GrammarType::Parser,
            max_token_type: 10,
            states: vec![s0, s1],
            rules: vec![RuleInfo { start_state: StateIndex(0), stop_state: StateIndex(1), token_type: None }],
            mode_to_start_state: vec![],
            decision_to_state: vec![],
            lexer_actions: vec![],
        }
    }

    #[test]
    fn first_of_state_collects_terminal_label() {
        let atn = tiny_atn();
        let first = LL1Analyzer::first_of_state(&atn, StateIndex(0));
        assert!(first.contains(7));
    }
}
