//! ATN deserializer (§4.9): decodes the flat `u32` wire format a grammar
//! tool emits into a ready-to-use [`ATN`]. Tag numbers for state/transition/
//! lexer-action kinds are this crate's own encoding choice — nothing in the
//! spec pins concrete byte values down — documented in `DESIGN.md`.

use crate::atn::actions::LexerAction;
use crate::atn::state::{ATNState, ATNStateType, BlockStartKind};
use crate::atn::transition::{Transition, NO_PRECEDENCE_RETURN};
use crate::atn::{GrammarType, RuleInfo, ATN};
use crate::error::ATNDeserializeError;
use crate::index::{DecisionIndex, RuleIndex, StateIndex, TokenType, EOF};
use crate::interval_set::IntervalSet;
use std::collections::HashSet;

pub const SERIALIZED_VERSION: u32 = 4;

struct Reader<'d> {
    data: &'d [u32],
    pos: usize,
}

impl<'d> Reader<'d> {
    fn new(data: &'d [u32]) -> Self {
        Self { data, pos: 0 }
    }

    fn u32(&mut self) -> Result<u32, ATNDeserializeError> {
        let v = *self.data.get(self.pos).ok_or_else(ATNDeserializeError::truncated)?;
        self.pos += 1;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32, ATNDeserializeError> {
        Ok(self.u32()? as i32)
    }

    fn usize(&mut self) -> Result<usize, ATNDeserializeError> {
        Ok(self.u32()? as usize)
    }

    fn bool(&mut self) -> Result<bool, ATNDeserializeError> {
        Ok(self.u32()? != 0)
    }
}

/// §4.9: read the whole wire format and return a verified [`ATN`]. Mirrors
/// the reference deserializer's read order exactly — state table, then the
/// non-greedy and precedence-rule flag lists, then rules/modes/sets/edges/
/// decisions/actions, then the post-pass links and `markPrecedenceDecisions`
/// — since later sections (`edges`, `decisions`) reference state indices
/// established only once the earlier sections have run.
pub fn deserialize(data: &[u32]) -> Result<ATN, ATNDeserializeError> {
    let mut r = Reader::new(data);

    let version = r.u32()?;
    if version != SERIALIZED_VERSION {
        return Err(ATNDeserializeError::version_mismatch(version, SERIALIZED_VERSION));
    }

    let grammar_type = match r.u32()? {
        0 => GrammarType::Lexer,
        1 => GrammarType::Parser,
        other => return Err(ATNDeserializeError::new(format!("unknown grammar type tag {other}"))),
    };
    let max_token_type: TokenType = r.i32()?;

    let mut states = read_states(&mut r)?;
    read_non_greedy_flags(&mut r, &mut states)?;
    let precedence_rules = read_precedence_rule_flags(&mut r)?;
    let mut rules = read_rules(&mut r, grammar_type)?;
    derive_rule_stop_states(&states, &mut rules);
    let mode_to_start_state = read_modes(&mut r)?;
    let sets = read_interval_sets(&mut r)?;
    read_edges(&mut r, &mut states, &rules, &precedence_rules, &sets)?;
    let decision_to_state = read_decisions(&mut r, &mut states)?;
    let lexer_actions = read_lexer_actions(&mut r)?;

    link_block_end_to_start(&mut states);
    link_loopback_to_entry(&mut states);
    mark_precedence_decisions(&mut states, &rules, &precedence_rules);

    let atn = ATN { grammar_type, max_token_type, states, rules, mode_to_start_state, decision_to_state, lexer_actions };
    atn.verify()?;
    Ok(atn)
}

fn read_states(r: &mut Reader) -> Result<Vec<ATNState>, ATNDeserializeError> {
    let num_states = r.usize()?;
    let mut states = Vec::with_capacity(num_states);
    let mut block_start_end: Vec<Option<usize>> = vec![None; num_states];
    let mut loop_end_back: Vec<Option<usize>> = vec![None; num_states];

    for i in 0..num_states {
        let tag = r.u32()?;
        let rule_index = RuleIndex(r.usize()?);
        let state_type = match tag {
            0 => ATNStateType::Basic,
            1 => ATNStateType::RuleStart,
            2 => ATNStateType::RuleStop,
            3 => ATNStateType::BlockStart(BlockStartKind::Basic),
            4 => ATNStateType::BlockStart(BlockStartKind::Plus),
            5 => ATNStateType::BlockStart(BlockStartKind::Star),
            6 => ATNStateType::BlockEnd,
            7 => ATNStateType::PlusLoopback,
            8 => ATNStateType::StarLoopEntry,
            9 => ATNStateType::StarLoopback,
            10 => ATNStateType::LoopEnd,
            11 => ATNStateType::TokensStart,
            other => return Err(ATNDeserializeError::unknown_state_type(other)),
        };
        match state_type {
            ATNStateType::BlockStart(_) => block_start_end[i] = Some(r.usize()?),
            ATNStateType::LoopEnd => loop_end_back[i] = Some(r.usize()?),
            _ => {}
        }
        states.push(ATNState::new(StateIndex(i), rule_index, state_type));
    }

    for (i, end) in block_start_end.into_iter().enumerate() {
        if let Some(e) = end {
            states[i].end_state = Some(StateIndex(e));
        }
    }
    for (i, back) in loop_end_back.into_iter().enumerate() {
        if let Some(b) = back {
            states[i].loop_back_state = Some(StateIndex(b));
        }
    }
    Ok(states)
}

fn read_non_greedy_flags(r: &mut Reader, states: &mut [ATNState]) -> Result<(), ATNDeserializeError> {
    let count = r.usize()?;
    for _ in 0..count {
        let s = r.usize()?;
        states[s].non_greedy = true;
    }
    Ok(())
}

fn read_precedence_rule_flags(r: &mut Reader) -> Result<HashSet<RuleIndex>, ATNDeserializeError> {
    let count = r.usize()?;
    let mut rules = HashSet::with_capacity(count);
    for _ in 0..count {
        rules.insert(RuleIndex(r.usize()?));
    }
    Ok(rules)
}

fn read_rules(r: &mut Reader, grammar_type: GrammarType) -> Result<Vec<RuleInfo>, ATNDeserializeError> {
    let count = r.usize()?;
    let mut rules = Vec::with_capacity(count);
    for _ in 0..count {
        let start_state = StateIndex(r.usize()?);
        let token_type = if grammar_type == GrammarType::Lexer {
            let t = r.i32()?;
            if t < 0 { None } else { Some(t) }
        } else {
            None
        };
        // Overwritten below by `derive_rule_stop_states` once the state
        // table's RuleStop entries are known.
        rules.push(RuleInfo { start_state, stop_state: StateIndex(usize::MAX), token_type });
    }
    Ok(rules)
}

/// §4.9 "deriving RuleStop back-links by scan": the rule table only gives a
/// start state; each rule's stop state is whichever `RuleStop` carries that
/// rule's index.
fn derive_rule_stop_states(states: &[ATNState], rules: &mut [RuleInfo]) {
    for state in states {
        if state.state_type == ATNStateType::RuleStop {
            rules[state.rule_index.0].stop_state = state.state_number;
        }
    }
}

fn read_modes(r: &mut Reader) -> Result<Vec<StateIndex>, ATNDeserializeError> {
    let count = r.usize()?;
    let mut modes = Vec::with_capacity(count);
    for _ in 0..count {
        modes.push(StateIndex(r.usize()?));
    }
    Ok(modes)
}

fn read_interval_sets(r: &mut Reader) -> Result<Vec<IntervalSet>, ATNDeserializeError> {
    let count = r.usize()?;
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        let eof_included = r.bool()?;
        let num_intervals = r.usize()?;
        let mut set = IntervalSet::new();
        if eof_included {
            set.add_one(EOF);
        }
        for _ in 0..num_intervals {
            let from = r.i32()?;
            let to = r.i32()?;
            set.add_range(from, to);
        }
        sets.push(set);
    }
    Ok(sets)
}

fn read_edges(
    r: &mut Reader,
    states: &mut [ATNState],
    rules: &[RuleInfo],
    precedence_rules: &HashSet<RuleIndex>,
    sets: &[IntervalSet],
) -> Result<(), ATNDeserializeError> {
    let count = r.usize()?;
    // Rule transitions need a second pass once every RuleStop's stop state
    // is known, to emit the synthetic RuleStop -> followState return edge.
    let mut rule_invocations = Vec::new();

    for _ in 0..count {
        let src = r.usize()?;
        let tag = r.u32()?;
        let target = StateIndex(r.usize()?);
        let transition = match tag {
            0 => {
                let outermost_precedence_return = r.i32()?;
                Transition::Epsilon { target, outermost_precedence_return }
            }
            1 => Transition::Atom { target, label: r.i32()? },
            2 => {
                let from = r.i32()?;
                let to = r.i32()?;
                Transition::Range { target, from, to }
            }
            3 => Transition::Set { target, set: sets[r.usize()?].clone() },
            4 => Transition::NotSet { target, set: sets[r.usize()?].clone() },
            5 => Transition::Wildcard { target },
            6 => {
                let rule_index = RuleIndex(r.usize()?);
                let precedence = r.i32()?;
                let follow_state = StateIndex(r.usize()?);
                rule_invocations.push((rule_index, precedence, follow_state));
                Transition::Rule { target, rule_index, precedence, follow_state }
            }
            7 => {
                let rule_index = RuleIndex(r.usize()?);
                let pred_index = r.usize()?;
                let is_ctx_dependent = r.bool()?;
                Transition::Predicate { target, rule_index, pred_index, is_ctx_dependent }
            }
            8 => Transition::PrecedencePredicate { target, precedence: r.i32()? },
            9 => {
                let rule_index = RuleIndex(r.usize()?);
                let action_index = r.i32()?;
                Transition::Action { target, rule_index, action_index }
            }
            other => return Err(ATNDeserializeError::unknown_transition_type(other)),
        };
        states[src].add_transition(transition);
    }

    // §4.9 step 8: a synthetic epsilon from each invoked rule's RuleStop
    // back to the caller's followState, carrying `outermostPrecedenceReturn`
    // when this is a left-recursive rule returning at precedence 0.
    for (rule_index, precedence, follow_state) in rule_invocations {
        let stop_state = rules[rule_index.0].stop_state;
        let outermost_precedence_return = if precedence_rules.contains(&rule_index) && precedence == 0 {
            rule_index.0 as i32
        } else {
            NO_PRECEDENCE_RETURN
        };
        states[stop_state.0].add_transition(Transition::Epsilon { target: follow_state, outermost_precedence_return });
    }

    Ok(())
}

fn read_decisions(r: &mut Reader, states: &mut [ATNState]) -> Result<Vec<StateIndex>, ATNDeserializeError> {
    let count = r.usize()?;
    let mut decision_to_state = Vec::with_capacity(count);
    for i in 0..count {
        let s = r.usize()?;
        states[s].decision = Some(DecisionIndex(i));
        decision_to_state.push(StateIndex(s));
    }
    Ok(decision_to_state)
}

fn read_lexer_actions(r: &mut Reader) -> Result<Vec<LexerAction>, ATNDeserializeError> {
    let count = r.usize()?;
    let mut actions = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = r.u32()?;
        let action = match tag {
            0 => LexerAction::Channel(r.i32()?),
            1 => {
                let rule_index = RuleIndex(r.usize()?);
                let action_index = r.i32()?;
                LexerAction::Custom { rule_index, action_index }
            }
            2 => LexerAction::Mode(r.i32()?),
            3 => LexerAction::More,
            4 => LexerAction::PopMode,
            5 => LexerAction::PushMode(r.i32()?),
            6 => LexerAction::Skip,
            7 => LexerAction::Type(r.i32()?),
            other => return Err(ATNDeserializeError::unknown_action_type(other)),
        };
        actions.push(action);
    }
    Ok(actions)
}

/// Post-pass: a `BlockStart` carries its `end_state` straight from the wire
/// format; the reverse link isn't serialized, so walk it back onto the
/// `BlockEnd`.
fn link_block_end_to_start(states: &mut [ATNState]) {
    for i in 0..states.len() {
        if matches!(states[i].state_type, ATNStateType::BlockStart(_)) {
            if let Some(end) = states[i].end_state {
                states[end.0].start_state = Some(StateIndex(i));
            }
        }
    }
}

/// Post-pass: `PlusLoopback`/`StarLoopback` carry no explicit "entry state"
/// extra in the wire format (unlike `LoopEnd`'s `loopBackState`) — it's
/// recovered from their own transitions, which every grammar-tool emitter
/// already points back at the loop's entry.
fn link_loopback_to_entry(states: &mut [ATNState]) {
    for i in 0..states.len() {
        match states[i].state_type {
            ATNStateType::PlusLoopback => {
                let entry = states[i]
                    .transitions
                    .iter()
                    .map(|t| t.target())
                    .find(|t| matches!(states[t.0].state_type, ATNStateType::BlockStart(BlockStartKind::Plus)));
                states[i].loop_back_state = entry;
            }
            ATNStateType::StarLoopback => {
                states[i].loop_back_state = states[i].transitions.first().map(|t| t.target());
            }
            _ => {}
        }
    }
}

/// §4.9 final step: a left-recursive rule's `StarLoopEntry` is recognized by
/// its exit transition leading to a `LoopEnd` that itself epsilon-jumps
/// straight to the rule's `RuleStop` — the shape the operator-precedence
/// loop elimination always produces.
fn mark_precedence_decisions(states: &mut [ATNState], rules: &[RuleInfo], precedence_rules: &HashSet<RuleIndex>) {
    for i in 0..states.len() {
        if states[i].state_type != ATNStateType::StarLoopEntry {
            continue;
        }
        if !precedence_rules.contains(&states[i].rule_index) {
            continue;
        }
        if states[i].transitions.len() != 2 {
            continue;
        }
        let exit = states[i].transitions[1].target();
        if states[exit.0].state_type != ATNStateType::LoopEnd {
            continue;
        }
        let rule_stop = rules[states[i].rule_index.0].stop_state;
        let jumps_to_stop = states[exit.0]
            .transitions
            .iter()
            .any(|t| matches!(t, Transition::Epsilon { .. }) && t.target() == rule_stop);
        if jumps_to_stop {
            states[i].is_precedence_decision = true;
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    /// A single parser rule with no alternatives: `RuleStart --eps--> Basic
    /// --eps--> RuleStop`. Just enough to exercise every read-order step
    /// without needing decisions, sets, or modes.
    fn one_rule_parser_atn_words() -> Vec<u32> {
        let neg1 = (-1i32) as u32;
        vec![
            SERIALIZED_VERSION,
            1, // grammar type: Parser
            0, // max_token_type
            3, // num_states
            1, 0, // state0: RuleStart, rule 0
            0, 0, // state1: Basic, rule 0
            2, 0, // state2: RuleStop, rule 0
            0, // num_non_greedy
            0, // num_precedence_rules
            1, // num_rules
            0, // rule0.start_state = state0
            0, // num_modes
            0, // num_sets
            2, // num_edges
            0, 0, 1, neg1, // state0 --eps--> state1
            1, 0, 2, neg1, // state1 --eps--> state2
            0, // num_decisions
            0, // num_lexer_actions
        ]
    }

    #[test]
    fn deserializes_a_minimal_parser_atn() {
        let atn = deserialize(&one_rule_parser_atn_words()).expect("should deserialize");
        assert_eq!(atn.states.len(), 3);
        assert_eq!(atn.rule_start_state(RuleIndex(0)), StateIndex(0));
        assert_eq!(atn.rule_stop_state(RuleIndex(0)), StateIndex(2));
        assert_eq!(atn.state(StateIndex(0)).transitions.len(), 1);
        assert_eq!(atn.state(StateIndex(0)).transitions[0].target(), StateIndex(1));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut words = one_rule_parser_atn_words();
        words[0] = 3;
        let err = deserialize(&words).expect_err("version mismatch should fail");
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn rejects_truncated_input() {
        let words = vec![SERIALIZED_VERSION, 1];
        assert!(deserialize(&words).is_err());
    }

    #[test]
    fn rejects_unknown_state_type_tag() {
        let mut words = one_rule_parser_atn_words();
        // state1's tag, at index 6 (after version, grammar type, max_token_type,
        // num_states, and state0's tag+rule_index words).
        words[6] = 99;
        let err = deserialize(&words).expect_err("unknown state type tag should fail");
        assert!(err.to_string().contains("state type"));
    }
}
