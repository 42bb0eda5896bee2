//! The ATN model (§3.1–§3.2): the read-only graph produced by
//! deserialization and consumed by both simulators.

pub mod actions;
pub mod state;
pub mod transition;

use crate::index::{DecisionIndex, RuleIndex, StateIndex, TokenType};
use crate::interval_set::IntervalSet;
use actions::LexerAction;
use state::{ATNState, ATNStateType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarType {
    Lexer,
    Parser,
}

/// Decoded rule metadata (§3.1 `ruleToStartState` / `ruleToStopState` /
/// `ruleToTokenType`).
#[derive(Debug, Clone, Copy)]
pub struct RuleInfo {
    pub start_state: StateIndex,
    pub stop_state: StateIndex,
    /// Lexer rules only: the token type this rule produces.
    pub token_type: Option<TokenType>,
}

#[derive(Debug)]
pub struct ATN {
    pub grammar_type: GrammarType,
    pub max_token_type: TokenType,
    pub states: Vec<ATNState>,
    pub rules: Vec<RuleInfo>,
    /// Lexer only: one start state per lexical mode.
    pub mode_to_start_state: Vec<StateIndex>,
    pub decision_to_state: Vec<StateIndex>,
    pub lexer_actions: Vec<LexerAction>,
}

impl ATN {
    pub fn state(&self, i: StateIndex) -> &ATNState {
        &self.states[i.0]
    }

    pub fn decision_state(&self, decision: DecisionIndex) -> &ATNState {
        self.state(self.decision_to_state[decision.0])
    }

    pub fn num_decisions(&self) -> usize {
        self.decision_to_state.len()
    }

    pub fn rule_start_state(&self, rule: RuleIndex) -> StateIndex {
        self.rules[rule.0].start_state
    }

    pub fn rule_stop_state(&self, rule: RuleIndex) -> StateIndex {
        self.rules[rule.0].stop_state
    }

    /// Minimum/maximum terminal symbol value admitted by `NotSet`/`Wildcard`
    /// transitions (§3.3). `0` is the lowest valid token/char value; EOF
    /// (`-1`) is excluded, matching the reference runtime's vocabulary
    /// bounds.
    pub fn min_vocab(&self) -> TokenType {
        0
    }
    pub fn max_vocab(&self) -> TokenType {
        self.max_token_type
    }

    /// §3.2 `verifyATN`: re-check every invariant the deserializer is
    /// supposed to have already established. Exposed separately so a
    /// hand-built (non-deserialized) ATN, such as one assembled in tests,
    /// can also be validated.
    pub fn verify(&self) -> Result<(), crate::error::ATNDeserializeError> {
        use crate::error::ATNDeserializeError as E;
        for state in &self.states {
            match &state.state_type {
                ATNStateType::Basic => {
                    if !state.epsilon_only_transitions && state.transitions.len() > 1 {
                        return Err(E::invariant(format!(
                            "Basic state {} has {} outgoing non-epsilon transitions",
                            state.state_number,
                            state.transitions.len()
                        )));
                    }
                }
                ATNStateType::RuleStart => {
                    let rule = &self.rules[state.rule_index.0];
                    if rule.start_state != state.state_number {
                        return Err(E::invariant(format!(
                            "RuleStart {} is not registered as the start state of rule {}",
                            state.state_number, state.rule_index
                        )));
                    }
                }
                ATNStateType::BlockStart(_) => {
                    if state.end_state.is_none() {
                        return Err(E::invariant(format!(
                            "BlockStart {} has no end_state link",
                            state.state_number
                        )));
                    }
                }
                ATNStateType::BlockEnd => {
                    if state.start_state.is_none() {
                        return Err(E::invariant(format!(
                            "BlockEnd {} has no start_state link",
                            state.state_number
                        )));
                    }
                }
                ATNStateType::PlusLoopback => {
                    let target = state
                        .transitions
                        .iter()
                        .map(|t| t.target())
                        .find_map(|t| {
                            if let ATNStateType::BlockStart(_) = self.state(t).state_type {
                                Some(t)
                            } else {
                                None
                            }
                        });
                    if target.is_none() {
                        return Err(E::invariant(format!(
                            "PlusLoopback {} has no transition into a PlusBlockStart",
                            state.state_number
                        )));
                    }
                }
                ATNStateType::StarLoopEntry => {
                    if state.transitions.len() != 2 {
                        return Err(E::invariant(format!(
                            "StarLoopEntry {} must have exactly 2 transitions, found {}",
                            state.state_number,
                            state.transitions.len()
                        )));
                    }
                }
                ATNStateType::StarLoopback => {
                    if state.transitions.len() != 1 {
                        return Err(E::invariant(format!(
                            "StarLoopback {} must have exactly 1 transition",
                            state.state_number
                        )));
                    }
                }
                ATNStateType::LoopEnd => {
                    if state.loop_back_state.is_none() {
                        return Err(E::invariant(format!(
                            "LoopEnd {} has no loop_back_state link",
                            state.state_number
                        )));
                    }
                }
                ATNStateType::RuleStop | ATNStateType::TokensStart => {}
            }
        }
        Ok(())
    }

    /// §4.9 final step, optional: synthesize per-rule bypass transitions
    /// for tree-pattern matching. Not wired into the default
    /// [`crate::deserializer::deserialize`] path — §9's open question notes
    /// a known bug in the reference implementation here, so this is kept as
    /// an explicit opt-in the caller must request, rather than silently
    /// "fixed". See `DESIGN.md`.
    pub fn generate_rule_bypass_transitions(&mut self, _rule: RuleIndex) {
        // Intentionally unimplemented beyond the contract above: no test in
        // the corpus this crate was grounded on exercises tree-pattern
        // matching, and spec.md §9 directs reimplementers not to infer
        // intent beyond what tests assert.
    }

    /// First-set over terminal edges leaving `state` within its own rule
    /// body (used by [`crate::ll1_analyzer::LL1Analyzer`] and by the lexer's
    /// EOF handling in `computeReachSet`).
    pub fn next_tokens(&self, state: StateIndex) -> IntervalSet {
        crate::ll1_analyzer::LL1Analyzer::first_of_state(self, state)
    }
}
