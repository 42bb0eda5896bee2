//! `LexerATNSimulator` (§4.8): token recognition by walking the same ATN
//! machinery the parser uses, driven by "run to the longest match" instead
//! of prediction among competing alternatives. Ties between rules matching
//! the same length resolve by declaration order (the alt number a rule was
//! given at the mode's `TokensStart` decision).

use crate::atn::actions::{LexerAction, LexerActionExecutor};
use crate::atn::state::ATNStateType;
use crate::atn::transition::Transition;
use crate::atn::ATN;
use crate::config::LexerATNConfig;
use crate::config_set::LexerATNConfigSet;
use crate::context::PredictionContext;
use crate::dfa::state::DFAState;
use crate::dfa::DFA;
use crate::error::LexerNoViableAltError;
use crate::index::{DecisionIndex, RuleIndex, StateIndex, TokenType, EOF};
use crate::recognizer::{CharStream, Recognizer};
use std::collections::HashSet;
use std::sync::Arc;

/// What `match_token` hands back once a token has been recognized. Channel
/// and type can be overridden mid-match by `channel`/`type` lexer commands;
/// `skip`/`more` tell the caller's `nextToken` loop whether to discard this
/// match and keep lexing rather than emit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerMatchResult {
    pub token_type: TokenType,
    pub channel: i32,
    pub skip: bool,
    pub more: bool,
}

/// An accept state visited while driving the DFA, remembered so a later
/// dead end can fall back to the most recent successful match (§4.8 step 4).
struct SimState {
    index: usize,
    line: u32,
    column: i32,
    dfa_state: Arc<DFAState<LexerATNConfig>>,
}

/// Busy-guard key for the lexer's closure recursion: `(state, alt, context
/// id)`. Unlike the parser, lexer configs never carry a semantic-context
/// tree (predicates are evaluated eagerly in `get_epsilon_target`), so the
/// key needs no fourth component.
type BusyKey = (StateIndex, usize, usize);
fn busy_key(c: &LexerATNConfig) -> BusyKey {
    (c.state, c.alt, c.context.id)
}

pub struct LexerATNSimulator<'a> {
    pub atn: &'a ATN,
    pub dfas: Arc<Vec<DFA<LexerATNConfig>>>,
    pub mode: usize,
    mode_stack: Vec<usize>,
    pub line: u32,
    pub column: i32,
    channel: i32,
    type_override: Option<TokenType>,
}

impl<'a> LexerATNSimulator<'a> {
    pub fn new(atn: &'a ATN) -> Self {
        let dfas = (0..atn.mode_to_start_state.len())
            .map(|i| DFA::new(DecisionIndex(i), false))
            .collect();
        Self {
            atn,
            dfas: Arc::new(dfas),
            mode: 0,
            mode_stack: Vec::new(),
            line: 1,
            column: 0,
            channel: 0,
            type_override: None,
        }
    }

    /// §4.8 `match`: recognize one token starting at `input`'s current
    /// position, leaving the stream positioned just past it (or, on
    /// `Skip`/`More`, wherever the caller's `nextToken` loop should resume).
    pub fn match_token(
        &mut self,
        input: &mut dyn CharStream,
        recognizer: &mut dyn Recognizer,
    ) -> Result<LexerMatchResult, LexerNoViableAltError> {
        let start_index = input.index();
        self.channel = 0;
        self.type_override = None;

        let dfa_index = self.mode;
        let s0 = match self.dfas[dfa_index].s0() {
            Some(s) => s,
            None => {
                let configs = self.compute_start_state(&*recognizer, self.atn.mode_to_start_state[dfa_index]);
                let s = self.add_dfa_state(&self.dfas[dfa_index], configs);
                self.dfas[dfa_index].set_s0(s.clone());
                s
            }
        };
        self.exec_atn(input, recognizer, dfa_index, s0, start_index)
    }

    fn exec_atn(
        &mut self,
        input: &mut dyn CharStream,
        recognizer: &mut dyn Recognizer,
        dfa_index: usize,
        s0: Arc<DFAState<LexerATNConfig>>,
        start_index: usize,
    ) -> Result<LexerMatchResult, LexerNoViableAltError> {
        let mut state = s0;
        let mut prev_accept = if state.is_accept_state { Some(self.capture(&state, input)) } else { None };

        loop {
            let t = input.la(1);
            let target = match state.get_target(t) {
                Some(target) => target,
                None => {
                    let offset = (input.index() - start_index) as i32 + 1;
                    self.compute_target_state(recognizer, dfa_index, &state, t, offset)
                }
            };
            if target.is_error {
                break;
            }
            if t != EOF {
                self.consume(input);
            }
            if target.is_accept_state {
                prev_accept = Some(self.capture(&target, input));
                if t == EOF {
                    break;
                }
            }
            state = target;
        }

        match prev_accept {
            Some(sim) => Ok(self.accept(input, recognizer, start_index, sim)),
            None if input.index() == start_index && input.la(1) == EOF => {
                Ok(LexerMatchResult { token_type: EOF, channel: self.channel, skip: false, more: false })
            }
            None => Err(LexerNoViableAltError { start_index }),
        }
    }

    fn capture(&self, state: &Arc<DFAState<LexerATNConfig>>, input: &mut dyn CharStream) -> SimState {
        SimState { index: input.index(), line: self.line, column: self.column, dfa_state: state.clone() }
    }

    /// Rewind to the last accept point, restore `line`/`column`, and replay
    /// that state's recorded actions before returning its token type.
    fn accept(
        &mut self,
        input: &mut dyn CharStream,
        recognizer: &mut dyn Recognizer,
        start_index: usize,
        sim: SimState,
    ) -> LexerMatchResult {
        input.seek(sim.index);
        self.line = sim.line;
        self.column = sim.column;

        let mut skip = false;
        let mut more = false;
        if let Some(executor) = sim.dfa_state.lexer_action_executor.clone() {
            for (action, offset) in executor.actions.iter().zip(executor.offsets.iter()) {
                match &**action {
                    LexerAction::Channel(c) => self.channel = *c,
                    LexerAction::Mode(m) => self.mode = *m as usize,
                    LexerAction::More => more = true,
                    LexerAction::PopMode => self.mode = self.mode_stack.pop().unwrap_or(self.mode),
                    LexerAction::PushMode(m) => {
                        self.mode_stack.push(self.mode);
                        self.mode = *m as usize;
                    }
                    LexerAction::Skip => skip = true,
                    LexerAction::Type(t) => self.type_override = Some(*t),
                    LexerAction::Custom { rule_index, action_index } => {
                        let saved = input.index();
                        input.seek((start_index as i64 + *offset as i64).max(0) as usize);
                        recognizer.lexer_action(*rule_index, *action_index);
                        input.seek(saved);
                    }
                }
            }
        }

        let token_type = self.type_override.unwrap_or(sim.dfa_state.prediction);
        LexerMatchResult { token_type, channel: self.channel, skip, more }
    }

    fn consume(&mut self, input: &mut dyn CharStream) {
        if input.la(1) == '\n' as TokenType {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        input.consume();
    }

    fn compute_start_state(&self, recognizer: &dyn Recognizer, state: StateIndex) -> LexerATNConfigSet {
        let mut configs = LexerATNConfigSet::new(false);
        let mut busy = HashSet::new();
        let mut crossed_predicate = false;
        let p = self.atn.state(state);
        for (i, t) in p.transitions.iter().enumerate() {
            let c = LexerATNConfig::new(t.target(), i + 1, PredictionContext::empty());
            self.closure(&mut configs, c, false, &mut busy, recognizer, 0, &mut crossed_predicate);
        }
        configs
    }

    fn compute_target_state(
        &self,
        recognizer: &mut dyn Recognizer,
        dfa_index: usize,
        prev: &Arc<DFAState<LexerATNConfig>>,
        t: TokenType,
        offset: i32,
    ) -> Arc<DFAState<LexerATNConfig>> {
        let mut reach = LexerATNConfigSet::new(false);
        let mut busy = HashSet::new();
        let mut crossed_predicate = false;
        for c in prev.configs.iter() {
            let state = self.atn.state(c.state);
            for tr in &state.transitions {
                if tr.matches(t, self.atn.min_vocab(), self.atn.max_vocab()) {
                    let next = c.derive(tr.target());
                    self.closure(&mut reach, next, false, &mut busy, &*recognizer, offset, &mut crossed_predicate);
                }
            }
        }
        if reach.is_empty() {
            return Arc::new(DFAState::error());
        }
        let dfa = &self.dfas[dfa_index];
        let target = self.add_dfa_state(dfa, reach);
        // §4.8 "DFA edges": cache only symbols in [0, 127], and only when no
        // (precedence-)predicate transition was crossed building this reach
        // set — a predicated transition's truth value can differ on a later
        // visit, so it must produce an accept state but never a cached edge
        // (the lexer analog of `addDFAEdge`'s `suppressEdge`).
        if (0..=127).contains(&t) && !crossed_predicate {
            prev.set_target(t, target.clone());
        }
        target
    }

    /// Interns a freshly-closed config set as a `DFAState`, marking it an
    /// accept state (and recording its token type / action executor) when
    /// the set contains a config that has fully popped back out to a
    /// `RuleStop` with an empty context — i.e. some rule matched completely.
    /// Ties between rules that matched the same length are broken by the
    /// lowest alt number, which is declaration order at `TokensStart`.
    fn add_dfa_state(&self, dfa: &DFA<LexerATNConfig>, configs: LexerATNConfigSet) -> Arc<DFAState<LexerATNConfig>> {
        let mut winner: Option<(usize, RuleIndex, Option<Arc<LexerActionExecutor>>)> = None;
        for c in configs.iter() {
            if self.atn.state(c.state).state_type == ATNStateType::RuleStop {
                let rule_index = self.atn.state(c.state).rule_index;
                let better = match &winner {
                    None => true,
                    Some((alt, _, _)) => c.alt < *alt,
                };
                if better {
                    winner = Some((c.alt, rule_index, c.lexer_action_executor.clone()));
                }
            }
        }

        let mut candidate = DFAState::new(0, Arc::new(configs));
        if let Some((_, rule_index, executor)) = winner {
            candidate.is_accept_state = true;
            candidate.prediction = self.atn.rules[rule_index.0].token_type.unwrap_or(EOF);
            candidate.lexer_action_executor = executor;
        }
        dfa.add_state(candidate)
    }

    /// Depth-first closure (§4.8): follows epsilon transitions, popping back
    /// out of invoked fragment rules via `context` the same way the parser
    /// does, and adds a leaf config wherever a non-epsilon transition (or a
    /// fully-popped `RuleStop`) is reached. Returns whether `config`'s alt
    /// reached an accept state anywhere in this subtree — once it has, a
    /// config that already passed through a non-greedy decision is no
    /// longer added, which is what stops `*?`/`+?` from continuing past the
    /// shortest match.
    #[allow(clippy::too_many_arguments)]
    fn closure(
        &self,
        configs: &mut LexerATNConfigSet,
        config: LexerATNConfig,
        mut current_alt_reached_accept: bool,
        busy: &mut HashSet<BusyKey>,
        recognizer: &dyn Recognizer,
        offset: i32,
        crossed_predicate: &mut bool,
    ) -> bool {
        if self.atn.state(config.state).state_type == ATNStateType::RuleStop {
            if !config.context.is_empty() {
                for i in 0..config.context.size() {
                    let return_state = config.context.get_return_state(i);
                    let parent = config.context.get_parent(i).unwrap_or_else(PredictionContext::empty);
                    let target = StateIndex(return_state as usize);
                    let c = config.derive_with_context(target, parent);
                    current_alt_reached_accept = self.closure(configs, c, current_alt_reached_accept, busy, recognizer, offset, crossed_predicate) || current_alt_reached_accept;
                }
                return current_alt_reached_accept;
            }
            configs.add(config, None);
            return true;
        }

        if !busy.insert(busy_key(&config)) {
            return current_alt_reached_accept;
        }

        let state = self.atn.state(config.state);
        if !state.epsilon_only_transitions && (!current_alt_reached_accept || !config.passed_through_non_greedy_decision) {
            configs.add(config.clone(), None);
        }

        for t in &state.transitions {
            if let Some(mut c) = self.get_epsilon_target(&config, t, recognizer, offset, crossed_predicate) {
                if state.is_decision() && state.non_greedy {
                    c.passed_through_non_greedy_decision = true;
                }
                current_alt_reached_accept = self.closure(configs, c, current_alt_reached_accept, busy, recognizer, offset, crossed_predicate) || current_alt_reached_accept;
            }
        }
        current_alt_reached_accept
    }

    /// Epsilon-ish transitions only; `Atom`/`Range`/`Set`/`NotSet`/`Wildcard`
    /// consume a symbol and so never produce a closure successor directly —
    /// they're taken by `compute_target_state`'s `matches` check instead.
    /// `offset` is how many symbols have been consumed since the token
    /// started, used to fix a `Custom` action's position immediately
    /// (rather than guessing it from the eventual match length at accept
    /// time); `crossed_predicate` is set whenever a (precedence-)predicate
    /// transition is evaluated, telling the caller the resulting reach must
    /// not be cached as a DFA edge.
    fn get_epsilon_target(
        &self,
        config: &LexerATNConfig,
        t: &Transition,
        recognizer: &dyn Recognizer,
        offset: i32,
        crossed_predicate: &mut bool,
    ) -> Option<LexerATNConfig> {
        match t {
            Transition::Epsilon { target, .. } => Some(config.derive(*target)),
            Transition::Rule { target, follow_state, .. } => {
                let new_context = PredictionContext::singleton(Some(config.context.clone()), follow_state.0 as i32);
                Some(config.derive_with_context(*target, new_context))
            }
            Transition::Predicate { target, rule_index, pred_index, .. } => {
                *crossed_predicate = true;
                if recognizer.eval_predicate(*rule_index, *pred_index) {
                    Some(config.derive(*target))
                } else {
                    None
                }
            }
            Transition::PrecedencePredicate { target, precedence } => {
                *crossed_predicate = true;
                if recognizer.eval_precedence_predicate(*precedence) {
                    Some(config.derive(*target))
                } else {
                    None
                }
            }
            Transition::Action { target, action_index, .. } => {
                let action = Arc::new(self.atn.lexer_actions[*action_index as usize].clone());
                let executor = LexerActionExecutor::append(config.lexer_action_executor.as_ref(), action, offset);
                Some(config.derive_with_action(*target, Some(executor)))
            }
            Transition::Atom { .. }
            | Transition::Range { .. }
            | Transition::Set { .. }
            | Transition::NotSet { .. }
            | Transition::Wildcard { .. } => None,
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::atn::state::ATNState;
    use crate::atn::ATN as AtnGraph;
    use crate::atn::GrammarType;
    use crate::context::RuleContext;
    use crate::index::RuleIndex;
    use crate::semantic_context::PredicateEvaluator;
    use std::cell::RefCell;

    struct NoopRecognizer;
    impl PredicateEvaluator for NoopRecognizer {
        fn eval_predicate(&self, _rule_index: RuleIndex, _pred_index: usize) -> bool {
            true
        }
        fn eval_precedence_predicate(&self, _precedence: i32) -> bool {
            true
        }
    }
    impl Recognizer for NoopRecognizer {
        fn rule_context(&self) -> Option<&dyn RuleContext> {
            None
        }
    }

    struct VecCharStream {
        chars: Vec<TokenType>,
        index: RefCell<usize>,
    }
    impl VecCharStream {
        fn new(s: &str) -> Self {
            Self { chars: s.chars().map(|c| c as TokenType).collect(), index: RefCell::new(0) }
        }
    }
    impl crate::recognizer::IntStream for VecCharStream {
        fn la(&self, offset: i32) -> TokenType {
            let i = *self.index.borrow() as i32 + offset - 1;
            if i < 0 || i as usize >= self.chars.len() {
                EOF
            } else {
                self.chars[i as usize]
            }
        }
        fn index(&self) -> usize {
            *self.index.borrow()
        }
        fn consume(&mut self) {
            *self.index.borrow_mut() += 1;
        }
        fn seek(&mut self, index: usize) {
            *self.index.borrow_mut() = index;
        }
        fn size(&self) -> Option<usize> {
            Some(self.chars.len())
        }
        fn mark(&mut self) -> i32 {
            0
        }
        fn release(&mut self, _marker: i32) {}
    }
    impl crate::recognizer::CharStream for VecCharStream {
        fn get_text(&self, start: usize, stop: usize) -> String {
            self.chars[start..=stop].iter().filter_map(|&c| char::from_u32(c as u32)).collect()
        }
    }

    /// Two token rules sharing a mode: `KEYWORD` matches the literal "if"
    /// (declared first, so it wins length ties), `IDENT` matches a single
    /// 'i'. Built by hand the way `parser_sim`'s test ATN is, rather than
    /// through the deserializer.
    fn if_and_ident_atn() -> AtnGraph {
        let mut states = Vec::new();
        let idx = |n: usize| StateIndex(n);

        let mut tokens_start = ATNState::new(idx(0), RuleIndex(0), ATNStateType::TokensStart);
        tokens_start.add_transition(Transition::Epsilon { target: idx(1), outermost_precedence_return: -1 });
        tokens_start.add_transition(Transition::Epsilon { target: idx(5), outermost_precedence_return: -1 });
        states.push(tokens_start);

        let mut rule0_start = ATNState::new(idx(1), RuleIndex(0), ATNStateType::RuleStart);
        rule0_start.add_transition(Transition::Epsilon { target: idx(2), outermost_precedence_return: -1 });
        states.push(rule0_start);

        let mut s2 = ATNState::new(idx(2), RuleIndex(0), ATNStateType::Basic);
        s2.add_transition(Transition::Atom { target: idx(3), label: 'i' as TokenType });
        states.push(s2);

        let mut s3 = ATNState::new(idx(3), RuleIndex(0), ATNStateType::Basic);
        s3.add_transition(Transition::Atom { target: idx(4), label: 'f' as TokenType });
        states.push(s3);

        states.push(ATNState::new(idx(4), RuleIndex(0), ATNStateType::RuleStop));

        let mut rule1_start = ATNState::new(idx(5), RuleIndex(1), ATNStateType::RuleStart);
        rule1_start.add_transition(Transition::Epsilon { target: idx(6), outermost_precedence_return: -1 });
        states.push(rule1_start);

        let mut s6 = ATNState::new(idx(6), RuleIndex(1), ATNStateType::Basic);
        s6.add_transition(Transition::Atom { target: idx(7), label: 'i' as TokenType });
        states.push(s6);

        states.push(ATNState::new(idx(7), RuleIndex(1), ATNStateType::RuleStop));

        AtnGraph {
            grammar_type: GrammarType::Lexer,
            max_token_type: 300,
            states,
            rules: vec![
                crate::atn::RuleInfo { start_state: idx(1), stop_state: idx(4), token_type: Some(100) },
                crate::atn::RuleInfo { start_state: idx(5), stop_state: idx(7), token_type: Some(200) },
            ],
            mode_to_start_state: vec![idx(0)],
            decision_to_state: vec![idx(0)],
            lexer_actions: Vec::new(),
        }
    }

    #[test]
    fn longest_match_wins_over_declaration_order() {
        let atn = if_and_ident_atn();
        let mut sim = LexerATNSimulator::new(&atn);
        let mut input = VecCharStream::new("if");
        let mut recognizer = NoopRecognizer;
        let result = sim.match_token(&mut input, &mut recognizer).expect("should match");
        assert_eq!(result.token_type, 100, "\"if\" is 2 chars, only KEYWORD reaches that far");
        assert_eq!(input.index(), 2);
    }

    #[test]
    fn shorter_rule_wins_when_longer_rule_cannot_continue() {
        let atn = if_and_ident_atn();
        let mut sim = LexerATNSimulator::new(&atn);
        let mut input = VecCharStream::new("ix");
        let mut recognizer = NoopRecognizer;
        let result = sim.match_token(&mut input, &mut recognizer).expect("should match");
        assert_eq!(result.token_type, 200, "KEYWORD dead-ends after 'i', IDENT's 1-char match wins");
        assert_eq!(input.index(), 1);
    }

    #[test]
    fn no_viable_alt_on_unmatched_character() {
        let atn = if_and_ident_atn();
        let mut sim = LexerATNSimulator::new(&atn);
        let mut input = VecCharStream::new("x");
        let mut recognizer = NoopRecognizer;
        assert!(sim.match_token(&mut input, &mut recognizer).is_err());
    }

    /// `'a' (.)*?` with nothing after the loop: a non-greedy star whose exit
    /// branch epsilons straight to `RuleStop`. Built so the exit and continue
    /// branches are siblings of the very same `closure(loopEntry, ...)` call
    /// — the one case where `current_alt_reached_accept` actually suppresses
    /// the continue-branch leaf within a single step, giving a deterministic
    /// "stop at the shortest match" result to assert on. A greedy `(.)*` in
    /// the same shape would instead consume every remaining character before
    /// settling on the longest match.
    fn a_then_non_greedy_any_atn() -> AtnGraph {
        let idx = |n: usize| StateIndex(n);
        let mut states = Vec::new();

        let mut tokens_start = ATNState::new(idx(0), RuleIndex(0), ATNStateType::TokensStart);
        tokens_start.add_transition(Transition::Epsilon { target: idx(1), outermost_precedence_return: -1 });
        states.push(tokens_start);

        let mut rule_start = ATNState::new(idx(1), RuleIndex(0), ATNStateType::RuleStart);
        rule_start.add_transition(Transition::Epsilon { target: idx(2), outermost_precedence_return: -1 });
        states.push(rule_start);

        let mut s2 = ATNState::new(idx(2), RuleIndex(0), ATNStateType::Basic);
        s2.add_transition(Transition::Atom { target: idx(3), label: 'a' as TokenType });
        states.push(s2);

        let mut loop_entry = ATNState::new(idx(3), RuleIndex(0), ATNStateType::StarLoopEntry);
        loop_entry.non_greedy = true;
        loop_entry.decision = Some(DecisionIndex(0));
        loop_entry.add_transition(Transition::Epsilon { target: idx(6), outermost_precedence_return: -1 }); // exit
        loop_entry.add_transition(Transition::Epsilon { target: idx(4), outermost_precedence_return: -1 }); // continue
        states.push(loop_entry);

        let mut s4 = ATNState::new(idx(4), RuleIndex(0), ATNStateType::Basic);
        s4.add_transition(Transition::Wildcard { target: idx(5) });
        states.push(s4);

        let mut loop_back = ATNState::new(idx(5), RuleIndex(0), ATNStateType::StarLoopback);
        loop_back.loop_back_state = Some(idx(3));
        loop_back.add_transition(Transition::Epsilon { target: idx(3), outermost_precedence_return: -1 });
        states.push(loop_back);

        states.push(ATNState::new(idx(6), RuleIndex(0), ATNStateType::RuleStop));

        AtnGraph {
            grammar_type: GrammarType::Lexer,
            max_token_type: 300,
            states,
            rules: vec![crate::atn::RuleInfo { start_state: idx(1), stop_state: idx(6), token_type: Some(77) }],
            mode_to_start_state: vec![idx(0)],
            decision_to_state: vec![idx(3)],
            lexer_actions: Vec::new(),
        }
    }

    #[test]
    fn non_greedy_loop_stops_at_shortest_match() {
        let atn = a_then_non_greedy_any_atn();
        let mut sim = LexerATNSimulator::new(&atn);
        let mut input = VecCharStream::new("axyz");
        let mut recognizer = NoopRecognizer;
        let result = sim.match_token(&mut input, &mut recognizer).expect("should match");
        assert_eq!(result.token_type, 77);
        assert_eq!(input.index(), 1, "non-greedy `*?` must not consume beyond the minimum match");
    }
}
