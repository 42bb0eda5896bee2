//! `ParserATNSimulator` (§4.3–§4.7): adaptive LL(*) prediction with
//! SLL→LL fallback, precedence-aware left-recursive start states, and
//! semantic-predicate handling.

use crate::atn::state::ATNStateType;
use crate::atn::transition::Transition;
use crate::atn::ATN;
use crate::config::ATNConfig;
use crate::config_set::ATNConfigSet;
use crate::context::{self, MergeCache, PredictionContext, PredictionContextCache, RuleContext};
use crate::dfa::state::{DFAState, PredPrediction};
use crate::dfa::DFA;
use crate::error::NoViableAltError;
use crate::index::{DecisionIndex, StateIndex, TokenType, EOF};
use crate::prediction_mode;
use crate::recognizer::{ErrorListener, Recognizer, TokenStream};
use crate::semantic_context::SemanticContext;
use std::collections::HashSet;
use std::sync::Arc;

/// Busy-set key for closure recursion guards (§4.3, §9 "closure recursion
/// depth"): full `ATNConfig` equality is context-aware, so the key includes
/// the context's interned id rather than the config set's reduced
/// `(state, alt, semanticContext)` key.
type BusyKey = (StateIndex, usize, usize, u64);

fn busy_key(c: &ATNConfig) -> BusyKey {
    (c.state, c.alt, c.context.id, semantic_context_fingerprint(&c.semantic_context))
}

fn semantic_context_fingerprint(ctx: &Arc<SemanticContext>) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    ctx.hash(&mut h);
    h.finish()
}

pub struct ParserATNSimulator<'a> {
    pub atn: &'a ATN,
    /// One DFA per decision, shared via `Arc` so separate recognizer
    /// instances running on separate threads can reuse the same prediction
    /// cache (§5) rather than each cold-starting their own.
    pub dfas: Arc<Vec<DFA<ATNConfig>>>,
    pub context_cache: Arc<PredictionContextCache>,
}

impl<'a> ParserATNSimulator<'a> {
    pub fn new(atn: &'a ATN, context_cache: Arc<PredictionContextCache>) -> Self {
        let dfas = (0..atn.num_decisions())
            .map(|i| {
                let decision = DecisionIndex(i);
                let is_precedence = atn.decision_state(decision).is_precedence_decision;
                DFA::new(decision, is_precedence)
            })
            .collect();
        Self { atn, dfas: Arc::new(dfas), context_cache }
    }

    /// §4.4 `adaptivePredict`.
    pub fn adaptive_predict(
        &self,
        input: &mut dyn TokenStream,
        decision: DecisionIndex,
        outer_context: Option<&dyn RuleContext>,
        recognizer: &dyn Recognizer,
        listener: &mut dyn ErrorListener,
    ) -> Result<usize, NoViableAltError> {
        let dfa = &self.dfas[decision.0];
        let start_index = input.index();
        let mark = input.mark();
        let merge_cache = context::new_merge_cache();
        let result =
            self.adaptive_predict_inner(input, dfa, outer_context, recognizer, listener, start_index, Some(&merge_cache));
        input.seek(start_index);
        input.release(mark);
        result
    }

    fn adaptive_predict_inner(
        &self,
        input: &mut dyn TokenStream,
        dfa: &DFA<ATNConfig>,
        outer_context: Option<&dyn RuleContext>,
        recognizer: &dyn Recognizer,
        listener: &mut dyn ErrorListener,
        start_index: usize,
        merge_cache: Option<&MergeCache>,
    ) -> Result<usize, NoViableAltError> {
        let s0 = self.resolve_sll_start_state(dfa, outer_context, recognizer, input, merge_cache);
        self.exec_atn(dfa, s0, input, outer_context, recognizer, listener, start_index, merge_cache)
    }

    fn resolve_sll_start_state(
        &self,
        dfa: &DFA<ATNConfig>,
        outer_context: Option<&dyn RuleContext>,
        recognizer: &dyn Recognizer,
        input: &mut dyn TokenStream,
        merge_cache: Option<&MergeCache>,
    ) -> Arc<DFAState<ATNConfig>> {
        if dfa.is_precedence_dfa {
            let precedence = recognizer.current_precedence();
            if let Some(existing) = dfa.precedence_start_state(precedence) {
                return existing;
            }
        } else if let Some(existing) = dfa.s0() {
            return existing;
        }

        let decision_state = self.atn.decision_state(dfa.decision);
        let initial_context = PredictionContext::from_rule_context(self.atn, outer_context);
        let initial_context = self.context_cache.get_cached(&initial_context);

        let mut configs = ATNConfigSet::new(false);
        let mut busy = HashSet::new();
        for (i, t) in decision_state.transitions.iter().enumerate() {
            let seed = ATNConfig::new(t.target(), i + 1, initial_context.clone());
            self.closure(seed, &mut configs, &mut busy, true, false, 0, false, input, recognizer, merge_cache);
        }

        let configs = if dfa.is_precedence_dfa {
            self.apply_precedence_filter(&configs, recognizer.current_precedence(), merge_cache)
        } else {
            configs
        };

        let mut state = DFAState::new(0, Arc::new(configs));
        if let Some(alt) = unique_alt(&state.configs) {
            state.is_accept_state = true;
            state.prediction = alt as i32;
        }
        let interned = dfa.add_state(state);
        if dfa.is_precedence_dfa {
            dfa.set_precedence_start_state(recognizer.current_precedence(), interned.clone());
        } else {
            dfa.set_s0(interned.clone());
        }
        interned
    }

    /// §4.4's `execATN` loop.
    fn exec_atn(
        &self,
        dfa: &DFA<ATNConfig>,
        s0: Arc<DFAState<ATNConfig>>,
        input: &mut dyn TokenStream,
        outer_context: Option<&dyn RuleContext>,
        recognizer: &dyn Recognizer,
        listener: &mut dyn ErrorListener,
        start_index: usize,
        merge_cache: Option<&MergeCache>,
    ) -> Result<usize, NoViableAltError> {
        let mut previous = s0;
        loop {
            let t = input.la(1);
            let d = match previous.get_target(t) {
                Some(existing) => existing,
                None => self.compute_target_state(dfa, &previous, t, input, recognizer, merge_cache),
            };

            if d.is_error {
                if let Some(alt) = self.syn_valid_or_sem_invalid_alt(&previous.configs, recognizer) {
                    return Ok(alt);
                }
                return Err(NoViableAltError {
                    start_index,
                    offending_index: input.index(),
                    dead_end_configs: (*previous.configs).clone(),
                });
            }

            if d.requires_full_context {
                let full_configs = self.full_context_start_configs(dfa, outer_context, recognizer, input, merge_cache);
                return self.exec_atn_with_full_context(
                    full_configs,
                    input,
                    recognizer,
                    listener,
                    start_index,
                    merge_cache,
                );
            }

            if d.is_accept_state {
                if d.predicates.is_empty() {
                    return Ok(d.prediction as usize);
                }
                return self.evaluate_accept_predicates(&d, recognizer, listener, start_index, input.index());
            }

            previous = d;
            if t == EOF {
                break;
            }
            input.consume();
        }
        Err(NoViableAltError {
            start_index,
            offending_index: input.index(),
            dead_end_configs: (*previous.configs).clone(),
        })
    }

    /// §4.4 `computeTargetState`.
    fn compute_target_state(
        &self,
        dfa: &DFA<ATNConfig>,
        prev: &Arc<DFAState<ATNConfig>>,
        t: TokenType,
        input: &mut dyn TokenStream,
        recognizer: &dyn Recognizer,
        merge_cache: Option<&MergeCache>,
    ) -> Arc<DFAState<ATNConfig>> {
        let reach = self.compute_reach_set(&prev.configs, t, false, input, recognizer, merge_cache);
        let reach = match reach {
            Some(r) => r,
            None => {
                let err = Arc::new(DFAState::error());
                prev.set_target(t, err.clone());
                return err;
            }
        };

        let mut d = DFAState::new(0, Arc::new(reach));
        if let Some(alt) = unique_alt(&d.configs) {
            d.is_accept_state = true;
            d.prediction = alt as i32;
        } else if prediction_mode::has_sll_conflict_terminating_prediction(&d.configs) {
            d.requires_full_context = true;
            d.is_accept_state = true;
            let conflicting = prediction_mode::get_conflicting_alts(&d.configs);
            d.prediction = conflicting.min().expect("conflicting alt set must be non-empty") as i32;
        }

        if d.is_accept_state && d.configs.has_semantic_context {
            let preds = predicates_for_ambiguous_alts(&d.configs);
            if !preds.is_empty() {
                d.predicates = preds;
                d.prediction = -1;
            }
        }

        let target = dfa.add_state(d);
        prev.set_target(t, target.clone());
        target
    }

    /// §4.4 `computeReachSet`.
    fn compute_reach_set(
        &self,
        source: &ATNConfigSet,
        t: TokenType,
        full_ctx: bool,
        input: &mut dyn TokenStream,
        recognizer: &dyn Recognizer,
        merge_cache: Option<&MergeCache>,
    ) -> Option<ATNConfigSet> {
        let mut intermediate = ATNConfigSet::new(full_ctx);
        let mut skipped_stop_states: Vec<ATNConfig> = Vec::new();

        for c in source.iter() {
            if self.atn.state(c.state).state_type == ATNStateType::RuleStop {
                if full_ctx || t == EOF {
                    skipped_stop_states.push(c.clone());
                }
                continue;
            }
            for tr in &self.atn.state(c.state).transitions {
                if !tr.is_epsilon() && tr.matches(t, self.atn.min_vocab(), self.atn.max_vocab()) {
                    intermediate.add(c.derive(tr.target()), merge_cache);
                }
            }
        }

        let mut reach = if skipped_stop_states.is_empty()
            && t != EOF
            && unique_alt(&intermediate).is_some()
        {
            intermediate
        } else {
            let mut reach = ATNConfigSet::new(full_ctx);
            let mut busy = HashSet::new();
            for c in intermediate.iter() {
                self.closure(c.clone(), &mut reach, &mut busy, false, full_ctx, 0, t == EOF, input, recognizer, merge_cache);
            }
            reach
        };

        if t == EOF {
            let mut filtered = ATNConfigSet::new(full_ctx);
            for c in reach.iter() {
                if self.atn.state(c.state).state_type == ATNStateType::RuleStop {
                    filtered.add(c.clone(), merge_cache);
                }
            }
            reach = filtered;
        }

        let reach_has_stop = reach.iter().any(|c| self.atn.state(c.state).state_type == ATNStateType::RuleStop);
        if !full_ctx || !reach_has_stop {
            for c in skipped_stop_states {
                reach.add(c, merge_cache);
            }
        }

        if reach.is_empty() {
            None
        } else {
            Some(reach)
        }
    }

    /// §4.5: the precedence filter applied once to a precedence DFA's SLL
    /// start configs.
    fn apply_precedence_filter(
        &self,
        configs: &ATNConfigSet,
        precedence: i32,
        merge_cache: Option<&MergeCache>,
    ) -> ATNConfigSet {
        let mut states_from_alt1: std::collections::HashMap<StateIndex, Arc<PredictionContext>> =
            std::collections::HashMap::new();
        let mut out = ATNConfigSet::new(configs.full_ctx);

        for c in configs.iter() {
            if c.alt == 1 {
                match c.semantic_context.eval_precedence(precedence) {
                    Some(replacement) => {
                        if replacement.is_always_false() {
                            continue;
                        }
                        states_from_alt1.insert(c.state, c.context.clone());
                        let mut nc = c.clone();
                        nc.semantic_context = replacement;
                        out.add(nc, merge_cache);
                    }
                    None => {
                        states_from_alt1.insert(c.state, c.context.clone());
                        out.add(c.clone(), merge_cache);
                    }
                }
            } else {
                if !c.precedence_filter_suppressed {
                    if let Some(ctx1) = states_from_alt1.get(&c.state) {
                        if **ctx1 == *c.context {
                            continue;
                        }
                    }
                }
                out.add(c.clone(), merge_cache);
            }
        }
        out
    }

    /// §4.6: rebuild the closure from scratch with the full outer context.
    fn full_context_start_configs(
        &self,
        dfa: &DFA<ATNConfig>,
        outer_context: Option<&dyn RuleContext>,
        recognizer: &dyn Recognizer,
        input: &mut dyn TokenStream,
        merge_cache: Option<&MergeCache>,
    ) -> ATNConfigSet {
        let decision_state = self.atn.decision_state(dfa.decision);
        let initial_context = PredictionContext::from_rule_context(self.atn, outer_context);
        let mut configs = ATNConfigSet::new(true);
        for (i, t) in decision_state.transitions.iter().enumerate() {
            let seed = ATNConfig::new(t.target(), i + 1, initial_context.clone());
            let mut busy = HashSet::new();
            self.closure(seed, &mut configs, &mut busy, true, true, 0, false, input, recognizer, merge_cache);
        }
        configs
    }

    /// §4.6 `execATNWithFullContext`.
    fn exec_atn_with_full_context(
        &self,
        mut configs: ATNConfigSet,
        input: &mut dyn TokenStream,
        recognizer: &dyn Recognizer,
        listener: &mut dyn ErrorListener,
        start_index: usize,
        merge_cache: Option<&MergeCache>,
    ) -> Result<usize, NoViableAltError> {
        listener.report_attempting_full_context(start_index, input.index());
        loop {
            let t = input.la(1);
            let reach = self.compute_reach_set(&configs, t, true, input, recognizer, merge_cache);
            let reach = match reach {
                Some(r) => r,
                None => {
                    return Err(NoViableAltError { start_index, offending_index: input.index(), dead_end_configs: configs });
                }
            };

            if let Some(alt) = prediction_mode::get_single_viable_alt(&reach) {
                listener.report_context_sensitivity(start_index, input.index(), alt);
                return Ok(alt);
            }

            let subsets = prediction_mode::alt_subsets(&reach);
            if prediction_mode::all_subsets_conflict(&reach) && prediction_mode::all_subsets_equal(&subsets) {
                let alts = prediction_mode::get_alts(&reach).to_vec();
                listener.report_ambiguity(start_index, input.index(), &alts);
                return Ok(alts.into_iter().min().expect("conflicting alt set must be non-empty"));
            }

            configs = reach;
            if t == EOF {
                break;
            }
            input.consume();
        }
        Err(NoViableAltError { start_index, offending_index: input.index(), dead_end_configs: configs })
    }

    fn evaluate_accept_predicates(
        &self,
        d: &Arc<DFAState<ATNConfig>>,
        recognizer: &dyn Recognizer,
        listener: &mut dyn ErrorListener,
        start_index: usize,
        stop_index: usize,
    ) -> Result<usize, NoViableAltError> {
        let mut viable: Vec<usize> = d.predicates.iter().filter(|p| p.pred.eval(recognizer)).map(|p| p.alt).collect();
        if viable.is_empty() {
            return Err(NoViableAltError {
                start_index,
                offending_index: stop_index,
                dead_end_configs: (*d.configs).clone(),
            });
        }
        viable.sort_unstable();
        if viable.len() > 1 {
            listener.report_ambiguity(start_index, stop_index, &viable);
        }
        Ok(viable[0])
    }

    /// §7.2 `getSynValidOrSemInvalidAltThatFinishedDecisionEntryRule`.
    fn syn_valid_or_sem_invalid_alt(&self, configs: &ATNConfigSet, recognizer: &dyn Recognizer) -> Option<usize> {
        let mut best: Option<usize> = None;
        for c in configs.iter() {
            if !c.semantic_context.eval(recognizer) {
                continue;
            }
            let finished =
                self.atn.state(c.state).state_type == ATNStateType::RuleStop || c.reaches_into_outer_context > 0;
            if finished {
                best = Some(best.map_or(c.alt, |b| b.min(c.alt)));
            }
        }
        best
    }

    /// §4.3 `closure`: handles the RuleStop pop-the-call-stack case before
    /// delegating to [`Self::closure_leaf`].
    #[allow(clippy::too_many_arguments)]
    fn closure(
        &self,
        config: ATNConfig,
        configs: &mut ATNConfigSet,
        busy: &mut HashSet<BusyKey>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        treat_eof_as_epsilon: bool,
        input: &mut dyn TokenStream,
        recognizer: &dyn Recognizer,
        merge_cache: Option<&MergeCache>,
    ) {
        if self.atn.state(config.state).state_type == ATNStateType::RuleStop {
            if !config.context.is_empty() {
                for i in 0..config.context.size() {
                    let return_state = config.context.get_return_state(i);
                    if return_state == context::EMPTY_RETURN_STATE {
                        if full_ctx {
                            let mut c = config.clone();
                            c.context = PredictionContext::empty();
                            configs.dips_into_outer_context = true;
                            configs.add(c, merge_cache);
                        } else {
                            // Fell off the end of the rule with no caller context to
                            // pop to: chase this RuleStop's synthetic FOLLOW edges
                            // instead, marking the config as having dipped outside
                            // the decision's entry rule (§7.2).
                            let mut c = config.clone();
                            c.reaches_into_outer_context = config.reaches_into_outer_context + 1;
                            configs.dips_into_outer_context = true;
                            self.closure_leaf(
                                &c,
                                configs,
                                busy,
                                collect_predicates,
                                full_ctx,
                                depth,
                                treat_eof_as_epsilon,
                                input,
                                recognizer,
                                merge_cache,
                            );
                        }
                        continue;
                    }
                    // Ordinary pop back to a known call site: not itself a dip
                    // into outer context, so carry the counter unchanged.
                    let parent = config.context.get_parent(i).unwrap_or_else(PredictionContext::empty);
                    let mut c = ATNConfig::new(StateIndex(return_state as usize), config.alt, parent);
                    c.semantic_context = config.semantic_context.clone();
                    c.reaches_into_outer_context = config.reaches_into_outer_context;
                    if !busy.insert(busy_key(&c)) {
                        continue;
                    }
                    self.closure(
                        c,
                        configs,
                        busy,
                        collect_predicates,
                        full_ctx,
                        depth + 1,
                        treat_eof_as_epsilon,
                        input,
                        recognizer,
                        merge_cache,
                    );
                }
                return;
            } else if full_ctx {
                configs.dips_into_outer_context = true;
                configs.add(config, merge_cache);
                return;
            }
        }
        self.closure_leaf(
            &config,
            configs,
            busy,
            collect_predicates,
            full_ctx,
            depth,
            treat_eof_as_epsilon,
            input,
            recognizer,
            merge_cache,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn closure_leaf(
        &self,
        config: &ATNConfig,
        configs: &mut ATNConfigSet,
        busy: &mut HashSet<BusyKey>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        treat_eof_as_epsilon: bool,
        input: &mut dyn TokenStream,
        recognizer: &dyn Recognizer,
        merge_cache: Option<&MergeCache>,
    ) {
        let state = self.atn.state(config.state);
        if !state.epsilon_only_transitions {
            configs.add(config.clone(), merge_cache);
        }

        let skip_loop_entry = self.can_drop_loop_entry_edge(config);
        for (i, t) in state.transitions.iter().enumerate() {
            if i == 0 && skip_loop_entry {
                continue;
            }
            let continue_collecting = collect_predicates && !matches!(t, Transition::Action { .. });
            if let Some(c) = self.get_epsilon_target(
                config,
                t,
                continue_collecting,
                depth == 0,
                full_ctx,
                treat_eof_as_epsilon,
                input,
                recognizer,
            ) {
                let key = busy_key(&c);
                if busy.insert(key) {
                    self.closure(
                        c,
                        configs,
                        busy,
                        continue_collecting,
                        full_ctx,
                        depth,
                        treat_eof_as_epsilon,
                        input,
                        recognizer,
                        merge_cache,
                    );
                }
            }
        }
    }

    /// `canDropLoopEntryEdgeInLeftRecursiveRule` (§4.3): a conservative
    /// check — it only ever answers "don't skip" in cases the reference
    /// optimization would actually skip, never the reverse, so correctness
    /// is preserved at the cost of occasionally exploring an edge the
    /// reference implementation would have pruned.
    fn can_drop_loop_entry_edge(&self, config: &ATNConfig) -> bool {
        let state = self.atn.state(config.state);
        if state.state_type != ATNStateType::StarLoopEntry || !state.is_precedence_decision {
            return false;
        }
        if config.context.is_empty() {
            return false;
        }
        for i in 0..config.context.size() {
            let return_state = config.context.get_return_state(i);
            if return_state == context::EMPTY_RETURN_STATE {
                return false;
            }
            let rs = self.atn.state(StateIndex(return_state as usize));
            let stays_in_rule = rs.rule_index == state.rule_index
                && matches!(rs.state_type, ATNStateType::BlockEnd | ATNStateType::StarLoopEntry);
            if !stays_in_rule {
                return false;
            }
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn get_epsilon_target(
        &self,
        config: &ATNConfig,
        t: &Transition,
        collect_predicates: bool,
        in_context: bool,
        full_ctx: bool,
        treat_eof_as_epsilon: bool,
        input: &mut dyn TokenStream,
        recognizer: &dyn Recognizer,
    ) -> Option<ATNConfig> {
        match t {
            Transition::Epsilon { target, .. } => Some(config.derive(*target)),
            Transition::Rule { target, follow_state, .. } => {
                let new_context = PredictionContext::singleton(Some(config.context.clone()), follow_state.0 as i32);
                Some(config.derive_with_context(*target, new_context))
            }
            Transition::PrecedencePredicate { target, precedence } => {
                if full_ctx {
                    let valid = self.eval_at_start_index(input, |_| recognizer.eval_precedence_predicate(*precedence));
                    if valid {
                        Some(config.derive(*target))
                    } else {
                        None
                    }
                } else if collect_predicates {
                    let pred = Arc::new(SemanticContext::PrecedencePredicate { precedence: *precedence });
                    let new_ctx = SemanticContext::and(vec![config.semantic_context.clone(), pred]);
                    Some(config.clone().with_semantic_context(new_ctx).derive(*target))
                } else {
                    Some(config.derive(*target))
                }
            }
            Transition::Predicate { target, rule_index, pred_index, is_ctx_dependent } => {
                if full_ctx && (!*is_ctx_dependent || in_context) {
                    let (rule_index, pred_index) = (*rule_index, *pred_index);
                    let valid = self.eval_at_start_index(input, |_| recognizer.eval_predicate(rule_index, pred_index));
                    if valid {
                        Some(config.derive(*target))
                    } else {
                        None
                    }
                } else if collect_predicates {
                    let pred = Arc::new(SemanticContext::Predicate {
                        rule_index: *rule_index,
                        pred_index: *pred_index,
                        is_ctx_dependent: *is_ctx_dependent,
                    });
                    let new_ctx = SemanticContext::and(vec![config.semantic_context.clone(), pred]);
                    Some(config.clone().with_semantic_context(new_ctx).derive(*target))
                } else {
                    Some(config.derive(*target))
                }
            }
            Transition::Action { target, .. } => {
                let mut c = config.derive(*target);
                c.semantic_context = Arc::new(SemanticContext::None);
                Some(c)
            }
            Transition::Atom { .. }
            | Transition::Range { .. }
            | Transition::Set { .. }
            | Transition::NotSet { .. }
            | Transition::Wildcard { .. } => {
                if treat_eof_as_epsilon && t.matches(EOF, self.atn.min_vocab(), self.atn.max_vocab()) {
                    Some(config.derive(t.target()))
                } else {
                    None
                }
            }
        }
    }

    /// Predicate evaluation must see the same lookahead the decision that
    /// triggered it saw, not wherever `input` has wandered to mid-closure
    /// (§4.3 "restoring index after"); seek back, evaluate, restore.
    fn eval_at_start_index(&self, input: &mut dyn TokenStream, f: impl FnOnce(&mut dyn TokenStream) -> bool) -> bool {
        let here = input.index();
        let result = f(input);
        input.seek(here);
        result
    }
}

fn unique_alt(configs: &ATNConfigSet) -> Option<usize> {
    let alts = prediction_mode::get_alts(configs);
    if alts.cardinality() == 1 {
        alts.min()
    } else {
        None
    }
}

/// `getPredsForAmbigAlts`: for each represented alt, OR together every
/// config's semantic context; alts whose combined predicate is trivially
/// true contribute nothing (they need no gating), so an empty result means
/// the caller should fall back to the plain `prediction` field.
fn predicates_for_ambiguous_alts(configs: &ATNConfigSet) -> Vec<PredPrediction> {
    let mut preds = Vec::new();
    for alt in configs.represented_alts() {
        let mut combined: Option<Arc<SemanticContext>> = None;
        for c in configs.iter().filter(|c| c.alt == alt) {
            combined = Some(match combined {
                None => c.semantic_context.clone(),
                Some(existing) => SemanticContext::or(vec![existing, c.semantic_context.clone()]),
            });
        }
        if let Some(pred) = combined {
            if !matches!(*pred, SemanticContext::None) {
                preds.push(PredPrediction { pred, alt });
            }
        }
    }
    preds
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::atn::actions::LexerAction;
    use crate::atn::state::{ATNState, BlockStartKind};
    use crate::atn::{GrammarType, RuleInfo};
    use crate::index::RuleIndex;
    use crate::recognizer::SilentErrorListener;
    use std::cell::RefCell;

    struct NoopRecognizer;
    impl crate::semantic_context::PredicateEvaluator for NoopRecognizer {
        fn eval_predicate(&self, _: RuleIndex, _: usize) -> bool {
            true
        }
        fn eval_precedence_predicate(&self, _: i32) -> bool {
            true
        }
    }
    impl Recognizer for NoopRecognizer {
        fn rule_context(&self) -> Option<&dyn RuleContext> {
            None
        }
    }

    struct VecTokenStream {
        tokens: Vec<TokenType>,
        index: RefCell<usize>,
    }
    impl VecTokenStream {
        fn new(tokens: Vec<TokenType>) -> Self {
            Self { tokens, index: RefCell::new(0) }
        }
    }
    impl crate::recognizer::IntStream for VecTokenStream {
        fn la(&self, offset: i32) -> TokenType {
            let i = *self.index.borrow() as i32 + offset - 1;
            if i < 0 || i as usize >= self.tokens.len() {
                EOF
            } else {
                self.tokens[i as usize]
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
            Some(self.tokens.len())
        }
        fn mark(&mut self) -> i32 {
            0
        }
        fn release(&mut self, _marker: i32) {}
    }
    impl TokenStream for VecTokenStream {
        fn get_text_range(&self, _start: usize, _stop: usize) -> String {
            String::new()
        }
    }

    /// Decision: alt1 = token 1, alt2 = token 2, both leading straight to
    /// RuleStop — an unambiguous two-alternative choice.
    fn two_alt_atn() -> ATN {
        let mut decision = ATNState::new(StateIndex(0), RuleIndex(0), ATNStateType::BlockStart(BlockStartKind::Basic));
        decision.decision = Some(DecisionIndex(0));
        let mut alt1 = ATNState::new(StateIndex(1), RuleIndex(0), ATNStateType::Basic);
        let mut alt2 = ATNState::new(StateIndex(2), RuleIndex(0), ATNStateType::Basic);
        let stop = ATNState::new(StateIndex(3), RuleIndex(0), ATNStateType::RuleStop);
        let end = ATNState::new(StateIndex(4), RuleIndex(0), ATNStateType::BlockEnd);

        decision.add_transition(Transition::Epsilon { target: StateIndex(1), outermost_precedence_return: -1 });
        decision.add_transition(Transition::Epsilon { target: StateIndex(2), outermost_precedence_return: -1 });
        decision.end_state = Some(StateIndex(4));
        alt1.add_transition(Transition::Atom { target: StateIndex(4), label: 1 });
        alt2.add_transition(Transition::Atom { target: StateIndex(4), label: 2 });
        let mut end = end;
        end.start_state = Some(StateIndex(0));
        end.add_transition(Transition::Epsilon { target: StateIndex(3), outermost_precedence_return: -1 });

        ATN {
            grammar_type: GrammarType::Parser,
            max_token_type: 5,
            states: vec![decision, alt1, alt2, stop, end],
            rules: vec![RuleInfo { start_state: StateIndex(0), stop_state: StateIndex(3), token_type: None }],
            mode_to_start_state: vec![],
            decision_to_state: vec![StateIndex(0)],
            lexer_actions: Vec::<LexerAction>::new(),
        }
    }

    #[test]
    fn predicts_second_alt_on_matching_token() {
        let atn = two_alt_atn();
        let sim = ParserATNSimulator::new(&atn, Arc::new(PredictionContextCache::new()));
        let mut input = VecTokenStream::new(vec![2]);
        let recognizer = NoopRecognizer;
        let mut listener = SilentErrorListener;
        let alt = sim
            .adaptive_predict(&mut input, DecisionIndex(0), None, &recognizer, &mut listener)
            .expect("prediction should succeed");
        assert_eq!(alt, 2);
    }

    #[test]
    fn no_viable_alt_on_unmatched_token() {
        let atn = two_alt_atn();
        let sim = ParserATNSimulator::new(&atn, Arc::new(PredictionContextCache::new()));
        let mut input = VecTokenStream::new(vec![99]);
        let recognizer = NoopRecognizer;
        let mut listener = SilentErrorListener;
        let result = sim.adaptive_predict(&mut input, DecisionIndex(0), None, &recognizer, &mut listener);
        assert!(result.is_err());
    }

    #[test]
    fn precedence_filter_drops_lower_alt_at_same_return_state() {
        let atn = two_alt_atn();
        let sim = ParserATNSimulator::new(&atn, Arc::new(PredictionContextCache::new()));
        let ctx = crate::context::PredictionContext::singleton(None, 7);

        let mut configs = ATNConfigSet::new(false);
        configs.add(ATNConfig::new(StateIndex(5), 1, ctx.clone()), None);
        configs.add(ATNConfig::new(StateIndex(5), 2, ctx.clone()), None);

        let filtered = sim.apply_precedence_filter(&configs, 0, None);
        let alts: Vec<usize> = filtered.iter().map(|c| c.alt).collect();
        assert_eq!(alts, vec![1], "alt 2 at the same (state, context) as alt 1 must be dropped");
    }

    #[test]
    fn precedence_filter_keeps_lower_alt_at_different_return_context() {
        let atn = two_alt_atn();
        let sim = ParserATNSimulator::new(&atn, Arc::new(PredictionContextCache::new()));
        let ctx1 = crate::context::PredictionContext::singleton(None, 7);
        let ctx2 = crate::context::PredictionContext::singleton(None, 9);

        let mut configs = ATNConfigSet::new(false);
        configs.add(ATNConfig::new(StateIndex(5), 1, ctx1), None);
        configs.add(ATNConfig::new(StateIndex(5), 2, ctx2), None);

        let filtered = sim.apply_precedence_filter(&configs, 0, None);
        let mut alts: Vec<usize> = filtered.iter().map(|c| c.alt).collect();
        alts.sort();
        assert_eq!(alts, vec![1, 2], "a different return context must not be filtered out");
    }

    #[test]
    fn precedence_filter_keeps_suppressed_lower_alt_at_same_return_context() {
        let atn = two_alt_atn();
        let sim = ParserATNSimulator::new(&atn, Arc::new(PredictionContextCache::new()));
        let ctx = crate::context::PredictionContext::singleton(None, 7);

        let mut suppressed = ATNConfig::new(StateIndex(5), 2, ctx.clone());
        suppressed.precedence_filter_suppressed = true;

        let mut configs = ATNConfigSet::new(false);
        configs.add(ATNConfig::new(StateIndex(5), 1, ctx), None);
        configs.add(suppressed, None);

        let filtered = sim.apply_precedence_filter(&configs, 0, None);
        let mut alts: Vec<usize> = filtered.iter().map(|c| c.alt).collect();
        alts.sort();
        assert_eq!(alts, vec![1, 2], "precedence_filter_suppressed must bypass the same-context drop");
    }
}
