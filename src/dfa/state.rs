//! `DFAState` (§3.7): one node of a decision's lexical/adaptive-predict
//! cache, lazily grown as `adaptivePredict`/the lexer simulator discover new
//! reachable configurations.

use crate::atn::actions::LexerActionExecutor;
use crate::config_set::{ConfigItem, ConfigSet, HasAlt};
use crate::index::TokenType;
use crate::semantic_context::SemanticContext;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

/// A semantic-predicate-gated prediction: accept alt `alt` only if `pred`
/// evaluates true (§4.5's predicate-gated accept states).
#[derive(Debug, Clone)]
pub struct PredPrediction {
    pub pred: Arc<SemanticContext>,
    pub alt: usize,
}

/// Canonicalization key used by [`crate::dfa::DFA`] to collapse
/// structurally-identical config sets onto one state: the `(state, alt,
/// context id)` triples the set contains, sorted so member order doesn't
/// matter. Context identity (rather than deep structural equality) is
/// sufficient here because every context reaching a `DFAState` has already
/// passed through the shared `PredictionContextCache` (§4.1.3), so
/// structurally-equal contexts are the same `Arc`.
pub fn canonical_key<C: ConfigItem + HasAlt>(configs: &ConfigSet<C>) -> Vec<(usize, usize, usize)> {
    let mut key: Vec<(usize, usize, usize)> =
        configs.iter().map(|c| (c.state().0, c.alt(), c.context().id)).collect();
    key.sort_unstable();
    key.dedup();
    key
}

pub struct DFAState<C: ConfigItem + HasAlt> {
    pub state_number: usize,
    pub configs: Arc<ConfigSet<C>>,
    pub edges: RwLock<HashMap<TokenType, Arc<DFAState<C>>>>,

    pub is_accept_state: bool,
    /// The alt to report when this is an accept state with no gating
    /// predicate. `-1` when `predicates` must be consulted instead.
    pub prediction: i32,
    pub predicates: Vec<PredPrediction>,
    /// Set when two or more alts survived SLL closure without resolving —
    /// `adaptivePredict` must re-run this decision in full LL context
    /// (§4.6) rather than trust `prediction`.
    pub requires_full_context: bool,

    /// Lexer DFA states only (§4.8): the actions to replay once this state
    /// is confirmed as the longest match.
    pub lexer_action_executor: Option<Arc<LexerActionExecutor>>,

    /// A process-wide sentinel substituted for "prediction failed, no valid
    /// target state" instead of `null`/`Option::None` wherever the
    /// reference runtime compares `target == ERROR` by reference identity.
    /// Generic statics can't hold a type parameter the way a non-generic
    /// singleton would, so this is a flag on an otherwise-empty state
    /// rather than a shared `Arc` compared by `ptr_eq`; callers check
    /// `.is_error` instead of identity.
    pub is_error: bool,
}

impl<C: ConfigItem + HasAlt> DFAState<C> {
    pub fn new(state_number: usize, configs: Arc<ConfigSet<C>>) -> Self {
        Self {
            state_number,
            configs,
            edges: RwLock::new(HashMap::new()),
            is_accept_state: false,
            prediction: -1,
            predicates: Vec::new(),
            requires_full_context: false,
            lexer_action_executor: None,
            is_error: false,
        }
    }

    pub fn error() -> Self {
        Self {
            state_number: usize::MAX,
            configs: Arc::new(ConfigSet::new(false)),
            edges: RwLock::new(HashMap::new()),
            is_accept_state: false,
            prediction: -1,
            predicates: Vec::new(),
            requires_full_context: false,
            lexer_action_executor: None,
            is_error: true,
        }
    }

    pub fn get_target(&self, symbol: TokenType) -> Option<Arc<DFAState<C>>> {
        self.edges.read().unwrap().get(&symbol).cloned()
    }

    pub fn set_target(&self, symbol: TokenType, target: Arc<DFAState<C>>) {
        self.edges.write().unwrap().insert(symbol, target);
    }
}

impl<C: ConfigItem + HasAlt> PartialEq for DFAState<C> {
    fn eq(&self, other: &Self) -> bool {
        canonical_key(&self.configs) == canonical_key(&other.configs)
    }
}
impl<C: ConfigItem + HasAlt> Eq for DFAState<C> {}
impl<C: ConfigItem + HasAlt> Hash for DFAState<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        canonical_key(&self.configs).hash(state)
    }
}

impl<C: ConfigItem + HasAlt> std::fmt::Debug for DFAState<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DFAState")
            .field("state_number", &self.state_number)
            .field("is_accept_state", &self.is_accept_state)
            .field("prediction", &self.prediction)
            .field("is_error", &self.is_error)
            .finish()
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::config::ATNConfig;
    use crate::context::PredictionContext;
    use crate::index::StateIndex;

    fn leaf_state(n: usize) -> Arc<DFAState<ATNConfig>> {
        let ctx = PredictionContext::empty();
        let mut configs = ConfigSet::new(false);
        configs.add(ATNConfig::new(StateIndex(n), 1, ctx), None);
        Arc::new(DFAState::new(n, Arc::new(configs)))
    }

    /// Once an edge is recorded for a symbol, every later read for that same
    /// symbol returns the same target — a DFA edge, once discovered, never
    /// reverts or flips to a different state.
    #[test]
    fn edge_is_stable_once_set() {
        let from = leaf_state(0);
        let target = leaf_state(1);

        assert!(from.get_target(5).is_none());
        from.set_target(5, target.clone());

        let first_read = from.get_target(5).expect("edge must exist after set_target");
        let second_read = from.get_target(5).expect("edge must still exist");
        assert!(Arc::ptr_eq(&first_read, &second_read));
        assert!(Arc::ptr_eq(&first_read, &target));
    }

    /// Edges for distinct symbols don't clobber each other.
    #[test]
    fn edges_for_distinct_symbols_are_independent() {
        let from = leaf_state(0);
        let target_a = leaf_state(1);
        let target_b = leaf_state(2);

        from.set_target(1, target_a.clone());
        from.set_target(2, target_b.clone());

        assert!(Arc::ptr_eq(&from.get_target(1).unwrap(), &target_a));
        assert!(Arc::ptr_eq(&from.get_target(2).unwrap(), &target_b));
    }
}
