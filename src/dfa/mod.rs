//! The per-decision DFA cache (§3.7, §4.3): lazily populated as
//! `adaptivePredict`/the lexer simulator visit new configurations, and
//! safe to share across recognizer instances running on separate threads
//! (§5) since every mutation goes through `RwLock`/`Mutex`.

pub mod state;

use crate::config_set::{ConfigItem, ConfigSet, HasAlt};
use crate::index::DecisionIndex;
use state::{canonical_key, DFAState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub struct DFA<C: ConfigItem + HasAlt> {
    pub decision: DecisionIndex,
    /// Left-recursive rules get one DFA per precedence level rather than a
    /// single `s0` (§4.5's "s0.edges[precedence]" scheme, adapted here to a
    /// map since precedences aren't contiguous from zero in general).
    pub is_precedence_dfa: bool,
    s0: RwLock<Option<Arc<DFAState<C>>>>,
    precedence_s0: RwLock<HashMap<i32, Arc<DFAState<C>>>>,

    /// Canonicalizing table: every state ever added, keyed by its config
    /// set's [`canonical_key`], so two closures that land on the same
    /// configuration set share one `DFAState` rather than growing the
    /// automaton unboundedly.
    states: Mutex<HashMap<Vec<(usize, usize, usize)>, Arc<DFAState<C>>>>,
    next_state_number: AtomicUsize,
}

impl<C: ConfigItem + HasAlt> DFA<C> {
    pub fn new(decision: DecisionIndex, is_precedence_dfa: bool) -> Self {
        Self {
            decision,
            is_precedence_dfa,
            s0: RwLock::new(None),
            precedence_s0: RwLock::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            next_state_number: AtomicUsize::new(0),
        }
    }

    pub fn s0(&self) -> Option<Arc<DFAState<C>>> {
        self.s0.read().unwrap().clone()
    }

    pub fn set_s0(&self, state: Arc<DFAState<C>>) {
        *self.s0.write().unwrap() = Some(state);
    }

    pub fn precedence_start_state(&self, precedence: i32) -> Option<Arc<DFAState<C>>> {
        self.precedence_s0.read().unwrap().get(&precedence).cloned()
    }

    pub fn set_precedence_start_state(&self, precedence: i32, state: Arc<DFAState<C>>) {
        self.precedence_s0.write().unwrap().insert(precedence, state);
    }

    /// Intern a freshly-built `DFAState`: returns the existing state sharing
    /// its canonical key if one exists (preserving the `prev --t--> D`
    /// edge-sharing the reference runtime relies on), otherwise assigns it a
    /// state number and registers it. `candidate.state_number` is ignored —
    /// the caller builds it with a placeholder since the real number is only
    /// known once we know whether this is actually a new state.
    pub fn add_state(&self, mut candidate: DFAState<C>) -> Arc<DFAState<C>> {
        let key = canonical_key(&candidate.configs);
        let mut states = self.states.lock().unwrap();
        if let Some(existing) = states.get(&key) {
            return existing.clone();
        }
        candidate.state_number = self.next_state_number.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(candidate);
        states.insert(key, state.clone());
        state
    }

    pub fn state_count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}
