//! `ATNConfig` (§3.5): one (state, alt, context) triple tracked during
//! closure/reach computation, plus the lexer's extended variant.

use crate::atn::actions::LexerActionExecutor;
use crate::context::PredictionContext;
use crate::index::StateIndex;
use crate::semantic_context::SemanticContext;
use std::sync::Arc;

/// A parser-side ATN configuration.
///
/// `reaches_into_outer_context` and `precedence_filter_suppressed` are kept
/// as plain fields rather than bit-packed into the reference runtime's
/// single `int`: nothing in this crate's hot path scans large arrays of
/// configs where the packing would matter, and plain fields keep the
/// `Debug` output readable.
#[derive(Debug, Clone)]
pub struct ATNConfig {
    pub state: StateIndex,
    pub alt: usize,
    pub context: Arc<PredictionContext>,
    pub semantic_context: Arc<SemanticContext>,

    /// Set by `closure` while crossing a rule-stop boundary with an empty
    /// return context during full-context (LL) prediction; read back by
    /// `closure`'s precedence filter and by conflict detection (§4.5, §4.7).
    pub reaches_into_outer_context: u32,
    /// Left-recursive rules: once an alt has produced a successful
    /// precedence-filtered config at a given precedence, `closure`
    /// suppresses the PrecedencePredicate-guarded alternatives with lower
    /// precedence for the rest of this closure (§4.5).
    pub precedence_filter_suppressed: bool,
}

impl ATNConfig {
    pub fn new(state: StateIndex, alt: usize, context: Arc<PredictionContext>) -> Self {
        Self {
            state,
            alt,
            context,
            semantic_context: Arc::new(SemanticContext::None),
            reaches_into_outer_context: 0,
            precedence_filter_suppressed: false,
        }
    }

    pub fn with_semantic_context(mut self, ctx: Arc<SemanticContext>) -> Self {
        self.semantic_context = ctx;
        self
    }

    /// §3.6 equivalence key: `(state, alt, context, semanticContext)` — two
    /// configs with this key equal are the same member of an `ATNConfigSet`
    /// and get merged rather than duplicated.
    pub fn equivalence_key(&self) -> (StateIndex, usize, Arc<PredictionContext>, Arc<SemanticContext>) {
        (self.state, self.alt, self.context.clone(), self.semantic_context.clone())
    }

    pub fn derive(&self, state: StateIndex) -> Self {
        Self { state, ..self.clone() }
    }

    pub fn derive_with_context(&self, state: StateIndex, context: Arc<PredictionContext>) -> Self {
        Self { state, context, ..self.clone() }
    }
}

/// The lexer's extended configuration (§3.5): same (state, context) shape,
/// but tracks the deferred action list and non-greedy-loop exit flag
/// instead of a parser alt/semantic-context.
#[derive(Debug, Clone)]
pub struct LexerATNConfig {
    pub state: StateIndex,
    pub alt: usize,
    pub context: Arc<PredictionContext>,
    pub lexer_action_executor: Option<Arc<LexerActionExecutor>>,
    /// Once true, this configuration already exited a non-greedy loop and
    /// must not be allowed to re-enter it (§4.8's closure termination rule
    /// for `*?`/`+?`).
    pub passed_through_non_greedy_decision: bool,
}

impl LexerATNConfig {
    pub fn new(state: StateIndex, alt: usize, context: Arc<PredictionContext>) -> Self {
        Self {
            state,
            alt,
            context,
            lexer_action_executor: None,
            passed_through_non_greedy_decision: false,
        }
    }

    pub fn equivalence_key(&self) -> (StateIndex, usize, Arc<PredictionContext>) {
        (self.state, self.alt, self.context.clone())
    }

    pub fn derive(&self, state: StateIndex) -> Self {
        Self { state, ..self.clone() }
    }

    pub fn derive_with_context(&self, state: StateIndex, context: Arc<PredictionContext>) -> Self {
        Self { state, context, ..self.clone() }
    }

    pub fn derive_with_action(&self, state: StateIndex, executor: Option<Arc<LexerActionExecutor>>) -> Self {
        Self { state, lexer_action_executor: executor, ..self.clone() }
    }
}
