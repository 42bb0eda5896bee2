//! `ATNConfigSet` (§3.6, §4.2): the working set closure/reach computation
//! builds and merges into. Shared, generic implementation over the parser's
//! [`ATNConfig`] and the lexer's [`LexerATNConfig`] — the merge-on-add
//! algorithm the two share is identical and substantial enough that
//! duplicating it per config kind would just be two copies of the same ~150
//! lines drifting apart; see `DESIGN.md`.

use crate::config::{ATNConfig, LexerATNConfig};
use crate::context::{self, MergeCache, PredictionContext};
use crate::index::StateIndex;
use crate::semantic_context::SemanticContext;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// What a config kind must expose for set membership and context merging.
/// `Key` is everything *except* the context — §3.6 merges on `(state, alt,
/// semanticContext)` for the parser and `(state, alt)` for the lexer,
/// folding the context in via [`context::merge`] rather than treating it as
/// part of the identity.
pub trait ConfigItem: Clone {
    type Key: Eq + Hash + Clone;
    fn key(&self) -> Self::Key;
    fn state(&self) -> StateIndex;
    fn context(&self) -> &Arc<PredictionContext>;
    fn with_context(&self, context: Arc<PredictionContext>) -> Self;

    /// Whether this config carries a non-trivial semantic predicate. Only
    /// [`ATNConfig`] ever does — the lexer has no predicate transitions on
    /// its configs — so this defaults to `false` rather than living in the
    /// shared [`ConfigSet`] bookkeeping as a field every config kind must
    /// populate.
    fn has_semantic_context(&self) -> bool {
        false
    }

    /// §4.2 step 4: fold `other`'s per-config bookkeeping (beyond the
    /// context, which `add` merges separately) onto `self` when `other`
    /// merges into `self`'s slot. Only [`ATNConfig`] has anything to fold
    /// here (`reaches_into_outer_context`, `precedence_filter_suppressed`);
    /// the lexer's config carries neither, so this defaults to a no-op.
    fn merge_extra(&mut self, _other: &Self) {}
}

impl ConfigItem for ATNConfig {
    type Key = (StateIndex, usize, Arc<SemanticContext>);
    fn key(&self) -> Self::Key {
        (self.state, self.alt, self.semantic_context.clone())
    }
    fn state(&self) -> StateIndex {
        self.state
    }
    fn context(&self) -> &Arc<PredictionContext> {
        &self.context
    }
    fn with_context(&self, context: Arc<PredictionContext>) -> Self {
        self.derive_with_context(self.state, context)
    }
    fn has_semantic_context(&self) -> bool {
        !matches!(*self.semantic_context, SemanticContext::None)
    }
    fn merge_extra(&mut self, other: &Self) {
        self.reaches_into_outer_context = self.reaches_into_outer_context.max(other.reaches_into_outer_context);
        if other.precedence_filter_suppressed {
            self.precedence_filter_suppressed = true;
        }
    }
}

impl ConfigItem for LexerATNConfig {
    type Key = (StateIndex, usize);
    fn key(&self) -> Self::Key {
        (self.state, self.alt)
    }
    fn state(&self) -> StateIndex {
        self.state
    }
    fn context(&self) -> &Arc<PredictionContext> {
        &self.context
    }
    fn with_context(&self, context: Arc<PredictionContext>) -> Self {
        self.derive_with_context(self.state, context)
    }
}

/// A closure/reach working set. `configs` preserves insertion order (closure
/// order matters for the priority the lexer gives equal-length matches and
/// for deterministic DFA-state labeling); `index` maps each distinct `Key`
/// to its slot in `configs` for O(1) merge-on-add.
#[derive(Debug, Clone)]
pub struct ConfigSet<C: ConfigItem> {
    configs: Vec<C>,
    index: HashMap<C::Key, usize>,

    /// Full-context (LL) prediction only: true once any config's closure
    /// crossed a rule-stop boundary into the caller's context (§4.6).
    pub dips_into_outer_context: bool,
    /// True once any config added carries a semantic predicate — lets
    /// `computeTargetState` skip `getPredsForAmbigAlts` entirely for the
    /// common predicate-free decision.
    pub has_semantic_context: bool,
    /// Whether this set was produced under full-context (LL) simulation, as
    /// opposed to SLL.
    pub full_ctx: bool,
    read_only: bool,
}

pub type ATNConfigSet = ConfigSet<ATNConfig>;
pub type LexerATNConfigSet = ConfigSet<LexerATNConfig>;

impl<C: ConfigItem> ConfigSet<C> {
    pub fn new(full_ctx: bool) -> Self {
        Self {
            configs: Vec::new(),
            index: HashMap::new(),
            dips_into_outer_context: false,
            has_semantic_context: false,
            full_ctx,
            read_only: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
    pub fn len(&self) -> usize {
        self.configs.len()
    }
    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.configs.iter()
    }
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// §3.6: freezes the set. Any further [`add`](Self::add) is a logic
    /// error in the caller, matching the reference runtime's
    /// `IllegalStateException` on a sealed set — it panics here rather than
    /// threading a `Result` through every closure call site.
    pub fn seal(&mut self) {
        self.read_only = true;
    }

    /// §4.2 `add`: merge `config` into the set, folding its context into any
    /// existing entry with the same `Key` via [`context::merge`] and its
    /// other bookkeeping (`reaches_into_outer_context`, `precedence_filter_
    /// suppressed`) via [`ConfigItem::merge_extra`] — unconditionally, not
    /// only when the merged context differs from the existing one. Mirrors
    /// the reference runtime's `add`, which reports `true` for the merge
    /// case regardless of whether the context actually changed; callers
    /// that gate further closure expansion on this return value must keep
    /// expanding through a same-context merge too.
    pub fn add(&mut self, config: C, merge_cache: Option<&MergeCache>) -> bool {
        assert!(!self.read_only, "cannot add to a sealed ATNConfigSet");
        if config.has_semantic_context() {
            self.has_semantic_context = true;
        }
        let key = config.key();
        if let Some(&i) = self.index.get(&key) {
            let existing = &self.configs[i];
            let root_is_wildcard = !self.full_ctx;
            let merged = context::merge(existing.context(), config.context(), root_is_wildcard, merge_cache);
            let mut updated = existing.with_context(merged);
            updated.merge_extra(&config);
            self.configs[i] = updated;
            true
        } else {
            let i = self.configs.len();
            self.index.insert(key, i);
            self.configs.push(config);
            true
        }
    }

    pub fn add_all(&mut self, other: &ConfigSet<C>, merge_cache: Option<&MergeCache>) {
        for c in other.configs.iter().cloned() {
            self.add(c, merge_cache);
        }
    }

    /// The distinct alt numbers represented, in first-seen order. Used by
    /// `ParserATNSimulator::get_alts` and the lexer's priority resolution.
    pub fn represented_alts(&self) -> Vec<usize>
    where
        C: HasAlt,
    {
        let mut seen = Vec::new();
        for c in &self.configs {
            let alt = c.alt();
            if !seen.contains(&alt) {
                seen.push(alt);
            }
        }
        seen
    }
}

/// Parser and lexer configs both carry an alt number, but it isn't part of
/// the shared [`ConfigItem`] contract (the lexer's "alt" is really "rule
/// index competing for this token", used only for priority, not for
/// ambiguity bookkeeping) — split out so [`ConfigSet::represented_alts`]
/// stays meaningful for both without forcing identical semantics.
pub trait HasAlt {
    fn alt(&self) -> usize;
}
impl HasAlt for ATNConfig {
    fn alt(&self) -> usize {
        self.alt
    }
}
impl HasAlt for LexerATNConfig {
    fn alt(&self) -> usize {
        self.alt
    }
}

impl<C: ConfigItem> Default for ConfigSet<C> {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::config::ATNConfig;
    use crate::index::StateIndex;

    #[test]
    fn add_merges_contexts_for_equal_keys() {
        let mut set = ATNConfigSet::new(false);
        let parent = PredictionContext::empty();
        let ctx_a = PredictionContext::singleton(Some(parent.clone()), 1);
        let ctx_b = PredictionContext::singleton(Some(parent.clone()), 2);

        let changed1 = set.add(ATNConfig::new(StateIndex(0), 1, ctx_a), None);
        let changed2 = set.add(ATNConfig::new(StateIndex(0), 1, ctx_b), None);

        assert!(changed1);
        assert!(changed2);
        assert_eq!(set.len(), 1, "same (state, alt, semanticContext) must merge into one config");
        assert_eq!(set.iter().next().unwrap().context.size(), 2);
    }

    #[test]
    fn add_keeps_distinct_alts_separate() {
        let mut set = ATNConfigSet::new(false);
        let ctx = PredictionContext::empty();
        set.add(ATNConfig::new(StateIndex(0), 1, ctx.clone()), None);
        set.add(ATNConfig::new(StateIndex(0), 2, ctx), None);
        assert_eq!(set.len(), 2);
        assert_eq!(set.represented_alts(), vec![1, 2]);
    }

    #[test]
    #[should_panic]
    fn add_after_seal_panics() {
        let mut set = ATNConfigSet::new(false);
        set.seal();
        set.add(ATNConfig::new(StateIndex(0), 1, PredictionContext::empty()), None);
    }
}
