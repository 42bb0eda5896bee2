//! Semantic predicate trees (§3.3 `Predicate`/`PrecedencePredicate`
//! transitions combine into these via `closure`). Evaluated against
//! whatever embedding-language callback the recognizer supplies.

use crate::index::RuleIndex;
use std::sync::Arc;

/// The embedder's predicate/precedence-predicate evaluation hooks (§6.2).
/// A parser generated from a grammar with no semantic predicates never
/// calls into this; it exists purely as a seam for embedders that do.
pub trait PredicateEvaluator {
    fn eval_predicate(&self, rule_index: RuleIndex, pred_index: usize) -> bool;
    fn eval_precedence_predicate(&self, precedence: i32) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticContext {
    None,
    Predicate { rule_index: RuleIndex, pred_index: usize, is_ctx_dependent: bool },
    PrecedencePredicate { precedence: i32 },
    And(Vec<Arc<SemanticContext>>),
    Or(Vec<Arc<SemanticContext>>),
}

impl SemanticContext {
    pub fn eval(&self, evaluator: &dyn PredicateEvaluator) -> bool {
        match self {
            SemanticContext::None => true,
            SemanticContext::Predicate { rule_index, pred_index, .. } => {
                evaluator.eval_predicate(*rule_index, *pred_index)
            }
            SemanticContext::PrecedencePredicate { precedence } => {
                evaluator.eval_precedence_predicate(*precedence)
            }
            SemanticContext::And(operands) => operands.iter().all(|o| o.eval(evaluator)),
            SemanticContext::Or(operands) => operands.iter().any(|o| o.eval(evaluator)),
        }
    }

    /// Used by the precedence filter (§4.5 step "filter by precedence") to
    /// strip `PrecedencePredicate` nodes whose precedence is below the
    /// current one, replacing them with a constant before the tree is
    /// otherwise evaluated.
    pub fn eval_precedence(&self, precedence: i32) -> Option<Arc<SemanticContext>> {
        match self {
            SemanticContext::PrecedencePredicate { precedence: p } => {
                if *p <= precedence {
                    None // trivially true: drop the predicate
                } else {
                    Some(SemanticContext::always_false())
                }
            }
            SemanticContext::And(operands) => {
                let mut changed = false;
                let mut kept = Vec::new();
                for o in operands {
                    match o.eval_precedence(precedence) {
                        Some(replacement) => {
                            changed = true;
                            if !matches!(*replacement, SemanticContext::None) {
                                kept.push(replacement);
                            } else {
                                return None;
                            }
                        }
                        None => kept.push(o.clone()),
                    }
                }
                if !changed {
                    None
                } else if kept.is_empty() {
                    Some(Arc::new(SemanticContext::None))
                } else {
                    Some(SemanticContext::and(kept))
                }
            }
            SemanticContext::Or(operands) => {
                let mut changed = false;
                let mut kept = Vec::new();
                for o in operands {
                    match o.eval_precedence(precedence) {
                        Some(replacement) => {
                            changed = true;
                            if matches!(*replacement, SemanticContext::None) {
                                return None;
                            }
                        }
                        None => kept.push(o.clone()),
                    }
                }
                if !changed {
                    None
                } else if kept.is_empty() {
                    Some(SemanticContext::always_false())
                } else {
                    Some(SemanticContext::or(kept))
                }
            }
            SemanticContext::None | SemanticContext::Predicate { .. } => None,
        }
    }

    /// An empty `Or` evaluates to false, which is what an exhausted set of
    /// precedence alternatives collapses to.
    fn always_false() -> Arc<SemanticContext> {
        Arc::new(SemanticContext::Or(Vec::new()))
    }

    /// Whether this node is the canonical "always false" marker produced by
    /// [`Self::always_false`] — used by callers of `eval_precedence` to
    /// distinguish "predicate dropped out (trivially true)" from "predicate
    /// failed outright" without re-evaluating.
    pub fn is_always_false(&self) -> bool {
        matches!(self, SemanticContext::Or(operands) if operands.is_empty())
    }

    /// Flattening `And`/`Or` constructors (matches the reference runtime's
    /// `SemanticContext.and`/`.or`, which de-duplicate and absorb nested
    /// `true`/`false`).
    pub fn and(operands: Vec<Arc<SemanticContext>>) -> Arc<SemanticContext> {
        let mut flat = Vec::new();
        for o in operands {
            match &*o {
                SemanticContext::And(inner) => flat.extend(inner.iter().cloned()),
                _ => flat.push(o),
            }
        }
        flat.dedup_by(|a, b| a == b);
        if flat.len() == 1 {
            flat.into_iter().next().unwrap()
        } else {
            Arc::new(SemanticContext::And(flat))
        }
    }

    pub fn or(operands: Vec<Arc<SemanticContext>>) -> Arc<SemanticContext> {
        let mut flat = Vec::new();
        for o in operands {
            match &*o {
                SemanticContext::Or(inner) => flat.extend(inner.iter().cloned()),
                _ => flat.push(o),
            }
        }
        flat.dedup_by(|a, b| a == b);
        if flat.len() == 1 {
            flat.into_iter().next().unwrap()
        } else {
            Arc::new(SemanticContext::Or(flat))
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    struct AllTrue;
    impl PredicateEvaluator for AllTrue {
        fn eval_predicate(&self, _: RuleIndex, _: usize) -> bool {
            true
        }
        fn eval_precedence_predicate(&self, _: i32) -> bool {
            true
        }
    }

    #[test]
    fn none_is_vacuously_true() {
        assert!(SemanticContext::None.eval(&AllTrue));
    }

    #[test]
    fn and_requires_all_operands() {
        let p1 = Arc::new(SemanticContext::Predicate { rule_index: RuleIndex(0), pred_index: 0, is_ctx_dependent: false });
        let p2 = Arc::new(SemanticContext::Predicate { rule_index: RuleIndex(0), pred_index: 1, is_ctx_dependent: false });
        let combined = SemanticContext::and(vec![p1, p2]);
        assert!(combined.eval(&AllTrue));
    }

    #[test]
    fn precedence_predicate_at_or_below_current_drops_out() {
        let pred = SemanticContext::PrecedencePredicate { precedence: 3 };
        assert!(pred.eval_precedence(5).is_none());
    }
}
