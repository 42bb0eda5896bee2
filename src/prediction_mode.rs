//! §4.7: conflict detection over a `DFAState`'s alt-to-configs mapping —
//! the predicates `adaptivePredict` uses to decide whether an SLL result is
//! trustworthy or whether it must re-run in full LL context.

use crate::config::ATNConfig;
use crate::config_set::ATNConfigSet;
use crate::context::PredictionContext;
use std::collections::HashMap;
use std::sync::Arc;

/// A small fixed-growth bitset over alt numbers (1-based, as ATN alts are).
/// Hand-rolled rather than pulling in a crate: the reference runtime's
/// `BitSet` is a handful of bit-twiddling methods and nothing here needs the
/// sparse/rank-select machinery a general bitset crate would offer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (bit % 64);
    }

    pub fn get(&self, bit: usize) -> bool {
        let word = bit / 64;
        word < self.words.len() && self.words[word] & (1u64 << (bit % 64)) != 0
    }

    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (i, w) in other.words.iter().enumerate() {
            self.words[i] |= w;
        }
    }

    pub fn min(&self) -> Option<usize> {
        for (i, &w) in self.words.iter().enumerate() {
            if w != 0 {
                return Some(i * 64 + w.trailing_zeros() as usize);
            }
        }
        None
    }

    pub fn to_vec(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for (i, &w) in self.words.iter().enumerate() {
            for bit in 0..64 {
                if w & (1u64 << bit) != 0 {
                    out.push(i * 64 + bit);
                }
            }
        }
        out
    }
}

/// `getConflictingAltSubsets`: group configs by `(state, context)` and
/// collect, per group, the set of alts present — the raw material every
/// other conflict predicate below filters.
pub fn alt_subsets(configs: &ATNConfigSet) -> Vec<BitSet> {
    conflicting_alt_subsets(configs)
}

fn conflicting_alt_subsets(configs: &ATNConfigSet) -> Vec<BitSet> {
    let mut groups: HashMap<(crate::index::StateIndex, Arc<PredictionContext>), BitSet> = HashMap::new();
    let mut order: Vec<(crate::index::StateIndex, Arc<PredictionContext>)> = Vec::new();
    for c in configs.iter() {
        let key = (c.state, c.context.clone());
        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            BitSet::new()
        });
        entry.set(c.alt);
    }
    order.into_iter().map(|k| groups.remove(&k).unwrap()).collect()
}

/// `allSubsetsConflict`: every state's reachable alt set is identical and
/// has more than one member — i.e., no state alone disambiguates.
pub fn all_subsets_conflict(configs: &ATNConfigSet) -> bool {
    let subsets = conflicting_alt_subsets(configs);
    all_subsets_equal(&subsets) && subsets.first().map_or(false, |s| s.cardinality() > 1)
}

pub fn all_subsets_equal(subsets: &[BitSet]) -> bool {
    match subsets.split_first() {
        None => true,
        Some((first, rest)) => rest.iter().all(|s| s == first),
    }
}

/// `getAlts`: the union of all alts appearing anywhere in `configs`.
pub fn get_alts(configs: &ATNConfigSet) -> BitSet {
    let mut out = BitSet::new();
    for c in configs.iter() {
        out.set(c.alt);
    }
    out
}

/// `getConflictingAlts`: the smallest subset of alts that conflict, i.e. the
/// first group from [`conflicting_alt_subsets`] with more than one member,
/// unioned with every other subset sharing its membership. In practice
/// (matching the reference implementation) this is simply the union of all
/// per-(state,context) subsets that have more than one alt.
pub fn get_conflicting_alts(configs: &ATNConfigSet) -> BitSet {
    let mut out = BitSet::new();
    for subset in conflicting_alt_subsets(configs) {
        if subset.cardinality() > 1 {
            out.union_with(&subset);
        }
    }
    out
}

/// `hasSLLConflictTerminatingPrediction`: SLL prediction may stop as soon as
/// either (a) every alt-subset agrees (no ambiguity at all), or (b) the
/// subsets conflict exactly the way `resolvesToJustOneViableAlt`/minimum-alt
/// resolution would settle them — in which case there's no need to escalate
/// to full LL.
pub fn has_sll_conflict_terminating_prediction(configs: &ATNConfigSet) -> bool {
    if resolves_to_just_one_viable_alt(configs).is_some() {
        return true;
    }
    let subsets = conflicting_alt_subsets(configs);
    all_subsets_conflict(configs) || has_conflicting_alt_subset_with_nonconflicting(&subsets)
}

fn has_conflicting_alt_subset_with_nonconflicting(subsets: &[BitSet]) -> bool {
    subsets.iter().any(|s| s.cardinality() > 1)
}

/// `getSingleViableAlt`: if exactly one alt is viable across every subset
/// (every other alt conflicts away), return it.
pub fn resolves_to_just_one_viable_alt(configs: &ATNConfigSet) -> Option<usize> {
    get_single_viable_alt(configs)
}

pub fn get_single_viable_alt(configs: &ATNConfigSet) -> Option<usize> {
    let subsets = conflicting_alt_subsets(configs);
    let mut result = None;
    for subset in &subsets {
        let min = subset.min()?;
        match result {
            None => result = Some(min),
            Some(r) if r != min => return None,
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn bitset_tracks_membership() {
        let mut b = BitSet::new();
        b.set(3);
        b.set(130);
        assert!(b.get(3));
        assert!(b.get(130));
        assert!(!b.get(4));
        assert_eq!(b.cardinality(), 2);
    }

    #[test]
    fn all_subsets_equal_trivially_true_for_empty() {
        assert!(all_subsets_equal(&[]));
    }

    #[test]
    fn all_subsets_equal_detects_mismatch() {
        let mut a = BitSet::new();
        a.set(1);
        let mut b = BitSet::new();
        b.set(2);
        assert!(!all_subsets_equal(&[a, b]));
    }
}
