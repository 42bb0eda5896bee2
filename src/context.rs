//! The graph-structured stack (§3.4, §4.1): an immutable DAG of rule-return
//! stacks, merged and interned so that parallel ATN configurations sharing a
//! suffix share storage.

use crate::atn::transition::Transition;
use crate::atn::ATN;
use crate::index::{RuleIndex, StateIndex};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const EMPTY_RETURN_STATE: i32 = i32::MAX;

#[derive(Debug)]
enum Kind {
    Empty,
    Singleton {
        parent: Option<Arc<PredictionContext>>,
        return_state: i32,
    },
    Array {
        parents: Vec<Option<Arc<PredictionContext>>>,
        return_states: Vec<i32>,
    },
}

/// A GSS node. `id` is a process-wide monotonic identifier (`0` reserved for
/// the shared [`EMPTY`] node, per §3.4); `hash` is the cached structural
/// hash used by [`Hash`]/[`PartialEq`].
#[derive(Debug)]
pub struct PredictionContext {
    pub id: usize,
    hash: u64,
    kind: Kind,
}

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

fn hash_of(kind: &Kind) -> u64 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    match kind {
        Kind::Empty => 0u8.hash(&mut h),
        Kind::Singleton { parent, return_state } => {
            1u8.hash(&mut h);
            return_state.hash(&mut h);
            hash_opt_parent(parent, &mut h);
        }
        Kind::Array { parents, return_states } => {
            2u8.hash(&mut h);
            return_states.hash(&mut h);
            for p in parents {
                hash_opt_parent(p, &mut h);
            }
        }
    }
    h.finish()
}

fn hash_opt_parent(p: &Option<Arc<PredictionContext>>, h: &mut impl Hasher) {
    match p {
        Some(p) => p.hash.hash(h),
        None => 0u64.hash(h),
    }
}

pub static EMPTY: Lazy<Arc<PredictionContext>> =
    Lazy::new(|| Arc::new(PredictionContext { id: 0, hash: hash_of(&Kind::Empty), kind: Kind::Empty }));

fn opt_arc_eq(a: &Option<Arc<PredictionContext>>, b: &Option<Arc<PredictionContext>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y) || **x == **y,
        _ => false,
    }
}

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.hash != other.hash {
            return false;
        }
        match (&self.kind, &other.kind) {
            (Kind::Empty, Kind::Empty) => true,
            (
                Kind::Singleton { parent: p1, return_state: r1 },
                Kind::Singleton { parent: p2, return_state: r2 },
            ) => r1 == r2 && opt_arc_eq(p1, p2),
            (
                Kind::Array { parents: p1, return_states: r1 },
                Kind::Array { parents: p2, return_states: r2 },
            ) => {
                r1 == r2
                    && p1.len() == p2.len()
                    && p1.iter().zip(p2.iter()).all(|(a, b)| opt_arc_eq(a, b))
            }
            _ => false,
        }
    }
}
impl Eq for PredictionContext {}
impl Hash for PredictionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state)
    }
}

impl PredictionContext {
    pub fn empty() -> Arc<PredictionContext> {
        EMPTY.clone()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    pub fn singleton(parent: Option<Arc<PredictionContext>>, return_state: i32) -> Arc<PredictionContext> {
        if parent.is_none() && return_state == EMPTY_RETURN_STATE {
            return PredictionContext::empty();
        }
        let kind = Kind::Singleton { parent, return_state };
        Arc::new(PredictionContext {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            hash: hash_of(&kind),
            kind,
        })
    }

    fn array(parents: Vec<Option<Arc<PredictionContext>>>, return_states: Vec<i32>) -> Arc<PredictionContext> {
        debug_assert_eq!(parents.len(), return_states.len());
        if return_states.len() == 1 {
            return PredictionContext::singleton(parents.into_iter().next().unwrap(), return_states[0]);
        }
        debug_assert!(
            return_states.windows(2).all(|w| w[0] < w[1]),
            "Array PredictionContext return_states must be strictly sorted ascending: {:?}",
            return_states
        );
        let kind = Kind::Array { parents, return_states };
        Arc::new(PredictionContext {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            hash: hash_of(&kind),
            kind,
        })
    }

    pub fn size(&self) -> usize {
        match &self.kind {
            Kind::Empty => 1,
            Kind::Singleton { .. } => 1,
            Kind::Array { return_states, .. } => return_states.len(),
        }
    }

    pub fn get_parent(&self, i: usize) -> Option<Arc<PredictionContext>> {
        match &self.kind {
            Kind::Empty => {
                debug_assert_eq!(i, 0);
                None
            }
            Kind::Singleton { parent, .. } => {
                debug_assert_eq!(i, 0);
                parent.clone()
            }
            Kind::Array { parents, .. } => parents[i].clone(),
        }
    }

    pub fn get_return_state(&self, i: usize) -> i32 {
        match &self.kind {
            Kind::Empty => EMPTY_RETURN_STATE,
            Kind::Singleton { return_state, .. } => {
                debug_assert_eq!(i, 0);
                *return_state
            }
            Kind::Array { return_states, .. } => return_states[i],
        }
    }

    /// §4.1.1 `fromRuleContext`: walk the rule-invocation chain from
    /// innermost (`outer_context`) to outermost, producing the return-state
    /// stack a parser configuration at `outer_context` would carry. The
    /// outermost node's parent is [`EMPTY`].
    pub fn from_rule_context(atn: &ATN, outer_context: Option<&dyn RuleContext>) -> Arc<PredictionContext> {
        let mut return_states = Vec::new();
        let mut ctx = outer_context;
        while let Some(rc) = ctx {
            match rc.invoking_state() {
                Some(invoking_state) => {
                    return_states.push(follow_state_of(atn, invoking_state));
                    ctx = rc.parent();
                }
                None => break,
            }
        }
        let mut result = PredictionContext::empty();
        for rs in return_states.into_iter().rev() {
            result = PredictionContext::singleton(Some(result), rs);
        }
        result
    }
}

fn follow_state_of(atn: &ATN, invoking_state: StateIndex) -> i32 {
    let state = atn.state(invoking_state);
    state
        .transitions
        .iter()
        .find_map(|t| match t {
            Transition::Rule { follow_state, .. } => Some(follow_state.0 as i32),
            _ => None,
        })
        .expect("invoking state must carry a Rule transition (§4.1.1)")
}

/// The caller's rule-invocation chain, as required to build a
/// [`PredictionContext`] from §6.2's `Recognizer` contract.
pub trait RuleContext {
    fn invoking_state(&self) -> Option<StateIndex>;
    fn parent(&self) -> Option<&dyn RuleContext>;
    fn rule_index(&self) -> Option<RuleIndex> {
        None
    }
}

/// §4.1.3: the per-`adaptivePredict` memo table. Keyed by the two input
/// nodes' ids in the order given, then the reverse order, exactly as §4.1.2
/// describes — achieved here by normalizing the key to `(min(a,b),
/// max(a,b))`, which collapses both lookup orders into the same slot
/// without needing two probes.
pub type MergeCache = Mutex<HashMap<(usize, usize), Arc<PredictionContext>>>;

pub fn new_merge_cache() -> MergeCache {
    Mutex::new(HashMap::new())
}

fn cache_key(a: &Arc<PredictionContext>, b: &Arc<PredictionContext>) -> (usize, usize) {
    if a.id <= b.id {
        (a.id, b.id)
    } else {
        (b.id, a.id)
    }
}

/// §4.1.2 `merge`.
pub fn merge(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    merge_cache: Option<&MergeCache>,
) -> Arc<PredictionContext> {
    if Arc::ptr_eq(a, b) || **a == **b {
        return a.clone();
    }
    merge_singletons_or_arrays(a, b, root_is_wildcard, merge_cache)
}

fn merge_singletons_or_arrays(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    merge_cache: Option<&MergeCache>,
) -> Arc<PredictionContext> {
    if a.size() == 1 && b.size() == 1 {
        return merge_singletons(a, b, root_is_wildcard, merge_cache);
    }
    let (pa, ra) = as_array_parts(a);
    let (pb, rb) = as_array_parts(b);
    merge_arrays(a, &pa, &ra, b, &pb, &rb, root_is_wildcard, merge_cache)
}

fn as_array_parts(ctx: &Arc<PredictionContext>) -> (Vec<Option<Arc<PredictionContext>>>, Vec<i32>) {
    let n = ctx.size();
    let mut parents = Vec::with_capacity(n);
    let mut return_states = Vec::with_capacity(n);
    for i in 0..n {
        parents.push(ctx.get_parent(i));
        return_states.push(ctx.get_return_state(i));
    }
    (parents, return_states)
}

/// §4.1.2 `mergeRoot`: special-cases an `Empty` operand.
fn merge_root(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
) -> Option<Arc<PredictionContext>> {
    if root_is_wildcard {
        if a.is_empty() {
            return Some(PredictionContext::empty());
        }
        if b.is_empty() {
            return Some(PredictionContext::empty());
        }
        return None;
    }
    if a.is_empty() && b.is_empty() {
        return Some(PredictionContext::empty());
    }
    if a.is_empty() {
        Some(add_empty_return_entry(b))
    } else if b.is_empty() {
        Some(add_empty_return_entry(a))
    } else {
        None
    }
}

/// Full LL keeps `$` (outermost return) alive as an explicit array entry
/// rather than collapsing to `Empty`, since other alternatives in the same
/// config set may still need their own context.
fn add_empty_return_entry(ctx: &Arc<PredictionContext>) -> Arc<PredictionContext> {
    let (mut parents, mut return_states) = as_array_parts(ctx);
    parents.push(None);
    return_states.push(EMPTY_RETURN_STATE);
    PredictionContext::array(parents, return_states)
}

/// §4.1.2 `mergeSingletons`.
fn merge_singletons(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    merge_cache: Option<&MergeCache>,
) -> Arc<PredictionContext> {
    if let Some(cache) = merge_cache {
        let key = cache_key(a, b);
        if let Some(hit) = cache.lock().unwrap().get(&key) {
            return hit.clone();
        }
    }
    if let Some(root_merge) = merge_root(a, b, root_is_wildcard) {
        if let Some(cache) = merge_cache {
            cache.lock().unwrap().insert(cache_key(a, b), root_merge.clone());
        }
        return root_merge;
    }

    let ra = a.get_return_state(0);
    let rb = b.get_return_state(0);
    let pa = a.get_parent(0);
    let pb = b.get_parent(0);

    let result = if ra == rb {
        let merged_parent = match (&pa, &pb) {
            (Some(x), Some(y)) => Some(merge(x, y, root_is_wildcard, merge_cache)),
            (None, None) => None,
            _ => unreachable!("equal return states with mismatched None/Some parents"),
        };
        if opt_arc_eq(&merged_parent, &pa) {
            a.clone()
        } else if opt_arc_eq(&merged_parent, &pb) {
            b.clone()
        } else {
            PredictionContext::singleton(merged_parent, ra)
        }
    } else {
        // Different return states: produce a 2-entry Array, sorted by
        // return state, sharing a parent when the parents are identical.
        let (p1, r1, p2, r2) = if ra < rb { (pa, ra, pb, rb) } else { (pb, rb, pa, ra) };
        if opt_arc_eq(&p1, &p2) {
            PredictionContext::array(vec![p1.clone(), p2], vec![r1, r2])
        } else {
            PredictionContext::array(vec![p1, p2], vec![r1, r2])
        }
    };

    if let Some(cache) = merge_cache {
        cache.lock().unwrap().insert(cache_key(a, b), result.clone());
    }
    result
}

/// §4.1.2 `mergeArrays`: classic merge of two sorted runs by return state.
fn merge_arrays(
    a: &Arc<PredictionContext>,
    pa: &[Option<Arc<PredictionContext>>],
    ra: &[i32],
    b: &Arc<PredictionContext>,
    pb: &[Option<Arc<PredictionContext>>],
    rb: &[i32],
    root_is_wildcard: bool,
    merge_cache: Option<&MergeCache>,
) -> Arc<PredictionContext> {
    if let Some(cache) = merge_cache {
        let key = cache_key(a, b);
        if let Some(hit) = cache.lock().unwrap().get(&key) {
            return hit.clone();
        }
    }
    if let Some(root_merge) = merge_root(a, b, root_is_wildcard) {
        if let Some(cache) = merge_cache {
            cache.lock().unwrap().insert(cache_key(a, b), root_merge.clone());
        }
        return root_merge;
    }

    let mut i = 0usize;
    let mut j = 0usize;
    let mut merged_parents: Vec<Option<Arc<PredictionContext>>> = Vec::new();
    let mut merged_states: Vec<i32> = Vec::new();

    while i < ra.len() && j < rb.len() {
        let p1 = &pa[i];
        let p2 = &pb[j];
        if ra[i] == rb[j] {
            let r = ra[i];
            let both_empty_root = r == EMPTY_RETURN_STATE && p1.is_none() && p2.is_none();
            let merged_parent = if both_empty_root {
                None
            } else if opt_arc_eq(p1, p2) {
                p1.clone()
            } else {
                Some(merge(p1.as_ref().unwrap(), p2.as_ref().unwrap(), root_is_wildcard, merge_cache))
            };
            merged_parents.push(merged_parent);
            merged_states.push(r);
            i += 1;
            j += 1;
        } else if ra[i] < rb[j] {
            merged_parents.push(p1.clone());
            merged_states.push(ra[i]);
            i += 1;
        } else {
            merged_parents.push(p2.clone());
            merged_states.push(rb[j]);
            j += 1;
        }
    }
    while i < ra.len() {
        merged_parents.push(pa[i].clone());
        merged_states.push(ra[i]);
        i += 1;
    }
    while j < rb.len() {
        merged_parents.push(pb[j].clone());
        merged_states.push(rb[j]);
        j += 1;
    }

    combine_common_parents(&mut merged_parents);

    let result = if merged_states.len() == 1 {
        PredictionContext::singleton(merged_parents.into_iter().next().unwrap(), merged_states[0])
    } else if merged_states == ra && same_parents(&merged_parents, pa) {
        a.clone()
    } else if merged_states == rb && same_parents(&merged_parents, pb) {
        b.clone()
    } else {
        PredictionContext::array(merged_parents, merged_states)
    };

    if let Some(cache) = merge_cache {
        cache.lock().unwrap().insert(cache_key(a, b), result.clone());
    }
    result
}

fn same_parents(a: &[Option<Arc<PredictionContext>>], b: &[Option<Arc<PredictionContext>>]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| opt_arc_eq(x, y))
}

/// §4.1.2 `combineCommonParents`: de-duplicate equal parents by identity so
/// structurally-equal parent subgraphs produced by independent merges
/// collapse back onto the same `Arc`.
fn combine_common_parents(parents: &mut [Option<Arc<PredictionContext>>]) {
    let mut uniq: Vec<Arc<PredictionContext>> = Vec::new();
    for slot in parents.iter_mut() {
        if let Some(p) = slot {
            if let Some(existing) = uniq.iter().find(|u| ***u == **p) {
                *p = existing.clone();
            } else {
                uniq.push(p.clone());
            }
        }
    }
}

/// §4.1.3: canonicalizes nodes referenced from DFA states so structurally
/// identical subgraphs reached via independent predictions are shared.
/// Unlike the per-prediction [`MergeCache`], this cache is process-wide and
/// long-lived — it is exactly the object §5 says may be shared across
/// recognizer instances running on separate threads.
pub struct PredictionContextCache {
    interned: Mutex<HashMap<Arc<PredictionContext>, Arc<PredictionContext>>>,
}

impl PredictionContextCache {
    pub fn new() -> Self {
        Self { interned: Mutex::new(HashMap::new()) }
    }

    /// `getCachedPredictionContext`: rebuild `ctx` bottom-up, substituting
    /// the cached equivalent for each parent, and intern the result.
    pub fn get_cached(&self, ctx: &Arc<PredictionContext>) -> Arc<PredictionContext> {
        let mut visited: HashMap<usize, Arc<PredictionContext>> = HashMap::new();
        self.get_cached_inner(ctx, &mut visited)
    }

    fn get_cached_inner(
        &self,
        ctx: &Arc<PredictionContext>,
        visited: &mut HashMap<usize, Arc<PredictionContext>>,
    ) -> Arc<PredictionContext> {
        if ctx.is_empty() {
            return ctx.clone();
        }
        if let Some(hit) = visited.get(&ctx.id) {
            return hit.clone();
        }
        let n = ctx.size();
        let mut changed = false;
        let mut new_parents = Vec::with_capacity(n);
        for i in 0..n {
            match ctx.get_parent(i) {
                None => new_parents.push(None),
                Some(p) => {
                    let cached_parent = self.get_cached_inner(&p, visited);
                    if !Arc::ptr_eq(&cached_parent, &p) {
                        changed = true;
                    }
                    new_parents.push(Some(cached_parent));
                }
            }
        }
        let rebuilt = if changed {
            if n == 1 {
                PredictionContext::singleton(new_parents.into_iter().next().unwrap(), ctx.get_return_state(0))
            } else {
                let states = (0..n).map(|i| ctx.get_return_state(i)).collect();
                PredictionContext::array(new_parents, states)
            }
        } else {
            ctx.clone()
        };

        let interned = {
            let mut map = self.interned.lock().unwrap();
            map.entry(rebuilt.clone()).or_insert_with(|| rebuilt.clone()).clone()
        };
        visited.insert(ctx.id, interned.clone());
        interned
    }
}

impl Default for PredictionContextCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    fn singleton(parent: &Arc<PredictionContext>, rs: i32) -> Arc<PredictionContext> {
        PredictionContext::singleton(Some(parent.clone()), rs)
    }

    #[test]
    fn merge_idempotence() {
        // P1: merge(x, x, *, *) == x
        let a = singleton(&PredictionContext::empty(), 5);
        let merged = merge(&a, &a, true, None);
        assert_eq!(*merged, *a);
        let merged_ll = merge(&a, &a, false, None);
        assert_eq!(*merged_ll, *a);
    }

    #[test]
    fn merge_symmetry() {
        // P2: merge(a,b) == merge(b,a) (structural)
        let p = singleton(&PredictionContext::empty(), 1);
        let a = singleton(&p, 10);
        let b = singleton(&p, 20);
        let ab = merge(&a, &b, true, None);
        let ba = merge(&b, &a, true, None);
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn empty_absorbs_in_wildcard_mode() {
        // P3
        let a = singleton(&PredictionContext::empty(), 7);
        let merged = merge(&PredictionContext::empty(), &a, true, None);
        assert!(merged.is_empty());
    }

    #[test]
    fn array_invariant_sorted_with_empty_last() {
        // P4
        let a = singleton(&PredictionContext::empty(), 5);
        let merged = merge(&PredictionContext::empty(), &a, false, None);
        assert_eq!(merged.size(), 2);
        assert_eq!(merged.get_return_state(0), 5);
        assert_eq!(merged.get_return_state(1), EMPTY_RETURN_STATE);
    }

    #[test]
    fn merge_cache_hits_on_second_call() {
        let cache = new_merge_cache();
        let p = singleton(&PredictionContext::empty(), 1);
        let a = singleton(&p, 10);
        let b = singleton(&p, 20);
        let first = merge(&a, &b, true, Some(&cache));
        let second = merge(&a, &b, true, Some(&cache));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn mismatched_return_states_produce_sorted_array() {
        let parent = PredictionContext::empty();
        let a = singleton(&parent, 20);
        let b = singleton(&parent, 10);
        let merged = merge(&a, &b, true, None);
        assert_eq!(merged.size(), 2);
        assert_eq!(merged.get_return_state(0), 10);
        assert_eq!(merged.get_return_state(1), 20);
    }
}
