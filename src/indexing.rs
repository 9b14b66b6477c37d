use crate::clause_types::*;
use crate::machine::heap::*;
use crate::types::*;

use fxhash::FxHashMap;
use lru::LruCache;
use parking_lot::Mutex;
use smallvec::SmallVec;

use std::num::NonZeroUsize;
use std::sync::Arc;

/// Only the leading arguments are considered for indexing.
pub(crate) const MAX_INDEXABLE_ARGS: usize = 9;
/// At most this many positions make up one key.
pub(crate) const MAX_KEY_ARGS: usize = 3;

pub(crate) type IndexKey = SmallVec<[Term; MAX_KEY_ARGS]>;

type KeyValues = SmallVec<[Option<Term>; MAX_KEY_ARGS]>;

/// One index over a fixed set of argument positions.
#[derive(Debug)]
pub struct ClauseIndex {
    positions: SmallVec<[usize; MAX_KEY_ARGS]>,
    buckets: FxHashMap<IndexKey, Arc<[usize]>>,
    // clauses with a wildcard at some key position, in order. a key no
    // clause mentions in full can only select among these.
    open: Vec<(usize, KeyValues)>,
}

fn compatible(values: &[Option<Term>], key: &[Term]) -> bool {
    values.iter().zip(key).all(|(value, key)| match value {
        None => true,
        Some(value) => value == key,
    })
}

impl ClauseIndex {
    pub fn lookup(&self, key: &IndexKey) -> Arc<[usize]> {
        match self.buckets.get(key) {
            Some(clauses) => clauses.clone(),
            None => self
                .open
                .iter()
                .filter(|(_, values)| compatible(values, key))
                .map(|(clause, _)| *clause)
                .collect(),
        }
    }

    #[inline]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }
}

/// Head values of one clause at the eligible positions; `None` marks
/// a wildcard.
type HeadKeys = SmallVec<[Option<Term>; MAX_INDEXABLE_ARGS]>;

/// The indexing state of a compiled predicate: which argument
/// positions can be indexed at all, and a bounded cache of the indexes
/// built so far, keyed by the mask of positions they cover.
#[derive(Debug)]
pub struct ClauseIndexer {
    eligible: SmallVec<[usize; MAX_INDEXABLE_ARGS]>,
    head_keys: Vec<HeadKeys>,
    all: Arc<[usize]>,
    cache: Mutex<LruCache<u16, Arc<ClauseIndex>>>,
}

impl ClauseIndexer {
    pub fn new(clauses: &[ClassifiedClause], cache_capacity: NonZeroUsize) -> Self {
        let arity = clauses
            .first()
            .map(|clause| clause.clause().head().args().len())
            .unwrap_or(0);

        let occurrences: Vec<Vec<u32>> = clauses
            .iter()
            .map(|clause| clause.clause().var_occurrences())
            .collect();

        let head_key = |clause: &ClassifiedClause, counts: &[u32], pos: usize| {
            match &clause.clause().head().args()[pos] {
                Term::Var(var) if counts.get(var.index()) == Some(&1) => Some(None),
                arg if arg.is_ground() => Some(Some(arg.clone())),
                _ => None,
            }
        };

        let eligible: SmallVec<[usize; MAX_INDEXABLE_ARGS]> = (0..arity.min(MAX_INDEXABLE_ARGS))
            .filter(|&pos| {
                clauses
                    .iter()
                    .zip(&occurrences)
                    .all(|(clause, counts)| head_key(clause, counts, pos).is_some())
            })
            .collect();

        let head_keys = clauses
            .iter()
            .zip(&occurrences)
            .map(|(clause, counts)| {
                eligible
                    .iter()
                    .map(|&pos| head_key(clause, counts, pos).flatten())
                    .collect()
            })
            .collect();

        ClauseIndexer {
            eligible,
            head_keys,
            all: (0..clauses.len()).collect(),
            cache: Mutex::new(LruCache::new(cache_capacity)),
        }
    }

    #[inline]
    pub fn eligible_positions(&self) -> &[usize] {
        &self.eligible
    }

    /// Every clause, in order.
    #[inline]
    pub fn all(&self) -> Arc<[usize]> {
        self.all.clone()
    }

    /// The ordered clauses that can match a call with these arguments.
    pub fn candidates(&self, heap: &Heap, args: &[Term]) -> Arc<[usize]> {
        let mut mask = 0u16;
        let mut key = IndexKey::new();

        for (bit, &pos) in self.eligible.iter().enumerate() {
            if key.len() == MAX_KEY_ARGS {
                break;
            }

            if let Some(arg) = args.get(pos) {
                if heap.is_ground(arg) {
                    mask |= 1 << bit;
                    key.push(heap.resolve(arg));
                }
            }
        }

        if mask == 0 {
            return self.all.clone();
        }

        self.index_for(mask).lookup(&key)
    }

    fn index_for(&self, mask: u16) -> Arc<ClauseIndex> {
        if let Some(index) = self.cache.lock().get(&mask) {
            return index.clone();
        }

        let index = Arc::new(self.build_index(mask));
        self.cache.lock().put(mask, index.clone());

        index
    }

    /// Groups the clauses by their head values at the positions in
    /// `mask`. Clauses with a wildcard join every group they are
    /// compatible with, keeping the original order.
    pub fn build_index(&self, mask: u16) -> ClauseIndex {
        let bits: SmallVec<[usize; MAX_KEY_ARGS]> = (0..self.eligible.len())
            .filter(|bit| mask & (1 << bit) != 0)
            .collect();

        let values: Vec<KeyValues> = self
            .head_keys
            .iter()
            .map(|keys| bits.iter().map(|&bit| keys[bit].clone()).collect())
            .collect();

        let mut buckets: FxHashMap<IndexKey, Vec<usize>> = FxHashMap::default();

        for clause_values in &values {
            let key: Option<IndexKey> = clause_values.iter().cloned().collect();

            if let Some(key) = key {
                buckets.entry(key).or_default();
            }
        }

        let mut open = vec![];

        for (clause, clause_values) in values.into_iter().enumerate() {
            for (key, clauses) in buckets.iter_mut() {
                if compatible(&clause_values, key) {
                    clauses.push(clause);
                }
            }

            if clause_values.iter().any(Option::is_none) {
                open.push((clause, clause_values));
            }
        }

        let positions: SmallVec<[usize; MAX_KEY_ARGS]> =
            bits.iter().map(|&bit| self.eligible[bit]).collect();

        tracing::debug!(
            positions = ?positions,
            buckets = buckets.len(),
            "built clause index"
        );

        ClauseIndex {
            positions,
            buckets: buckets
                .into_iter()
                .map(|(key, clauses)| (key, clauses.into()))
                .collect(),
            open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::copier::VarMap;
    use crate::parser::{read_clause, read_term};

    use proptest::prelude::*;

    fn indexer(program: &[&str]) -> (Vec<ClassifiedClause>, ClauseIndexer) {
        let clauses: Vec<_> = program
            .iter()
            .map(|text| ClassifiedClause::new(read_clause(text).unwrap()))
            .collect();

        let indexer = ClauseIndexer::new(&clauses, NonZeroUsize::new(4).unwrap());
        (clauses, indexer)
    }

    fn candidates(indexer: &ClauseIndexer, call: &str) -> Vec<usize> {
        let query = read_term(call).unwrap();
        let mut heap = Heap::new();
        let call = heap.instantiate(&query.term, &mut VarMap::new(query.var_count));

        indexer.candidates(&heap, call.args()).to_vec()
    }

    #[test]
    fn eligibility() {
        let (_, indexer) = indexer(&["p(a, X, f(Y)) :- q(Y).", "p(_, b, c).", "p(Z, c, Z)."]);

        // position 0 has the repeated `Z`, position 2 the open `f(Y)`.
        assert_eq!(indexer.eligible_positions(), &[1]);
    }

    #[test]
    fn wildcards_join_every_bucket_in_order() {
        let (_, indexer) = indexer(&["e(a, b).", "e(_, c).", "e(b, c).", "e(a, d)."]);

        assert_eq!(candidates(&indexer, "e(a, Y)."), vec![0, 1, 3]);
        assert_eq!(candidates(&indexer, "e(b, Y)."), vec![1, 2]);
        assert_eq!(candidates(&indexer, "e(z, Y)."), vec![1]);
        assert_eq!(candidates(&indexer, "e(X, c)."), vec![1, 2]);
        assert_eq!(candidates(&indexer, "e(X, Y)."), vec![0, 1, 2, 3]);
        assert_eq!(candidates(&indexer, "e(a, c)."), vec![1]);
    }

    #[test]
    fn missing_key_without_wildcards_is_empty() {
        let (_, indexer) = indexer(&["n(1).", "n(2)."]);
        assert!(candidates(&indexer, "n(3).").is_empty());
    }

    #[test]
    fn eviction_only_costs_a_rebuild() {
        let (_, indexer) = indexer(&["t(a, b, c).", "t(a, c, b).", "t(b, b, b)."]);
        let cache_capacity = NonZeroUsize::new(1).unwrap();
        let indexer = ClauseIndexer {
            cache: Mutex::new(LruCache::new(cache_capacity)),
            ..indexer
        };

        for _ in 0..3 {
            assert_eq!(candidates(&indexer, "t(a, X, Y)."), vec![0, 1]);
            assert_eq!(candidates(&indexer, "t(X, b, Y)."), vec![0, 2]);
            assert_eq!(candidates(&indexer, "t(X, Y, b)."), vec![1, 2]);
        }
    }

    fn head_arg() -> impl Strategy<Value = &'static str> {
        prop::sample::select(&["a", "b", "c", "_", "f(a)"][..])
    }

    fn call_arg() -> impl Strategy<Value = &'static str> {
        prop::sample::select(&["a", "b", "c", "d", "_", "f(a)", "f(_)"][..])
    }

    proptest! {
        #[test]
        fn indexed_lookup_matches_full_scan(
            heads in prop::collection::vec(prop::collection::vec(head_arg(), 3), 1..8),
            call in prop::collection::vec(call_arg(), 3),
        ) {
            let program: Vec<String> = heads.iter().map(|args| format!("p({}).", args.join(", "))).collect();
            let program: Vec<&str> = program.iter().map(String::as_str).collect();
            let (clauses, indexer) = indexer(&program);

            let query = read_term(&format!("p({}).", call.join(", "))).unwrap();
            let mut heap = Heap::new();
            let call = heap.instantiate(&query.term, &mut VarMap::new(query.var_count));

            let indexed = indexer.candidates(&heap, call.args());

            let mut matching = |candidates: &[usize]| -> Vec<usize> {
                candidates
                    .iter()
                    .copied()
                    .filter(|&i| {
                        let mark = heap.mark();
                        let matched = clauses[i].try_match(&mut heap, call.args()) != Match::Fail;
                        heap.undo_to(mark);
                        matched
                    })
                    .collect()
            };

            let full_scan: Vec<usize> = (0..clauses.len()).collect();
            let expected = matching(&full_scan);
            prop_assert_eq!(matching(&indexed), expected);
        }
    }
}
