use crate::clause_types::*;
use crate::forms::*;

use arcu::atomic::Arcu;
use arcu::epoch_counters::GlobalEpochCounterPool;
use arcu::rcu_ref::RcuRef;
use arcu::Rcu;
use parking_lot::Mutex;

use std::sync::Arc;

/// A persistent vector: clones share structure, so publishing a list
/// with one clause added or removed costs `O(log n)`.
pub type ClauseList = im::Vector<Arc<ClassifiedClause>>;

/// The clause list of a dynamic predicate as it stood when it was
/// read. Later asserts and retracts never show through it.
pub type ClauseSnapshot = RcuRef<ClauseList, ClauseList>;

/// The clauses of a dynamic predicate. Readers take lock-free
/// snapshots; writers serialize on `update` and publish a new list
/// sharing all but the changed path with the old one, so a reader never
/// observes a half-applied change.
pub struct DynamicPredicate {
    clauses: Arcu<ClauseList, GlobalEpochCounterPool>,
    update: Mutex<()>,
}

impl std::fmt::Debug for DynamicPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicPredicate")
            .field("clauses", &self.clauses.read().len())
            .finish()
    }
}

impl Default for DynamicPredicate {
    fn default() -> Self {
        Self::new(vec![])
    }
}

impl DynamicPredicate {
    pub fn new(clauses: Vec<Clause>) -> Self {
        let clauses: ClauseList = clauses
            .into_iter()
            .map(|clause| Arc::new(ClassifiedClause::new(clause)))
            .collect();

        DynamicPredicate {
            clauses: Arcu::new(clauses, GlobalEpochCounterPool),
            update: Mutex::new(()),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> ClauseSnapshot {
        self.clauses.read()
    }

    pub fn len(&self) -> usize {
        self.clauses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn assert(&self, clause: Clause, append_or_prepend: AppendOrPrepend) {
        let clause = Arc::new(ClassifiedClause::new(clause));
        let _guard = self.update.lock();

        let mut clauses = (*self.clauses.read()).clone();

        if append_or_prepend.is_append() {
            clauses.push_back(clause);
        } else {
            clauses.push_front(clause);
        }

        self.clauses.replace(clauses);
    }

    /// Removes `clause` if it is still present. Identity, not
    /// structure, decides: of two equal clauses only the one read from
    /// a snapshot is removed. Returns false if a concurrent retract got
    /// there first.
    pub fn retract(&self, clause: &Arc<ClassifiedClause>) -> bool {
        let _guard = self.update.lock();
        let mut clauses = (*self.clauses.read()).clone();

        let Some(position) = clauses.iter().position(|c| Arc::ptr_eq(c, clause)) else {
            return false;
        };

        clauses.remove(position);
        self.clauses.replace(clauses);

        true
    }

    /// Removes every clause.
    pub fn clear(&self) {
        let _guard = self.update.lock();
        self.clauses.replace(ClauseList::new());
    }
}
