use crate::machine::heap::*;
use crate::types::*;

use fxhash::FxHashSet;
use smallvec::SmallVec;

use std::sync::Arc;

// past this many steps, pairs of structure nodes are remembered so
// that cyclic bindings terminate.
const CYCLE_CHECK_THRESHOLD: usize = 64;

type Pdl = SmallVec<[(Term, Term); 16]>;

impl Heap {
    /// Structural unification through the current bindings.
    ///
    /// Bindings made before a failure are left in place; callers undo
    /// to their own mark.
    pub fn unify(&mut self, a: &Term, b: &Term) -> bool {
        let mut pdl: Pdl = SmallVec::new();
        let mut visited: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut steps = 0;

        pdl.push((a.clone(), b.clone()));

        while let Some((t1, t2)) = pdl.pop() {
            let d1 = self.deref(&t1).clone();
            let d2 = self.deref(&t2).clone();

            steps += 1;

            match (&d1, &d2) {
                (Term::Var(v1), Term::Var(v2)) => {
                    if v1 == v2 {
                        continue;
                    } else if v1 > v2 {
                        self.bind(*v1, d2);
                    } else {
                        self.bind(*v2, d1);
                    }
                }
                (Term::Var(v), _) => self.bind(*v, d2),
                (_, Term::Var(v)) => self.bind(*v, d1),
                (Term::Compound(c1), Term::Compound(c2)) => {
                    if Arc::ptr_eq(c1, c2) {
                        continue;
                    }

                    if c1.name() != c2.name() || c1.arity() != c2.arity() {
                        return false;
                    }

                    if d1.is_ground() && d2.is_ground() {
                        if c1 != c2 {
                            return false;
                        }

                        continue;
                    }

                    if steps > CYCLE_CHECK_THRESHOLD {
                        let key = (Arc::as_ptr(c1) as usize, Arc::as_ptr(c2) as usize);

                        if !visited.insert(key) {
                            continue;
                        }
                    }

                    for (a1, a2) in c1.args().iter().zip(c2.args()).rev() {
                        pdl.push((a1.clone(), a2.clone()));
                    }
                }
                (Term::List(l1), Term::List(l2)) => {
                    if Arc::ptr_eq(l1, l2) {
                        continue;
                    }

                    if d1.is_ground() && d2.is_ground() {
                        if l1 != l2 {
                            return false;
                        }

                        continue;
                    }

                    if steps > CYCLE_CHECK_THRESHOLD {
                        let key = (Arc::as_ptr(l1) as usize, Arc::as_ptr(l2) as usize);

                        if !visited.insert(key) {
                            continue;
                        }
                    }

                    pdl.push((l1.tail().clone(), l2.tail().clone()));
                    pdl.push((l1.head().clone(), l2.head().clone()));
                }
                _ => {
                    if d1 != d2 {
                        return false;
                    }
                }
            }
        }

        true
    }
}
