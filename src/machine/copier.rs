use crate::machine::heap::*;
use crate::types::*;

use fxhash::FxHashMap;
use smallvec::SmallVec;

/// Clause-local variable slots for one activation. A slot is filled
/// either by a call argument substituted for a head variable or by a
/// fresh heap variable on first use.
#[derive(Debug, Default, Clone)]
pub struct VarMap {
    slots: SmallVec<[Option<Term>; 8]>,
}

impl VarMap {
    pub fn new(var_count: usize) -> Self {
        let mut slots = SmallVec::with_capacity(var_count);
        slots.resize(var_count, None);
        VarMap { slots }
    }

    #[inline]
    pub fn get(&self, var: VarId) -> Option<&Term> {
        self.slots.get(var.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn set(&mut self, var: VarId, value: Term) {
        if var.index() >= self.slots.len() {
            self.slots.resize(var.index() + 1, None);
        }

        self.slots[var.index()] = Some(value);
    }

    fn get_or_fresh(&mut self, var: VarId, heap: &mut Heap) -> Term {
        match self.get(var) {
            Some(value) => value.clone(),
            None => {
                let value = heap.fresh_var();
                self.set(var, value.clone());
                value
            }
        }
    }
}

impl Heap {
    /// Copies a clause template into the heap, mapping its clause-local
    /// variables through `env`. Ground subterms are shared.
    pub fn instantiate(&mut self, template: &Term, env: &mut VarMap) -> Term {
        if template.is_ground() {
            return template.clone();
        }

        match template {
            Term::Var(var) => env.get_or_fresh(*var, self),
            Term::Compound(c) => {
                let args = c.args().iter().map(|arg| self.instantiate(arg, env)).collect();
                Term::from_parts(c.name(), args)
            }
            Term::List(_) => {
                let mut heads = vec![];
                let mut current = template;

                while let Term::List(cons) = current {
                    if current.is_ground() {
                        break;
                    }

                    heads.push(self.instantiate(cons.head(), env));
                    current = cons.tail();
                }

                let tail = self.instantiate(current, env);
                Term::list_with_tail(heads, tail)
            }
            _ => template.clone(),
        }
    }

    /// `copy_term/2`: a copy of `term` under the current bindings in
    /// which every distinct unbound variable is replaced by exactly one
    /// fresh variable.
    pub fn copy_term(&mut self, term: &Term, map: &mut FxHashMap<VarId, Term>) -> Term {
        let term = self.deref(term).clone();

        if term.is_ground() {
            return term;
        }

        match &term {
            Term::Var(var) => {
                if let Some(copy) = map.get(var) {
                    return copy.clone();
                }

                let copy = self.fresh_var();
                map.insert(*var, copy.clone());
                copy
            }
            Term::Compound(c) => {
                let args = c.args().iter().map(|arg| self.copy_term(arg, map)).collect();
                Term::from_parts(c.name(), args)
            }
            Term::List(_) => {
                let mut heads = vec![];
                let mut current = term.clone();

                while let Term::List(cons) = &current {
                    if current.is_ground() {
                        break;
                    }

                    heads.push(self.copy_term(cons.head(), map));
                    current = self.deref(cons.tail()).clone();
                }

                let tail = self.copy_term(&current, map);
                Term::list_with_tail(heads, tail)
            }
            _ => term.clone(),
        }
    }
}

/// Produces binding-free copies of heap terms whose unbound variables
/// are renumbered `0..n` in order of first occurrence. Detached terms
/// outlive the query they came from: they are the form in which
/// answers, tabled calls and asserted clauses are kept.
#[derive(Debug, Default)]
pub struct Detacher {
    map: FxHashMap<VarId, VarId>,
}

impl Detacher {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn var_count(&self) -> usize {
        self.map.len()
    }

    /// The local numbering assigned so far, keyed by heap variable.
    pub fn mapping(&self) -> &FxHashMap<VarId, VarId> {
        &self.map
    }

    pub fn detach(&mut self, heap: &Heap, term: &Term) -> Term {
        let term = heap.deref(term);

        if term.is_ground() {
            return term.clone();
        }

        match term {
            Term::Var(var) => {
                let next = VarId(self.map.len() as u32);
                Term::Var(*self.map.entry(*var).or_insert(next))
            }
            Term::Compound(c) => {
                let args = c.args().iter().map(|arg| self.detach(heap, arg)).collect();
                Term::from_parts(c.name(), args)
            }
            Term::List(_) => {
                let mut heads = vec![];
                let mut current = term;

                while let Term::List(cons) = current {
                    if current.is_ground() {
                        break;
                    }

                    heads.push(self.detach(heap, cons.head()));
                    current = heap.deref(cons.tail());
                }

                let tail = self.detach(heap, current);
                Term::list_with_tail(heads, tail)
            }
            _ => term.clone(),
        }
    }
}

/// Detaches a single term, returning it with its variable count.
pub fn detach(heap: &Heap, term: &Term) -> (Term, usize) {
    let mut detacher = Detacher::new();
    let term = detacher.detach(heap, term);
    (term, detacher.var_count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_shares_ground_subterms() {
        let mut heap = Heap::new();
        let ground = Term::compound("g", [Term::atom("a")]);
        let template = Term::compound("f", [ground.clone(), Term::var(0), Term::var(0)]);

        let mut env = VarMap::new(1);
        let copy = heap.instantiate(&template, &mut env);

        match (&copy, &ground) {
            (Term::Compound(c), Term::Compound(g)) => {
                assert!(matches!(&c.args()[0], Term::Compound(a) if std::sync::Arc::ptr_eq(a, g)));
                assert_eq!(c.args()[1], c.args()[2]);
                assert!(c.args()[1].is_var());
            }
            _ => unreachable!(),
        }

        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn instantiate_uses_substituted_slots() {
        let mut heap = Heap::new();
        let template = Term::compound("p", [Term::var(0), Term::var(1)]);

        let mut env = VarMap::new(2);
        env.set(VarId(0), Term::atom("x"));

        let copy = heap.instantiate(&template, &mut env);

        assert_eq!(copy.args()[0], Term::atom("x"));
        assert!(copy.args()[1].is_var());
    }

    #[test]
    fn copy_term_renames_each_variable_once() {
        let mut heap = Heap::new();
        let x = heap.fresh_var();
        let y = heap.fresh_var();

        let term = Term::compound("f", [x.clone(), y.clone(), x.clone()]);
        let copy = heap.copy_term(&term, &mut FxHashMap::default());

        let args = copy.args();
        assert_eq!(args[0], args[2]);
        assert_ne!(args[0], args[1]);
        assert_ne!(args[0], x);
        assert_eq!(heap.len(), 4);
    }

    #[test]
    fn detached_variants_are_equal() {
        let mut heap = Heap::new();
        let a = heap.fresh_var();
        let b = heap.fresh_var();

        let t1 = Term::compound("path", [a.clone(), b.clone(), a.clone()]);
        let t2 = Term::compound("path", [b.clone(), a.clone(), b.clone()]);

        let (d1, n1) = detach(&heap, &t1);
        let (d2, n2) = detach(&heap, &t2);

        assert_eq!(d1, d2);
        assert_eq!((n1, n2), (2, 2));
        assert_eq!(d1, Term::compound("path", [Term::var(0), Term::var(1), Term::var(0)]));
    }
}
