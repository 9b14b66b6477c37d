use crate::types::*;

/// The binding cells of one query together with its trail.
///
/// Every binding is trailed unconditionally, so `undo_to` restores the
/// cells exactly as they were when the mark was taken. Cells allocated
/// after a mark are released by `undo_to`; terms built after a mark
/// must not outlive a backtrack to it.
#[derive(Debug, Default)]
pub struct Heap {
    cells: Vec<Option<Term>>,
    trail: Vec<VarId>,
}

/// A backtracking point: the trail height and the number of allocated
/// cells at the moment the mark was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    trail: usize,
    cells: usize,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            cells: Vec::with_capacity(256),
            trail: Vec::with_capacity(256),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    #[inline]
    pub fn fresh_var(&mut self) -> Term {
        let var = VarId(self.cells.len() as u32);
        self.cells.push(None);
        Term::Var(var)
    }

    #[inline]
    pub fn mark(&self) -> Mark {
        Mark {
            trail: self.trail.len(),
            cells: self.cells.len(),
        }
    }

    /// Undoes every binding made since `mark` in reverse order. Undoing
    /// to a mark at or above the current height does nothing.
    pub fn undo_to(&mut self, mark: Mark) {
        while self.trail.len() > mark.trail {
            if let Some(var) = self.trail.pop() {
                self.cells[var.index()] = None;
            }
        }

        if self.cells.len() > mark.cells {
            self.cells.truncate(mark.cells);
        }
    }

    #[inline]
    pub fn bind(&mut self, var: VarId, value: Term) {
        debug_assert!(self.cells[var.index()].is_none());
        debug_assert!(!matches!(value, Term::Var(v) if v >= var));

        self.cells[var.index()] = Some(value);
        self.trail.push(var);
    }

    #[inline]
    pub fn is_bound(&self, var: VarId) -> bool {
        matches!(self.cells.get(var.index()), Some(Some(_)))
    }

    /// Follows variable bindings until an unbound variable or a
    /// non-variable term. Variable to variable bindings always point
    /// at an older cell, so this terminates.
    #[inline]
    pub fn deref<'a>(&'a self, mut term: &'a Term) -> &'a Term {
        while let Term::Var(var) = term {
            match &self.cells[var.index()] {
                Some(value) => term = value,
                None => break,
            }
        }

        term
    }

    /// Whether no unbound variable is reachable from `term`.
    pub fn is_ground(&self, term: &Term) -> bool {
        let mut stack = vec![term];

        while let Some(term) = stack.pop() {
            let term = self.deref(term);

            match term {
                Term::Var(_) => return false,
                Term::Compound(_) | Term::List(_) if !term.is_ground() => {
                    stack.extend(term.args().iter());
                }
                _ => {}
            }
        }

        true
    }

    /// Substitutes all bindings into `term`. Unbound variables are left
    /// in place and ground subterms are shared.
    pub fn resolve(&self, term: &Term) -> Term {
        let term = self.deref(term);

        if term.is_ground() {
            return term.clone();
        }

        match term {
            Term::Compound(c) => {
                let args = c.args().iter().map(|arg| self.resolve(arg)).collect();
                Term::from_parts(c.name(), args)
            }
            Term::List(_) => {
                let mut heads = vec![];
                let mut current = term;

                while let Term::List(cons) = current {
                    if current.is_ground() {
                        break;
                    }

                    heads.push(self.resolve(cons.head()));
                    current = self.deref(cons.tail());
                }

                let tail = if current.is_ground() {
                    current.clone()
                } else {
                    self.resolve(current)
                };

                Term::list_with_tail(heads, tail)
            }
            _ => term.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_undo() {
        let mut heap = Heap::new();

        let x = heap.fresh_var();
        let mark = heap.mark();
        let y = heap.fresh_var();

        let (Term::Var(xv), Term::Var(yv)) = (&x, &y) else {
            unreachable!()
        };

        heap.bind(*yv, x.clone());
        heap.bind(*xv, Term::atom("a"));

        assert_eq!(heap.deref(&y), &Term::atom("a"));

        heap.undo_to(mark);

        assert_eq!(heap.deref(&x), &x);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.trail_len(), 0);

        // idempotent
        heap.undo_to(mark);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn resolve_substitutes_through_lists() {
        let mut heap = Heap::new();

        let x = heap.fresh_var();
        let t = heap.fresh_var();
        let list = Term::list_with_tail([Term::integer(1), x.clone()], t.clone());

        let Term::Var(xv) = x else { unreachable!() };
        let Term::Var(tv) = t else { unreachable!() };

        heap.bind(xv, Term::integer(2));
        heap.bind(tv, Term::list([Term::integer(3)]));

        assert_eq!(
            heap.resolve(&list),
            Term::list([Term::integer(1), Term::integer(2), Term::integer(3)])
        );
        assert!(heap.is_ground(&list));
    }

    #[test]
    fn partial_terms_are_not_ground() {
        let mut heap = Heap::new();
        let x = heap.fresh_var();
        let term = Term::compound("f", [Term::atom("a"), x.clone()]);

        assert!(!heap.is_ground(&term));
        assert_eq!(heap.resolve(&term), term);
    }
}
