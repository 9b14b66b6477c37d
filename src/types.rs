use crate::atom_table::*;

use derive_more::{Display, From};
use ordered_float::OrderedFloat;

use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;

/// Handle to a binding cell. Inside a clause template the handle is a
/// clause-local variable number; at run time it addresses a cell of
/// the query's [`Heap`](crate::machine::heap::Heap).
#[derive(Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "_{}", _0)]
pub struct VarId(pub(crate) u32);

impl VarId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A Prolog term. Structures are reference counted and immutable;
/// only the binding cells a `Var` points to ever change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Var(VarId),
    Atom(Atom),
    Integer(i64),
    Float(OrderedFloat<f64>),
    Compound(Arc<Compound>),
    List(Arc<Cons>),
    EmptyList,
}

const_assert!(mem::size_of::<Term>() == 16);

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Compound {
    name: Atom,
    args: Box<[Term]>,
    ground: bool,
}

#[derive(Debug)]
pub struct Cons {
    cells: [Term; 2],
    ground: bool,
}

impl Compound {
    #[inline]
    pub fn name(&self) -> Atom {
        self.name
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn args(&self) -> &[Term] {
        &self.args
    }
}

impl Cons {
    #[inline]
    pub fn head(&self) -> &Term {
        &self.cells[0]
    }

    #[inline]
    pub fn tail(&self) -> &Term {
        &self.cells[1]
    }

    #[inline]
    pub fn cells(&self) -> &[Term] {
        &self.cells
    }
}

// list equality and hashing walk the spine in a loop so that long
// lists do not recurse once per cell.
impl PartialEq for Cons {
    fn eq(&self, other: &Cons) -> bool {
        let (mut a, mut b) = (self, other);

        loop {
            if std::ptr::eq(a, b) {
                return true;
            }

            if a.ground != b.ground || a.head() != b.head() {
                return false;
            }

            match (a.tail(), b.tail()) {
                (Term::List(x), Term::List(y)) => {
                    a = x;
                    b = y;
                }
                (x, y) => return x == y,
            }
        }
    }
}

impl Eq for Cons {}

impl Hash for Cons {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut cons = self;

        loop {
            cons.head().hash(state);

            match cons.tail() {
                Term::List(next) => cons = next,
                tail => {
                    tail.hash(state);
                    break;
                }
            }
        }
    }
}

#[inline]
fn is_unique_structure(term: &Term) -> bool {
    match term {
        Term::Compound(c) => Arc::strong_count(c) == 1,
        Term::List(l) => Arc::strong_count(l) == 1,
        _ => false,
    }
}

// long lists and deeply nested structures would otherwise be dropped
// recursively, one host stack frame per level.
fn drop_iteratively(mut stack: Vec<Term>) {
    while let Some(term) = stack.pop() {
        match term {
            Term::Compound(c) => {
                if let Ok(mut c) = Arc::try_unwrap(c) {
                    stack.extend(mem::take(&mut c.args).into_vec());
                }
            }
            Term::List(l) => {
                if let Ok(mut l) = Arc::try_unwrap(l) {
                    let [head, tail] = mem::replace(&mut l.cells, [Term::EmptyList, Term::EmptyList]);
                    stack.push(head);
                    stack.push(tail);
                }
            }
            _ => {}
        }
    }
}

impl Drop for Compound {
    fn drop(&mut self) {
        if self.args.iter().any(is_unique_structure) {
            drop_iteratively(mem::take(&mut self.args).into_vec());
        }
    }
}

impl Drop for Cons {
    fn drop(&mut self) {
        if self.cells.iter().any(is_unique_structure) {
            let [head, tail] = mem::replace(&mut self.cells, [Term::EmptyList, Term::EmptyList]);
            drop_iteratively(vec![head, tail]);
        }
    }
}

impl Term {
    #[inline]
    pub fn atom(name: &str) -> Self {
        Term::from_atom(Atom::intern(name))
    }

    /// Normalizes `[]` to the empty list constant.
    #[inline]
    pub fn from_atom(atom: Atom) -> Self {
        if atom == atom!("[]") {
            Term::EmptyList
        } else {
            Term::Atom(atom)
        }
    }

    #[inline]
    pub fn integer(n: i64) -> Self {
        Term::Integer(n)
    }

    #[inline]
    pub fn float(f: f64) -> Self {
        Term::Float(OrderedFloat(f))
    }

    #[inline]
    pub fn var(index: u32) -> Self {
        Term::Var(VarId(index))
    }

    /// Builds `name(args...)`, collapsing to an atom when there are no
    /// arguments and to a list cell for `'.'/2`.
    pub fn compound(name: &str, args: impl IntoIterator<Item = Term>) -> Self {
        Term::from_parts(Atom::intern(name), args.into_iter().collect())
    }

    pub fn from_parts(name: Atom, args: Vec<Term>) -> Self {
        match args.len() {
            0 => Term::from_atom(name),
            2 if name == atom!(".") => {
                let mut args = args.into_iter();
                match (args.next(), args.next()) {
                    (Some(head), Some(tail)) => Term::cons(head, tail),
                    _ => unreachable!(),
                }
            }
            _ => {
                let ground = args.iter().all(Term::is_ground);

                Term::Compound(Arc::new(Compound {
                    name,
                    args: args.into_boxed_slice(),
                    ground,
                }))
            }
        }
    }

    #[inline]
    pub fn cons(head: Term, tail: Term) -> Self {
        let ground = head.is_ground() && tail.is_ground();
        Term::List(Arc::new(Cons { cells: [head, tail], ground }))
    }

    pub fn list(items: impl IntoIterator<Item = Term>) -> Self {
        Term::list_with_tail(items, Term::EmptyList)
    }

    pub fn list_with_tail(items: impl IntoIterator<Item = Term>, tail: Term) -> Self {
        let items: Vec<Term> = items.into_iter().collect();

        items
            .into_iter()
            .rev()
            .fold(tail, |tail, head| Term::cons(head, tail))
    }

    /// The cached immutability flag: true iff no variable occurs in the
    /// term. It does not consult bindings.
    #[inline(always)]
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Compound(c) => c.ground,
            Term::List(l) => l.ground,
            _ => true,
        }
    }

    #[inline]
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    #[inline]
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Term::Atom(_) | Term::Compound(_) | Term::List(_) | Term::EmptyList
        )
    }

    #[inline]
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Term::Atom(_) | Term::Integer(_) | Term::Float(_) | Term::EmptyList
        )
    }

    /// Name and arity of a callable term.
    pub fn name_and_arity(&self) -> Option<(Atom, usize)> {
        match self {
            Term::Atom(atom) => Some((*atom, 0)),
            Term::EmptyList => Some((atom!("[]"), 0)),
            Term::Compound(c) => Some((c.name, c.args.len())),
            Term::List(_) => Some((atom!("."), 2)),
            _ => None,
        }
    }

    /// Arguments of a compound or list cell; empty for anything else.
    #[inline]
    pub fn args(&self) -> &[Term] {
        match self {
            Term::Compound(c) => c.args(),
            Term::List(l) => l.cells(),
            _ => &[],
        }
    }

    /// Whether `self` is `name(_, ...)` with exactly `arity` arguments.
    #[inline]
    pub fn is_functor(&self, name: Atom, arity: usize) -> bool {
        match self {
            Term::Compound(c) => c.name == name && c.args.len() == arity,
            Term::List(_) => name == atom!(".") && arity == 2,
            Term::Atom(a) => *a == name && arity == 0,
            Term::EmptyList => name == atom!("[]") && arity == 0,
            _ => false,
        }
    }

    /// Rebuilds a structure of the same shape around new arguments.
    pub(crate) fn with_args(&self, args: Vec<Term>) -> Term {
        match self {
            Term::Compound(c) => Term::from_parts(c.name, args),
            Term::List(_) => {
                let mut args = args.into_iter();
                match (args.next(), args.next()) {
                    (Some(head), Some(tail)) => Term::cons(head, tail),
                    _ => unreachable!(),
                }
            }
            _ => self.clone(),
        }
    }

    /// Iterates the elements of a list up to the first non-list tail.
    pub fn list_iter(&self) -> ListIter<'_> {
        ListIter { current: self }
    }
}

pub struct ListIter<'a> {
    current: &'a Term,
}

impl<'a> ListIter<'a> {
    /// The tail remaining once iteration stops.
    pub fn rest(&self) -> &'a Term {
        self.current
    }
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Term;

    fn next(&mut self) -> Option<&'a Term> {
        match self.current {
            Term::List(l) => {
                self.current = l.tail();
                Some(l.head())
            }
            _ => None,
        }
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Integer(n)
    }
}

impl From<f64> for Term {
    fn from(f: f64) -> Self {
        Term::float(f)
    }
}

impl From<Atom> for Term {
    fn from(atom: Atom) -> Self {
        Term::from_atom(atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_flag_is_cached_bottom_up() {
        let ground = Term::compound("f", [Term::atom("a"), Term::list([Term::integer(1)])]);
        let open = Term::compound("f", [Term::atom("a"), Term::list([Term::var(0)])]);

        assert!(ground.is_ground());
        assert!(!open.is_ground());
        assert!(!Term::var(3).is_ground());
        assert!(Term::EmptyList.is_ground());
    }

    #[test]
    fn empty_argument_compounds_collapse() {
        assert_eq!(Term::compound("foo", []), Term::atom("foo"));
        assert_eq!(Term::atom("[]"), Term::EmptyList);
        assert_eq!(
            Term::compound(".", [Term::integer(1), Term::EmptyList]),
            Term::list([Term::integer(1)])
        );
    }

    #[test]
    fn integers_and_floats_are_distinct() {
        assert_ne!(Term::integer(1), Term::float(1.0));
    }

    #[test]
    fn list_iteration_stops_at_tail() {
        let list = Term::list_with_tail([Term::integer(1), Term::integer(2)], Term::var(0));
        let mut iter = list.list_iter();

        assert_eq!(iter.next(), Some(&Term::integer(1)));
        assert_eq!(iter.next(), Some(&Term::integer(2)));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.rest(), &Term::var(0));
    }

    #[test]
    fn long_lists_drop_without_recursion() {
        let list = Term::list((0..500_000).map(Term::integer));
        drop(list);

        let mut nested = Term::atom("zero");

        for _ in 0..500_000 {
            nested = Term::compound("s", [nested]);
        }

        drop(nested);
    }

    #[test]
    fn long_lists_compare_and_hash_without_recursion() {
        use std::collections::hash_map::DefaultHasher;

        let a = Term::list((0..300_000).map(Term::integer));
        let b = Term::list((0..300_000).map(Term::integer));

        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);

        assert_eq!(ha.finish(), hb.finish());
    }
}
