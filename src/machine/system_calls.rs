use crate::atom_table::*;
use crate::clause_types::*;
use crate::forms::*;
use crate::machine::arithmetic_ops::*;
use crate::machine::copier::*;
use crate::machine::dispatch::*;
use crate::machine::dynamic_database::*;
use crate::machine::heap::*;
use crate::machine::machine_errors::*;
use crate::machine::machine_indices::*;
use crate::machine::machine_state::*;
use crate::machine::Goal;
use crate::types::*;

use fxhash::FxHashMap;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A built-in that succeeds at most once. It receives the call's
/// arguments, unresolved.
pub type DeterministicFn =
    dyn Fn(&mut MachineState, &[Term]) -> Result<bool, EngineError> + Send + Sync;

/// Builds the live goal of a built-in that may succeed more than once.
pub type GoalFactory =
    dyn Fn(&mut MachineState, &[Term]) -> Result<Box<dyn Goal>, EngineError> + Send + Sync;

#[derive(Clone)]
pub enum Builtin {
    Deterministic(Arc<DeterministicFn>),
    Nondeterministic(Arc<GoalFactory>),
}

impl Builtin {
    pub fn deterministic(
        f: impl Fn(&mut MachineState, &[Term]) -> Result<bool, EngineError> + Send + Sync + 'static,
    ) -> Self {
        Builtin::Deterministic(Arc::new(f))
    }

    pub fn nondeterministic(
        f: impl Fn(&mut MachineState, &[Term]) -> Result<Box<dyn Goal>, EngineError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Builtin::Nondeterministic(Arc::new(f))
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Builtin::Deterministic(_) => f.write_str("Builtin::Deterministic"),
            Builtin::Nondeterministic(_) => f.write_str("Builtin::Nondeterministic"),
        }
    }
}

type SystemFn = fn(&mut MachineState, &[Term]) -> Result<bool, EngineError>;
type SystemFactory = fn(&mut MachineState, &[Term]) -> Result<Box<dyn Goal>, EngineError>;

fn det(name: &str, arity: usize, f: SystemFn) -> (PredicateKey, Builtin) {
    ((atom!(name), arity), Builtin::Deterministic(Arc::new(f)))
}

fn nondet(name: &str, arity: usize, f: SystemFactory) -> (PredicateKey, Builtin) {
    ((atom!(name), arity), Builtin::Nondeterministic(Arc::new(f)))
}

/// The built-in predicates every machine starts with.
pub(crate) fn system_builtins() -> Vec<(PredicateKey, Builtin)> {
    vec![
        // solutions
        det("findall", 3, findall),
        det("forall", 2, forall),
        nondet("between", 3, between),
        nondet("repeat", 0, repeat),
        // unification and comparison
        det("=", 2, |machine_st, args| Ok(machine_st.unify(&args[0], &args[1]))),
        det("\\=", 2, not_unifiable),
        det("==", 2, |machine_st, args| order(machine_st, args, |o| o == Ordering::Equal)),
        det("\\==", 2, |machine_st, args| order(machine_st, args, |o| o != Ordering::Equal)),
        det("@<", 2, |machine_st, args| order(machine_st, args, |o| o == Ordering::Less)),
        det("@>", 2, |machine_st, args| order(machine_st, args, |o| o == Ordering::Greater)),
        det("@=<", 2, |machine_st, args| order(machine_st, args, |o| o != Ordering::Greater)),
        det("@>=", 2, |machine_st, args| order(machine_st, args, |o| o != Ordering::Less)),
        det("compare", 3, compare_order),
        // type checks
        det("var", 1, |machine_st, args| Ok(machine_st.heap.deref(&args[0]).is_var())),
        det("nonvar", 1, |machine_st, args| Ok(!machine_st.heap.deref(&args[0]).is_var())),
        det("atom", 1, |machine_st, args| {
            Ok(matches!(machine_st.heap.deref(&args[0]), Term::Atom(_) | Term::EmptyList))
        }),
        det("number", 1, |machine_st, args| {
            Ok(matches!(machine_st.heap.deref(&args[0]), Term::Integer(_) | Term::Float(_)))
        }),
        det("integer", 1, |machine_st, args| {
            Ok(matches!(machine_st.heap.deref(&args[0]), Term::Integer(_)))
        }),
        det("float", 1, |machine_st, args| {
            Ok(matches!(machine_st.heap.deref(&args[0]), Term::Float(_)))
        }),
        det("atomic", 1, |machine_st, args| Ok(machine_st.heap.deref(&args[0]).is_atomic())),
        det("compound", 1, |machine_st, args| {
            Ok(matches!(machine_st.heap.deref(&args[0]), Term::Compound(_) | Term::List(_)))
        }),
        det("callable", 1, |machine_st, args| Ok(machine_st.heap.deref(&args[0]).is_callable())),
        det("is_list", 1, |machine_st, args| {
            let (_, tail) = list_items(&machine_st.heap, &args[0]);
            Ok(tail == Term::EmptyList)
        }),
        det("ground", 1, |machine_st, args| Ok(machine_st.heap.is_ground(&args[0]))),
        // arithmetic
        det("is", 2, |machine_st, args| {
            let value = eval(&machine_st.heap, &args[1])?.to_term();
            Ok(machine_st.unify(&args[0], &value))
        }),
        det("=:=", 2, |machine_st, args| arith_compare(machine_st, args, |o| o == Ordering::Equal)),
        det("=\\=", 2, |machine_st, args| arith_compare(machine_st, args, |o| o != Ordering::Equal)),
        det("<", 2, |machine_st, args| arith_compare(machine_st, args, |o| o == Ordering::Less)),
        det(">", 2, |machine_st, args| arith_compare(machine_st, args, |o| o == Ordering::Greater)),
        det("=<", 2, |machine_st, args| arith_compare(machine_st, args, |o| o != Ordering::Greater)),
        det(">=", 2, |machine_st, args| arith_compare(machine_st, args, |o| o != Ordering::Less)),
        // database
        det("assert", 1, |machine_st, args| assert_clause(machine_st, &args[0], AppendOrPrepend::Append)),
        det("assertz", 1, |machine_st, args| assert_clause(machine_st, &args[0], AppendOrPrepend::Append)),
        det("asserta", 1, |machine_st, args| assert_clause(machine_st, &args[0], AppendOrPrepend::Prepend)),
        nondet("retract", 1, retract),
        det("retractall", 1, retractall),
        // term inspection
        det("functor", 3, functor),
        det("arg", 3, arg),
        det("=..", 2, univ),
        det("copy_term", 2, |machine_st, args| {
            let copy = machine_st.heap.copy_term(&args[0], &mut FxHashMap::default());
            Ok(machine_st.unify(&args[1], &copy))
        }),
        nondet("length", 2, length),
    ]
}

/// The elements of a list under the current bindings, and the tail
/// that ended it: `[]` for a proper list.
pub(crate) fn list_items(heap: &Heap, term: &Term) -> (Vec<Term>, Term) {
    let mut items = vec![];
    let mut current = heap.deref(term);

    while let Term::List(cons) = current {
        items.push(cons.head().clone());
        current = heap.deref(cons.tail());
    }

    (items, current.clone())
}

fn not_unifiable(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    let mark = machine_st.heap.mark();
    let unifiable = machine_st.unify(&args[0], &args[1]);

    machine_st.heap.undo_to(mark);
    Ok(!unifiable)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TermOrderCategory {
    Variable,
    Number,
    Atom,
    Compound,
}

fn order_category(term: &Term) -> TermOrderCategory {
    match term {
        Term::Var(_) => TermOrderCategory::Variable,
        Term::Integer(_) | Term::Float(_) => TermOrderCategory::Number,
        Term::Atom(_) | Term::EmptyList => TermOrderCategory::Atom,
        Term::Compound(_) | Term::List(_) => TermOrderCategory::Compound,
    }
}

/// The standard order of terms: variables, then numbers, then atoms,
/// then compound terms by arity, name and arguments left to right. An
/// integer and a float of equal value order the float first.
pub fn compare_terms(heap: &Heap, t1: &Term, t2: &Term) -> Ordering {
    let mut pdl = vec![(t1, t2)];

    while let Some((t1, t2)) = pdl.pop() {
        let t1 = heap.deref(t1);
        let t2 = heap.deref(t2);

        let (cat1, cat2) = (order_category(t1), order_category(t2));

        if cat1 != cat2 {
            return cat1.cmp(&cat2);
        }

        let ordering = match (t1, t2) {
            (Term::Var(v1), Term::Var(v2)) => v1.cmp(v2),
            (Term::Integer(n1), Term::Integer(n2)) => n1.cmp(n2),
            (Term::Float(f1), Term::Float(f2)) => f1.cmp(f2),
            (Term::Integer(n), Term::Float(f)) => {
                compare(Number::Integer(*n), Number::Float(*f)).then(Ordering::Greater)
            }
            (Term::Float(f), Term::Integer(n)) => {
                compare(Number::Float(*f), Number::Integer(*n)).then(Ordering::Less)
            }
            _ => {
                let (Some((n1, a1)), Some((n2, a2))) = (t1.name_and_arity(), t2.name_and_arity()) else {
                    continue;
                };

                let ordering = a1.cmp(&a2).then_with(|| n1.cmp(&n2));

                if ordering == Ordering::Equal {
                    pdl.extend(t1.args().iter().zip(t2.args()).rev());
                }

                ordering
            }
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn order(
    machine_st: &mut MachineState,
    args: &[Term],
    test: impl FnOnce(Ordering) -> bool,
) -> Result<bool, EngineError> {
    Ok(test(compare_terms(&machine_st.heap, &args[0], &args[1])))
}

fn compare_order(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    match machine_st.heap.deref(&args[0]) {
        Term::Var(_) => {}
        Term::Atom(atom) if matches!(atom.as_str(), "<" | "=" | ">") => {}
        Term::Atom(_) => {
            return Err(EngineError::Domain {
                expected: "order",
                culprit: args[0].clone(),
            })
        }
        culprit => return Err(EngineError::type_error(ValidType::Atom, culprit.clone())),
    }

    let symbol = match compare_terms(&machine_st.heap, &args[1], &args[2]) {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };

    Ok(machine_st.unify(&args[0], &Term::atom(symbol)))
}

fn arith_compare(
    machine_st: &mut MachineState,
    args: &[Term],
    test: impl FnOnce(Ordering) -> bool,
) -> Result<bool, EngineError> {
    let n1 = eval(&machine_st.heap, &args[0])?;
    let n2 = eval(&machine_st.heap, &args[1])?;

    Ok(test(compare(n1, n2)))
}

fn findall(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    let (template, goal, results) = (&args[0], &args[1], &args[2]);

    match list_items(&machine_st.heap, results).1 {
        Term::Var(_) | Term::EmptyList => {}
        _ => return Err(EngineError::type_error(ValidType::List, machine_st.resolve(results))),
    }

    let mut instances = vec![];

    machine_st.for_each_solution(goal, |machine_st| {
        instances.push(detach(&machine_st.heap, template).0);
        Ok(true)
    })?;

    let items: Vec<Term> = instances
        .iter()
        .map(|instance| machine_st.heap.instantiate(instance, &mut VarMap::new(0)))
        .collect();

    Ok(machine_st.unify(results, &Term::list(items)))
}

fn forall(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    let counterexample = Term::from_parts(
        atom!(","),
        vec![
            args[0].clone(),
            Term::from_parts(atom!("\\+"), vec![args[1].clone()]),
        ],
    );

    Ok(!machine_st.has_solution(&counterexample)?)
}

fn integer_arg(heap: &Heap, term: &Term) -> Result<i64, EngineError> {
    match heap.deref(term) {
        Term::Integer(n) => Ok(*n),
        Term::Var(_) => Err(EngineError::Instantiation),
        culprit => Err(EngineError::type_error(ValidType::Integer, culprit.clone())),
    }
}

/// `repeat`: succeeds every time it is backtracked into.
#[derive(Debug)]
pub struct RepeatGoal;

impl Goal for RepeatGoal {
    fn evaluate(&mut self, _machine_st: &mut MachineState) -> EvalResult {
        Ok(true)
    }

    fn could_reevaluation_succeed(&self) -> bool {
        true
    }
}

fn repeat(_machine_st: &mut MachineState, _args: &[Term]) -> Result<Box<dyn Goal>, EngineError> {
    Ok(Box::new(RepeatGoal))
}

/// `between(Low, High, X)` with `X` unbound: counts up from `Low`.
pub struct BetweenGoal {
    x: Term,
    next: Option<i64>,
    high: Option<i64>,
    mark: Mark,
}

impl Goal for BetweenGoal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        machine_st.heap.undo_to(self.mark);

        let Some(n) = self.next else {
            return Ok(false);
        };

        if self.high.map_or(false, |high| n > high) {
            self.next = None;
            return Ok(false);
        }

        self.next = if self.high == Some(n) { None } else { n.checked_add(1) };

        Ok(machine_st.unify(&self.x, &Term::Integer(n)))
    }

    fn could_reevaluation_succeed(&self) -> bool {
        match (self.next, self.high) {
            (Some(n), Some(high)) => n <= high,
            (next, _) => next.is_some(),
        }
    }
}

fn between(machine_st: &mut MachineState, args: &[Term]) -> Result<Box<dyn Goal>, EngineError> {
    let low = integer_arg(&machine_st.heap, &args[0])?;

    let high = match machine_st.heap.deref(&args[1]) {
        Term::Atom(atom) if matches!(atom.as_str(), "inf" | "infinite") => None,
        _ => Some(integer_arg(&machine_st.heap, &args[1])?),
    };

    let mark = machine_st.heap.mark();

    match machine_st.heap.deref(&args[2]) {
        Term::Var(_) => Ok(Box::new(BetweenGoal {
            x: args[2].clone(),
            next: Some(low),
            high,
            mark,
        })),
        Term::Integer(x) => {
            let within = low <= *x && high.map_or(true, |high| *x <= high);

            let goal: Box<dyn Goal> = if within {
                Box::new(TrueGoal::default())
            } else {
                Box::new(FailGoal)
            };

            Ok(goal)
        }
        culprit => Err(EngineError::type_error(ValidType::Integer, culprit.clone())),
    }
}

fn assert_clause(
    machine_st: &mut MachineState,
    term: &Term,
    append_or_prepend: AppendOrPrepend,
) -> Result<bool, EngineError> {
    let (term, var_count) = detach(&machine_st.heap, term);
    let clause = Clause::from_term(term, var_count)?;

    machine_st.indices.assert(clause, append_or_prepend)?;
    Ok(true)
}

// `Head :- Body` or `Head`, with the head checked as callable.
fn split_clause(heap: &Heap, term: &Term) -> Result<(Term, Term), EngineError> {
    let term = heap.deref(term);

    let (head, body) = if term.is_functor(atom!(":-"), 2) {
        (heap.deref(&term.args()[0]).clone(), term.args()[1].clone())
    } else {
        (term.clone(), Term::Atom(atom!("true")))
    };

    match head {
        Term::Var(_) => Err(EngineError::Instantiation),
        head if head.is_callable() => Ok((head, body)),
        culprit => Err(EngineError::type_error(ValidType::Callable, culprit)),
    }
}

fn dynamic_entry(
    machine_st: &MachineState,
    head: &Term,
) -> Result<Option<Arc<PredicateEntry>>, EngineError> {
    let Some(key) = head.name_and_arity() else {
        return Ok(None);
    };

    match machine_st.indices.lookup(&key) {
        Some(entry) if entry.as_dynamic().is_some() => Ok(Some(entry)),
        Some(_) => Err(EngineError::StaticProcedure(key)),
        None if is_control_construct(key) || machine_st.indices.builtin(&key).is_some() => {
            Err(EngineError::StaticProcedure(key))
        }
        None => Ok(None),
    }
}

/// `retract(Clause)`: removes the matching clauses of a dynamic
/// predicate one solution at a time. The clauses considered are those
/// present when the call began.
pub struct RetractGoal {
    entry: Arc<PredicateEntry>,
    snapshot: ClauseList,
    head: Term,
    body: Term,
    next: usize,
    mark: Mark,
}

impl Goal for RetractGoal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        machine_st.heap.undo_to(self.mark);

        let Some(pred) = self.entry.as_dynamic() else {
            return Ok(false);
        };

        while let Some(clause) = self.snapshot.get(self.next).cloned() {
            self.next += 1;

            let matched = {
                let mut env = VarMap::new(clause.clause().var_count());
                let head = machine_st.heap.instantiate(clause.clause().head(), &mut env);
                let body = machine_st.heap.instantiate(clause.clause().body(), &mut env);

                machine_st.unify(&head, &self.head) && machine_st.unify(&body, &self.body)
            };

            if matched && pred.retract(&clause) {
                return Ok(true);
            }

            machine_st.heap.undo_to(self.mark);
        }

        Ok(false)
    }

    fn could_reevaluation_succeed(&self) -> bool {
        self.next < self.snapshot.len()
    }
}

fn retract(machine_st: &mut MachineState, args: &[Term]) -> Result<Box<dyn Goal>, EngineError> {
    let (head, body) = split_clause(&machine_st.heap, &args[0])?;

    let Some(entry) = dynamic_entry(machine_st, &head)? else {
        return Ok(Box::new(FailGoal));
    };

    let snapshot = match entry.as_dynamic() {
        Some(pred) => (*pred.snapshot()).clone(),
        None => ClauseList::new(),
    };

    Ok(Box::new(RetractGoal {
        entry,
        snapshot,
        head,
        body,
        next: 0,
        mark: machine_st.heap.mark(),
    }))
}

fn retractall(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    let (head, _) = split_clause(&machine_st.heap, &args[0])?;

    let entry = match dynamic_entry(machine_st, &head)? {
        Some(entry) => entry,
        None => {
            if let Some((name, arity)) = head.name_and_arity() {
                machine_st.indices.declare_dynamic((name, arity))?;
            }

            return Ok(true);
        }
    };

    let Some(pred) = entry.as_dynamic() else {
        return Ok(true);
    };

    let snapshot = pred.snapshot();

    for clause in snapshot.iter() {
        let mark = machine_st.heap.mark();

        let matched = {
            let mut env = VarMap::new(clause.clause().var_count());
            let instance = machine_st.heap.instantiate(clause.clause().head(), &mut env);

            machine_st.unify(&instance, &head)
        };

        machine_st.heap.undo_to(mark);

        if matched {
            pred.retract(clause);
        }
    }

    Ok(true)
}

fn functor(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    let term = machine_st.deref(&args[0]);

    if !term.is_var() {
        let (name, arity) = match term.name_and_arity() {
            Some((name, arity)) if arity > 0 => (Term::from_atom(name), arity),
            _ => (term.clone(), 0),
        };

        let arity = Term::Integer(arity as i64);

        return Ok(machine_st.unify(&args[1], &name) && machine_st.unify(&args[2], &arity));
    }

    let name = machine_st.deref(&args[1]);
    let arity = integer_arg(&machine_st.heap, &args[2])?;

    if name.is_var() {
        return Err(EngineError::Instantiation);
    }

    if arity < 0 {
        return Err(EngineError::Domain {
            expected: "not_less_than_zero",
            culprit: Term::Integer(arity),
        });
    }

    let structure = match name {
        name if arity == 0 && name.is_atomic() => name,
        culprit @ (Term::Compound(_) | Term::List(_)) => {
            return Err(EngineError::type_error(ValidType::Atomic, machine_st.resolve(&culprit)))
        }
        Term::Atom(atom) => {
            let args = (0..arity).map(|_| machine_st.fresh_var()).collect();
            Term::from_parts(atom, args)
        }
        Term::EmptyList => {
            let args = (0..arity).map(|_| machine_st.fresh_var()).collect();
            Term::from_parts(atom!("[]"), args)
        }
        culprit => return Err(EngineError::type_error(ValidType::Atom, culprit)),
    };

    Ok(machine_st.unify(&args[0], &structure))
}

fn arg(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    let n = integer_arg(&machine_st.heap, &args[0])?;
    let term = machine_st.deref(&args[1]);

    match term {
        Term::Compound(_) | Term::List(_) => {}
        Term::Var(_) => return Err(EngineError::Instantiation),
        culprit => return Err(EngineError::type_error(ValidType::Compound, culprit)),
    }

    let Some(value) = usize::try_from(n)
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| term.args().get(i))
    else {
        return Ok(false);
    };

    Ok(machine_st.unify(&args[2], value))
}

fn univ(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    let term = machine_st.deref(&args[0]);

    if !term.is_var() {
        let list = match term.name_and_arity() {
            Some((name, arity)) if arity > 0 => {
                let items = std::iter::once(Term::from_atom(name)).chain(term.args().iter().cloned());
                Term::list(items)
            }
            _ => Term::list([term.clone()]),
        };

        return Ok(machine_st.unify(&args[1], &list));
    }

    let (items, tail) = list_items(&machine_st.heap, &args[1]);

    match tail {
        Term::EmptyList => {}
        Term::Var(_) => return Err(EngineError::Instantiation),
        _ => return Err(EngineError::type_error(ValidType::List, machine_st.resolve(&args[1]))),
    }

    let Some((head, rest)) = items.split_first() else {
        return Err(EngineError::Domain {
            expected: "non_empty_list",
            culprit: Term::EmptyList,
        });
    };

    let structure = match machine_st.deref(head) {
        Term::Var(_) => return Err(EngineError::Instantiation),
        head if rest.is_empty() && head.is_atomic() => head,
        Term::Atom(name) => Term::from_parts(name, rest.to_vec()),
        Term::EmptyList => Term::from_parts(atom!("[]"), rest.to_vec()),
        culprit if rest.is_empty() => {
            return Err(EngineError::type_error(ValidType::Atomic, machine_st.resolve(&culprit)))
        }
        culprit => return Err(EngineError::type_error(ValidType::Atom, machine_st.resolve(&culprit))),
    };

    Ok(machine_st.unify(&args[0], &structure))
}

/// `length(List, N)` over a partial list with `N` unbound: extends the
/// list one cell per solution.
pub struct LengthGoal {
    tail: Term,
    n: Term,
    prefix: usize,
    extra: usize,
    mark: Mark,
}

impl Goal for LengthGoal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        machine_st.heap.undo_to(self.mark);

        let cells: Vec<Term> = (0..self.extra).map(|_| machine_st.fresh_var()).collect();
        let length = Term::Integer((self.prefix + self.extra) as i64);

        self.extra += 1;

        Ok(machine_st.unify(&self.tail, &Term::list(cells)) && machine_st.unify(&self.n, &length))
    }

    fn could_reevaluation_succeed(&self) -> bool {
        true
    }
}

fn length_of(machine_st: &mut MachineState, args: &[Term]) -> Result<bool, EngineError> {
    let (items, tail) = list_items(&machine_st.heap, &args[0]);

    match tail {
        Term::EmptyList => {
            let length = Term::Integer(items.len() as i64);
            Ok(machine_st.unify(&args[1], &length))
        }
        Term::Var(_) => {
            let n = integer_arg(&machine_st.heap, &args[1])?;

            match usize::try_from(n).ok().and_then(|n| n.checked_sub(items.len())) {
                Some(extra) => {
                    let cells: Vec<Term> = (0..extra).map(|_| machine_st.fresh_var()).collect();
                    Ok(machine_st.unify(&tail, &Term::list(cells)))
                }
                None => Ok(false),
            }
        }
        _ => Ok(false),
    }
}

fn length(machine_st: &mut MachineState, args: &[Term]) -> Result<Box<dyn Goal>, EngineError> {
    let mark = machine_st.heap.mark();

    match machine_st.heap.deref(&args[1]) {
        Term::Var(_) | Term::Integer(_) => {}
        culprit => return Err(EngineError::type_error(ValidType::Integer, culprit.clone())),
    }

    if let Term::Integer(n) = machine_st.heap.deref(&args[1]) {
        if *n < 0 {
            return Err(EngineError::Domain {
                expected: "not_less_than_zero",
                culprit: Term::Integer(*n),
            });
        }
    }

    let (items, tail) = list_items(&machine_st.heap, &args[0]);

    if tail.is_var() && machine_st.heap.deref(&args[1]).is_var() {
        return Ok(Box::new(LengthGoal {
            tail,
            n: args[1].clone(),
            prefix: items.len(),
            extra: 0,
            mark,
        }));
    }

    Ok(Box::new(DeterministicGoal::new(Arc::new(length_of), args.to_vec(), mark)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Machine;

    fn with_state(f: impl FnOnce(&mut MachineState)) {
        let machine = Machine::default();
        let mut machine_st = MachineState::new(machine.indices.clone());

        f(&mut machine_st)
    }

    #[test]
    fn standard_order() {
        with_state(|machine_st| {
            let x = machine_st.fresh_var();
            let terms = [
                x,
                Term::float(1.0),
                Term::integer(1),
                Term::integer(2),
                Term::atom("a"),
                Term::atom("b"),
                Term::compound("f", [Term::atom("z")]),
                Term::compound("a", [Term::atom("a"), Term::atom("a")]),
            ];

            for pair in terms.windows(2) {
                assert_eq!(
                    compare_terms(&machine_st.heap, &pair[0], &pair[1]),
                    Ordering::Less,
                    "{} @< {}",
                    pair[0],
                    pair[1]
                );
            }
        });
    }

    #[test]
    fn order_sees_through_bindings() {
        with_state(|machine_st| {
            let x = machine_st.fresh_var();
            assert!(machine_st.unify(&x, &Term::integer(3)));

            let f_x = Term::compound("f", [x]);
            let f_3 = Term::compound("f", [Term::integer(3)]);

            assert_eq!(compare_terms(&machine_st.heap, &f_x, &f_3), Ordering::Equal);
        });
    }

    #[test]
    fn list_items_follow_bound_tails() {
        with_state(|machine_st| {
            let t = machine_st.fresh_var();
            let list = Term::list_with_tail([Term::integer(1)], t.clone());

            assert!(machine_st.unify(&t, &Term::list([Term::integer(2)])));

            let (items, tail) = list_items(&machine_st.heap, &list);

            assert_eq!(items, vec![Term::integer(1), Term::integer(2)]);
            assert_eq!(tail, Term::EmptyList);
        });
    }

    #[test]
    fn functor_builds_and_decomposes() {
        with_state(|machine_st| {
            let (t, n, a) = (machine_st.fresh_var(), machine_st.fresh_var(), machine_st.fresh_var());

            let args = [Term::compound("f", [Term::atom("x"), Term::atom("y")]), n.clone(), a.clone()];
            assert!(functor(machine_st, &args).unwrap());
            assert_eq!(machine_st.resolve(&n), Term::atom("f"));
            assert_eq!(machine_st.resolve(&a), Term::integer(2));

            let args = [t.clone(), Term::atom("g"), Term::integer(1)];
            assert!(functor(machine_st, &args).unwrap());
            assert!(machine_st.resolve(&t).is_functor(atom!("g"), 1));

            let args = [machine_st.fresh_var(), Term::atom("g"), Term::integer(-1)];
            assert!(matches!(functor(machine_st, &args), Err(EngineError::Domain { .. })));
        });
    }
}
