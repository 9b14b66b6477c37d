use crate::atom_table::*;
use crate::machine::machine_errors::*;
use crate::types::*;

use std::fmt;

pub type PredicateKey = (Atom, usize); // name, arity.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOrPrepend {
    Append,
    Prepend,
}

impl AppendOrPrepend {
    #[inline]
    pub(crate) fn is_append(self) -> bool {
        match self {
            AppendOrPrepend::Append => true,
            AppendOrPrepend::Prepend => false,
        }
    }
}

pub(crate) struct KeyDisplay(pub(crate) PredicateKey);

impl fmt::Display for KeyDisplay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.0 .0, self.0 .1)
    }
}

/// A stored clause template. Variables are numbered `0..var_count`
/// locally to the clause and are never bound in place; every
/// activation copies them or substitutes call arguments for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    head: Term,
    body: Term,
    var_count: usize,
}

impl Clause {
    pub fn new(head: Term, body: Term, var_count: usize) -> Result<Self, EngineError> {
        match &head {
            Term::Atom(_) | Term::Compound(_) | Term::List(_) | Term::EmptyList => {}
            Term::Var(_) => return Err(EngineError::Instantiation),
            _ => {
                return Err(EngineError::Type {
                    expected: ValidType::Callable,
                    culprit: head,
                })
            }
        }

        if !(body.is_callable() || body.is_var()) {
            return Err(EngineError::Type {
                expected: ValidType::Callable,
                culprit: body,
            });
        }

        Ok(Clause { head, body, var_count })
    }

    pub fn fact(head: Term, var_count: usize) -> Result<Self, EngineError> {
        Self::new(head, Term::Atom(atom!("true")), var_count)
    }

    /// Splits `Head :- Body`, treating anything else as a fact.
    pub fn from_term(term: Term, var_count: usize) -> Result<Self, EngineError> {
        if term.is_functor(atom!(":-"), 2) {
            let args = term.args();
            Self::new(args[0].clone(), args[1].clone(), var_count)
        } else {
            Self::fact(term, var_count)
        }
    }

    #[inline]
    pub fn head(&self) -> &Term {
        &self.head
    }

    #[inline]
    pub fn body(&self) -> &Term {
        &self.body
    }

    #[inline]
    pub fn var_count(&self) -> usize {
        self.var_count
    }

    #[inline]
    pub fn is_fact(&self) -> bool {
        self.body == Term::Atom(atom!("true"))
    }

    pub fn key(&self) -> PredicateKey {
        // the head was validated as callable on construction.
        self.head.name_and_arity().unwrap_or((atom!("true"), 0))
    }

    /// Occurrence count per clause-local variable across head and body.
    pub(crate) fn var_occurrences(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.var_count];

        count_vars(&self.head, &mut counts);
        count_vars(&self.body, &mut counts);

        counts
    }

    /// The clause as the term `Head :- Body`, or `Head` for facts.
    pub fn to_term(&self) -> Term {
        if self.is_fact() {
            self.head.clone()
        } else {
            Term::from_parts(atom!(":-"), vec![self.head.clone(), self.body.clone()])
        }
    }
}

pub(crate) fn count_vars(term: &Term, counts: &mut [u32]) {
    let mut stack = vec![term];

    while let Some(term) = stack.pop() {
        match term {
            Term::Var(v) => {
                if let Some(count) = counts.get_mut(v.index()) {
                    *count += 1;
                }
            }
            Term::Compound(_) | Term::List(_) if !term.is_ground() => {
                stack.extend(term.args().iter());
            }
            _ => {}
        }
    }
}

/// Goals of a right-nested conjunction, in order.
pub(crate) fn conjuncts(body: &Term) -> Vec<&Term> {
    let mut goals = vec![];
    let mut current = body;

    while current.is_functor(atom!(","), 2) {
        let args = current.args();
        goals.push(&args[0]);
        current = &args[1];
    }

    goals.push(current);
    goals
}

/// Rebuilds a right-nested conjunction, `true` when empty.
pub(crate) fn conjunction(goals: &[&Term]) -> Term {
    match goals.split_last() {
        None => Term::Atom(atom!("true")),
        Some((last, init)) => init.iter().rev().fold((*last).clone(), |acc, goal| {
            Term::from_parts(atom!(","), vec![(*goal).clone(), acc])
        }),
    }
}

/// Whether any goal reachable through the control constructs of
/// `body` satisfies `pred`.
pub(crate) fn any_goal(body: &Term, pred: &mut impl FnMut(&Term) -> bool) -> bool {
    let mut stack = vec![body];

    while let Some(goal) = stack.pop() {
        let is_control = goal.is_functor(atom!(","), 2)
            || goal.is_functor(atom!(";"), 2)
            || goal.is_functor(atom!("->"), 2);

        if is_control {
            stack.extend(goal.args().iter());
        } else if pred(goal) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts_and_rules() {
        let fact = Clause::from_term(Term::compound("p", [Term::var(0)]), 1).unwrap();
        assert!(fact.is_fact());
        assert_eq!(fact.key(), (atom!("p"), 1));

        let rule = Clause::from_term(
            Term::compound(":-", [Term::atom("q"), Term::atom("r")]),
            0,
        )
        .unwrap();

        assert!(!rule.is_fact());
        assert_eq!(rule.body(), &Term::atom("r"));
    }

    #[test]
    fn malformed_heads_are_rejected() {
        assert!(matches!(
            Clause::fact(Term::integer(3), 0),
            Err(EngineError::Type { .. })
        ));
        assert!(matches!(
            Clause::fact(Term::var(0), 1),
            Err(EngineError::Instantiation)
        ));
    }

    #[test]
    fn conjunction_round_trip() {
        let body = Term::compound(
            ",",
            [Term::atom("a"), Term::compound(",", [Term::atom("b"), Term::atom("c")])],
        );

        let goals = conjuncts(&body);
        assert_eq!(goals.len(), 3);
        assert_eq!(conjunction(&goals), body);
        assert_eq!(conjunction(&[]), Term::atom("true"));
    }

    #[test]
    fn occurrences_span_head_and_body() {
        let clause = Clause::new(
            Term::compound("p", [Term::var(0), Term::var(1)]),
            Term::compound("q", [Term::var(0)]),
            2,
        )
        .unwrap();

        assert_eq!(clause.var_occurrences(), vec![2, 1]);
    }
}
