use crate::forms::*;
use crate::machine::copier::*;
use crate::machine::heap::*;
use crate::types::*;

/// How one head argument of a mutable clause is matched.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadArg {
    /// First occurrence of a clause variable as a whole argument: the
    /// call argument is substituted for it, nothing is copied.
    Substitute(VarId),
    /// Copy the template with fresh variables and unify it with the
    /// call argument.
    Unify(Term),
}

/// Evaluation strategy of a clause, chosen once from the shape of its
/// head when the predicate is compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseAction {
    /// A fact whose arguments are pairwise distinct variables.
    AlwaysMatched,
    /// An atom head.
    ZeroArg,
    /// Every head argument is ground and the body is `true`.
    ImmutableFact,
    /// Every head argument is ground.
    ImmutableRule,
    MutableFact(Box<[HeadArg]>),
    MutableRule(Box<[HeadArg]>),
}

/// Outcome of matching a call against one clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Match {
    Fail,
    Fact,
    Body(Term),
}

impl ClauseAction {
    pub fn classify(clause: &Clause) -> Self {
        let head = clause.head();
        let args = head.args();

        if args.is_empty() {
            return ClauseAction::ZeroArg;
        }

        if clause.is_fact() && distinct_vars(args) {
            return ClauseAction::AlwaysMatched;
        }

        if args.iter().all(Term::is_ground) {
            return if clause.is_fact() {
                ClauseAction::ImmutableFact
            } else {
                ClauseAction::ImmutableRule
            };
        }

        let mut seen = vec![false; clause.var_count()];
        let mut plan = Vec::with_capacity(args.len());

        for arg in args {
            match arg {
                Term::Var(var) if !seen.get(var.index()).copied().unwrap_or(true) => {
                    seen[var.index()] = true;
                    plan.push(HeadArg::Substitute(*var));
                }
                _ => {
                    mark_vars(arg, &mut seen);
                    plan.push(HeadArg::Unify(arg.clone()));
                }
            }
        }

        if clause.is_fact() {
            ClauseAction::MutableFact(plan.into_boxed_slice())
        } else {
            ClauseAction::MutableRule(plan.into_boxed_slice())
        }
    }

    #[inline]
    pub fn is_fact(&self) -> bool {
        matches!(
            self,
            ClauseAction::AlwaysMatched | ClauseAction::ImmutableFact | ClauseAction::MutableFact(_)
        )
    }
}

fn distinct_vars(args: &[Term]) -> bool {
    let mut seen = vec![];

    for arg in args {
        match arg {
            Term::Var(var) if !seen.contains(var) => seen.push(*var),
            _ => return false,
        }
    }

    true
}

fn mark_vars(term: &Term, seen: &mut [bool]) {
    let mut stack = vec![term];

    while let Some(term) = stack.pop() {
        match term {
            Term::Var(var) => {
                if let Some(flag) = seen.get_mut(var.index()) {
                    *flag = true;
                }
            }
            Term::Compound(_) | Term::List(_) if !term.is_ground() => {
                stack.extend(term.args().iter());
            }
            _ => {}
        }
    }
}

/// A stored clause together with its strategy.
#[derive(Debug, Clone)]
pub struct ClassifiedClause {
    clause: Clause,
    action: ClauseAction,
}

impl ClassifiedClause {
    pub fn new(clause: Clause) -> Self {
        let action = ClauseAction::classify(&clause);
        ClassifiedClause { clause, action }
    }

    #[inline]
    pub fn clause(&self) -> &Clause {
        &self.clause
    }

    #[inline]
    pub fn action(&self) -> &ClauseAction {
        &self.action
    }

    /// Matches the head against the call arguments, returning the
    /// activation's variable slots. Bindings made by a failed match
    /// are left for the caller to undo.
    pub fn unify_head(&self, heap: &mut Heap, args: &[Term]) -> Option<VarMap> {
        let mut env = VarMap::new(self.clause.var_count());

        match &self.action {
            ClauseAction::AlwaysMatched | ClauseAction::ZeroArg => {}
            ClauseAction::ImmutableFact | ClauseAction::ImmutableRule => {
                for (head_arg, arg) in self.clause.head().args().iter().zip(args) {
                    if !heap.unify(head_arg, arg) {
                        return None;
                    }
                }
            }
            ClauseAction::MutableFact(plan) | ClauseAction::MutableRule(plan) => {
                for (head_arg, arg) in plan.iter().zip(args) {
                    match head_arg {
                        HeadArg::Substitute(var) => {
                            let value = heap.deref(arg).clone();
                            env.set(*var, value);
                        }
                        HeadArg::Unify(template) => {
                            let copy = heap.instantiate(template, &mut env);

                            if !heap.unify(&copy, arg) {
                                return None;
                            }
                        }
                    }
                }
            }
        }

        Some(env)
    }

    pub fn try_match(&self, heap: &mut Heap, args: &[Term]) -> Match {
        match self.unify_head(heap, args) {
            None => Match::Fail,
            Some(_) if self.action.is_fact() || self.clause.is_fact() => Match::Fact,
            Some(mut env) => Match::Body(heap.instantiate(self.clause.body(), &mut env)),
        }
    }
}

/// Matching without any specialization: copy the whole clause, then
/// unify. Every strategy must agree with it.
#[cfg(test)]
pub(crate) fn naive_match(clause: &Clause, heap: &mut Heap, args: &[Term]) -> Match {
    let mut env = VarMap::new(clause.var_count());
    let head = heap.instantiate(clause.head(), &mut env);

    for (head_arg, arg) in head.args().iter().zip(args) {
        if !heap.unify(head_arg, arg) {
            return Match::Fail;
        }
    }

    if clause.is_fact() {
        Match::Fact
    } else {
        Match::Body(heap.instantiate(clause.body(), &mut env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{read_clause, read_term};

    use proptest::prelude::*;

    fn classify(text: &str) -> ClauseAction {
        let clause = read_clause(text).unwrap();
        ClauseAction::classify(&clause)
    }

    #[test]
    fn shapes() {
        assert_eq!(classify("p(X, Y)."), ClauseAction::AlwaysMatched);
        assert_eq!(classify("p :- q."), ClauseAction::ZeroArg);
        assert_eq!(classify("p(a, f(b))."), ClauseAction::ImmutableFact);
        assert_eq!(classify("p(a) :- q."), ClauseAction::ImmutableRule);

        assert_eq!(
            classify("p(X, X)."),
            ClauseAction::MutableFact(
                vec![HeadArg::Substitute(VarId(0)), HeadArg::Unify(Term::var(0))].into()
            )
        );

        assert!(matches!(classify("p(X, Y) :- q(X)."), ClauseAction::MutableRule(_)));
        assert!(matches!(classify("p([H|T]) :- q(H, T)."), ClauseAction::MutableRule(_)));
    }

    #[test]
    fn substitution_binds_nothing() {
        let clause = ClassifiedClause::new(read_clause("p(X, Y) :- q(Y, X).").unwrap());
        let mut heap = Heap::new();

        let args = [Term::atom("a"), heap.fresh_var()];
        let trail = heap.trail_len();

        match clause.try_match(&mut heap, &args) {
            Match::Body(body) => {
                assert_eq!(body, Term::compound("q", [args[1].clone(), Term::atom("a")]));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(heap.trail_len(), trail);
    }

    fn arg_term(vars: &'static [&'static str]) -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            Just("a".to_owned()),
            Just("b".to_owned()),
            Just("1".to_owned()),
            prop::sample::select(vars).prop_map(str::to_owned),
        ];

        leaf.prop_recursive(2, 8, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("f({}, {})", a, b)),
                (inner.clone(), inner).prop_map(|(a, b)| format!("[{}|{}]", a, b)),
            ]
        })
    }

    // the call side only uses anonymous variables, so it is linear and
    // no cyclic binding can arise without an occurs check.
    fn match_outcome(
        heap: &mut Heap,
        call: &Term,
        matcher: impl FnOnce(&mut Heap) -> Match,
    ) -> Option<Term> {
        let mark = heap.mark();

        let outcome = match matcher(&mut *heap) {
            Match::Fail => None,
            Match::Fact => Some(detach(heap, &Term::compound("r", [call.clone()])).0),
            Match::Body(body) => {
                Some(detach(heap, &Term::compound("r", [call.clone(), body])).0)
            }
        };

        heap.undo_to(mark);
        outcome
    }

    proptest! {
        #[test]
        fn strategies_agree_with_naive_copy(
            head in prop::collection::vec(arg_term(&["X", "Y", "_"]), 1..4),
            call in prop::collection::vec(arg_term(&["_"]), 4),
            rule in any::<bool>(),
        ) {
            let arity = head.len();
            let text = if rule {
                format!("p({}) :- q(X, Y).", head.join(", "))
            } else {
                format!("p({}).", head.join(", "))
            };

            let clause = read_clause(&text).unwrap();
            let classified = ClassifiedClause::new(clause.clone());

            let query = read_term(&format!("c({}).", call[..arity].join(", "))).unwrap();

            let mut heap = Heap::new();
            let mut env = VarMap::new(query.var_count);
            let call = heap.instantiate(&query.term, &mut env);

            let fast = match_outcome(&mut heap, &call, |heap| classified.try_match(heap, call.args()));
            let slow = match_outcome(&mut heap, &call, |heap| naive_match(&clause, heap, call.args()));

            prop_assert_eq!(fast, slow);
        }
    }
}
