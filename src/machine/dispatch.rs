use crate::atom_table::*;
use crate::clause_types::*;
use crate::forms::*;
use crate::machine::config::*;
use crate::machine::dynamic_database::*;
use crate::machine::heap::*;
use crate::machine::machine_errors::*;
use crate::machine::machine_indices::*;
use crate::machine::machine_state::*;
use crate::machine::observer::*;
use crate::machine::system_calls::*;
use crate::machine::tabling::*;
use crate::machine::tail_recursion::*;
use crate::machine::Goal;
use crate::types::*;

use std::sync::Arc;

/// Control constructs are interpreted here and can never be redefined.
pub(crate) fn is_control_construct((name, arity): PredicateKey) -> bool {
    matches!(
        (name.as_str(), arity),
        ("true" | "fail" | "false" | "!", 0)
            | ("," | ";" | "->", 2)
            | ("\\+" | "not" | "once" | "ignore", 1)
            | ("call", 1..=8)
    )
}

/// Builds the live goal for `term`. `barrier` is the cut barrier of
/// the clause the goal occurs in: it is what a `!` in a transparent
/// position cuts to.
pub fn goal_for(
    machine_st: &mut MachineState,
    term: &Term,
    barrier: CutBarrier,
) -> Result<Box<dyn Goal>, EngineError> {
    let goal = machine_st.heap.deref(term).clone();

    let Some((name, arity)) = goal.name_and_arity() else {
        return match goal {
            Term::Var(_) => Err(EngineError::Instantiation),
            culprit => Err(EngineError::type_error(ValidType::Callable, culprit)),
        };
    };

    let args = goal.args();
    let mark = machine_st.heap.mark();

    match (name.as_str(), arity) {
        ("true", 0) => return Ok(Box::new(TrueGoal::default())),
        ("fail" | "false", 0) => return Ok(Box::new(FailGoal)),
        ("!", 0) => return Ok(Box::new(CutGoal::new(barrier))),
        (",", 2) => {
            let left = goal_for(machine_st, &args[0], barrier)?;
            return Ok(Box::new(Conjunction::new(left, args[1].clone(), barrier, mark)));
        }
        (";", 2) => {
            let left = machine_st.heap.deref(&args[0]).clone();

            if left.is_functor(atom!("->"), 2) {
                let cond_then = left.args();

                return Ok(Box::new(IfThenElse::new(
                    cond_then[0].clone(),
                    cond_then[1].clone(),
                    Some(args[1].clone()),
                    barrier,
                    mark,
                )));
            }

            return Ok(Box::new(Disjunction::new(left, args[1].clone(), barrier, mark)));
        }
        ("->", 2) => {
            return Ok(Box::new(IfThenElse::new(
                args[0].clone(),
                args[1].clone(),
                None,
                barrier,
                mark,
            )))
        }
        ("once", 1) => {
            let then = Term::Atom(atom!("true"));
            return Ok(Box::new(IfThenElse::new(args[0].clone(), then, None, barrier, mark)));
        }
        ("ignore", 1) => {
            let then = Term::Atom(atom!("true"));
            let otherwise = Some(then.clone());

            return Ok(Box::new(IfThenElse::new(
                args[0].clone(),
                then,
                otherwise,
                barrier,
                mark,
            )));
        }
        ("\\+" | "not", 1) => return Ok(Box::new(NotProvable::new(args[0].clone()))),
        ("call", 1..=8) => {
            let goal = add_args(&machine_st.heap, &args[0], &args[1..])?;
            let barrier = machine_st.fresh_barrier();

            return Ok(Box::new(CallGoal::new(goal, barrier)));
        }
        _ => {}
    }

    let key = (name, arity);
    let indices = machine_st.indices.clone();

    if let Some(builtin) = indices.builtin(&key) {
        return match builtin {
            Builtin::Deterministic(f) => Ok(Box::new(DeterministicGoal::new(f, args.to_vec(), mark))),
            Builtin::Nondeterministic(factory) => factory(machine_st, args),
        };
    }

    let Some(entry) = indices.lookup(&key) else {
        return match indices.config.unknown {
            UnknownPolicy::Error => Err(EngineError::UnknownProcedure(key)),
            UnknownPolicy::Fail => Ok(Box::new(FailGoal)),
        };
    };

    let barrier = machine_st.fresh_barrier();

    match &*entry {
        PredicateEntry::Static(code) => {
            let pred = code.compiled(&indices.config);

            if pred.tail_loop.is_some() {
                Ok(Box::new(TailRecursiveGoal::new(pred, goal, barrier, mark)))
            } else {
                let source = ClauseSource::Static(pred);
                Ok(Box::new(UserGoal::new(source, key, goal, barrier, mark)))
            }
        }
        PredicateEntry::Dynamic(pred) => {
            let source = ClauseSource::Dynamic(pred.snapshot());
            Ok(Box::new(UserGoal::new(source, key, goal, barrier, mark)))
        }
        PredicateEntry::Tabled(..) => Ok(Box::new(TabledGoal::new(entry.clone(), key, goal, mark))),
    }
}

/// `call/N`: the goal with the extra arguments appended.
pub(crate) fn add_args(heap: &Heap, goal: &Term, extra: &[Term]) -> Result<Term, EngineError> {
    let goal = heap.deref(goal);

    if extra.is_empty() {
        return match goal {
            Term::Var(_) => Err(EngineError::Instantiation),
            goal if goal.is_callable() => Ok(goal.clone()),
            culprit => Err(EngineError::type_error(ValidType::Callable, culprit.clone())),
        };
    }

    match goal.name_and_arity() {
        Some((name, _)) => {
            let args = goal.args().iter().chain(extra).cloned().collect();
            Ok(Term::from_parts(name, args))
        }
        None if goal.is_var() => Err(EngineError::Instantiation),
        None => Err(EngineError::type_error(ValidType::Callable, goal.clone())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Active,
    Exhausted,
}

/// `true`, and any goal known to succeed exactly once.
#[derive(Debug, Default)]
pub struct TrueGoal {
    evaluated: bool,
}

impl Goal for TrueGoal {
    fn evaluate(&mut self, _machine_st: &mut MachineState) -> EvalResult {
        Ok(!std::mem::replace(&mut self.evaluated, true))
    }

    fn could_reevaluation_succeed(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct FailGoal;

impl Goal for FailGoal {
    fn evaluate(&mut self, _machine_st: &mut MachineState) -> EvalResult {
        Ok(false)
    }

    fn could_reevaluation_succeed(&self) -> bool {
        false
    }
}

/// `!`: succeeds once, and cuts when backtracked into.
#[derive(Debug)]
pub struct CutGoal {
    barrier: CutBarrier,
    evaluated: bool,
}

impl CutGoal {
    fn new(barrier: CutBarrier) -> Self {
        CutGoal {
            barrier,
            evaluated: false,
        }
    }
}

impl Goal for CutGoal {
    fn evaluate(&mut self, _machine_st: &mut MachineState) -> EvalResult {
        if std::mem::replace(&mut self.evaluated, true) {
            Err(Unwind::Cut(self.barrier))
        } else {
            Ok(true)
        }
    }

    fn could_reevaluation_succeed(&self) -> bool {
        true
    }
}

/// `(A, B)`. The right goal is built each time the left one succeeds,
/// so it sees the left goal's bindings; it is dropped before the left
/// goal is retried.
pub struct Conjunction {
    left: Box<dyn Goal>,
    right_term: Term,
    right: Option<Box<dyn Goal>>,
    barrier: CutBarrier,
    mark: Mark,
    phase: Phase,
}

impl Conjunction {
    fn new(left: Box<dyn Goal>, right_term: Term, barrier: CutBarrier, mark: Mark) -> Self {
        Conjunction {
            left,
            right_term,
            right: None,
            barrier,
            mark,
            phase: Phase::Fresh,
        }
    }

    fn exhaust(&mut self, machine_st: &mut MachineState) -> EvalResult {
        self.phase = Phase::Exhausted;
        self.right = None;
        machine_st.heap.undo_to(self.mark);

        Ok(false)
    }

    fn retry_left(&mut self, machine_st: &mut MachineState) -> EvalResult {
        if self.left.could_reevaluation_succeed() {
            self.left.evaluate(machine_st)
        } else {
            Ok(false)
        }
    }
}

impl Goal for Conjunction {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        match self.phase {
            Phase::Exhausted => return Ok(false),
            Phase::Fresh => {
                self.phase = Phase::Active;
                self.mark = machine_st.heap.mark();

                if !self.left.evaluate(machine_st)? {
                    return self.exhaust(machine_st);
                }
            }
            Phase::Active => {
                if let Some(right) = self.right.as_mut() {
                    if right.could_reevaluation_succeed() && right.evaluate(machine_st)? {
                        return Ok(true);
                    }
                }

                self.right = None;

                if !self.retry_left(machine_st)? {
                    return self.exhaust(machine_st);
                }
            }
        }

        loop {
            let mut right = goal_for(machine_st, &self.right_term, self.barrier)?;

            if right.evaluate(machine_st)? {
                self.right = Some(right);
                return Ok(true);
            }

            drop(right);

            if !self.retry_left(machine_st)? {
                return self.exhaust(machine_st);
            }
        }
    }

    fn could_reevaluation_succeed(&self) -> bool {
        self.phase == Phase::Active
            && (self.left.could_reevaluation_succeed()
                || self
                    .right
                    .as_ref()
                    .map_or(false, |right| right.could_reevaluation_succeed()))
    }
}

/// `(A ; B)`: every solution of `A`, then every solution of `B`.
pub struct Disjunction {
    left_term: Term,
    right_term: Term,
    current: Option<Box<dyn Goal>>,
    on_right: bool,
    barrier: CutBarrier,
    mark: Mark,
    phase: Phase,
}

impl Disjunction {
    fn new(left_term: Term, right_term: Term, barrier: CutBarrier, mark: Mark) -> Self {
        Disjunction {
            left_term,
            right_term,
            current: None,
            on_right: false,
            barrier,
            mark,
            phase: Phase::Fresh,
        }
    }
}

impl Goal for Disjunction {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        match self.phase {
            Phase::Exhausted => return Ok(false),
            Phase::Fresh => {
                self.phase = Phase::Active;
                self.mark = machine_st.heap.mark();

                let mut left = goal_for(machine_st, &self.left_term, self.barrier)?;

                if left.evaluate(machine_st)? {
                    self.current = Some(left);
                    return Ok(true);
                }
            }
            Phase::Active => {
                if let Some(current) = self.current.as_mut() {
                    if current.could_reevaluation_succeed() && current.evaluate(machine_st)? {
                        return Ok(true);
                    }
                }

                self.current = None;
            }
        }

        machine_st.heap.undo_to(self.mark);

        if !self.on_right {
            self.on_right = true;

            let mut right = goal_for(machine_st, &self.right_term, self.barrier)?;

            if right.evaluate(machine_st)? {
                self.current = Some(right);
                return Ok(true);
            }
        }

        self.phase = Phase::Exhausted;
        machine_st.heap.undo_to(self.mark);

        Ok(false)
    }

    fn could_reevaluation_succeed(&self) -> bool {
        match self.phase {
            Phase::Active if !self.on_right => true,
            Phase::Active => self
                .current
                .as_ref()
                .map_or(false, |goal| goal.could_reevaluation_succeed()),
            _ => false,
        }
    }
}

/// `(C -> T ; E)` and `(C -> T)`. The condition is opaque to cut and
/// committed to its first solution; the branches are transparent.
pub struct IfThenElse {
    cond: Term,
    then: Term,
    otherwise: Option<Term>,
    branch: Option<Box<dyn Goal>>,
    barrier: CutBarrier,
    mark: Mark,
    phase: Phase,
}

impl IfThenElse {
    fn new(cond: Term, then: Term, otherwise: Option<Term>, barrier: CutBarrier, mark: Mark) -> Self {
        IfThenElse {
            cond,
            then,
            otherwise,
            branch: None,
            barrier,
            mark,
            phase: Phase::Fresh,
        }
    }

    fn exhaust(&mut self, machine_st: &mut MachineState) -> EvalResult {
        self.phase = Phase::Exhausted;
        self.branch = None;
        machine_st.heap.undo_to(self.mark);

        Ok(false)
    }
}

impl Goal for IfThenElse {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        match self.phase {
            Phase::Exhausted => Ok(false),
            Phase::Fresh => {
                self.phase = Phase::Active;
                self.mark = machine_st.heap.mark();

                let cond_barrier = machine_st.fresh_barrier();
                let mut cond = CallGoal::new(self.cond.clone(), cond_barrier);

                let branch = if cond.evaluate(machine_st)? {
                    // commit: the condition's alternatives go, its bindings stay.
                    drop(cond);
                    self.then.clone()
                } else {
                    match self.otherwise.clone() {
                        Some(otherwise) => otherwise,
                        None => return self.exhaust(machine_st),
                    }
                };

                let mut branch = goal_for(machine_st, &branch, self.barrier)?;

                if branch.evaluate(machine_st)? {
                    self.branch = Some(branch);
                    Ok(true)
                } else {
                    self.exhaust(machine_st)
                }
            }
            Phase::Active => {
                if let Some(branch) = self.branch.as_mut() {
                    if branch.could_reevaluation_succeed() && branch.evaluate(machine_st)? {
                        return Ok(true);
                    }
                }

                self.exhaust(machine_st)
            }
        }
    }

    fn could_reevaluation_succeed(&self) -> bool {
        self.phase == Phase::Active
            && self
                .branch
                .as_ref()
                .map_or(false, |branch| branch.could_reevaluation_succeed())
    }
}

/// `\+ G`: succeeds, binding nothing, iff `G` has no solution.
pub struct NotProvable {
    goal: Term,
    evaluated: bool,
}

impl NotProvable {
    fn new(goal: Term) -> Self {
        NotProvable {
            goal,
            evaluated: false,
        }
    }
}

impl Goal for NotProvable {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        if std::mem::replace(&mut self.evaluated, true) {
            return Ok(false);
        }

        Ok(!machine_st.has_solution(&self.goal)?)
    }

    fn could_reevaluation_succeed(&self) -> bool {
        false
    }
}

/// `call/N`: runs a goal term behind its own cut barrier, so a cut
/// inside it only prunes the alternatives of the call.
pub struct CallGoal {
    goal: Term,
    inner: Option<Box<dyn Goal>>,
    barrier: CutBarrier,
    mark: Option<Mark>,
    exhausted: bool,
}

impl CallGoal {
    pub(crate) fn new(goal: Term, barrier: CutBarrier) -> Self {
        CallGoal {
            goal,
            inner: None,
            barrier,
            mark: None,
            exhausted: false,
        }
    }

    fn exhaust(&mut self, machine_st: &mut MachineState) -> EvalResult {
        self.exhausted = true;
        self.inner = None;

        if let Some(mark) = self.mark {
            machine_st.heap.undo_to(mark);
        }

        Ok(false)
    }
}

impl Goal for CallGoal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        if self.exhausted {
            return Ok(false);
        }

        let result = match self.inner.as_mut() {
            Some(inner) if inner.could_reevaluation_succeed() => inner.evaluate(machine_st),
            Some(_) => Ok(false),
            None => {
                self.mark = Some(machine_st.heap.mark());

                let mut inner = goal_for(machine_st, &self.goal, self.barrier)?;
                let result = inner.evaluate(machine_st);

                self.inner = Some(inner);
                result
            }
        };

        match result {
            Ok(true) => Ok(true),
            Ok(false) => self.exhaust(machine_st),
            Err(Unwind::Cut(barrier)) if barrier == self.barrier => self.exhaust(machine_st),
            Err(unwind) => Err(unwind),
        }
    }

    fn could_reevaluation_succeed(&self) -> bool {
        !self.exhausted
            && self
                .inner
                .as_ref()
                .map_or(true, |inner| inner.could_reevaluation_succeed())
    }
}

/// Adapts a deterministic built-in to the goal protocol.
pub struct DeterministicGoal {
    f: Arc<DeterministicFn>,
    args: Vec<Term>,
    mark: Mark,
    evaluated: bool,
}

impl DeterministicGoal {
    pub(crate) fn new(f: Arc<DeterministicFn>, args: Vec<Term>, mark: Mark) -> Self {
        DeterministicGoal {
            f,
            args,
            mark,
            evaluated: false,
        }
    }
}

impl Goal for DeterministicGoal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        if self.evaluated {
            machine_st.heap.undo_to(self.mark);
            return Ok(false);
        }

        self.evaluated = true;
        self.mark = machine_st.heap.mark();

        let succeeded = (self.f)(machine_st, &self.args)?;

        if !succeeded {
            machine_st.heap.undo_to(self.mark);
        }

        Ok(succeeded)
    }

    fn could_reevaluation_succeed(&self) -> bool {
        false
    }
}

/// Where the clauses of a user predicate come from for one call.
pub(crate) enum ClauseSource {
    Static(Arc<CompiledPredicate>),
    /// The dynamic clause list as of the call: clauses asserted or
    /// retracted while the call is active do not affect it.
    Dynamic(ClauseSnapshot),
}

impl ClauseSource {
    #[inline]
    fn clause(&self, index: usize) -> &ClassifiedClause {
        match self {
            ClauseSource::Static(pred) => &pred.clauses[index],
            ClauseSource::Dynamic(snapshot) => &*snapshot[index],
        }
    }

    #[inline]
    fn len(&self) -> usize {
        match self {
            ClauseSource::Static(pred) => pred.clauses.len(),
            ClauseSource::Dynamic(snapshot) => snapshot.len(),
        }
    }
}

/// A call to a user predicate: tries the candidate clauses in order,
/// resuming the choice points of the current clause's body before
/// moving on to the next clause.
pub struct UserGoal {
    source: ClauseSource,
    key: PredicateKey,
    call: Term,
    candidates: Option<Arc<[usize]>>,
    next: usize,
    current: Option<usize>,
    body: Option<Box<dyn Goal>>,
    barrier: CutBarrier,
    mark: Mark,
    phase: Phase,
}

impl UserGoal {
    pub(crate) fn new(
        source: ClauseSource,
        key: PredicateKey,
        call: Term,
        barrier: CutBarrier,
        mark: Mark,
    ) -> Self {
        UserGoal {
            source,
            key,
            call,
            candidates: None,
            next: 0,
            current: None,
            body: None,
            barrier,
            mark,
            phase: Phase::Fresh,
        }
    }

    fn has_more_candidates(&self) -> bool {
        match &self.candidates {
            Some(candidates) => self.next < candidates.len(),
            None => self.next < self.source.len(),
        }
    }

    fn next_candidate(&mut self) -> Option<usize> {
        let index = match &self.candidates {
            Some(candidates) => *candidates.get(self.next)?,
            None if self.next < self.source.len() => self.next,
            None => return None,
        };

        self.next += 1;
        Some(index)
    }

    fn annotate(&self, error: EngineError) -> EngineError {
        match self.current {
            Some(index) => error.in_clause(self.source.clause(index).clause()),
            None => error,
        }
    }

    fn exhaust(&mut self, machine_st: &mut MachineState, port: Port) -> EvalResult {
        self.phase = Phase::Exhausted;
        self.body = None;
        machine_st.heap.undo_to(self.mark);
        machine_st.report(port, self.key, &self.call, self.current);

        Ok(false)
    }

    fn unwind(&mut self, machine_st: &mut MachineState, unwind: Unwind) -> EvalResult {
        match unwind {
            Unwind::Cut(barrier) if barrier == self.barrier => self.exhaust(machine_st, Port::Cut),
            Unwind::Error(error) => Err(Unwind::Error(self.annotate(error))),
            unwind => Err(unwind),
        }
    }

    fn exit(&self, machine_st: &MachineState) -> EvalResult {
        machine_st.report(Port::Exit, self.key, &self.call, self.current);
        Ok(true)
    }
}

impl Goal for UserGoal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        match self.phase {
            Phase::Exhausted => return Ok(false),
            Phase::Fresh => {
                self.phase = Phase::Active;
                self.mark = machine_st.heap.mark();

                if let ClauseSource::Static(pred) = &self.source {
                    self.candidates = Some(pred.candidates(&machine_st.heap, self.call.args()));
                }

                machine_st.report(Port::Call, self.key, &self.call, None);
            }
            Phase::Active => {
                machine_st.report(Port::Redo, self.key, &self.call, self.current);

                if let Some(body) = self.body.as_mut() {
                    if body.could_reevaluation_succeed() {
                        match body.evaluate(machine_st) {
                            Ok(true) => return self.exit(machine_st),
                            Ok(false) => {}
                            Err(unwind) => return self.unwind(machine_st, unwind),
                        }
                    }
                }

                self.body = None;
            }
        }

        loop {
            machine_st.heap.undo_to(self.mark);

            let Some(index) = self.next_candidate() else {
                return self.exhaust(machine_st, Port::Fail);
            };

            self.current = Some(index);

            let outcome = self
                .source
                .clause(index)
                .try_match(&mut machine_st.heap, self.call.args());

            match outcome {
                Match::Fail => continue,
                Match::Fact => return self.exit(machine_st),
                Match::Body(body) => {
                    let mut goal = match goal_for(machine_st, &body, self.barrier) {
                        Ok(goal) => goal,
                        Err(error) => return Err(Unwind::Error(self.annotate(error))),
                    };

                    match goal.evaluate(machine_st) {
                        Ok(true) => {
                            self.body = Some(goal);
                            return self.exit(machine_st);
                        }
                        Ok(false) => continue,
                        Err(unwind) => {
                            drop(goal);
                            return self.unwind(machine_st, unwind);
                        }
                    }
                }
            }
        }
    }

    fn could_reevaluation_succeed(&self) -> bool {
        self.phase == Phase::Active
            && (self.has_more_candidates()
                || self
                    .body
                    .as_ref()
                    .map_or(false, |body| body.could_reevaluation_succeed()))
    }
}
