use crate::atom_table::*;
use crate::clause_types::*;
use crate::forms::*;
use crate::machine::dispatch::*;
use crate::machine::heap::*;
use crate::machine::machine_errors::*;
use crate::machine::machine_indices::*;
use crate::machine::machine_state::*;
use crate::machine::observer::*;
use crate::machine::Goal;
use crate::types::*;

use std::sync::Arc;

const BASE_CLAUSE: usize = 0;
const STEP_CLAUSE: usize = 1;

/// A predicate of the shape
///
/// ```text
/// p(...) :- Base.
/// p(...) :- Prefix, p(...).
/// ```
///
/// where neither `Base` nor `Prefix` calls `p` and `Prefix` does not
/// cut. Such a predicate runs as a loop over its argument frame. A cut
/// in `Base` commits the depth it ran at: the step clause is not tried
/// there, and backtracking resumes in the prefixes of shallower depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailLoop {
    prefix_len: usize,
}

fn calls_key(body: &Term, key: PredicateKey) -> bool {
    any_goal(body, &mut |goal| goal.name_and_arity() == Some(key))
}

fn calls_key_or_cuts(body: &Term, key: PredicateKey) -> bool {
    any_goal(body, &mut |goal| {
        goal.name_and_arity() == Some(key) || goal.is_functor(atom!("!"), 0)
    })
}

impl TailLoop {
    pub(crate) fn detect(key: PredicateKey, clauses: &[ClassifiedClause]) -> Option<TailLoop> {
        let [base, step] = clauses else {
            return None;
        };

        if calls_key(base.clause().body(), key) || step.clause().is_fact() {
            return None;
        }

        let goals = conjuncts(step.clause().body());
        let (last, prefix) = goals.split_last()?;

        if last.name_and_arity() != Some(key) {
            return None;
        }

        if prefix.iter().any(|goal| calls_key_or_cuts(goal, key)) {
            return None;
        }

        Some(TailLoop {
            prefix_len: prefix.len(),
        })
    }

    #[inline]
    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }
}

/// A prefix of the step clause that may still produce solutions. The
/// recursive call it led to is resumed from `last_call` when it does.
struct PrefixChoice {
    goal: Box<dyn Goal>,
    last_call: Term,
    frame_mark: Mark,
    after: Mark,
}

enum Step {
    Enter,
    ResumeBase,
    Recurse,
    Backtrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Active,
    Exhausted,
}

/// Runs a [`TailLoop`] predicate iteratively. The solutions and their
/// order are those of plain recursion, but a step whose prefix is
/// deterministic leaves nothing behind.
pub struct TailRecursiveGoal {
    pred: Arc<CompiledPredicate>,
    call: Term,
    current: Option<Term>,
    base: Option<Box<dyn Goal>>,
    stack: Vec<PrefixChoice>,
    barrier: CutBarrier,
    mark: Mark,
    frame_mark: Mark,
    phase: Phase,
    depth: usize,
}

impl TailRecursiveGoal {
    pub(crate) fn new(pred: Arc<CompiledPredicate>, call: Term, barrier: CutBarrier, mark: Mark) -> Self {
        TailRecursiveGoal {
            pred,
            call,
            current: None,
            base: None,
            stack: vec![],
            barrier,
            mark,
            frame_mark: mark,
            phase: Phase::Fresh,
            depth: 0,
        }
    }

    #[inline]
    fn clause(&self, index: usize) -> &ClassifiedClause {
        &self.pred.clauses[index]
    }

    fn fail(&mut self, error: EngineError, clause: usize) -> EvalResult {
        self.phase = Phase::Exhausted;
        let error = error.in_clause(self.clause(clause).clause());

        Err(Unwind::Error(error))
    }

    fn unwind(&mut self, machine_st: &mut MachineState, unwind: Unwind, clause: usize) -> EvalResult {
        match unwind {
            Unwind::Error(error) => self.fail(error, clause),
            Unwind::Cut(barrier) if barrier == self.barrier => self.exhaust(machine_st, Port::Cut),
            unwind => Err(unwind),
        }
    }

    // a cut in the base clause commits the current depth only.
    fn commit_base(&mut self, machine_st: &mut MachineState, unwind: Unwind) -> Result<Option<Step>, Unwind> {
        self.base = None;

        match unwind {
            Unwind::Cut(barrier) if barrier == self.barrier && !self.stack.is_empty() => {
                self.current = None;
                machine_st.heap.undo_to(self.frame_mark);

                Ok(Some(Step::Backtrack))
            }
            unwind => self.unwind(machine_st, unwind, BASE_CLAUSE).map(|_| None),
        }
    }

    fn exhaust(&mut self, machine_st: &mut MachineState, port: Port) -> EvalResult {
        self.phase = Phase::Exhausted;
        self.base = None;
        self.current = None;
        self.stack.clear();
        machine_st.heap.undo_to(self.mark);

        tracing::trace!(
            predicate = %KeyDisplay(self.pred.key),
            depth = self.depth,
            "tail loop exhausted"
        );

        machine_st.report(port, self.pred.key, &self.call, None);
        Ok(false)
    }

    fn exit(&self, machine_st: &MachineState) -> EvalResult {
        machine_st.report(Port::Exit, self.pred.key, &self.call, Some(BASE_CLAUSE));
        Ok(true)
    }

    // runs the step clause up to its recursive call.
    fn run_prefix(&mut self, machine_st: &mut MachineState, body: Term) -> Result<Step, Unwind> {
        let (prefix, last_call) = {
            let goals = conjuncts(&body);

            match goals.split_last() {
                Some((last, prefix)) => (conjunction(prefix), (*last).clone()),
                None => (Term::Atom(atom!("true")), body.clone()),
            }
        };

        drop(body);

        let mut goal = goal_for(machine_st, &prefix, self.barrier)?;

        if !goal.evaluate(machine_st)? {
            drop(goal);
            drop(last_call);

            machine_st.heap.undo_to(self.frame_mark);
            return Ok(Step::Backtrack);
        }

        if goal.could_reevaluation_succeed() {
            self.stack.push(PrefixChoice {
                goal,
                last_call: last_call.clone(),
                frame_mark: self.frame_mark,
                after: machine_st.heap.mark(),
            });
        }

        self.depth += 1;
        self.current = Some(last_call);

        Ok(Step::Enter)
    }
}

impl Goal for TailRecursiveGoal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        let mut step = match self.phase {
            Phase::Exhausted => return Ok(false),
            Phase::Fresh => {
                self.phase = Phase::Active;
                self.mark = machine_st.heap.mark();
                self.current = Some(self.call.clone());

                machine_st.report(Port::Call, self.pred.key, &self.call, None);
                Step::Enter
            }
            Phase::Active => {
                machine_st.report(Port::Redo, self.pred.key, &self.call, None);

                match &self.base {
                    Some(base) if base.could_reevaluation_succeed() => Step::ResumeBase,
                    _ => Step::Recurse,
                }
            }
        };

        loop {
            step = match step {
                Step::Enter => {
                    self.frame_mark = machine_st.heap.mark();

                    let Some(current) = self.current.clone() else {
                        return self.exhaust(machine_st, Port::Fail);
                    };

                    let outcome = self
                        .clause(BASE_CLAUSE)
                        .try_match(&mut machine_st.heap, current.args());

                    match outcome {
                        Match::Fail => Step::Recurse,
                        Match::Fact => {
                            self.base = None;
                            return self.exit(machine_st);
                        }
                        Match::Body(body) => {
                            let mut goal = match goal_for(machine_st, &body, self.barrier) {
                                Ok(goal) => goal,
                                Err(error) => return self.fail(error, BASE_CLAUSE),
                            };

                            match goal.evaluate(machine_st) {
                                Ok(true) => {
                                    self.base = Some(goal);
                                    return self.exit(machine_st);
                                }
                                Ok(false) => Step::Recurse,
                                Err(unwind) => {
                                    drop(goal);

                                    match self.commit_base(machine_st, unwind)? {
                                        Some(step) => step,
                                        None => return Ok(false),
                                    }
                                }
                            }
                        }
                    }
                }
                Step::ResumeBase => {
                    let result = match self.base.as_mut() {
                        Some(base) => base.evaluate(machine_st),
                        None => Ok(false),
                    };

                    match result {
                        Ok(true) => return self.exit(machine_st),
                        Ok(false) => Step::Recurse,
                        Err(unwind) => match self.commit_base(machine_st, unwind)? {
                            Some(step) => step,
                            None => return Ok(false),
                        },
                    }
                }
                Step::Recurse => {
                    self.base = None;
                    machine_st.heap.undo_to(self.frame_mark);

                    let Some(current) = self.current.take() else {
                        return self.exhaust(machine_st, Port::Fail);
                    };

                    let outcome = self
                        .clause(STEP_CLAUSE)
                        .try_match(&mut machine_st.heap, current.args());

                    drop(current);

                    match outcome {
                        Match::Body(body) => match self.run_prefix(machine_st, body) {
                            Ok(step) => step,
                            Err(unwind) => return self.unwind(machine_st, unwind, STEP_CLAUSE),
                        },
                        Match::Fail | Match::Fact => {
                            machine_st.heap.undo_to(self.frame_mark);
                            Step::Backtrack
                        }
                    }
                }
                Step::Backtrack => {
                    self.base = None;
                    self.current = None;

                    let Some(mut choice) = self.stack.pop() else {
                        return self.exhaust(machine_st, Port::Fail);
                    };

                    machine_st.heap.undo_to(choice.after);

                    match choice.goal.evaluate(machine_st) {
                        Ok(true) => {
                            self.current = Some(choice.last_call.clone());

                            if choice.goal.could_reevaluation_succeed() {
                                choice.after = machine_st.heap.mark();
                                self.stack.push(choice);
                            }

                            Step::Enter
                        }
                        Ok(false) => {
                            let frame_mark = choice.frame_mark;

                            drop(choice);
                            machine_st.heap.undo_to(frame_mark);

                            Step::Backtrack
                        }
                        Err(unwind) => {
                            drop(choice);
                            return self.unwind(machine_st, unwind, STEP_CLAUSE);
                        }
                    }
                }
            };
        }
    }

    fn could_reevaluation_succeed(&self) -> bool {
        self.phase == Phase::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read_clause;

    fn classified(clauses: &[&str]) -> Vec<ClassifiedClause> {
        clauses
            .iter()
            .map(|text| ClassifiedClause::new(read_clause(text).unwrap()))
            .collect()
    }

    fn detect(clauses: &[&str]) -> Option<TailLoop> {
        let clauses = classified(clauses);
        TailLoop::detect(clauses[0].clause().key(), &clauses)
    }

    #[test]
    fn accumulator_loops_are_detected() {
        let tail_loop = detect(&[
            "len([], N, N).",
            "len([_|T], N0, N) :- N1 is N0 + 1, len(T, N1, N).",
        ]);

        assert_eq!(tail_loop.map(|l| l.prefix_len()), Some(1));
    }

    #[test]
    fn a_cut_in_the_base_clause_is_allowed() {
        let tail_loop = detect(&["c(0) :- !.", "c(N) :- N1 is N - 1, c(N1)."]);
        assert_eq!(tail_loop.map(|l| l.prefix_len()), Some(1));

        let tail_loop = detect(&["w(N, N) :- !.", "w(N, M) :- N < M, between(1, 2, D), N1 is N + D, w(N1, M)."]);
        assert_eq!(tail_loop.map(|l| l.prefix_len()), Some(3));
    }

    #[test]
    fn other_shapes_are_left_alone() {
        // the recursive call is not last.
        assert!(detect(&["n([], 0).", "n([_|T], N) :- n(T, M), N is M + 1."]).is_none());

        // cut in the step clause.
        assert!(detect(&["c([]).", "c([_|T]) :- !, c(T)."]).is_none());

        // the step clause is not the recursive one.
        assert!(detect(&["d(N) :- N1 is N - 1, d(N1).", "d(0) :- !."]).is_none());

        // the base clause recurses.
        assert!(detect(&["b(X) :- b(X).", "b(X) :- b(X)."]).is_none());

        // three clauses.
        assert!(detect(&["t(a).", "t(b).", "t(X) :- t(X)."]).is_none());
    }
}
