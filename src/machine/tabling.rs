use crate::forms::*;
use crate::machine::copier::*;
use crate::machine::dispatch::*;
use crate::machine::heap::*;
use crate::machine::machine_errors::*;
use crate::machine::machine_indices::*;
use crate::machine::machine_state::*;
use crate::machine::Goal;
use crate::types::*;

use fxhash::{FxHashMap, FxHashSet};
use lru::LruCache;
use parking_lot::{Condvar, Mutex};

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// A table this query is generating. Tables nest as tabled calls do.
#[derive(Debug)]
pub struct TableFrame {
    key: Term,
    answers: Vec<Term>,
    seen: FxHashSet<Term>,
    /// A variant of the call was met while this frame was generating.
    reentered: bool,
    /// The answers read another frame's partial answers, so they may
    /// not be the whole set.
    incomplete: bool,
}

impl TableFrame {
    fn new(key: Term) -> Self {
        TableFrame {
            key,
            answers: vec![],
            seen: FxHashSet::default(),
            reentered: false,
            incomplete: false,
        }
    }

    fn record(&mut self, answer: Term) {
        if self.seen.insert(answer.clone()) {
            self.answers.push(answer);
        }
    }
}

#[derive(Debug)]
struct Pending {
    owner: ThreadId,
    done: Mutex<bool>,
    cond: Condvar,
}

impl Pending {
    fn new(owner: ThreadId) -> Self {
        Pending {
            owner,
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();

        while !*done {
            self.cond.wait(&mut done);
        }
    }

    fn publish(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }
}

lazy_static! {
    /// The thread each blocked table caller waits on, across every
    /// table of the process. Never cyclic.
    static ref WAITS_FOR: Mutex<FxHashMap<ThreadId, ThreadId>> = Mutex::new(FxHashMap::default());
}

// an edge of the wait-for graph, removed when the wait ends.
struct WaitEdge {
    waiter: ThreadId,
}

impl WaitEdge {
    /// `None` if `owner` is, directly or through other waiting
    /// threads, waiting on `waiter`.
    fn new(waiter: ThreadId, owner: ThreadId) -> Option<WaitEdge> {
        let mut waits = WAITS_FOR.lock();
        let mut next = Some(owner);

        while let Some(thread) = next {
            if thread == waiter {
                return None;
            }

            next = waits.get(&thread).copied();
        }

        waits.insert(waiter, owner);
        Some(WaitEdge { waiter })
    }
}

impl Drop for WaitEdge {
    fn drop(&mut self) {
        WAITS_FOR.lock().remove(&self.waiter);
    }
}

struct TableState {
    complete: LruCache<Term, Arc<[Term]>>,
    in_flight: FxHashMap<Term, Arc<Pending>>,
}

/// The answers of a tabled predicate, shared by every query of a
/// machine. Completed call variants are cached. One caller per variant
/// computes it while the others wait, unless waiting would deadlock.
pub struct AnswerTable {
    state: Mutex<TableState>,
}

impl fmt::Debug for AnswerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct("AnswerTable")
            .field("complete", &state.complete.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

enum Role {
    Cached(Arc<[Term]>),
    Wait(Arc<Pending>, WaitEdge),
    Lead(Arc<Pending>),
    Private,
}

// unregisters an in-flight computation however it ends.
struct InFlightGuard<'a> {
    table: &'a AnswerTable,
    key: Term,
    pending: Arc<Pending>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.table.state.lock().in_flight.remove(&self.key);
        self.pending.publish();
    }
}

impl AnswerTable {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        AnswerTable {
            state: Mutex::new(TableState {
                complete: LruCache::new(capacity),
                in_flight: FxHashMap::default(),
            }),
        }
    }

    fn role(&self, key: &Term) -> Role {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if let Some(answers) = state.complete.get(key) {
            return Role::Cached(answers.clone());
        }

        match state.in_flight.get(key) {
            Some(pending) => match WaitEdge::new(me, pending.owner) {
                Some(edge) => Role::Wait(pending.clone(), edge),
                // the owner waits on this thread, or is this thread.
                None => Role::Private,
            },
            None => {
                let pending = Arc::new(Pending::new(me));
                state.in_flight.insert(key.clone(), pending.clone());
                Role::Lead(pending)
            }
        }
    }

    fn publish(&self, key: Term, answers: Arc<[Term]>) {
        self.state.lock().complete.put(key, answers);
    }

    /// The number of completed call variants held.
    pub fn len(&self) -> usize {
        self.state.lock().complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs the clauses of a tabled predicate for `call` until no new
/// answers appear, returning the answers and whether they are the
/// complete set.
fn resolve_answers(
    machine_st: &mut MachineState,
    code: &StaticCode,
    key: PredicateKey,
    call: &Term,
    variant: Term,
) -> Result<(Vec<Term>, bool), EngineError> {
    let pred = code.compiled(&machine_st.indices.config);
    let depth = machine_st.tabling.len();

    machine_st.tabling.push(TableFrame::new(variant));

    let result = fixpoint(machine_st, &pred, key, call, depth);
    let frame = machine_st.tabling.pop();

    result?;

    match frame {
        Some(frame) => Ok((frame.answers, !frame.incomplete)),
        None => Ok((vec![], false)),
    }
}

fn fixpoint(
    machine_st: &mut MachineState,
    pred: &Arc<CompiledPredicate>,
    key: PredicateKey,
    call: &Term,
    depth: usize,
) -> Result<(), EngineError> {
    let mut rounds = 0usize;

    loop {
        let before = match machine_st.tabling.get_mut(depth) {
            Some(frame) => {
                frame.reentered = false;
                frame.answers.len()
            }
            None => return Ok(()),
        };

        let mark = machine_st.heap.mark();
        let barrier = machine_st.fresh_barrier();
        let source = ClauseSource::Static(pred.clone());
        let mut goal = UserGoal::new(source, key, call.clone(), barrier, mark);

        let result = loop {
            match goal.evaluate(machine_st) {
                Ok(true) => {
                    let (answer, _) = detach(&machine_st.heap, call);

                    if let Some(frame) = machine_st.tabling.get_mut(depth) {
                        frame.record(answer);
                    }

                    if !goal.could_reevaluation_succeed() {
                        break Ok(());
                    }
                }
                Ok(false) | Err(Unwind::Cut(_)) => break Ok(()),
                Err(Unwind::Error(error)) => break Err(error),
            }
        };

        drop(goal);
        machine_st.heap.undo_to(mark);
        result?;

        rounds += 1;

        let Some(frame) = machine_st.tabling.get(depth) else {
            return Ok(());
        };

        if !frame.reentered || frame.answers.len() == before {
            tracing::trace!(
                predicate = %KeyDisplay(key),
                rounds,
                answers = frame.answers.len(),
                "fixpoint reached"
            );

            return Ok(());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Active,
    Exhausted,
}

/// A call to a tabled predicate. Its answers are all found when it is
/// first evaluated; they are then handed out one at a time.
pub struct TabledGoal {
    entry: Arc<PredicateEntry>,
    key: PredicateKey,
    call: Term,
    answers: Arc<[Term]>,
    next: usize,
    mark: Mark,
    phase: Phase,
}

impl TabledGoal {
    pub(crate) fn new(entry: Arc<PredicateEntry>, key: PredicateKey, call: Term, mark: Mark) -> Self {
        TabledGoal {
            entry,
            key,
            call,
            answers: Arc::from(vec![]),
            next: 0,
            mark,
            phase: Phase::Fresh,
        }
    }

    fn answers(&self, machine_st: &mut MachineState) -> Result<Arc<[Term]>, EngineError> {
        let PredicateEntry::Tabled(code, table) = &*self.entry else {
            return Ok(Arc::from(vec![]));
        };

        let (variant, _) = detach(&machine_st.heap, &self.call);

        // a variant of a call this query is generating: read the
        // answers found so far.
        let reentered = machine_st
            .tabling
            .iter()
            .position(|frame| frame.key == variant);

        if let Some(position) = reentered {
            let frames = &mut machine_st.tabling[position..];

            frames[0].reentered = true;

            for frame in &mut frames[1..] {
                frame.incomplete = true;
            }

            return Ok(Arc::from(frames[0].answers.clone()));
        }

        loop {
            match table.role(&variant) {
                Role::Cached(answers) => return Ok(answers),
                Role::Wait(pending, edge) => {
                    tracing::debug!(
                        predicate = %KeyDisplay(self.key),
                        call = %variant,
                        "waiting for table"
                    );

                    pending.wait();
                    drop(edge);
                }
                Role::Lead(pending) => {
                    let _guard = InFlightGuard {
                        table,
                        key: variant.clone(),
                        pending,
                    };

                    tracing::debug!(
                        predicate = %KeyDisplay(self.key),
                        call = %variant,
                        "generating table"
                    );

                    let (answers, complete) =
                        resolve_answers(machine_st, code, self.key, &self.call, variant.clone())?;
                    let answers: Arc<[Term]> = Arc::from(answers);

                    if complete {
                        tracing::debug!(
                            predicate = %KeyDisplay(self.key),
                            call = %variant,
                            answers = answers.len(),
                            "table complete"
                        );

                        table.publish(variant, answers.clone());
                    }

                    return Ok(answers);
                }
                Role::Private => {
                    tracing::debug!(
                        predicate = %KeyDisplay(self.key),
                        call = %variant,
                        "generating table privately"
                    );

                    let (answers, _) =
                        resolve_answers(machine_st, code, self.key, &self.call, variant)?;

                    return Ok(Arc::from(answers));
                }
            }
        }
    }
}

impl Goal for TabledGoal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult {
        match self.phase {
            Phase::Exhausted => return Ok(false),
            Phase::Fresh => {
                self.phase = Phase::Active;
                self.answers = self.answers(machine_st)?;
                self.mark = machine_st.heap.mark();
            }
            Phase::Active => machine_st.heap.undo_to(self.mark),
        }

        while let Some(answer) = self.answers.get(self.next) {
            self.next += 1;

            let instance = machine_st.heap.instantiate(answer, &mut VarMap::new(0));

            if machine_st.heap.unify(&instance, &self.call) {
                return Ok(true);
            }

            drop(instance);
            machine_st.heap.undo_to(self.mark);
        }

        self.phase = Phase::Exhausted;
        machine_st.heap.undo_to(self.mark);

        Ok(false)
    }

    fn could_reevaluation_succeed(&self) -> bool {
        self.phase == Phase::Active && self.next < self.answers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;

    #[test]
    fn frames_deduplicate_answers() {
        let mut frame = TableFrame::new(Term::compound("p", [Term::var(0)]));

        frame.record(Term::compound("p", [Term::integer(1)]));
        frame.record(Term::compound("p", [Term::integer(2)]));
        frame.record(Term::compound("p", [Term::integer(1)]));

        assert_eq!(frame.answers.len(), 2);
    }

    #[test]
    fn one_leader_per_variant() {
        let table = AnswerTable::new(NonZeroUsize::MIN);
        let key = Term::compound("p", [Term::var(0)]);

        let Role::Lead(pending) = table.role(&key) else {
            panic!("first caller must lead");
        };

        // the leader itself would wait forever.
        assert!(matches!(table.role(&key), Role::Private));

        thread::scope(|s| {
            let waits = s.spawn(|| matches!(table.role(&key), Role::Wait(..)));
            assert!(waits.join().unwrap());
        });

        drop(InFlightGuard {
            table: &table,
            key: key.clone(),
            pending,
        });

        // the leader gave up without publishing: the next caller leads.
        assert!(matches!(table.role(&key), Role::Lead(_)));
    }

    #[test]
    fn waits_that_close_a_cycle_compute_privately() {
        let table = AnswerTable::new(NonZeroUsize::new(4).unwrap());
        let (k1, k2) = (
            Term::compound("p", [Term::var(0)]),
            Term::compound("q", [Term::var(0)]),
        );

        let Role::Lead(_p1) = table.role(&k1) else {
            panic!("first caller must lead");
        };

        let (waiting_tx, waiting_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        thread::scope(|s| {
            let (table, k1, k2) = (&table, &k1, &k2);

            s.spawn(move || {
                let Role::Lead(_p2) = table.role(k2) else {
                    panic!("first caller must lead");
                };

                let role = table.role(k1);
                waiting_tx.send(matches!(role, Role::Wait(..))).unwrap();
                done_rx.recv().unwrap();
            });

            assert!(waiting_rx.recv().unwrap());

            // the other thread waits on this one
            assert!(matches!(table.role(k2), Role::Private));
            done_tx.send(()).unwrap();
        });
    }

    #[test]
    fn published_answers_are_cached() {
        let table = AnswerTable::new(NonZeroUsize::MIN);
        let key = Term::compound("p", [Term::var(0)]);
        let answers: Arc<[Term]> = Arc::from(vec![Term::compound("p", [Term::integer(1)])]);

        table.publish(key.clone(), answers);

        assert_eq!(table.len(), 1);
        assert!(matches!(table.role(&key), Role::Cached(a) if a.len() == 1));
    }
}
