use crate::forms::*;
use crate::machine::dispatch::*;
use crate::machine::heap::*;
use crate::machine::machine_errors::*;
use crate::machine::machine_indices::*;
use crate::machine::observer::*;
use crate::machine::tabling::*;
use crate::machine::Goal;
use crate::types::*;

use std::fmt;
use std::sync::Arc;

/// The state of one running query: its heap and trail, the tables it
/// is currently generating and a source of fresh cut barriers. The
/// program itself is shared through `indices`.
pub struct MachineState {
    pub(crate) heap: Heap,
    pub(crate) indices: Arc<IndexStore>,
    pub(crate) tabling: Vec<TableFrame>,
    next_barrier: u64,
}

impl fmt::Debug for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineState")
            .field("heap", &self.heap.len())
            .field("trail", &self.heap.trail_len())
            .field("tabling", &self.tabling.len())
            .finish()
    }
}

impl MachineState {
    pub(crate) fn new(indices: Arc<IndexStore>) -> Self {
        MachineState {
            heap: Heap::new(),
            indices,
            tabling: vec![],
            next_barrier: 0,
        }
    }

    #[inline]
    pub(crate) fn fresh_barrier(&mut self) -> CutBarrier {
        self.next_barrier += 1;
        CutBarrier(self.next_barrier)
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[inline]
    pub fn unify(&mut self, a: &Term, b: &Term) -> bool {
        self.heap.unify(a, b)
    }

    /// The term `term` is bound to, or the unbound variable itself.
    #[inline]
    pub fn deref(&self, term: &Term) -> Term {
        self.heap.deref(term).clone()
    }

    #[inline]
    pub fn resolve(&self, term: &Term) -> Term {
        self.heap.resolve(term)
    }

    #[inline]
    pub fn fresh_var(&mut self) -> Term {
        self.heap.fresh_var()
    }

    pub(crate) fn report(
        &self,
        port: Port,
        key: PredicateKey,
        call: &Term,
        clause: Option<usize>,
    ) {
        if let Some(observer) = &self.indices.config.observer {
            let goal = self.heap.resolve(call);

            observer.port(&PortEvent {
                port,
                key,
                goal: &goal,
                clause,
            });
        }
    }

    /// Runs `goal` as `call/1` would, handing each solution to `f`
    /// until `f` returns false or the solutions run out. Bindings made
    /// by the goal are undone before returning.
    pub fn for_each_solution(
        &mut self,
        goal: &Term,
        mut f: impl FnMut(&mut MachineState) -> Result<bool, EngineError>,
    ) -> Result<(), EngineError> {
        let mark = self.heap.mark();
        let barrier = self.fresh_barrier();
        let mut call = CallGoal::new(goal.clone(), barrier);

        let result = loop {
            match call.evaluate(self) {
                Ok(true) => match f(self) {
                    Ok(true) if call.could_reevaluation_succeed() => {}
                    Ok(_) => break Ok(()),
                    Err(error) => break Err(error),
                },
                Ok(false) | Err(Unwind::Cut(_)) => break Ok(()),
                Err(Unwind::Error(error)) => break Err(error),
            }
        };

        drop(call);
        self.heap.undo_to(mark);

        result
    }

    /// Whether `goal` has a solution. Its bindings are undone.
    pub fn has_solution(&mut self, goal: &Term) -> Result<bool, EngineError> {
        let mut found = false;

        self.for_each_solution(goal, |_| {
            found = true;
            Ok(false)
        })?;

        Ok(found)
    }
}
