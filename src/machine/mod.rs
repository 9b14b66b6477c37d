pub mod arithmetic_ops;
pub mod config;
pub mod copier;
pub mod dispatch;
pub mod dynamic_database;
pub mod heap;
pub mod lib_machine;
pub mod machine_errors;
pub mod machine_indices;
pub mod machine_state;
pub mod observer;
pub mod system_calls;
pub mod tabling;
pub mod tail_recursion;
pub mod unify;

use crate::atom_table::*;
use crate::forms::*;
use crate::machine::machine_errors::*;
use crate::machine::machine_indices::*;
use crate::machine::machine_state::*;
use crate::machine::system_calls::*;
use crate::parser::*;

use std::sync::Arc;

/// A live goal: a resumable computation that yields its solutions one
/// `evaluate` at a time.
///
/// The first `evaluate` runs the goal; each further call backtracks
/// into it for the next solution. `Ok(true)` leaves the bindings of a
/// solution in place, `Ok(false)` means there are no more and that
/// every binding the goal made has been undone.
pub trait Goal {
    fn evaluate(&mut self, machine_st: &mut MachineState) -> EvalResult;

    /// Whether backtracking into the goal could produce another
    /// solution (or raise a cut). A `false` here lets the caller skip
    /// the goal and drop it. Only consulted after a successful
    /// `evaluate`.
    fn could_reevaluation_succeed(&self) -> bool;
}

/// A handle to a program: its predicates, built-ins and configuration.
/// Clones share the program, so queries may run on several threads at
/// once, each with its own [`QueryState`](crate::QueryState).
#[derive(Clone, Debug)]
pub struct Machine {
    pub(crate) indices: Arc<IndexStore>,
}

impl Default for Machine {
    fn default() -> Self {
        crate::MachineBuilder::default().build()
    }
}

impl Machine {
    /// Adds a clause to a static predicate, after the existing ones.
    /// Fails once the predicate has been called.
    pub fn add_clause(&self, clause: Clause) -> Result<(), EngineError> {
        self.indices.add_clause(clause)
    }

    /// Parses and adds a single clause.
    pub fn add_clause_str(&self, text: &str) -> Result<(), EngineError> {
        self.add_clause(read_clause(text)?)
    }

    pub fn declare_dynamic(&self, name: &str, arity: usize) -> Result<(), EngineError> {
        self.indices.declare_dynamic((atom!(name), arity))
    }

    pub fn declare_tabled(&self, name: &str, arity: usize) -> Result<(), EngineError> {
        self.indices.declare_tabled((atom!(name), arity))
    }

    /// Adds a clause to a dynamic predicate, creating it if needed.
    pub fn assert(&self, clause: Clause, append_or_prepend: AppendOrPrepend) -> Result<(), EngineError> {
        self.indices.assert(clause, append_or_prepend)
    }

    /// Registers a built-in under `name/arity`, replacing any earlier
    /// registration. Calls to it bypass the clause store.
    pub fn register_builtin(&self, name: &str, arity: usize, builtin: Builtin) {
        self.indices.register_builtin((atom!(name), arity), builtin);
    }

    /// Whether anything is defined under `name/arity`.
    pub fn is_defined(&self, name: &str, arity: usize) -> bool {
        let key = (atom!(name), arity);
        self.indices.lookup(&key).is_some() || self.indices.builtin(&key).is_some()
    }
}
