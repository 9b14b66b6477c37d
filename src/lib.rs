//! The clause resolution core of a Prolog system: unification over a
//! trailed binding store, first-argument style indexing, goal objects
//! with cut, a loop for tail-recursive predicates and tabling shared
//! between threads.
#![recursion_limit = "4112"]

#[macro_use]
extern crate static_assertions;
#[macro_use]
extern crate lazy_static;

#[macro_use]
pub(crate) mod atom_table;
pub mod clause_types;
pub mod forms;
pub(crate) mod heap_print;
pub mod indexing;
pub(crate) mod machine;
pub mod parser;
pub mod types;

// Re-exports
pub use atom_table::Atom;
pub use forms::{AppendOrPrepend, Clause, PredicateKey};
pub use machine::arithmetic_ops::Number;
pub use machine::config::*;
pub use machine::copier::{detach, Detacher, VarMap};
pub use machine::dispatch::goal_for;
pub use machine::heap::{Heap, Mark};
pub use machine::lib_machine::*;
pub use machine::machine_errors::{CutBarrier, EngineError, EvalError, EvalResult, Unwind, ValidType};
pub use machine::machine_state::MachineState;
pub use machine::observer::{Observer, Port, PortEvent, TracingObserver};
pub use machine::system_calls::{Builtin, DeterministicFn, GoalFactory};
pub use machine::{Goal, Machine};
pub use parser::{read_clause, read_program, read_term, ParserError, ReadTerm};
pub use types::{Term, VarId};
