use std::collections::BTreeMap;

use crate::atom_table::*;
use crate::forms::*;
use crate::machine::copier::*;
use crate::machine::dispatch::*;
use crate::machine::machine_errors::*;
use crate::machine::machine_state::*;
use crate::machine::{Goal, Machine};
use crate::parser::{read_program, read_term, ReadTerm};
use crate::types::*;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};


/// Represents a leaf answer from a query.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafAnswer {
    /// A `true` leaf answer.
    True,
    /// A `false` leaf answer.
    ///
    /// This means that the query has no answers at all.
    False,
    /// A leaf answer with bindings.
    #[non_exhaustive]
    LeafAnswer {
        /// The bindings of variables in the query.
        bindings: BTreeMap<String, Term>,
    },
}

impl LeafAnswer {
    /// Creates a leaf answer from its bindings.
    pub fn from_bindings<S: Into<String>>(bindings: impl IntoIterator<Item = (S, Term)>) -> Self {
        LeafAnswer::LeafAnswer {
            bindings: bindings.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// The binding of `name`, if the answer has one.
    pub fn get(&self, name: &str) -> Option<&Term> {
        match self {
            LeafAnswer::LeafAnswer { bindings } => bindings.get(name),
            _ => None,
        }
    }
}

impl Serialize for LeafAnswer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LeafAnswer::True => serializer.serialize_bool(true),
            LeafAnswer::False => serializer.serialize_bool(false),
            LeafAnswer::LeafAnswer { bindings } => bindings.serialize(serializer),
        }
    }
}

struct Structure<'a> {
    name: Atom,
    args: &'a [Term],
}

impl Serialize for Structure<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;

        map.serialize_entry("functor", self.name.as_str())?;
        map.serialize_entry("args", self.args)?;

        map.end()
    }
}

/// Serializes a detached term. Atoms become strings, numbers numbers
/// and proper lists arrays; other structures become
/// `{"functor": .., "args": [..]}` and variables `{"var": n}`.
impl Serialize for Term {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Term::Var(var) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("var", &var.0)?;
                map.end()
            }
            Term::Atom(atom) => serializer.serialize_str(atom.as_str()),
            Term::Integer(n) => serializer.serialize_i64(*n),
            Term::Float(f) => serializer.serialize_f64(f.into_inner()),
            Term::EmptyList => serializer.serialize_seq(Some(0))?.end(),
            Term::List(cons) => {
                let mut items = self.list_iter();
                items.by_ref().for_each(drop);

                if *items.rest() == Term::EmptyList {
                    let mut seq = serializer.serialize_seq(None)?;

                    for item in self.list_iter() {
                        seq.serialize_element(item)?;
                    }

                    seq.end()
                } else {
                    Structure {
                        name: atom!("."),
                        args: cons.cells(),
                    }
                    .serialize(serializer)
                }
            }
            Term::Compound(c) => Structure {
                name: c.name(),
                args: c.args(),
            }
            .serialize(serializer),
        }
    }
}

/// The answers to a query, computed one at a time as the iterator is
/// advanced. The query owns its state and shares only the program with
/// the [`Machine`] it came from.
pub struct QueryState {
    machine_st: MachineState,
    query: Option<Term>,
    goal: Option<Box<dyn Goal>>,
    var_names: Vec<(String, Term)>,
    barrier: CutBarrier,
    pending: Option<EngineError>,
    answered: bool,
    done: bool,
}

impl std::fmt::Debug for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryState")
            .field("machine_st", &self.machine_st)
            .field("var_names", &self.var_names)
            .field("answered", &self.answered)
            .field("done", &self.done)
            .finish()
    }
}

impl QueryState {
    fn new(machine: &Machine, read: Result<ReadTerm, EngineError>) -> Self {
        let mut machine_st = MachineState::new(machine.indices.clone());
        let barrier = machine_st.fresh_barrier();

        let mut query_st = QueryState {
            machine_st,
            query: None,
            goal: None,
            var_names: vec![],
            barrier,
            pending: None,
            answered: false,
            done: false,
        };

        match read {
            Ok(read) => {
                let mut env = VarMap::new(read.var_count);

                for index in 0..read.var_count {
                    let var = query_st.machine_st.fresh_var();
                    env.set(VarId(index as u32), var);
                }

                query_st.var_names = read
                    .var_names
                    .iter()
                    .filter_map(|(name, var)| Some((name.clone(), env.get(*var)?.clone())))
                    .collect();

                query_st.query = Some(query_st.machine_st.heap.instantiate(&read.term, &mut env));
            }
            Err(error) => query_st.pending = Some(error),
        }

        query_st
    }

    fn answer(&self) -> LeafAnswer {
        let mut detacher = Detacher::new();
        let mut bindings = BTreeMap::new();

        for (name, var) in &self.var_names {
            if name.starts_with('_') || self.machine_st.heap.deref(var).is_var() {
                continue;
            }

            bindings.insert(name.clone(), detacher.detach(&self.machine_st.heap, var));
        }

        if bindings.is_empty() {
            LeafAnswer::True
        } else {
            LeafAnswer::LeafAnswer { bindings }
        }
    }

    fn step(&mut self) -> EvalResult {
        match self.goal.as_mut() {
            Some(goal) if goal.could_reevaluation_succeed() => goal.evaluate(&mut self.machine_st),
            Some(_) => Ok(false),
            None => {
                let Some(query) = self.query.take() else {
                    return Ok(false);
                };

                let mut goal = goal_for(&mut self.machine_st, &query, self.barrier)?;
                let result = goal.evaluate(&mut self.machine_st);

                self.goal = Some(goal);
                result
            }
        }
    }
}

impl Iterator for QueryState {
    type Item = Result<LeafAnswer, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(error) = self.pending.take() {
            self.done = true;
            return Some(Err(error));
        }

        match self.step() {
            Ok(true) => {
                self.answered = true;
                Some(Ok(self.answer()))
            }
            Ok(false) | Err(Unwind::Cut(_)) => {
                self.done = true;
                self.goal = None;

                if self.answered {
                    None
                } else {
                    Some(Ok(LeafAnswer::False))
                }
            }
            Err(Unwind::Error(error)) => {
                tracing::debug!(%error, "query raised an error");

                self.done = true;
                self.goal = None;

                Some(Err(error))
            }
        }
    }
}

impl std::iter::FusedIterator for QueryState {}

// the predicate indicators of a `dynamic`, `table` or `discontiguous`
// directive: `F/N`, a comma list of them or a list of them.
fn predicate_indicators(term: &Term) -> Result<Vec<PredicateKey>, EngineError> {
    let mut keys = vec![];
    let mut stack = vec![term];

    while let Some(term) = stack.pop() {
        match term {
            Term::Var(_) => return Err(EngineError::Instantiation),
            Term::EmptyList => {}
            Term::List(cons) => {
                stack.push(cons.tail());
                stack.push(cons.head());
            }
            _ if term.is_functor(atom!(","), 2) => {
                let args = term.args();

                stack.push(&args[1]);
                stack.push(&args[0]);
            }
            _ if term.is_functor(atom!("/"), 2) => match term.args() {
                [Term::Atom(name), Term::Integer(arity)] if *arity >= 0 => {
                    keys.push((*name, *arity as usize));
                }
                [Term::Var(_), _] | [_, Term::Var(_)] => return Err(EngineError::Instantiation),
                _ => {
                    return Err(EngineError::Domain {
                        expected: "predicate_indicator",
                        culprit: term.clone(),
                    })
                }
            },
            _ => {
                return Err(EngineError::Domain {
                    expected: "predicate_indicator",
                    culprit: term.clone(),
                })
            }
        }
    }

    Ok(keys)
}

impl Machine {
    /// Loads a program text: its clauses and its directives.
    /// `dynamic/1` and `table/1` declare predicates, `discontiguous/1`
    /// is accepted, `initialization/1` goals run once the whole text is
    /// loaded and any other directive runs when it is read. A syntax
    /// error anywhere loads nothing.
    pub fn consult(&self, program: &str) -> Result<(), EngineError> {
        let terms = read_program(program)?;

        let mut clauses = 0usize;
        let mut initialization = vec![];

        for read in terms {
            let term = &read.term;

            let directive = if term.is_functor(atom!(":-"), 1) || term.is_functor(atom!("?-"), 1) {
                term.args()[0].clone()
            } else {
                Clause::from_term(read.term, read.var_count).and_then(|clause| self.add_clause(clause))?;
                clauses += 1;
                continue;
            };

            match directive.name_and_arity() {
                Some((name, 1)) if name == atom!("dynamic") => {
                    for key in predicate_indicators(&directive.args()[0])? {
                        self.indices.declare_dynamic(key)?;
                    }
                }
                Some((name, 1)) if name == atom!("table") => {
                    for key in predicate_indicators(&directive.args()[0])? {
                        self.indices.declare_tabled(key)?;
                    }
                }
                Some((name, 1)) if name == atom!("discontiguous") => {
                    predicate_indicators(&directive.args()[0])?;
                }
                Some((name, 1)) if name.as_str() == "initialization" => {
                    initialization.push(ReadTerm {
                        term: directive.args()[0].clone(),
                        var_names: read.var_names,
                        var_count: read.var_count,
                    });
                }
                _ => self.run_directive(ReadTerm {
                    term: directive,
                    var_names: read.var_names,
                    var_count: read.var_count,
                })?,
            }
        }

        tracing::debug!(clauses, "consulted program");

        for goal in initialization {
            self.run_directive(goal)?;
        }

        Ok(())
    }

    // runs a directive goal for its first solution only.
    fn run_directive(&self, goal: ReadTerm) -> Result<(), EngineError> {
        let text = goal.term.to_string();

        match self.run_query_term(goal).next() {
            Some(Err(error)) => Err(error),
            Some(Ok(LeafAnswer::False)) | None => {
                tracing::warn!(directive = %text, "directive failed");
                Ok(())
            }
            Some(Ok(_)) => Ok(()),
        }
    }

    /// Runs a query given as text, with or without its final full stop.
    /// A syntax error is the iterator's only item.
    pub fn run_query(&self, query: impl Into<String>) -> QueryState {
        let query = query.into();
        let read = read_term(&query).map_err(EngineError::from);

        QueryState::new(self, read)
    }

    /// Runs an already parsed query.
    pub fn run_query_term(&self, query: ReadTerm) -> QueryState {
        QueryState::new(self, Ok(query))
    }

    /// Collects every answer to a query, stopping at the first error.
    pub fn query_all(&self, query: impl Into<String>) -> Result<Vec<LeafAnswer>, EngineError> {
        self.run_query(query).collect()
    }
}
