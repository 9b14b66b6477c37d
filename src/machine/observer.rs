use crate::forms::*;
use crate::types::*;

use std::fmt;

/// The points of a procedure box at which an observer is notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    Call,
    Redo,
    Exit,
    Fail,
    /// The activation was cut: it will produce no further solutions.
    Cut,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Port::Call => "call",
            Port::Redo => "redo",
            Port::Exit => "exit",
            Port::Fail => "fail",
            Port::Cut => "cut",
        };

        f.write_str(name)
    }
}

/// An event delivered to an observer. `goal` is the call with the
/// bindings current at the port substituted in; `clause` is the
/// position of the clause that was active, where there is one.
#[derive(Debug, Clone, Copy)]
pub struct PortEvent<'a> {
    pub port: Port,
    pub key: PredicateKey,
    pub goal: &'a Term,
    pub clause: Option<usize>,
}

/// Receives port events from every user predicate activation. An
/// observer only watches: it cannot alter the course of a query.
pub trait Observer: Send + Sync {
    fn port(&self, event: &PortEvent);
}

/// Forwards ports to `tracing` at the trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn port(&self, event: &PortEvent) {
        tracing::trace!(
            port = %event.port,
            predicate = %KeyDisplay(event.key),
            clause = ?event.clause,
            "{}",
            event.goal
        );
    }
}
