use crate::atom_table::*;
use crate::forms::*;
use crate::parser::ParserError;
use crate::types::*;

use std::fmt;

use thiserror::Error;

// from 7.12.2 b) of 13211-1:1995
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidType {
    Atom,
    Atomic,
    Callable,
    Compound,
    Evaluable,
    Integer,
    List,
    Number,
}

impl ValidType {
    pub fn as_atom(self) -> Atom {
        match self {
            ValidType::Atom => atom!("atom"),
            ValidType::Atomic => atom!("atomic"),
            ValidType::Callable => atom!("callable"),
            ValidType::Compound => atom!("compound"),
            ValidType::Evaluable => atom!("evaluable"),
            ValidType::Integer => atom!("integer"),
            ValidType::List => atom!("list"),
            ValidType::Number => atom!("number"),
        }
    }
}

impl fmt::Display for ValidType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_atom())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("zero divisor")]
    ZeroDivisor,
    #[error("integer overflow")]
    IntOverflow,
    #[error("float overflow")]
    FloatOverflow,
    #[error("undefined result")]
    Undefined,
}

/// Errors that abort a query. Logical failure is never an error; it
/// is an `Ok(false)` from `Goal::evaluate`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("instantiation error")]
    Instantiation,
    #[error("type error: expected {expected}, found {culprit}")]
    Type { expected: ValidType, culprit: Term },
    #[error("domain error: expected {expected}, found {culprit}")]
    Domain { expected: &'static str, culprit: Term },
    #[error("evaluation error: {0}")]
    Evaluation(EvalError),
    #[error("existence error: unknown procedure {}", display_key(.0))]
    UnknownProcedure(PredicateKey),
    #[error("permission error: cannot modify static procedure {}", display_key(.0))]
    StaticProcedure(PredicateKey),
    #[error("permission error: {} is already defined as {}", display_key(.0), .1)]
    Redeclared(PredicateKey, &'static str),
    #[error(transparent)]
    Syntax(#[from] ParserError),
    #[error("{source}\n    in clause: {clause}")]
    InClause {
        clause: String,
        source: Box<EngineError>,
    },
}

fn display_key(key: &PredicateKey) -> KeyDisplay {
    KeyDisplay(*key)
}

impl EngineError {
    #[inline]
    pub(crate) fn type_error(expected: ValidType, culprit: Term) -> Self {
        EngineError::Type { expected, culprit }
    }

    /// Attaches the clause an error escaped from. Only the innermost
    /// clause is recorded.
    pub(crate) fn in_clause(self, clause: &Clause) -> Self {
        match self {
            EngineError::InClause { .. } => self,
            error => EngineError::InClause {
                clause: clause.to_string(),
                source: Box::new(error),
            },
        }
    }

    /// The error with any clause annotations stripped.
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::InClause { source, .. } => source.root_cause(),
            error => error,
        }
    }
}

impl From<EvalError> for EngineError {
    fn from(error: EvalError) -> Self {
        EngineError::Evaluation(error)
    }
}

/// Identifies the clause activation a cut belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CutBarrier(pub(crate) u64);

/// Non-local exits from `Goal::evaluate`. A cut unwinds only as far as
/// the activation owning its barrier; errors unwind the whole query.
#[derive(Debug)]
pub enum Unwind {
    Cut(CutBarrier),
    Error(EngineError),
}

impl From<EngineError> for Unwind {
    #[inline]
    fn from(error: EngineError) -> Self {
        Unwind::Error(error)
    }
}

impl From<EvalError> for Unwind {
    #[inline]
    fn from(error: EvalError) -> Self {
        Unwind::Error(EngineError::Evaluation(error))
    }
}

pub type EvalResult = Result<bool, Unwind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clause_annotation_is_innermost() {
        let inner = Clause::fact(Term::atom("inner"), 0).unwrap();
        let outer = Clause::fact(Term::atom("outer"), 0).unwrap();

        let error = EngineError::Instantiation.in_clause(&inner).in_clause(&outer);

        match &error {
            EngineError::InClause { clause, .. } => assert_eq!(clause, "inner"),
            _ => panic!("expected an annotated error"),
        }

        assert_eq!(error.root_cause(), &EngineError::Instantiation);
        assert!(error.to_string().contains("in clause: inner"));
    }

    #[test]
    fn messages() {
        let error = EngineError::UnknownProcedure((atom!("foo"), 2));
        assert_eq!(error.to_string(), "existence error: unknown procedure foo/2");

        let error = EngineError::type_error(ValidType::Evaluable, Term::atom("a"));
        assert_eq!(error.to_string(), "type error: expected evaluable, found a");
    }
}
