pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{ParserError, ReadTerm};

use crate::forms::Clause;
use crate::machine::machine_errors::EngineError;

use parser::Parser;

/// Reads exactly one term. The final full stop may be omitted.
pub fn read_term(src: &str) -> Result<ReadTerm, ParserError> {
    let mut parser = Parser::new(src)?;

    let term = parser.read_term()?.ok_or(ParserError::UnexpectedEof)?;

    parser.expect_eof()?;
    Ok(term)
}

/// Reads every clause of a program text.
pub fn read_program(src: &str) -> Result<Vec<ReadTerm>, ParserError> {
    let mut parser = Parser::new(src)?;
    let mut terms = vec![];

    while let Some(term) = parser.read_term()? {
        terms.push(term);
    }

    Ok(terms)
}

/// Reads one clause, `Head :- Body` or a fact.
pub fn read_clause(src: &str) -> Result<Clause, EngineError> {
    let read = read_term(src)?;
    Clause::from_term(read.term, read.var_count)
}
