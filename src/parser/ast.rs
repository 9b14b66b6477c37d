use crate::types::*;

use indexmap::IndexMap;
use thiserror::Error;

pub const XFX: u32 = 0x0001;
pub const XFY: u32 = 0x0002;
pub const YFX: u32 = 0x0004;
pub const FX: u32 = 0x0010;
pub const FY: u32 = 0x0020;

pub type Specifier = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDesc {
    pub priority: usize,
    pub spec: Specifier,
}

impl OpDesc {
    #[inline]
    const fn new(priority: usize, spec: Specifier) -> Self {
        OpDesc { priority, spec }
    }

    /// Maximum priorities of the left and right operands.
    pub fn arg_priorities(self) -> (usize, usize) {
        let p = self.priority;

        match self.spec {
            XFY => (p - 1, p),
            YFX => (p, p - 1),
            FY => (0, p),
            FX => (0, p - 1),
            _ => (p - 1, p - 1),
        }
    }
}

/// The fixed operator table for infix operators.
pub fn infix_op(name: &str) -> Option<OpDesc> {
    let desc = match name {
        ":-" | "-->" => OpDesc::new(1200, XFX),
        ";" | "|" => OpDesc::new(1100, XFY),
        "->" | "*->" => OpDesc::new(1050, XFY),
        "," => OpDesc::new(1000, XFY),
        "=" | "\\=" | "==" | "\\==" | "@<" | "@>" | "@=<" | "@>=" | "=.." | "is" | "=:="
        | "=\\=" | "<" | ">" | "=<" | ">=" => OpDesc::new(700, XFX),
        "+" | "-" | "/\\" | "\\/" | "xor" => OpDesc::new(500, YFX),
        "*" | "/" | "//" | "rem" | "mod" | "div" | "<<" | ">>" => OpDesc::new(400, YFX),
        "**" => OpDesc::new(200, XFX),
        "^" => OpDesc::new(200, XFY),
        _ => return None,
    };

    Some(desc)
}

/// The fixed operator table for prefix operators.
pub fn prefix_op(name: &str) -> Option<OpDesc> {
    let desc = match name {
        ":-" | "?-" => OpDesc::new(1200, FX),
        "dynamic" | "table" | "discontiguous" | "initialization" => OpDesc::new(1150, FX),
        "\\+" => OpDesc::new(900, FY),
        "-" | "+" | "\\" => OpDesc::new(200, FY),
        _ => return None,
    };

    Some(desc)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParserError {
    #[error("syntax error: incomplete term at {0}:{1}")]
    IncompleteReduction(usize, usize),
    #[error("syntax error: integer out of range at {0}:{1}")]
    IntegerOverflow(usize, usize),
    #[error("syntax error: missing quote at {0}:{1}")]
    MissingQuote(usize, usize),
    #[error("syntax error: unexpected character {0:?} at {1}:{2}")]
    UnexpectedChar(char, usize, usize),
    #[error("syntax error: unexpected {0} at {1}:{2}")]
    UnexpectedToken(String, usize, usize),
    #[error("syntax error: unexpected end of input")]
    UnexpectedEof,
}

impl ParserError {
    pub fn line_and_col_num(&self) -> Option<(usize, usize)> {
        match self {
            &ParserError::IncompleteReduction(line_num, col_num)
            | &ParserError::IntegerOverflow(line_num, col_num)
            | &ParserError::MissingQuote(line_num, col_num)
            | &ParserError::UnexpectedChar(_, line_num, col_num)
            | &ParserError::UnexpectedToken(_, line_num, col_num) => Some((line_num, col_num)),
            ParserError::UnexpectedEof => None,
        }
    }
}

/// A term read from text. Its variables are numbered `0..var_count`
/// in order of first appearance; `var_names` holds the named ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadTerm {
    pub term: Term,
    pub var_names: IndexMap<String, VarId>,
    pub var_count: usize,
}
