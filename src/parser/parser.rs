use crate::atom_table::*;
use crate::parser::ast::*;
use crate::parser::lexer::*;
use crate::types::*;

use indexmap::IndexMap;

/// An operator precedence parser over a fully tokenized source text.
/// Each call to `read_term` consumes one clause up to its full stop.
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<TokenDesc>,
    pos: usize,
    var_names: IndexMap<String, VarId>,
    var_count: u32,
}

fn is_term_start(token: &Token) -> bool {
    match token {
        Token::Close
        | Token::CloseList
        | Token::CloseCurly
        | Token::Comma
        | Token::HeadTailSeparator
        | Token::End => false,
        Token::Name(name) => infix_op(name).is_none() || prefix_op(name).is_some(),
        _ => true,
    }
}

impl Parser {
    pub fn new(src: &str) -> Result<Self, ParserError> {
        Ok(Parser {
            tokens: read_tokens(src)?,
            pos: 0,
            var_names: IndexMap::new(),
            var_count: 0,
        })
    }

    #[inline]
    pub fn at_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn expect_eof(&self) -> Result<(), ParserError> {
        match self.peek() {
            Some(desc) => Err(unexpected(desc)),
            None => Ok(()),
        }
    }

    /// Reads the next clause, or `None` once the input is exhausted.
    pub fn read_term(&mut self) -> Result<Option<ReadTerm>, ParserError> {
        if self.at_eof() {
            return Ok(None);
        }

        self.var_names.clear();
        self.var_count = 0;

        let (term, _) = self.parse(1200)?;
        let desc = self.next_token()?;

        if !desc.token.is_end() {
            return Err(unexpected(&desc));
        }

        Ok(Some(ReadTerm {
            term,
            var_names: std::mem::take(&mut self.var_names),
            var_count: self.var_count as usize,
        }))
    }

    fn peek(&self) -> Option<&TokenDesc> {
        self.tokens.get(self.pos)
    }

    fn next_token(&mut self) -> Result<TokenDesc, ParserError> {
        match self.tokens.get(self.pos) {
            Some(desc) => {
                self.pos += 1;
                Ok(desc.clone())
            }
            None => Err(ParserError::UnexpectedEof),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ParserError> {
        let desc = self.next_token()?;

        if desc.token == token {
            Ok(())
        } else {
            Err(unexpected(&desc))
        }
    }

    fn fresh_var(&mut self) -> Term {
        let var = VarId(self.var_count);
        self.var_count += 1;
        Term::Var(var)
    }

    fn named_var(&mut self, name: String) -> Term {
        if name == "_" {
            return self.fresh_var();
        }

        if let Some(var) = self.var_names.get(&name) {
            return Term::Var(*var);
        }

        let var = VarId(self.var_count);
        self.var_count += 1;
        self.var_names.insert(name, var);

        Term::Var(var)
    }

    fn parse(&mut self, max: usize) -> Result<(Term, usize), ParserError> {
        let (mut left, mut left_priority) = self.parse_primary(max)?;

        loop {
            let (name, op) = match self.peek().map(|desc| &desc.token) {
                Some(Token::Comma) => (atom!(","), OpDesc { priority: 1000, spec: XFY }),
                Some(Token::HeadTailSeparator) => (atom!(";"), OpDesc { priority: 1100, spec: XFY }),
                Some(Token::Name(name)) => match infix_op(name) {
                    Some(op) => (Atom::intern(name), op),
                    None => break,
                },
                _ => break,
            };

            let (left_max, right_max) = op.arg_priorities();

            if op.priority > max || left_priority > left_max {
                break;
            }

            self.pos += 1;

            let (right, _) = self.parse(right_max)?;

            left = Term::from_parts(name, vec![left, right]);
            left_priority = op.priority;
        }

        Ok((left, left_priority))
    }

    fn parse_primary(&mut self, max: usize) -> Result<(Term, usize), ParserError> {
        let desc = self.next_token()?;

        let term = match desc.token {
            Token::Int(n) => Term::integer(n),
            Token::Float(f) => Term::float(f),
            Token::Var(name) => self.named_var(name),
            Token::String(s) => Term::list(s.chars().map(|c| Term::integer(c as i64))),
            Token::Open => {
                let (term, _) = self.parse(1200)?;
                self.expect(Token::Close)?;
                term
            }
            Token::OpenList => self.parse_list()?,
            Token::OpenCurly => {
                if let Some(Token::CloseCurly) = self.peek().map(|desc| &desc.token) {
                    self.pos += 1;
                    Term::Atom(atom!("{}"))
                } else {
                    let (term, _) = self.parse(1200)?;
                    self.expect(Token::CloseCurly)?;
                    Term::from_parts(atom!("{}"), vec![term])
                }
            }
            Token::Name(name) => return self.parse_name(name, false, max),
            Token::QuotedName(name) => return self.parse_name(name, true, max),
            _ => return Err(unexpected(&desc)),
        };

        Ok((term, 0))
    }

    fn parse_name(
        &mut self,
        name: String,
        quoted: bool,
        max: usize,
    ) -> Result<(Term, usize), ParserError> {
        let atom = Atom::intern(&name);

        let (next_token, layout_before) = match self.peek() {
            Some(desc) => (desc.token.clone(), desc.layout_before),
            None => return Ok((Term::from_atom(atom), 0)),
        };

        if next_token == Token::Open && !layout_before {
            self.pos += 1;

            let args = self.parse_arglist()?;
            return Ok((Term::from_parts(atom, args), 0));
        }

        if quoted {
            return Ok((Term::from_atom(atom), 0));
        }

        if name == "-" && !layout_before {
            match next_token {
                Token::Int(n) => {
                    self.pos += 1;
                    return Ok((Term::integer(n.wrapping_neg()), 0));
                }
                Token::Float(f) => {
                    self.pos += 1;
                    return Ok((Term::float(-f), 0));
                }
                _ => {}
            }
        }

        if let Some(op) = prefix_op(&name) {
            if op.priority <= max && is_term_start(&next_token) {
                let (_, right_max) = op.arg_priorities();
                let (operand, _) = self.parse(right_max)?;

                return Ok((Term::from_parts(atom, vec![operand]), op.priority));
            }
        }

        Ok((Term::from_atom(atom), 0))
    }

    // after the opening parenthesis of functional notation.
    fn parse_arglist(&mut self) -> Result<Vec<Term>, ParserError> {
        let mut args = vec![self.parse(999)?.0];

        loop {
            let desc = self.next_token()?;

            match desc.token {
                Token::Comma => args.push(self.parse(999)?.0),
                Token::Close => return Ok(args),
                _ => return Err(unexpected(&desc)),
            }
        }
    }

    // after the opening bracket.
    fn parse_list(&mut self) -> Result<Term, ParserError> {
        if let Some(Token::CloseList) = self.peek().map(|desc| &desc.token) {
            self.pos += 1;
            return Ok(Term::EmptyList);
        }

        let mut items = vec![self.parse(999)?.0];

        loop {
            let desc = self.next_token()?;

            match desc.token {
                Token::Comma => items.push(self.parse(999)?.0),
                Token::HeadTailSeparator => {
                    let (tail, _) = self.parse(999)?;
                    self.expect(Token::CloseList)?;

                    return Ok(Term::list_with_tail(items, tail));
                }
                Token::CloseList => return Ok(Term::list(items)),
                _ => return Err(unexpected(&desc)),
            }
        }
    }
}

fn unexpected(desc: &TokenDesc) -> ParserError {
    ParserError::UnexpectedToken(desc.token.to_string(), desc.line_num, desc.col_num)
}
