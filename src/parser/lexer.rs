use crate::atom_table::is_symbol_char;
use crate::parser::ast::*;

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    QuotedName(String),
    Var(String),
    Int(i64),
    Float(f64),
    String(String),
    Open,              // '('
    Close,             // ')'
    OpenList,          // '['
    CloseList,         // ']'
    OpenCurly,         // '{'
    CloseCurly,        // '}'
    HeadTailSeparator, // '|'
    Comma,             // ','
    End,
}

impl Token {
    #[inline]
    pub(super) fn is_end(&self) -> bool {
        matches!(self, Token::End)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "{}", name),
            Token::QuotedName(name) => write!(f, "'{}'", name),
            Token::Var(name) => write!(f, "{}", name),
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{:?}", n),
            Token::String(s) => write!(f, "{:?}", s),
            Token::Open => write!(f, "("),
            Token::Close => write!(f, ")"),
            Token::OpenList => write!(f, "["),
            Token::CloseList => write!(f, "]"),
            Token::OpenCurly => write!(f, "{{"),
            Token::CloseCurly => write!(f, "}}"),
            Token::HeadTailSeparator => write!(f, "|"),
            Token::Comma => write!(f, ","),
            Token::End => write!(f, "end of clause"),
        }
    }
}

/// A token together with where it starts and whether layout text
/// (whitespace or comments) precedes it.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenDesc {
    pub token: Token,
    pub layout_before: bool,
    pub line_num: usize,
    pub col_num: usize,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pub(crate) line_num: usize,
    pub(crate) col_num: usize,
}

impl<'a> fmt::Debug for Lexer<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lexer")
            .field("line_num", &self.line_num)
            .field("col_num", &self.col_num)
            .finish()
    }
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            chars: src.chars().peekable(),
            line_num: 1,
            col_num: 1,
        }
    }

    #[inline]
    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    // the character after the next one.
    fn peek_second(&self) -> Option<char> {
        let mut rest = self.chars.clone();
        rest.next();
        rest.next()
    }

    fn skip_char(&mut self) -> Option<char> {
        let c = self.chars.next();

        if let Some(c) = c {
            if c == '\n' {
                self.line_num += 1;
                self.col_num = 1;
            } else {
                self.col_num += 1;
            }
        }

        c
    }

    /// Skips whitespace and comments, returning whether any was found.
    fn scan_for_layout(&mut self) -> Result<bool, ParserError> {
        let mut layout = false;

        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.skip_char();
                }
                Some('%') => {
                    while let Some(c) = self.skip_char() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let (line_num, col_num) = (self.line_num, self.col_num);

                    self.skip_char();
                    self.skip_char();

                    let mut prev = ' ';

                    loop {
                        match self.skip_char() {
                            Some('/') if prev == '*' => break,
                            Some(c) => prev = c,
                            None => return Err(ParserError::IncompleteReduction(line_num, col_num)),
                        }
                    }
                }
                _ => return Ok(layout),
            }

            layout = true;
        }
    }

    pub fn next_token(&mut self) -> Result<Option<TokenDesc>, ParserError> {
        let layout_before = self.scan_for_layout()?;
        let (line_num, col_num) = (self.line_num, self.col_num);

        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(None),
        };

        let token = match c {
            '(' => self.solo(Token::Open),
            ')' => self.solo(Token::Close),
            '[' => self.solo(Token::OpenList),
            ']' => self.solo(Token::CloseList),
            '{' => self.solo(Token::OpenCurly),
            '}' => self.solo(Token::CloseCurly),
            '|' if self.peek_second() != Some('|') => self.solo(Token::HeadTailSeparator),
            ',' => self.solo(Token::Comma),
            '!' => self.solo(Token::Name("!".to_owned())),
            ';' => self.solo(Token::Name(";".to_owned())),
            '\'' => Token::QuotedName(self.quoted('\'')?),
            '"' => Token::String(self.quoted('"')?),
            '0'..='9' => self.number()?,
            '_' => Token::Var(self.alphanumeric()),
            c if c.is_uppercase() => Token::Var(self.alphanumeric()),
            c if c.is_alphabetic() => Token::Name(self.alphanumeric()),
            '.' if self.is_end_dot() => {
                self.skip_char();
                Token::End
            }
            c if is_symbol_char(c) || c == '|' => {
                let mut name = String::new();

                while let Some(c) = self.peek_char() {
                    if is_symbol_char(c) || c == '|' {
                        name.push(c);
                        self.skip_char();
                    } else {
                        break;
                    }
                }

                Token::Name(name)
            }
            c => return Err(ParserError::UnexpectedChar(c, line_num, col_num)),
        };

        Ok(Some(TokenDesc {
            token,
            layout_before,
            line_num,
            col_num,
        }))
    }

    fn solo(&mut self, token: Token) -> Token {
        self.skip_char();
        token
    }

    fn is_end_dot(&mut self) -> bool {
        match self.peek_second() {
            None => true,
            Some(c) => c.is_whitespace() || c == '%',
        }
    }

    fn alphanumeric(&mut self) -> String {
        let mut name = String::new();

        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.skip_char();
            } else {
                break;
            }
        }

        name
    }

    fn escape(&mut self, line_num: usize, col_num: usize) -> Result<Option<char>, ParserError> {
        let c = match self.skip_char() {
            Some(c) => c,
            None => return Err(ParserError::MissingQuote(line_num, col_num)),
        };

        let escaped = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'v' => '\x0b',
            '0' => '\0',
            'e' => '\x1b',
            's' => ' ',
            '\\' | '\'' | '"' | '`' => c,
            // continuation line.
            '\n' => return Ok(None),
            c => return Err(ParserError::UnexpectedChar(c, self.line_num, self.col_num)),
        };

        Ok(Some(escaped))
    }

    fn quoted(&mut self, delim: char) -> Result<String, ParserError> {
        let (line_num, col_num) = (self.line_num, self.col_num);
        let mut text = String::new();

        self.skip_char();

        loop {
            match self.skip_char() {
                None => return Err(ParserError::MissingQuote(line_num, col_num)),
                Some(c) if c == delim => {
                    if self.peek_char() == Some(delim) {
                        self.skip_char();
                        text.push(delim);
                    } else {
                        return Ok(text);
                    }
                }
                Some('\\') => {
                    if let Some(c) = self.escape(line_num, col_num)? {
                        text.push(c);
                    }
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn digits(&mut self, radix: u32) -> String {
        let mut digits = String::new();

        while let Some(c) = self.peek_char() {
            if c.is_digit(radix) {
                digits.push(c);
                self.skip_char();
            } else if c == '_' && radix == 10 && self.peek_second().map_or(false, |c| c.is_ascii_digit()) {
                self.skip_char();
            } else {
                break;
            }
        }

        digits
    }

    fn number(&mut self) -> Result<Token, ParserError> {
        let (line_num, col_num) = (self.line_num, self.col_num);

        if self.peek_char() == Some('0') {
            let radix = match self.peek_second() {
                Some('x') => Some(16),
                Some('o') => Some(8),
                Some('b') => Some(2),
                _ => None,
            };

            if let Some(radix) = radix {
                self.skip_char();
                self.skip_char();

                let digits = self.digits(radix);

                return i64::from_str_radix(&digits, radix)
                    .map(Token::Int)
                    .map_err(|_| ParserError::IntegerOverflow(line_num, col_num));
            }

            if self.peek_second() == Some('\'') {
                self.skip_char();
                self.skip_char();

                return self.char_code(line_num, col_num);
            }
        }

        let mut text = self.digits(10);

        let is_float = self.peek_char() == Some('.')
            && self.peek_second().map_or(false, |c| c.is_ascii_digit());

        if !is_float {
            return text
                .parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ParserError::IntegerOverflow(line_num, col_num));
        }

        self.skip_char();
        text.push('.');
        text.push_str(&self.digits(10));

        if let Some('e' | 'E') = self.peek_char() {
            let mut exponent = String::from("e");
            let mut lookahead = self.chars.clone();

            // only an exponent if digits follow.
            let sign = match self.peek_second() {
                Some(c @ ('+' | '-')) => {
                    lookahead.next();
                    lookahead.next();
                    Some(c)
                }
                _ => {
                    lookahead.next();
                    None
                }
            };

            if lookahead.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.skip_char();

                if let Some(sign) = sign {
                    self.skip_char();
                    exponent.push(sign);
                }

                exponent.push_str(&self.digits(10));
                text.push_str(&exponent);
            }
        }

        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ParserError::IncompleteReduction(line_num, col_num))
    }

    fn char_code(&mut self, line_num: usize, col_num: usize) -> Result<Token, ParserError> {
        match self.skip_char() {
            Some('\\') => match self.escape(line_num, col_num)? {
                Some(c) => Ok(Token::Int(c as i64)),
                None => Err(ParserError::UnexpectedChar('\n', line_num, col_num)),
            },
            Some('\'') => {
                // 0''' as well as 0''.
                if self.peek_char() == Some('\'') {
                    self.skip_char();
                }

                Ok(Token::Int('\'' as i64))
            }
            Some(c) => Ok(Token::Int(c as i64)),
            None => Err(ParserError::UnexpectedEof),
        }
    }
}

/// Tokenizes `src`, appending an end token if the final clause lacks
/// its terminating full stop.
pub fn read_tokens(src: &str) -> Result<Vec<TokenDesc>, ParserError> {
    let mut lexer = Lexer::new(src);
    let mut tokens = vec![];

    while let Some(desc) = lexer.next_token()? {
        tokens.push(desc);
    }

    if tokens.last().map_or(false, |desc| !desc.token.is_end()) {
        tokens.push(TokenDesc {
            token: Token::End,
            layout_before: true,
            line_num: lexer.line_num,
            col_num: lexer.col_num,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        read_tokens(src)
            .unwrap()
            .into_iter()
            .map(|desc| desc.token)
            .collect()
    }

    #[test]
    fn clause_tokens() {
        assert_eq!(
            tokens("foo(X, 'a b') :- X >= 0.5, !. % trailing"),
            vec![
                Token::Name("foo".to_owned()),
                Token::Open,
                Token::Var("X".to_owned()),
                Token::Comma,
                Token::QuotedName("a b".to_owned()),
                Token::Close,
                Token::Name(":-".to_owned()),
                Token::Var("X".to_owned()),
                Token::Name(">=".to_owned()),
                Token::Float(0.5),
                Token::Comma,
                Token::Name("!".to_owned()),
                Token::End,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokens("0'a 0x1F 12 1.5e3."),
            vec![
                Token::Int(97),
                Token::Int(31),
                Token::Int(12),
                Token::Float(1500.0),
                Token::End,
            ]
        );
        assert!(matches!(
            read_tokens("99999999999999999999."),
            Err(ParserError::IntegerOverflow(1, 1))
        ));
    }

    #[test]
    fn comments_count_as_layout() {
        let descs = read_tokens("f/* c */(a).").unwrap();

        assert_eq!(descs[1].token, Token::Open);
        assert!(descs[1].layout_before);
    }

    #[test]
    fn quoted_escapes() {
        assert_eq!(tokens(r"'it''s\n'"), vec![Token::QuotedName("it's\n".to_owned()), Token::End]);
        assert!(matches!(read_tokens("'open"), Err(ParserError::MissingQuote(1, 1))));
    }
}
