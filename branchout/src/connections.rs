//! The `--CONNECTIONS_FROM_TO` mapping: `(from,to)` pairs naming the
//! connection a pipeline currently uses and the one it should use instead.
//!
//! Pairs may be separated by commas and/or whitespace. `()` and the empty
//! string both mean "no rewiring".

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPair {
    pub from: String,
    pub to: String,
}

impl ConnectionPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for ConnectionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.from, self.to)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("at byte {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

pub fn parse_connection_pairs(input: &str) -> Result<Vec<ConnectionPair>, ParseError> {
    let mut cursor = Cursor::new(input);
    cursor.skip_ws();
    if cursor.at_end() {
        return Ok(Vec::new());
    }

    if cursor.empty_marker() {
        cursor.skip_ws();
        return match cursor.peek() {
            None => Ok(Vec::new()),
            Some(_) => Err(ParseError::new(cursor.pos, "unexpected input after '()'")),
        };
    }

    let mut pairs = Vec::new();
    let mut seen = HashSet::new();
    loop {
        let start = cursor.pos;
        let pair = cursor.pair()?;
        if !seen.insert(pair.from.clone()) {
            return Err(ParseError::new(
                start,
                format!("connection '{}' is mapped more than once", pair.from),
            ));
        }
        pairs.push(pair);

        cursor.skip_ws();
        match cursor.peek() {
            None => break,
            Some(',') => {
                cursor.bump();
                cursor.skip_ws();
            }
            Some(_) => {}
        }
        match cursor.peek() {
            Some('(') => continue,
            None => return Err(ParseError::new(cursor.pos, "expected '(' after ','")),
            Some(c) => {
                return Err(ParseError::new(
                    cursor.pos,
                    format!("unexpected '{}', expected '('", c),
                ))
            }
        }
    }

    Ok(pairs)
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Consumes `(` ws `)` if that is what comes next.
    fn empty_marker(&mut self) -> bool {
        let rest = &self.input[self.pos..];
        let Some(inner) = rest.strip_prefix('(') else {
            return false;
        };
        let trimmed = inner.trim_start();
        if !trimmed.starts_with(')') {
            return false;
        }
        self.pos += rest.len() - trimmed.len() + 1;
        true
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(ParseError::new(
                self.pos,
                format!("expected '{}', found '{}'", expected, c),
            )),
            None => Err(ParseError::new(
                self.pos,
                format!("expected '{}', found end of input", expected),
            )),
        }
    }

    fn pair(&mut self) -> Result<ConnectionPair, ParseError> {
        let open = self.pos;
        self.expect('(')?;

        let from = self.ident()?;
        match self.peek() {
            Some(',') => {
                self.bump();
            }
            Some(')') => return Err(ParseError::new(self.pos, "missing ',' between connections")),
            _ => return Err(self.unterminated(open)),
        }

        let to = self.ident()?;
        match self.peek() {
            Some(')') => {
                self.bump();
            }
            Some(',') => {
                return Err(ParseError::new(
                    self.pos,
                    "a pair holds exactly two connections",
                ))
            }
            _ => return Err(self.unterminated(open)),
        }

        Ok(ConnectionPair::new(from, to))
    }

    /// Reads up to the next delimiter; the trimmed text must be non-empty.
    fn ident(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                '(' => return Err(ParseError::new(self.pos, "nested '(' is not allowed")),
                ')' | ',' => break,
                _ => {
                    self.bump();
                }
            }
        }
        let ident = self.input[start..self.pos].trim();
        if ident.is_empty() {
            return Err(ParseError::new(start, "empty connection identifier"));
        }
        Ok(ident.to_string())
    }

    fn unterminated(&self, open: usize) -> ParseError {
        ParseError::new(open, "unbalanced '(': missing ')'")
    }
}
