use std::fmt;

use serde::{Deserialize, Serialize};

use crate::instructions::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Instruction(Op),
    Number,
    /// Statement separator: newline or `;`.
    Next,
    Eof,
}

/// Lexical atom. Tokens synthesized during expansion keep the text and
/// position of the token they were derived from, so diagnostics always point
/// at real source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    kind: TokenKind,
    text: String,
    value: i64,
    line: usize,
    column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, value: i64, line: usize, column: usize) -> Self {
        Self { kind, text: text.into(), value, line, column }
    }

    pub fn instruction(op: Op, line: usize, column: usize) -> Self {
        Self::new(TokenKind::Instruction(op), op.mnemonic(), 0, line, column)
    }

    pub fn number(value: i64, line: usize, column: usize) -> Self {
        Self::new(TokenKind::Number, value.to_string(), value, line, column)
    }

    /// New token at the same source location with a different kind and value.
    pub fn derive(&self, kind: TokenKind, value: i64) -> Self {
        Self { kind, text: self.text.clone(), value, line: self.line, column: self.column }
    }

    pub fn derive_op(&self, op: Op) -> Self {
        self.derive(TokenKind::Instruction(op), 0)
    }

    pub fn derive_number(&self, value: i64) -> Self {
        self.derive(TokenKind::Number, value)
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn op(&self) -> Option<Op> {
        match self.kind {
            TokenKind::Instruction(op) => Some(op),
            _ => None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Instruction(op) => write!(f, "{}[{}]: {} {}", self.line, self.column, op, self.text),
            TokenKind::Number => write!(f, "{}[{}]: NUMBER {} {}", self.line, self.column, self.text, self.value),
            TokenKind::Next => write!(f, "{}[{}]: NEXT", self.line, self.column),
            TokenKind::Eof => write!(f, "{}[{}]: EOF", self.line, self.column),
        }
    }
}
