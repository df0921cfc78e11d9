use crate::error::{AsmError, Diagnostics, Located};
use crate::instructions::Op;
use crate::token::{Token, TokenKind};

/// Split `source` into tokens. Mnemonics are case-insensitive.
///
/// Every unrecognised lexeme is reported; any error rejects the whole chunk.
pub fn scan(source: &str) -> Result<Vec<Token>, Diagnostics> {
    Scanner::new(source).scan()
}

struct Scanner {
    chars: Vec<char>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    errors: Diagnostics,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.to_uppercase().chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            column: 0,
            tokens: Vec::new(),
            errors: Diagnostics::default(),
        }
    }

    fn scan(mut self) -> Result<Vec<Token>, Diagnostics> {
        while !self.finished() {
            self.scan_token();
            self.column += self.current - self.start;
            self.start = self.current;
        }
        self.tokens.push(Token::new(TokenKind::Eof, "EOF", 0, self.line, self.column));
        let tokens = self.tokens;
        self.errors.into_result(tokens)
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            ' ' | '\t' | '\r' => {}
            '\n' => {
                self.add(TokenKind::Next, 0, Some("NEWLINE"));
                self.line += 1;
                // Advanced past the newline already; the caller adds 1.
                self.column = 0;
                self.start = self.current;
            }
            ';' => self.add(TokenKind::Next, 0, None),
            '-' if self.peek().is_some_and(|p| p.is_ascii_digit()) => self.number(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() => self.word(),
            _ => self.unrecognised(),
        }
    }

    fn word(&mut self) {
        // Mnemonics such as CSUB0 end in a digit.
        while self.peek().is_some_and(char::is_alphanumeric) {
            self.advance();
        }
        match Op::from_mnemonic(&self.lexeme()) {
            Some(op) => self.add(TokenKind::Instruction(op), 0, None),
            None => self.unrecognised(),
        }
    }

    fn number(&mut self) {
        while self.peek().is_some_and(|p| p.is_ascii_digit()) {
            self.advance();
        }
        match self.lexeme().parse::<i64>() {
            Ok(value) => self.add(TokenKind::Number, value, None),
            Err(_) => self.unrecognised(),
        }
    }

    fn unrecognised(&mut self) {
        let at = Located { line: self.line, column: self.column, text: self.lexeme() };
        self.errors.push(AsmError::Lexical { at });
    }

    fn add(&mut self, kind: TokenKind, value: i64, text: Option<&str>) {
        let text = text.map(str::to_string).unwrap_or_else(|| self.lexeme());
        self.tokens.push(Token::new(kind, text, value, self.line, self.column));
    }

    fn lexeme(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.current).copied()
    }

    fn finished(&self) -> bool {
        self.current >= self.chars.len()
    }
}
