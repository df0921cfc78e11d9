use std::fmt;

use crate::token::Token;

/// Where a diagnostic points in the source, plus the instruction text found there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub line: usize,
    pub column: usize,
    pub text: String,
}

impl Located {
    pub fn at(token: &Token) -> Self {
        Self { line: token.line(), column: token.column(), text: token.text().to_string() }
    }

    /// `instruction operand` pair, positioned at the instruction.
    pub fn pair(instruction: &Token, operand: &Token) -> Self {
        Self {
            line: instruction.line(),
            column: instruction.column(),
            text: format!("{} {}", instruction.text(), operand.text()),
        }
    }
}

impl fmt::Display for Located {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}[{}]", self.line, self.column)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("{at}, unrecognised token: {}", .at.text)]
    Lexical { at: Located },
    #[error("{at}, {message}: {}", .at.text)]
    Parse { at: Located, message: &'static str },
    #[error("{at}, invalid prefixing: {}", .at.text)]
    InvalidPrefixing { at: Located },
    #[error("{at}, offset instruction has invalid target {target}: {}", .at.text)]
    OffsetOutOfRange { at: Located, target: i64 },
    #[error("relocation did not converge after {passes} passes")]
    RelocationDidNotConverge { passes: usize },
    #[error("{stage}: leaf count mismatch, expected {expected} found {found}")]
    LeafCountMismatch { stage: &'static str, expected: usize, found: usize },
    #[error("malformed instruction tree: {0}")]
    MalformedTree(String),
}

/// Every error a stage found in one compilation unit.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Default)]
#[error("{}", render(.0))]
pub struct Diagnostics(pub Vec<AsmError>);

fn render(errors: &[AsmError]) -> String {
    errors
        .iter()
        .map(|e| format!("Error at {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Diagnostics {
    pub fn push(&mut self, err: AsmError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AsmError> {
        self.0.iter()
    }

    /// `Ok(value)` when nothing was reported.
    pub fn into_result<T>(self, value: T) -> Result<T, Diagnostics> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<AsmError> for Diagnostics {
    fn from(err: AsmError) -> Self {
        Diagnostics(vec![err])
    }
}
