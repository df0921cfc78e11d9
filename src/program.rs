//! Flat instruction list handed to the executor.

use serde::Serialize;

use crate::decoder::Decoded;
use crate::error::AsmError;
use crate::instructions::{Op, Width};
use crate::token::Token;
use crate::tree::Tree;

/// One emitted instruction with the source tokens it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Emitted {
    pub op: Op,
    pub operand: u8,
    pub instruction: Token,
    pub operand_token: Token,
    pub original_index: usize,
}

impl Emitted {
    pub fn decoded(&self) -> Decoded {
        Decoded { op: self.op, operand: self.operand }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    pub entries: Vec<Emitted>,
}

impl Program {
    /// Flatten a relocated tree. Every terminal must be a sized single-length
    /// instruction whose operand fits a nibble.
    pub fn from_tree(tree: &Tree) -> Result<Self, AsmError> {
        let mut entries = Vec::new();
        for leaf in tree.terminals(tree.root()) {
            let node = tree.node(leaf);
            let instruction = node.instruction()?;
            let operand_token = node.operand()?;
            if node.is_pending() {
                return Err(AsmError::MalformedTree(format!("unresolved branch {}", instruction.text())));
            }
            let op = instruction
                .op()
                .filter(|op| op.width() == Width::Single)
                .ok_or_else(|| AsmError::MalformedTree(format!("{} cannot be emitted", instruction.text())))?;
            let operand = u8::try_from(operand_token.value())
                .ok()
                .filter(|v| *v < 16)
                .ok_or_else(|| AsmError::MalformedTree(format!("{op} {} does not fit", operand_token.value())))?;
            entries.push(Emitted {
                op,
                operand,
                instruction: instruction.clone(),
                operand_token: operand_token.clone(),
                original_index: node.original_index(),
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn decoded(&self) -> Vec<Decoded> {
        self.entries.iter().map(Emitted::decoded).collect()
    }

    /// One byte per instruction, `(function << 4) | operand`.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.entries.iter().map(|e| e.decoded().to_byte()).collect()
    }

    /// Entry executing at `iptr`, if it is inside the program.
    pub fn position(&self, iptr: i64) -> Option<&Emitted> {
        usize::try_from(iptr).ok().and_then(|i| self.entries.get(i))
    }
}
