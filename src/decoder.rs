use serde::{Deserialize, Serialize};

use crate::instructions::Op;

/// One fetched instruction: a single-length function and its 4-bit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub op: Op,
    pub operand: u8,
}

impl Decoded {
    /// Image byte for this instruction, `(function << 4) | operand`.
    pub fn to_byte(self) -> u8 {
        (self.op.code() << 4) | (self.operand & 0xF)
    }
}

pub trait Decoder {
    fn decode(&self, raw: u8) -> Option<Decoded>;
}
