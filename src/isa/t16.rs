use crate::decoder::{Decoded, Decoder};
use crate::instructions::{Op, Width};

/// Byte decoder for the 16-bit transputer.
///
/// The high nibble selects one of the sixteen single-length functions, the
/// low nibble is its operand. Double-length operations are reached through
/// `OPR` at execution time, so every byte decodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct T16Decoder;

impl T16Decoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for T16Decoder {
    fn decode(&self, raw: u8) -> Option<Decoded> {
        let op = Op::from_function(raw >> 4)?;
        debug_assert_eq!(op.width(), Width::Single);
        Some(Decoded { op, operand: raw & 0xF })
    }
}
