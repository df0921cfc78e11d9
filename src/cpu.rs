use std::fmt;

use anyhow::Error;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::decoder::Decoder;
use crate::exec::Executor;
use crate::instructions::Op;
use crate::memory::Bus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub word_bits: u32, // 16 or 32
    pub memory_bytes: usize,
    pub trace_steps: bool,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            word_bits: 16,
            memory_bytes: 1 << 16,
            trace_steps: false,
        }
    }
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status: u8 {
const ERROR = 1 << 0;
const HALT_ON_ERROR = 1 << 1;
}
}

/// Evaluation stack register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reg {
    A,
    B,
    C,
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg::A => "Areg",
            Reg::B => "Breg",
            Reg::C => "Creg",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Trap {
    #[error("no instruction at {iptr}")]
    Fetch { iptr: i64 },
    #[error("OPR {code} is not valid")]
    InvalidOperate { code: i64 },
    #[error("{op} is not yet implemented")]
    NotImplemented { op: Op },
    #[error("{op}: {reg} is undefined")]
    UndefinedRegister { op: Op, reg: Reg },
    #[error("{op}: integer overflow")]
    Overflow { op: Op },
    #[error("{op}: division by zero")]
    DivideByZero { op: Op },
    #[error("Unaligned access at {addr:#06x}")]
    Unaligned { addr: u32 },
    #[error("Bus error at {addr:#06x}: {source}")]
    Bus { addr: u32, #[source] source: Error },
    #[error("error flag set with halt-on-error")]
    HaltOnError,
    #[error("stopped on error")]
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cpu {
    pub areg: Option<i64>,
    pub breg: Option<i64>,
    pub creg: Option<i64>,
    pub oreg: i64,
    pub iptr: i64,
    pub wptr: i64,
    /// Occupied evaluation stack slots, 0..=3.
    pub depth: u8,
    pub status: Status,
    pub cfg: CpuConfig,
}

impl Cpu {
    pub fn new(cfg: CpuConfig) -> Self {
        Self {
            areg: None,
            breg: None,
            creg: None,
            oreg: 0,
            iptr: 0,
            wptr: 0,
            depth: 0,
            status: Status::empty(),
            cfg,
        }
    }

    /// Start a new chunk: instruction pointer and operand register only.
    pub fn reset(&mut self) {
        self.iptr = 0;
        self.oreg = 0;
    }

    pub fn bytes_per_word(&self) -> i64 {
        i64::from(self.cfg.word_bits / 8)
    }

    /// Mask selecting the byte within a word.
    pub fn byte_select_mask(&self) -> i64 {
        self.bytes_per_word() - 1
    }

    pub fn min_int(&self) -> i64 {
        -(1i64 << (self.cfg.word_bits - 1))
    }

    pub fn max_int(&self) -> i64 {
        (1i64 << (self.cfg.word_bits - 1)) - 1
    }

    /// Reduce `v` to a signed word, two's complement.
    pub fn wrap(&self, v: i64) -> i64 {
        let shift = 64 - self.cfg.word_bits;
        v.wrapping_shl(shift).wrapping_shr(shift)
    }

    /// `v` if it fits a signed word, otherwise an overflow trap.
    pub fn checked(&self, op: Op, v: Option<i64>) -> Result<i64, Trap> {
        match v {
            Some(v) if (self.min_int()..=self.max_int()).contains(&v) => Ok(v),
            _ => Err(Trap::Overflow { op }),
        }
    }

    /// `base` moved by `index` words, trapping when it leaves the word range.
    pub fn word_offset(&self, op: Op, base: i64, index: i64) -> Result<i64, Trap> {
        let v = index.checked_mul(self.bytes_per_word()).and_then(|off| base.checked_add(off));
        self.checked(op, v)
    }

    /// Relative transfer of control; the step increment follows.
    pub fn jump(&mut self, op: Op, displacement: i64) -> Result<(), Trap> {
        self.iptr = self.iptr.checked_add(displacement).ok_or(Trap::Overflow { op })?;
        Ok(())
    }

    pub fn reg(&self, op: Op, reg: Reg) -> Result<i64, Trap> {
        let value = match reg {
            Reg::A => self.areg,
            Reg::B => self.breg,
            Reg::C => self.creg,
        };
        value.ok_or(Trap::UndefinedRegister { op, reg })
    }

    pub fn push(&mut self, v: i64) {
        self.creg = self.breg;
        self.breg = self.areg;
        self.areg = Some(v);
        self.depth = (self.depth + 1).min(3);
    }

    pub fn pop(&mut self, op: Op) -> Result<i64, Trap> {
        let v = self.reg(op, Reg::A)?;
        self.areg = self.breg;
        self.breg = self.creg;
        self.depth = self.depth.saturating_sub(1);
        Ok(v)
    }

    /// Byte address for a word-sized value, wrapped to the address space.
    pub fn address(&self, v: i64) -> u32 {
        let mask = if self.cfg.word_bits >= 32 { u32::MAX as i64 } else { (1i64 << self.cfg.word_bits) - 1 };
        (v & mask) as u32
    }

    fn aligned(&self, v: i64) -> Result<u32, Trap> {
        let addr = self.address(v);
        if v & self.byte_select_mask() != 0 {
            return Err(Trap::Unaligned { addr });
        }
        Ok(addr)
    }

    pub fn read_word<B: Bus>(&self, bus: &mut B, v: i64) -> Result<i64, Trap> {
        let addr = self.aligned(v)?;
        let raw = if self.cfg.word_bits == 32 {
            bus.read_u32(addr).map(|w| i64::from(w as i32))
        } else {
            bus.read_u16(addr).map(|w| i64::from(w as i16))
        };
        raw.map_err(|source| Trap::Bus { addr, source })
    }

    pub fn write_word<B: Bus>(&self, bus: &mut B, v: i64, val: i64) -> Result<(), Trap> {
        let addr = self.aligned(v)?;
        let res = if self.cfg.word_bits == 32 {
            bus.write_u32(addr, val as u32)
        } else {
            bus.write_u16(addr, val as u16)
        };
        res.map_err(|source| Trap::Bus { addr, source })
    }

    /// Fetch, decode and execute the instruction at `iptr`.
    ///
    /// The operand joins `oreg` before execution and `iptr` moves on by one
    /// afterwards, so branches add their displacement to their own position.
    pub fn step<B: Bus, D: Decoder, X: Executor>(
        &mut self,
        bus: &mut B,
        code: &[u8],
        dec: &D,
        exec: &X,
    ) -> Result<(), Trap> {
        let iptr = self.iptr;
        let raw = usize::try_from(iptr)
            .ok()
            .and_then(|i| code.get(i))
            .copied()
            .ok_or(Trap::Fetch { iptr })?;
        let d = dec.decode(raw).ok_or(Trap::Fetch { iptr })?;
        self.oreg = self.oreg.wrapping_add(i64::from(d.operand));
        if let Err(trap) = exec.exec(self, bus, d) {
            self.oreg = 0;
            return Err(trap);
        }
        if self.cfg.trace_steps {
            trace!(iptr, op = %d.op, operand = d.operand, state = %self, "step");
        }
        self.iptr = self.iptr.wrapping_add(1);
        Ok(())
    }
}

fn show(v: Option<i64>) -> String {
    v.map_or_else(|| "None".to_string(), |v| v.to_string())
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WPTR:{}, IPTR:{}, Areg:{}, Breg:{}, Creg:{}, Oreg:{}",
            self.wptr,
            self.iptr,
            show(self.areg),
            show(self.breg),
            show(self.creg),
            self.oreg
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_shuffles_through_three_registers() {
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.push(1);
        cpu.push(2);
        cpu.push(3);
        cpu.push(4);
        assert_eq!((cpu.areg, cpu.breg, cpu.creg, cpu.depth), (Some(4), Some(3), Some(2), 3));
        assert_eq!(cpu.pop(Op::Add).unwrap(), 4);
        assert_eq!((cpu.areg, cpu.breg, cpu.creg, cpu.depth), (Some(3), Some(2), Some(2), 2));
    }

    #[test]
    fn undefined_register_traps() {
        let mut cpu = Cpu::new(CpuConfig::default());
        assert!(matches!(cpu.pop(Op::Stl), Err(Trap::UndefinedRegister { op: Op::Stl, reg: Reg::A })));
    }

    #[test]
    fn word_range() {
        let cpu = Cpu::new(CpuConfig::default());
        assert_eq!((cpu.min_int(), cpu.max_int()), (-32768, 32767));
        assert_eq!(cpu.wrap(0x8000), -32768);
        assert_eq!(cpu.wrap(-1), -1);
        assert_eq!(cpu.address(-2), 0xFFFE);
        assert!(cpu.checked(Op::Add, Some(32768)).is_err());
    }

    #[test]
    fn display_matches_state_dump() {
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.push(7);
        assert_eq!(cpu.to_string(), "WPTR:0, IPTR:0, Areg:7, Breg:None, Creg:None, Oreg:0");
    }
}
