use tracing::warn;

use crate::cpu::{Cpu, Reg, Status, Trap};
use crate::decoder::Decoded;
use crate::instructions::Op;
use crate::memory::Bus;

pub trait Executor {
    fn exec<B: Bus>(&self, cpu: &mut Cpu, bus: &mut B, d: Decoded) -> Result<(), Trap>;
}

/// Integer subset of the instruction set. Every single-length function is
/// handled; `OPR` dispatches the double-length operations below and traps on
/// the rest.
pub struct IntExecutor;

impl Executor for IntExecutor {
    fn exec<B: Bus>(&self, cpu: &mut Cpu, bus: &mut B, d: Decoded) -> Result<(), Trap> {
        let o = cpu.oreg;
        match d.op {
            Op::Pfix => {
                cpu.oreg = o.wrapping_shl(4);
                return Ok(());
            }
            Op::Nfix => {
                cpu.oreg = (!o).wrapping_shl(4);
                return Ok(());
            }
            Op::Opr => {
                let op = Op::from_operate(o).ok_or(Trap::InvalidOperate { code: o })?;
                self.operate(cpu, bus, op)?;
            }
            Op::Ldc => cpu.push(o),
            Op::Ldl => {
                let addr = cpu.word_offset(Op::Ldl, cpu.wptr, o)?;
                let v = cpu.read_word(bus, addr)?;
                cpu.push(v);
            }
            Op::Stl => {
                let addr = cpu.word_offset(Op::Stl, cpu.wptr, o)?;
                let v = cpu.pop(Op::Stl)?;
                cpu.write_word(bus, addr, v)?;
            }
            Op::Ldlp => {
                let addr = cpu.word_offset(Op::Ldlp, cpu.wptr, o)?;
                cpu.push(addr);
            }
            Op::Adc => {
                let a = cpu.reg(Op::Adc, Reg::A)?;
                cpu.areg = Some(cpu.checked(Op::Adc, a.checked_add(o))?);
            }
            Op::Eqc => {
                let a = cpu.reg(Op::Eqc, Reg::A)?;
                cpu.areg = Some(i64::from(a == o));
            }
            Op::J => cpu.jump(Op::J, o)?,
            Op::Cj => {
                if cpu.reg(Op::Cj, Reg::A)? == 0 {
                    cpu.jump(Op::Cj, o)?;
                } else {
                    cpu.pop(Op::Cj)?;
                }
            }
            Op::Ldnl => {
                let a = cpu.reg(Op::Ldnl, Reg::A)?;
                let addr = cpu.word_offset(Op::Ldnl, a, o)?;
                cpu.areg = Some(cpu.read_word(bus, addr)?);
            }
            Op::Stnl => {
                let base = cpu.reg(Op::Stnl, Reg::A)?;
                let addr = cpu.word_offset(Op::Stnl, base, o)?;
                cpu.pop(Op::Stnl)?;
                let v = cpu.pop(Op::Stnl)?;
                cpu.write_word(bus, addr, v)?;
            }
            Op::Ldnlp => {
                let a = cpu.reg(Op::Ldnlp, Reg::A)?;
                cpu.areg = Some(cpu.word_offset(Op::Ldnlp, a, o)?);
            }
            Op::Call => {
                // The return slot holds the call's own position; the step
                // increment after `RET` lands on the next instruction.
                cpu.wptr = cpu.word_offset(Op::Call, cpu.wptr, -4)?;
                cpu.write_word(bus, cpu.wptr, cpu.iptr)?;
                let saved = [cpu.areg, cpu.breg, cpu.creg];
                for (k, v) in saved.into_iter().enumerate() {
                    if let Some(v) = v {
                        let addr = cpu.word_offset(Op::Call, cpu.wptr, k as i64 + 1)?;
                        cpu.write_word(bus, addr, v)?;
                    }
                }
                cpu.areg = Some(cpu.iptr + 1);
                cpu.jump(Op::Call, o)?;
            }
            Op::Ajw => cpu.wptr = cpu.word_offset(Op::Ajw, cpu.wptr, o)?,
            op => {
                warn!(%op, "double-length instruction fetched as a function");
                return Err(Trap::NotImplemented { op });
            }
        }
        cpu.oreg = 0;
        Ok(())
    }
}

impl IntExecutor {
    fn binary(cpu: &mut Cpu, op: Op) -> Result<(i64, i64), Trap> {
        let a = cpu.pop(op)?;
        let b = cpu.reg(op, Reg::A)?;
        Ok((a, b))
    }

    fn operate<B: Bus>(&self, cpu: &mut Cpu, bus: &mut B, op: Op) -> Result<(), Trap> {
        let bpw = cpu.bytes_per_word();
        match op {
            Op::Rev => std::mem::swap(&mut cpu.areg, &mut cpu.breg),
            Op::Add => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(cpu.checked(op, b.checked_add(a))?);
            }
            Op::Sub => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(cpu.checked(op, b.checked_sub(a))?);
            }
            Op::Mul => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(cpu.checked(op, b.checked_mul(a))?);
            }
            Op::Div | Op::Rem => {
                let (a, b) = Self::binary(cpu, op)?;
                if a == 0 {
                    return Err(Trap::DivideByZero { op });
                }
                let v = if op == Op::Div { b.checked_div(a) } else { b.checked_rem(a) };
                cpu.areg = Some(cpu.checked(op, v)?);
            }
            Op::Sum => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(cpu.wrap(b.wrapping_add(a)));
            }
            Op::Diff => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(cpu.wrap(b.wrapping_sub(a)));
            }
            Op::Prod => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(cpu.wrap(b.wrapping_mul(a)));
            }
            Op::And => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(b & a);
            }
            Op::Or => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(b | a);
            }
            Op::Xor => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(b ^ a);
            }
            Op::Not => {
                let a = cpu.reg(op, Reg::A)?;
                cpu.areg = Some(!a);
            }
            Op::Shl | Op::Shr => {
                let (a, b) = Self::binary(cpu, op)?;
                let bits = i64::from(cpu.cfg.word_bits);
                let v = if !(0..bits).contains(&a) {
                    0
                } else if op == Op::Shl {
                    cpu.wrap(b << a)
                } else {
                    // Logical: shift the unsigned word.
                    let unsigned = b & ((1i64 << bits) - 1);
                    cpu.wrap(unsigned >> a)
                };
                cpu.areg = Some(v);
            }
            Op::Gt => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(i64::from(b > a));
            }
            Op::Mint => cpu.push(cpu.min_int()),
            Op::Bsub => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(cpu.wrap(a.wrapping_add(b)));
            }
            Op::Wsub => {
                let (a, b) = Self::binary(cpu, op)?;
                cpu.areg = Some(cpu.wrap(a.wrapping_add(b.wrapping_mul(bpw))));
            }
            Op::Bcnt => {
                let a = cpu.reg(op, Reg::A)?;
                cpu.areg = Some(cpu.wrap(a.wrapping_mul(bpw)));
            }
            Op::Wcnt => {
                let a = cpu.reg(op, Reg::A)?;
                let select_bits = i64::from(bpw.trailing_zeros());
                cpu.areg = Some(a >> select_bits);
                cpu.creg = cpu.breg;
                cpu.breg = Some(a & cpu.byte_select_mask());
                cpu.depth = (cpu.depth + 1).min(3);
            }
            Op::Lb => {
                let a = cpu.reg(op, Reg::A)?;
                let addr = cpu.address(a);
                let v = bus.read_u8(addr).map_err(|source| Trap::Bus { addr, source })?;
                cpu.areg = Some(i64::from(v));
            }
            Op::Sb => {
                let a = cpu.pop(op)?;
                let v = cpu.pop(op)?;
                let addr = cpu.address(a);
                bus.write_u8(addr, v as u8).map_err(|source| Trap::Bus { addr, source })?;
            }
            Op::Ret => {
                cpu.iptr = cpu.read_word(bus, cpu.wptr)?;
                cpu.wptr = cpu.word_offset(op, cpu.wptr, 4)?;
            }
            Op::Gajw => {
                let a = cpu.reg(op, Reg::A)?;
                cpu.areg = Some(cpu.wptr);
                cpu.wptr = a;
            }
            Op::Seterr => {
                cpu.status.insert(Status::ERROR);
                if cpu.status.contains(Status::HALT_ON_ERROR) {
                    return Err(Trap::HaltOnError);
                }
            }
            Op::Testerr => {
                let clear = !cpu.status.contains(Status::ERROR);
                cpu.push(i64::from(clear));
                cpu.status.remove(Status::ERROR);
            }
            Op::Stoperr => {
                if cpu.status.contains(Status::ERROR) {
                    return Err(Trap::Stopped);
                }
            }
            Op::Clrhalterr => cpu.status.remove(Status::HALT_ON_ERROR),
            Op::Sethalterr => cpu.status.insert(Status::HALT_ON_ERROR),
            Op::Testhalterr => cpu.push(i64::from(cpu.status.contains(Status::HALT_ON_ERROR))),
            op => {
                warn!(%op, "unimplemented operation");
                return Err(Trap::NotImplemented { op });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuConfig;
    use crate::memory::LinearMemory;

    fn run(steps: &[(Op, u8)]) -> (Cpu, LinearMemory, Result<(), Trap>) {
        let mut cpu = Cpu::new(CpuConfig::default());
        let mut mem = LinearMemory::new(1 << 16);
        let exec = IntExecutor;
        for &(op, operand) in steps {
            cpu.oreg += i64::from(operand);
            if let Err(t) = exec.exec(&mut cpu, &mut mem, Decoded { op, operand }) {
                return (cpu, mem, Err(t));
            }
            cpu.iptr += 1;
        }
        (cpu, mem, Ok(()))
    }

    #[test]
    fn operate_dispatches_on_oreg() {
        // LDC 7, LDC 5, PFIX 5 OPR 3 (MUL)
        let (cpu, _, res) = run(&[(Op::Ldc, 7), (Op::Ldc, 5), (Op::Pfix, 5), (Op::Opr, 3)]);
        res.unwrap();
        assert_eq!(cpu.areg, Some(35));
        assert_eq!(cpu.oreg, 0);
    }

    #[test]
    fn negative_operate_is_invalid() {
        let (_, _, res) = run(&[(Op::Nfix, 0), (Op::Opr, 0)]);
        assert!(matches!(res, Err(Trap::InvalidOperate { code: -16 })));
    }

    #[test]
    fn unimplemented_operate() {
        // PFIX 4 OPR 10 is MOVE.
        let (_, _, res) = run(&[(Op::Pfix, 4), (Op::Opr, 10)]);
        assert!(matches!(res, Err(Trap::NotImplemented { op: Op::Move })));
    }

    #[test]
    fn add_overflow_traps() {
        let (_, _, res) = run(&[
            (Op::Pfix, 7),
            (Op::Pfix, 15),
            (Op::Pfix, 15),
            (Op::Ldc, 15),
            (Op::Ldc, 1),
            (Op::Opr, 5),
        ]);
        assert!(matches!(res, Err(Trap::Overflow { op: Op::Add })));
    }

    #[test]
    fn store_and_load_local() {
        let (cpu, mem, res) = run(&[(Op::Ldc, 9), (Op::Stl, 1), (Op::Ldl, 1)]);
        res.unwrap();
        assert_eq!(cpu.areg, Some(9));
        assert_eq!(&mem.mem[2..4], &[9, 0]);
    }

    #[test]
    fn halt_on_error() {
        let (cpu, _, res) = run(&[(Op::Pfix, 5), (Op::Opr, 8), (Op::Pfix, 1), (Op::Opr, 0)]);
        assert!(matches!(res, Err(Trap::HaltOnError)));
        assert!(cpu.status.contains(Status::ERROR | Status::HALT_ON_ERROR));
    }
}
