use std::fmt;

use serde::{Deserialize, Serialize};

/// Encoded length of an instruction in 4-bit function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Width {
    /// One function nibble, carries its own 4-bit operand.
    Single = 1,
    /// Two-nibble operation code, executed through `PFIX`/`OPR`.
    Double = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    // Single length
    Pfix,
    Nfix,
    Opr,
    Ldc,
    Ldl,
    Stl,
    Ldlp,
    Adc,
    Eqc,
    J,
    Cj,
    Ldnl,
    Stnl,
    Ldnlp,
    Call,
    Ajw,
    // Double length
    Rev,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Sum,
    Diff,
    Prod,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Gt,
    Lend,
    Bcnt,
    Wcnt,
    Ldpi,
    Mint,
    Bsub,
    Wsub,
    Move,
    In,
    Out,
    Lb,
    Sb,
    Outbyte,
    Outword,
    Gcall,
    Gajw,
    Ret,
    Startp,
    Endp,
    Runp,
    Stopp,
    Ldpri,
    Ldtimer,
    Tin,
    Alt,
    Altwt,
    Altend,
    Talt,
    Taltwt,
    Enbs,
    Diss,
    Enbc,
    Disc,
    Enbt,
    Dist,
    Csub0,
    Ccnt1,
    Testerr,
    Stoperr,
    Seterr,
    Xword,
    Cword,
    Xdble,
    Csngl,
    Ladd,
    Lsub,
    Lsum,
    Ldiff,
    Lmul,
    Ldiv,
    Lshl,
    Lshr,
    Norm,
    Resetch,
    Testpranal,
    Sthf,
    Stlf,
    Sttimer,
    Sthb,
    Stlb,
    Saveh,
    Savel,
    Clrhalterr,
    Sethalterr,
    Testhalterr,
}

#[derive(Debug, Clone, Copy)]
pub struct InstrDesc {
    pub op: Op,
    pub mnemonic: &'static str,
    pub code: u8,
    pub width: Width,
}

const fn single(op: Op, mnemonic: &'static str, code: u8) -> InstrDesc {
    InstrDesc { op, mnemonic, code, width: Width::Single }
}

const fn double(op: Op, mnemonic: &'static str, code: u8) -> InstrDesc {
    InstrDesc { op, mnemonic, code, width: Width::Double }
}

/// Instruction encoding of the 16-bit transputer, in handbook order.
pub const TABLE: &[InstrDesc] = &[
    single(Op::Pfix, "PFIX", 0x2),
    single(Op::Nfix, "NFIX", 0x6),
    single(Op::Opr, "OPR", 0xF),
    single(Op::Ldc, "LDC", 0x4),
    single(Op::Ldl, "LDL", 0x7),
    single(Op::Stl, "STL", 0xD),
    single(Op::Ldlp, "LDLP", 0x1),
    single(Op::Adc, "ADC", 0x8),
    single(Op::Eqc, "EQC", 0xC),
    single(Op::J, "J", 0x0),
    single(Op::Cj, "CJ", 0xA),
    single(Op::Ldnl, "LDNL", 0x3),
    single(Op::Stnl, "STNL", 0xE),
    single(Op::Ldnlp, "LDNLP", 0x5),
    single(Op::Call, "CALL", 0x9),
    single(Op::Ajw, "AJW", 0xB),
    double(Op::Rev, "REV", 0x00),
    double(Op::Add, "ADD", 0x05),
    double(Op::Sub, "SUB", 0x0C),
    double(Op::Mul, "MUL", 0x53),
    double(Op::Div, "DIV", 0x2C),
    double(Op::Rem, "REM", 0x1F),
    double(Op::Sum, "SUM", 0x52),
    double(Op::Diff, "DIFF", 0x04),
    double(Op::Prod, "PROD", 0x08),
    double(Op::And, "AND", 0x46),
    double(Op::Or, "OR", 0x4B),
    double(Op::Xor, "XOR", 0x33),
    double(Op::Not, "NOT", 0x32),
    double(Op::Shl, "SHL", 0x41),
    double(Op::Shr, "SHR", 0x40),
    double(Op::Gt, "GT", 0x09),
    double(Op::Lend, "LEND", 0x21),
    double(Op::Bcnt, "BCNT", 0x34),
    double(Op::Wcnt, "WCNT", 0x3F),
    double(Op::Ldpi, "LDPI", 0x1B),
    double(Op::Mint, "MINT", 0x42),
    double(Op::Bsub, "BSUB", 0x02),
    double(Op::Wsub, "WSUB", 0x0A),
    double(Op::Move, "MOVE", 0x4A),
    double(Op::In, "IN", 0x07),
    double(Op::Out, "OUT", 0x0B),
    double(Op::Lb, "LB", 0x01),
    double(Op::Sb, "SB", 0x3B),
    double(Op::Outbyte, "OUTBYTE", 0x0E),
    double(Op::Outword, "OUTWORD", 0x0F),
    double(Op::Gcall, "GCALL", 0x06),
    double(Op::Gajw, "GAJW", 0x3C),
    double(Op::Ret, "RET", 0x20),
    double(Op::Startp, "STARTP", 0x0D),
    double(Op::Endp, "ENDP", 0x03),
    double(Op::Runp, "RUNP", 0x39),
    double(Op::Stopp, "STOPP", 0x15),
    double(Op::Ldpri, "LDPRI", 0x1E),
    double(Op::Ldtimer, "LDTIMER", 0x22),
    double(Op::Tin, "TIN", 0x2B),
    double(Op::Alt, "ALT", 0x43),
    double(Op::Altwt, "ALTWT", 0x44),
    double(Op::Altend, "ALTEND", 0x45),
    double(Op::Talt, "TALT", 0x4E),
    double(Op::Taltwt, "TALTWT", 0x51),
    double(Op::Enbs, "ENBS", 0x49),
    double(Op::Diss, "DISS", 0x30),
    double(Op::Enbc, "ENBC", 0x48),
    double(Op::Disc, "DISC", 0x2F),
    double(Op::Enbt, "ENBT", 0x47),
    double(Op::Dist, "DIST", 0x2E),
    double(Op::Csub0, "CSUB0", 0x13),
    double(Op::Ccnt1, "CCNT1", 0x4D),
    double(Op::Testerr, "TESTERR", 0x29),
    double(Op::Stoperr, "STOPERR", 0x55),
    double(Op::Seterr, "SETERR", 0x10),
    double(Op::Xword, "XWORD", 0x3A),
    double(Op::Cword, "CWORD", 0x56),
    double(Op::Xdble, "XDBLE", 0x1D),
    double(Op::Csngl, "CSNGL", 0x4C),
    double(Op::Ladd, "LADD", 0x16),
    double(Op::Lsub, "LSUB", 0x38),
    double(Op::Lsum, "LSUM", 0x37),
    double(Op::Ldiff, "LDIFF", 0x4F),
    double(Op::Lmul, "LMUL", 0x31),
    double(Op::Ldiv, "LDIV", 0x1A),
    double(Op::Lshl, "LSHL", 0x36),
    double(Op::Lshr, "LSHR", 0x35),
    double(Op::Norm, "NORM", 0x19),
    double(Op::Resetch, "RESETCH", 0x12),
    double(Op::Testpranal, "TESTPRANAL", 0x2A),
    double(Op::Sthf, "STHF", 0x18),
    double(Op::Stlf, "STLF", 0x1C),
    double(Op::Sttimer, "STTIMER", 0x54),
    double(Op::Sthb, "STHB", 0x50),
    double(Op::Stlb, "STLB", 0x17),
    double(Op::Saveh, "SAVEH", 0x3E),
    double(Op::Savel, "SAVEL", 0x3D),
    double(Op::Clrhalterr, "CLRHALTERR", 0x57),
    double(Op::Sethalterr, "SETHALTERR", 0x58),
    double(Op::Testhalterr, "TESTHALTERR", 0x59),
];

impl Op {
    pub fn desc(self) -> &'static InstrDesc {
        // TABLE rows follow declaration order of `Op`.
        &TABLE[self as usize]
    }

    pub fn mnemonic(self) -> &'static str {
        self.desc().mnemonic
    }

    pub fn code(self) -> u8 {
        self.desc().code
    }

    pub fn width(self) -> Width {
        self.desc().width
    }

    pub fn is_prefix(self) -> bool {
        matches!(self, Op::Pfix | Op::Nfix)
    }

    /// Branches carry an instruction-relative displacement rather than a literal.
    pub fn is_branch(self) -> bool {
        matches!(self, Op::J | Op::Cj | Op::Call)
    }

    pub fn from_mnemonic(name: &str) -> Option<Op> {
        TABLE.iter().find(|d| d.mnemonic == name).map(|d| d.op)
    }

    /// Single-length instruction for a 4-bit function code.
    pub fn from_function(code: u8) -> Option<Op> {
        TABLE
            .iter()
            .find(|d| d.width == Width::Single && d.code == code)
            .map(|d| d.op)
    }

    /// Double-length instruction selected by an `OPR` operand.
    pub fn from_operate(code: i64) -> Option<Op> {
        TABLE
            .iter()
            .find(|d| d.width == Width::Double && i64::from(d.code) == code)
            .map(|d| d.op)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_op() {
        for (i, d) in TABLE.iter().enumerate() {
            assert_eq!(d.op as usize, i, "{} out of order", d.mnemonic);
            assert_eq!(d.op.desc().mnemonic, d.mnemonic);
            assert_eq!(Op::from_mnemonic(d.mnemonic), Some(d.op));
        }
        assert_eq!(TABLE.len(), 97);
    }

    #[test]
    fn function_codes_are_unique() {
        for code in 0..16u8 {
            let hits = TABLE
                .iter()
                .filter(|d| d.width == Width::Single && d.code == code)
                .count();
            assert_eq!(hits, 1, "function code {code:#x}");
        }
    }

    #[test]
    fn operate_lookup() {
        assert_eq!(Op::from_operate(0x53), Some(Op::Mul));
        assert_eq!(Op::from_operate(0x05), Some(Op::Add));
        assert_eq!(Op::from_operate(0x7F), None);
        assert_eq!(Op::from_function(0x0), Some(Op::J));
        assert!(Op::Call.is_branch());
        assert!(!Op::Ldc.is_branch());
    }
}
