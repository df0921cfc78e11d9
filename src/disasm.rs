use crate::decoder::Decoded;
use crate::encoder::decode;
use crate::instructions::Op;
use crate::program::Emitted;

pub fn fmt_decoded(d: &Decoded) -> String {
    format!("{} {}", d.op, d.operand)
}

pub fn fmt_instruction(e: &Emitted) -> String {
    fmt_decoded(&e.decoded())
}

/// Render `code` one line per instruction, resolving the operation behind
/// each `OPR` and the absolute target of each branch.
pub fn annotate(code: &[Decoded]) -> Vec<String> {
    let mut out = Vec::with_capacity(code.len());
    let mut chain: Vec<(Op, i64)> = Vec::new();
    for (i, d) in code.iter().enumerate() {
        let text = fmt_decoded(d);
        chain.push((d.op, i64::from(d.operand)));
        if d.op.is_prefix() {
            out.push(text);
            continue;
        }
        let value = decode(chain.drain(..));
        let note = match d.op {
            Op::Opr => match Op::from_operate(value) {
                Some(op) => op.to_string(),
                None => format!("invalid operation {value}"),
            },
            op if op.is_branch() => format!("-> {}", (i as i64 + 1).wrapping_add(value)),
            _ if value != i64::from(d.operand) => format!("= {value}"),
            _ => String::new(),
        };
        if note.is_empty() {
            out.push(text);
        } else {
            out.push(format!("{text:<10}; {note}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(op: Op, operand: u8) -> Decoded {
        Decoded { op, operand }
    }

    #[test]
    fn annotates_operations_branches_and_wide_literals() {
        let code = [
            d(Op::Pfix, 1),
            d(Op::Ldc, 4),
            d(Op::Pfix, 5),
            d(Op::Opr, 3),
            d(Op::Nfix, 0),
            d(Op::J, 14),
            d(Op::Ldl, 2),
        ];
        assert_eq!(
            annotate(&code),
            vec![
                "PFIX 1",
                "LDC 4     ; = 20",
                "PFIX 5",
                "OPR 3     ; MUL",
                "NFIX 0",
                "J 14      ; -> 4",
                "LDL 2",
            ]
        );
    }
}
