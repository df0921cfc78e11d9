//! Prefix-literal encoding.
//!
//! The processor builds wide operands in its operand register: each `PFIX n`
//! computes `acc = (acc + n) << 4`, each `NFIX n` computes
//! `acc = !(acc + n) << 4`, and the final instruction consumes `acc + n`.

use crate::error::AsmError;
use crate::instructions::Op;
use crate::token::Token;
use crate::tree::{Node, NodeId, NodeKind, Tree};

/// One emitted instruction of a prefix chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub op: Op,
    pub nibble: u8,
}

/// Shortest chain ending in `terminal` whose execution yields `value`.
pub fn encode(value: i64, terminal: Op) -> Vec<Step> {
    let mut steps = Vec::new();
    encode_into(value, terminal, &mut steps);
    steps
}

fn encode_into(value: i64, op: Op, out: &mut Vec<Step>) {
    if value >= 16 {
        encode_into(value >> 4, Op::Pfix, out);
    } else if value < 0 {
        encode_into(!value >> 4, Op::Nfix, out);
    }
    out.push(Step { op, nibble: (value & 0xF) as u8 });
}

/// Number of instructions `encode(value, _)` produces.
pub fn encoded_len(value: i64) -> usize {
    let mut len = 1;
    let mut v = value;
    while !(0..16).contains(&v) {
        v = if v < 0 { !v >> 4 } else { v >> 4 };
        len += 1;
    }
    len
}

/// Value an instruction sequence leaves for its final instruction.
///
/// Literals are not range-checked, so an unexpanded chain head holding a wide
/// value decodes the same way the executor would run it.
pub fn decode<I>(chain: I) -> i64
where
    I: IntoIterator<Item = (Op, i64)>,
{
    let mut acc: i64 = 0;
    let mut iter = chain.into_iter().peekable();
    while let Some((op, n)) = iter.next() {
        let sum = acc.wrapping_add(n);
        if iter.peek().is_none() {
            return sum;
        }
        acc = match op {
            Op::Nfix => (!sum).wrapping_shl(4),
            _ => sum.wrapping_shl(4),
        };
    }
    acc
}

pub fn decode_steps(steps: &[Step]) -> i64 {
    decode(steps.iter().map(|s| (s.op, i64::from(s.nibble))))
}

/// Decode the literal held by a terminal or chain node.
pub fn decode_node(tree: &Tree, id: NodeId) -> Result<i64, AsmError> {
    let mut pairs = Vec::new();
    for leaf in tree.terminals(id) {
        let node = tree.node(leaf);
        let op = node
            .instruction()?
            .op()
            .ok_or_else(|| AsmError::MalformedTree("terminal without an opcode".into()))?;
        pairs.push((op, node.value()?));
    }
    Ok(decode(pairs))
}

/// Build the node that emits `value` through `instruction`.
///
/// Generated tokens take their position from `operand`, the final
/// instruction keeps `instruction` itself. A single-step encoding is returned
/// as a bare terminal of `kind`; longer ones as a `Chain` whose children are
/// allocated in `tree`. Every generated node carries `original_index`.
pub fn encoding_node(
    tree: &mut Tree,
    kind: NodeKind,
    original_index: usize,
    instruction: &Token,
    operand: &Token,
    value: i64,
) -> Result<Node, AsmError> {
    let terminal = instruction
        .op()
        .ok_or_else(|| AsmError::MalformedTree(format!("{} is not an instruction", instruction.text())))?;
    let steps = encode(value, terminal);
    let (last, prefixes) = steps
        .split_last()
        .ok_or_else(|| AsmError::MalformedTree("empty encoding".into()))?;
    let head = Node::terminal(kind, original_index, instruction.clone(), operand.derive_number(i64::from(last.nibble)));
    if prefixes.is_empty() {
        return Ok(head);
    }
    let mut children = Vec::with_capacity(steps.len());
    for step in prefixes {
        let node = Node::terminal(
            NodeKind::Prefix,
            original_index,
            operand.derive_op(step.op),
            operand.derive_number(i64::from(step.nibble)),
        );
        children.push(tree.alloc(node));
    }
    children.push(tree.alloc(head));
    Ok(Node::group(NodeKind::Chain, original_index).with_children(children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn steps(pairs: &[(Op, u8)]) -> Vec<Step> {
        pairs.iter().map(|&(op, nibble)| Step { op, nibble }).collect()
    }

    #[test]
    fn small_values_need_no_prefix() {
        for v in 0..16 {
            assert_eq!(encode(v, Op::Ldc), steps(&[(Op::Ldc, v as u8)]));
        }
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode(20, Op::Ldc), steps(&[(Op::Pfix, 1), (Op::Ldc, 4)]));
        assert_eq!(encode(17, Op::J), steps(&[(Op::Pfix, 1), (Op::J, 1)]));
        assert_eq!(encode(-1, Op::Ldc), steps(&[(Op::Nfix, 0), (Op::Ldc, 15)]));
        assert_eq!(encode(-256, Op::Ldc), steps(&[(Op::Nfix, 15), (Op::Ldc, 0)]));
        assert_eq!(
            encode(-257, Op::Ldc),
            steps(&[(Op::Pfix, 1), (Op::Nfix, 0), (Op::Ldc, 15)])
        );
        assert_eq!(
            encode(0x1234, Op::Adc),
            steps(&[(Op::Pfix, 1), (Op::Pfix, 2), (Op::Pfix, 3), (Op::Adc, 4)])
        );
    }

    #[test]
    fn round_trip_wide_range() {
        for v in -70_000..70_000 {
            let chain = encode(v, Op::Ldc);
            assert_eq!(decode_steps(&chain), v, "value {v}");
            assert_eq!(chain.len(), encoded_len(v));
            assert_eq!(chain.last().map(|s| s.op), Some(Op::Ldc));
        }
        for v in [i64::from(i32::MAX), i64::from(i32::MIN), 1 << 40, -(1 << 40)] {
            assert_eq!(decode_steps(&encode(v, Op::Eqc)), v);
        }
    }

    #[test]
    fn encodings_are_minimal() {
        // Shortest chain reaching each value, by exhaustive search up to 3 steps.
        let mut shortest: HashMap<i64, usize> = HashMap::new();
        let prefix_ops = [Op::Pfix, Op::Nfix];
        let mut frontier: Vec<Vec<(Op, i64)>> = vec![Vec::new()];
        for len in 1..=3 {
            for prefix in &frontier {
                for n in 0..16 {
                    let mut chain = prefix.clone();
                    chain.push((Op::Ldc, n));
                    shortest.entry(decode(chain)).or_insert(len);
                }
            }
            let mut next = Vec::new();
            for prefix in &frontier {
                for op in prefix_ops {
                    for n in 0..16 {
                        let mut chain = prefix.clone();
                        chain.push((op, n));
                        next.push(chain);
                    }
                }
            }
            frontier = next;
        }
        for v in -5000..5000 {
            let got = encode(v, Op::Ldc).len();
            match shortest.get(&v) {
                Some(&best) => assert_eq!(got, best, "value {v}"),
                None => assert!(got > 3, "value {v} reachable in {got} but not found"),
            }
            assert_eq!(got == 1, (0..16).contains(&v));
        }
    }

    #[test]
    fn decode_unexpanded_head() {
        // PFIX 300 LDC 1 as written, before expansion.
        assert_eq!(decode([(Op::Pfix, 300), (Op::Ldc, 1)]), 4801);
        let expanded: Vec<(Op, i64)> = encode(300, Op::Pfix)
            .into_iter()
            .map(|s| (s.op, i64::from(s.nibble)))
            .chain([(Op::Ldc, 1)])
            .collect();
        assert_eq!(decode(expanded), 4801);
    }

    #[test]
    fn encoding_node_shapes() {
        let mut tree = Tree::new();
        let ldc = Token::instruction(Op::Ldc, 3, 0);
        let opd = Token::number(20, 3, 4);
        let node = encoding_node(&mut tree, NodeKind::Single, 7, &ldc, &opd, 20).unwrap();
        assert_eq!(node.kind(), NodeKind::Chain);
        assert_eq!(node.original_index(), 7);
        let id = tree.alloc(node);
        assert_eq!(decode_node(&tree, id).unwrap(), 20);
        let leaves = tree.terminals(id);
        assert_eq!(leaves.len(), 2);
        let prefix = tree.node(leaves[0]);
        assert_eq!(prefix.kind(), NodeKind::Prefix);
        assert_eq!(prefix.instruction().unwrap().op(), Some(Op::Pfix));
        assert_eq!(prefix.instruction().unwrap().line(), 3);
        assert_eq!(prefix.original_index(), 7);

        let bare = encoding_node(&mut tree, NodeKind::Single, 1, &ldc, &opd, 9).unwrap();
        assert_eq!(bare.kind(), NodeKind::Single);
        assert_eq!(bare.value().unwrap(), 9);
    }
}
