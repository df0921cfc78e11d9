//! Expansion into emission form.
//!
//! Wide literals become prefix chains, double-length operations become
//! `[PFIX hi] OPR lo`, and branches become zero-size placeholders that the
//! relocator sizes later. Every generated node keeps the original index of
//! the instruction it came from.

use tracing::debug;

use crate::encoder::{decode_node, encoding_node};
use crate::error::AsmError;
use crate::instructions::Op;
use crate::tree::{Node, NodeId, NodeKind, Tree};

pub fn expand(input: &Tree) -> Result<Tree, AsmError> {
    let expected = input.num_leaves(input.root());
    let mut out = Tree::new();
    let root = out.root();
    let mut consumed = 0;

    for &stmt in input.children(input.root()) {
        let node = input.node(stmt);
        let id = match node.kind() {
            NodeKind::Single => {
                consumed += 1;
                single(input, stmt, &mut out)?
            }
            NodeKind::Double => {
                consumed += 1;
                double(input.node(stmt), &mut out)?
            }
            NodeKind::Offset => {
                consumed += 1;
                branch(input, stmt, &mut out)?
            }
            NodeKind::Chain => {
                let (id, used) = chain(input, stmt, &mut out)?;
                consumed += used;
                id
            }
            kind => return Err(AsmError::MalformedTree(format!("{kind:?} at top level"))),
        };
        out.add_child(root, id)?;
    }

    if consumed != expected {
        return Err(AsmError::LeafCountMismatch { stage: "expand", expected, found: consumed });
    }
    debug!(input = expected, output = out.num_leaves(root), "expanded");
    Ok(out)
}

fn copy(input: &Tree, id: NodeId, out: &mut Tree) -> Result<NodeId, AsmError> {
    let node = input.node(id);
    let copied = Node::terminal(
        node.kind(),
        node.original_index(),
        node.instruction()?.clone(),
        node.operand()?.clone(),
    );
    Ok(out.alloc(copied))
}

fn single(input: &Tree, id: NodeId, out: &mut Tree) -> Result<NodeId, AsmError> {
    let node = input.node(id);
    let value = node.value()?;
    if (0..16).contains(&value) {
        return copy(input, id, out);
    }
    let wide = encoding_node(out, node.kind(), node.original_index(), node.instruction()?, node.operand()?, value)?;
    Ok(out.alloc(wide))
}

fn double(node: &Node, out: &mut Tree) -> Result<NodeId, AsmError> {
    let instruction = node.instruction()?;
    let code = instruction
        .op()
        .map(Op::code)
        .ok_or_else(|| AsmError::MalformedTree(format!("{} is not an instruction", instruction.text())))?;
    let (hi, lo) = (code >> 4, code & 0xF);
    let index = node.original_index();
    let opr = Node::terminal(
        NodeKind::Single,
        index,
        instruction.derive_op(Op::Opr),
        instruction.derive_number(i64::from(lo)),
    );
    if hi == 0 {
        return Ok(out.alloc(opr));
    }
    let pfix = Node::terminal(
        NodeKind::Prefix,
        index,
        instruction.derive_op(Op::Pfix),
        instruction.derive_number(i64::from(hi)),
    );
    let children = vec![out.alloc(pfix), out.alloc(opr)];
    Ok(out.alloc(Node::group(NodeKind::Chain, index).with_children(children)))
}

/// Placeholder for a bare branch, or for a chain that ends in one. The
/// displacement is the value the whole chain decodes to.
fn branch(input: &Tree, id: NodeId, out: &mut Tree) -> Result<NodeId, AsmError> {
    let terminal = input.node(input.rightmost_leaf(id));
    let displacement = decode_node(input, id)?;
    let placeholder = Node::placeholder(
        terminal.original_index(),
        terminal.instruction()?.clone(),
        terminal.operand()?.derive_number(displacement),
    );
    Ok(out.alloc(placeholder))
}

fn chain(input: &Tree, id: NodeId, out: &mut Tree) -> Result<(NodeId, usize), AsmError> {
    let leaves = input.terminals(id);
    let Some((&head, rest)) = leaves.split_first() else {
        return Err(AsmError::MalformedTree("empty chain".into()));
    };
    let last = input.node(*leaves.last().unwrap_or(&head));
    if last.kind() == NodeKind::Offset {
        return Ok((branch(input, id, out)?, leaves.len()));
    }

    let head_node = input.node(head);
    let value = head_node.value()?;
    let mut children = Vec::with_capacity(leaves.len() + 2);
    if (0..16).contains(&value) {
        children.push(copy(input, head, out)?);
    } else {
        let wide = encoding_node(
            out,
            head_node.kind(),
            head_node.original_index(),
            head_node.instruction()?,
            head_node.operand()?,
            value,
        )?;
        if wide.is_terminal() {
            children.push(out.alloc(wide));
        } else {
            children.extend_from_slice(wide.children());
        }
    }
    for &leaf in rest {
        children.push(copy(input, leaf, out)?);
    }

    let first = head_node.original_index();
    Ok((out.alloc(Node::group(NodeKind::Chain, first).with_children(children)), leaves.len()))
}
