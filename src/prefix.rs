//! Prefix-chain validation, run between parsing and expansion.
//!
//! Only the head of a chain may carry a literal wider than a nibble; the
//! expander widens it. Leading `PFIX 0` nodes contribute nothing and are
//! dropped, and a chain left with a single node becomes that node.

use tracing::debug;

use crate::error::{AsmError, Diagnostics, Located};
use crate::instructions::Op;
use crate::tree::{Node, NodeId, NodeKind, Tree};

pub fn validate(mut tree: Tree) -> Result<Tree, Diagnostics> {
    let root = tree.root();
    let mut errors = Diagnostics::default();
    for stmt in tree.children(root).to_vec() {
        if tree.node(stmt).kind() != NodeKind::Chain {
            continue;
        }
        if let Err(err) = check_chain(&mut tree, root, stmt, &mut errors) {
            errors.push(err);
        }
    }
    debug!(errors = errors.len(), "validated prefix chains");
    errors.into_result(tree)
}

fn check_chain(tree: &mut Tree, root: NodeId, chain: NodeId, errors: &mut Diagnostics) -> Result<(), AsmError> {
    let mut children = tree.children(chain).to_vec();
    while children.len() > 1 && is_zero_pfix(tree.node(children[0]))? {
        children.remove(0);
    }

    for &child in children.iter().skip(1) {
        let node = tree.node(child);
        let value = node.value()?;
        if !(0..16).contains(&value) {
            errors.push(AsmError::InvalidPrefixing { at: Located::pair(node.instruction()?, node.operand()?) });
        }
    }

    match children.as_slice() {
        [] => Err(AsmError::MalformedTree("empty chain".into())),
        [only] => tree.replace_child(root, chain, Some(*only)),
        [head, ..] => {
            let first = tree.node(*head).original_index();
            tree.overwrite(chain, Node::group(NodeKind::Chain, first).with_children(children));
            Ok(())
        }
    }
}

fn is_zero_pfix(node: &Node) -> Result<bool, AsmError> {
    Ok(node.kind() == NodeKind::Prefix && node.instruction()?.op() == Some(Op::Pfix) && node.value()? == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::scan;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn validated(src: &str) -> Result<Tree, Diagnostics> {
        validate(parse(&scan(src).unwrap()).unwrap())
    }

    fn top_kinds(tree: &Tree) -> Vec<(NodeKind, usize)> {
        tree.children(tree.root())
            .iter()
            .map(|&c| (tree.node(c).kind(), tree.num_leaves(c)))
            .collect()
    }

    #[test]
    fn strips_leading_zero_prefixes() {
        let tree = validated("PFIX 0 PFIX 0 LDC 3\nPFIX 0 PFIX 2 LDC 1\nPFIX 0 J 4").unwrap();
        assert_eq!(
            top_kinds(&tree),
            vec![(NodeKind::Single, 1), (NodeKind::Chain, 2), (NodeKind::Offset, 1)]
        );
        let chain = tree.children(tree.root())[1];
        assert_eq!(tree.node(chain).original_index(), 4);
    }

    #[test]
    fn keeps_nfix_zero() {
        let tree = validated("NFIX 0 LDC 15").unwrap();
        assert_eq!(top_kinds(&tree), vec![(NodeKind::Chain, 2)]);
    }

    #[test]
    fn head_may_be_wide() {
        assert!(validated("PFIX 300 LDC 1\nLDC 5000\nNFIX -3 ADC 2").is_ok());
    }

    #[test]
    fn rejects_wide_tail_literals() {
        let err = validated("PFIX 1 PFIX 16 LDC 2\nLDC 1\nPFIX 1 LDC -1").unwrap_err();
        let texts: Vec<String> = err
            .iter()
            .map(|e| match e {
                AsmError::InvalidPrefixing { at } => format!("{}:{}", at.line, at.text),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["1:PFIX 16", "3:LDC -1"]);
    }
}
