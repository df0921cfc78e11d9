//! Fixed-point branch relaxation.
//!
//! A branch written as `J n` at original index `i` targets original index
//! `i + 1 + n`. Once literals are expanded, both ends have moved, and the
//! branch's own encoded length depends on the displacement it encodes. Each
//! pass re-encodes every branch against the current layout; the layout is
//! final once a pass changes no branch length and elides nothing.

use tracing::{debug, trace};

use crate::encoder::encoding_node;
use crate::error::{AsmError, Diagnostics, Located};
use crate::instructions::Op;
use crate::token::Token;
use crate::tree::{NodeId, NodeKind, Tree};

pub const DEFAULT_MAX_PASSES: usize = 64;

#[derive(Debug, Clone)]
struct PendingBranch {
    /// Top-level slot holding the branch encoding; overwritten on each pass.
    slot: NodeId,
    target: usize,
    estimated_len: usize,
    op: Op,
    instruction: Token,
    operand: Token,
    original_index: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassResult {
    pub changed: bool,
    pub elided: usize,
    pub resized: usize,
}

pub struct Relocator {
    tree: Tree,
    branches: Vec<PendingBranch>,
    passes: usize,
}

impl Relocator {
    /// Collect every branch placeholder and fix its target. All out-of-range
    /// targets are reported together.
    pub fn new(tree: Tree) -> Result<Self, Diagnostics> {
        let max = tree.max_original_index();
        let mut branches = Vec::new();
        let mut errors = Diagnostics::default();

        for &slot in tree.children(tree.root()) {
            let node = tree.node(slot);
            if !node.is_pending() {
                continue;
            }
            let (instruction, operand) = match (node.instruction(), node.operand()) {
                (Ok(i), Ok(o)) => (i.clone(), o.clone()),
                (Err(e), _) | (_, Err(e)) => {
                    errors.push(e);
                    continue;
                }
            };
            let Some(op) = instruction.op() else {
                errors.push(AsmError::MalformedTree(format!("branch {} has no opcode", instruction.text())));
                continue;
            };
            let target = (node.original_index() as i64 + 1)
                .checked_add(operand.value())
                .unwrap_or(i64::MAX);
            match usize::try_from(target) {
                Ok(t) if max.is_some_and(|m| t <= m) => branches.push(PendingBranch {
                    slot,
                    target: t,
                    estimated_len: 0,
                    op,
                    instruction,
                    operand,
                    original_index: node.original_index(),
                }),
                _ => errors.push(AsmError::OffsetOutOfRange { at: Located::pair(&instruction, &operand), target }),
            }
        }

        debug!(branches = branches.len(), "collected branches");
        errors.into_result(Self { tree, branches, passes: 0 })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn pending(&self) -> usize {
        self.branches.len()
    }

    /// Re-encode every branch once, left to right.
    pub fn pass(&mut self) -> Result<PassResult, AsmError> {
        let root = self.tree.root();
        let mut result = PassResult::default();
        let mut kept = Vec::with_capacity(self.branches.len());
        let mut pending = std::mem::take(&mut self.branches).into_iter();

        while let Some(mut branch) = pending.next() {
            match self.place(root, &mut branch, &mut result) {
                Ok(true) => kept.push(branch),
                Ok(false) => {}
                Err(err) => {
                    // Branches not yet placed stay pending for the next call.
                    kept.push(branch);
                    kept.extend(pending);
                    self.branches = kept;
                    return Err(err);
                }
            }
        }

        self.branches = kept;
        self.passes += 1;
        debug!(pass = self.passes, ?result, "relocation pass");
        Ok(result)
    }

    /// Elide or re-encode one branch. Returns whether it is still pending.
    fn place(&mut self, root: NodeId, branch: &mut PendingBranch, result: &mut PassResult) -> Result<bool, AsmError> {
        self.tree.generate_distances();
        let dest = self.tree.locate(branch.target).ok_or_else(|| AsmError::OffsetOutOfRange {
            at: Located::pair(&branch.instruction, &branch.operand),
            target: branch.target as i64,
        })?;

        if branch.op == Op::J && self.falls_through(branch, dest) {
            trace!(index = branch.original_index, "eliding jump to next instruction");
            self.tree.replace_child(root, branch.slot, None)?;
            result.elided += 1;
            result.changed = true;
            return Ok(false);
        }

        let start = self.tree.node(branch.slot).distance as i64;
        let movement = self.tree.node(dest).distance as i64 - start - branch.estimated_len as i64;
        let encoding = encoding_node(
            &mut self.tree,
            NodeKind::Offset,
            branch.original_index,
            &branch.instruction,
            &branch.operand,
            movement,
        )?;
        self.tree.overwrite(branch.slot, encoding);

        let len = self.tree.emitted_len(branch.slot);
        trace!(index = branch.original_index, movement, len, "encoded branch");
        if len != branch.estimated_len {
            branch.estimated_len = len;
            result.resized += 1;
            result.changed = true;
        }
        Ok(true)
    }

    /// Run passes until nothing changes, failing after `max_passes`.
    pub fn run(&mut self, max_passes: usize) -> Result<(), AsmError> {
        loop {
            if self.passes >= max_passes {
                return Err(AsmError::RelocationDidNotConverge { passes: self.passes });
            }
            if !self.pass()?.changed {
                return Ok(());
            }
        }
    }

    /// The first instruction after the branch is its destination.
    ///
    /// Only `J` is ever elided through this check. `CJ` pops Areg when it does
    /// not jump and `CALL` writes a frame, so both keep their encoding even
    /// when they target the next instruction.
    fn falls_through(&self, branch: &PendingBranch, dest: NodeId) -> bool {
        branch.target > branch.original_index && self.tree.locate(branch.original_index + 1) == Some(dest)
    }
}

/// Size and encode every branch in `tree`.
pub fn relocate(tree: Tree, max_passes: usize) -> Result<Tree, Diagnostics> {
    let mut relocator = Relocator::new(tree)?;
    relocator.run(max_passes)?;
    debug!(passes = relocator.passes(), "relocation converged");
    Ok(relocator.into_tree())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::decode_node;
    use crate::expand::expand;
    use crate::lexer::scan;
    use crate::parser::parse;
    use crate::prefix::validate;
    use pretty_assertions::assert_eq;

    fn prepared(src: &str) -> Tree {
        expand(&validate(parse(&scan(src).unwrap()).unwrap()).unwrap()).unwrap()
    }

    fn listing(tree: &Tree) -> Vec<(String, i64)> {
        tree.terminals(tree.root())
            .into_iter()
            .map(|t| {
                let n = tree.node(t);
                (n.instruction().unwrap().op().unwrap().mnemonic().to_string(), n.value().unwrap())
            })
            .collect()
    }

    fn rows(pairs: &[(&str, i64)]) -> Vec<(String, i64)> {
        pairs.iter().map(|&(m, v)| (m.to_string(), v)).collect()
    }

    #[test]
    fn jump_to_next_is_elided() {
        let tree = relocate(prepared("J 0\nLDC 1"), DEFAULT_MAX_PASSES).unwrap();
        assert_eq!(listing(&tree), rows(&[("LDC", 1)]));
    }

    #[test]
    fn conditional_to_next_is_kept() {
        let tree = relocate(prepared("CJ 0\nLDC 1"), DEFAULT_MAX_PASSES).unwrap();
        assert_eq!(listing(&tree), rows(&[("CJ", 0), ("LDC", 1)]));
    }

    #[test]
    fn jump_over_unsized_branch_is_kept() {
        let tree = relocate(prepared("J 1\nCJ 0\nLDC 1"), DEFAULT_MAX_PASSES).unwrap();
        assert_eq!(listing(&tree), rows(&[("J", 1), ("CJ", 0), ("LDC", 1)]));
    }

    #[test]
    fn chained_elision() {
        let tree = relocate(prepared("J 1\nJ 0\nLDC 1"), DEFAULT_MAX_PASSES).unwrap();
        assert_eq!(listing(&tree), rows(&[("LDC", 1)]));
    }

    #[test]
    fn self_loop() {
        let tree = relocate(prepared("LDC 1\nJ -1"), DEFAULT_MAX_PASSES).unwrap();
        assert_eq!(listing(&tree), rows(&[("LDC", 1), ("NFIX", 0), ("J", 14)]));
        let slot = tree.children(tree.root())[1];
        assert_eq!(decode_node(&tree, slot).unwrap(), -2);
    }

    #[test]
    fn forward_branch_over_wide_literals() {
        // 17 single-unit instructions between the branch and its target.
        let mut src = String::from("J 17\n");
        for _ in 0..17 {
            src.push_str("LDC 1\n");
        }
        src.push_str("REV\n");
        let mut relocator = Relocator::new(prepared(&src)).unwrap();
        let first = relocator.pass().unwrap();
        assert!(first.changed);
        assert_eq!(&listing(relocator.tree())[..2], &rows(&[("PFIX", 1), ("J", 1)])[..]);
        relocator.run(DEFAULT_MAX_PASSES).unwrap();
        let tree = relocator.into_tree();
        let listed = listing(&tree);
        assert_eq!(&listed[..2], &rows(&[("PFIX", 1), ("J", 1)])[..]);
        assert_eq!(listed.len(), 20);
    }

    #[test]
    fn growth_forces_another_pass() {
        // The forward jump grows to two units in the first pass, so the
        // backward jump over it has to be re-encoded in the second.
        let src = "J 16\n".to_string() + &"LDC 1\n".repeat(16) + "J -18";
        let mut relocator = Relocator::new(prepared(&src)).unwrap();
        relocator.run(DEFAULT_MAX_PASSES).unwrap();
        assert!(relocator.passes() >= 2);
        let tree = relocator.tree();
        let slots = tree.children(tree.root());
        let last = slots[slots.len() - 1];
        assert_eq!(decode_node(tree, slots[0]).unwrap(), 16);
        assert_eq!(decode_node(tree, last).unwrap(), -20);
        assert_eq!(tree.emitted_len(tree.root()), 20);
    }

    #[test]
    fn converged_layout_is_stable() {
        let src = "LDC 1\nJ 20\nCJ -2\nLDC 5000\nCALL 3\nJ 0\nLDC -300\nPFIX 1 J 0\nEQC 1\n"
            .to_string()
            + &"ADC 1\n".repeat(20)
            + "J -30\nREV";
        let mut relocator = Relocator::new(prepared(&src)).unwrap();
        relocator.run(DEFAULT_MAX_PASSES).unwrap();
        let before = listing(relocator.tree());
        let again = relocator.pass().unwrap();
        assert!(!again.changed);
        assert_eq!(listing(relocator.tree()), before);
        for (_, operand) in before {
            assert!((0..16).contains(&operand));
        }
    }

    #[test]
    fn out_of_range_targets_are_all_reported() {
        let err = Relocator::new(prepared("J 5\nLDC 1\nCJ -4\nJ 0")).err().unwrap();
        let targets: Vec<i64> = err
            .iter()
            .map(|e| match e {
                AsmError::OffsetOutOfRange { target, .. } => *target,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(targets, vec![6, -1, 4]);
    }

    #[test]
    fn displacement_past_i64_is_out_of_range() {
        let err = Relocator::new(prepared("LDC 1\nJ 9223372036854775807")).err().unwrap();
        assert!(matches!(
            err.0.as_slice(),
            [AsmError::OffsetOutOfRange { target: i64::MAX, .. }]
        ));
    }

    #[test]
    fn failed_pass_keeps_pending_branches() {
        let mut relocator = Relocator::new(prepared("CJ 0\nJ 1\nLDC 1\nLDC 2")).unwrap();
        let root = relocator.tree.root();
        let last = *relocator.tree.children(root).last().unwrap();
        relocator.tree.replace_child(root, last, None).unwrap();

        for _ in 0..2 {
            assert!(matches!(relocator.pass(), Err(AsmError::OffsetOutOfRange { target: 3, .. })));
            assert_eq!(relocator.pending(), 2);
        }
        assert_eq!(relocator.passes(), 0);
    }

    #[test]
    fn pass_cap_fails_closed() {
        let src = "J 20\n".to_string() + &"LDC 1\n".repeat(20) + "REV";
        let mut relocator = Relocator::new(prepared(&src)).unwrap();
        assert_eq!(relocator.run(1), Err(AsmError::RelocationDidNotConverge { passes: 1 }));
    }
}
