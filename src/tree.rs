//! Arena-backed instruction tree.
//!
//! Nodes live in a flat arena and are addressed by [`NodeId`]. Children are
//! ordered; there are no parent links because every pass walks top-down from
//! the root. Replacing a node overwrites its arena slot, so handles held by
//! later passes stay valid.

use crate::error::AsmError;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Root: ordered top-level instruction groups.
    Statements,
    /// Prefix nodes followed by exactly one non-prefix terminal.
    Chain,
    /// Instruction with a literal operand.
    Single,
    /// Two-nibble operation, split by the expander.
    Double,
    /// `PFIX`/`NFIX` with a literal.
    Prefix,
    /// Branch whose operand is a relative displacement.
    Offset,
}

impl NodeKind {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeKind::Statements | NodeKind::Chain)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    instruction: Option<Token>,
    operand: Option<Token>,
    children: Vec<NodeId>,
    /// Position among emitted instructions, valid after [`Tree::generate_distances`].
    pub distance: usize,
    original_index: usize,
    /// Unresolved branch: reports a distance but occupies no space.
    pending: bool,
}

impl Node {
    pub fn group(kind: NodeKind, original_index: usize) -> Self {
        debug_assert!(!kind.is_terminal());
        Self {
            kind,
            instruction: None,
            operand: None,
            children: Vec::new(),
            distance: 0,
            original_index,
            pending: false,
        }
    }

    /// Terminal without tokens yet; fill with `set_instruction`/`set_operand`.
    pub fn leaf(kind: NodeKind, original_index: usize) -> Self {
        debug_assert!(kind.is_terminal());
        Self {
            kind,
            instruction: None,
            operand: None,
            children: Vec::new(),
            distance: 0,
            original_index,
            pending: false,
        }
    }

    pub fn terminal(kind: NodeKind, original_index: usize, instruction: Token, operand: Token) -> Self {
        Self {
            instruction: Some(instruction),
            operand: Some(operand),
            ..Self::leaf(kind, original_index)
        }
    }

    /// Zero-size stand-in for a branch until relocation sizes it.
    pub fn placeholder(original_index: usize, instruction: Token, operand: Token) -> Self {
        Self { pending: true, ..Self::terminal(NodeKind::Offset, original_index, instruction, operand) }
    }

    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        debug_assert!(!self.is_terminal());
        self.children = children;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn original_index(&self) -> usize {
        self.original_index
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn instruction(&self) -> Result<&Token, AsmError> {
        self.instruction
            .as_ref()
            .ok_or_else(|| AsmError::MalformedTree(format!("{:?} node has no instruction", self.kind)))
    }

    pub fn operand(&self) -> Result<&Token, AsmError> {
        self.operand
            .as_ref()
            .ok_or_else(|| AsmError::MalformedTree(format!("{:?} node has no operand", self.kind)))
    }

    pub fn set_instruction(&mut self, token: Token) -> Result<(), AsmError> {
        if !self.is_terminal() {
            return Err(AsmError::MalformedTree(format!("{:?} is not terminal", self.kind)));
        }
        if self.instruction.is_some() {
            return Err(AsmError::MalformedTree("instruction already set".into()));
        }
        self.instruction = Some(token);
        Ok(())
    }

    pub fn set_operand(&mut self, token: Token) -> Result<(), AsmError> {
        if self.instruction.is_none() {
            return Err(AsmError::MalformedTree(format!("{:?} node has no instruction", self.kind)));
        }
        if self.operand.is_some() {
            return Err(AsmError::MalformedTree("operand already set".into()));
        }
        self.operand = Some(token);
        Ok(())
    }

    /// Literal carried by the operand token.
    pub fn value(&self) -> Result<i64, AsmError> {
        Ok(self.operand()?.value())
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self { nodes: vec![Node::group(NodeKind::Statements, 0)], root: NodeId(0) }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), AsmError> {
        let p = &mut self.nodes[parent.0];
        if p.is_terminal() {
            return Err(AsmError::MalformedTree(format!("cannot add a child to {:?}", p.kind)));
        }
        p.children.push(child);
        Ok(())
    }

    /// Allocate `node` and append it under `parent`.
    pub fn push(&mut self, parent: NodeId, node: Node) -> Result<NodeId, AsmError> {
        let id = self.alloc(node);
        self.add_child(parent, id)?;
        Ok(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn num_children(&self, id: NodeId) -> usize {
        self.nodes[id.0].children.len()
    }

    /// Terminal nodes under `id`, pending placeholders included.
    pub fn num_leaves(&self, id: NodeId) -> usize {
        let node = &self.nodes[id.0];
        if node.is_terminal() {
            return 1;
        }
        node.children.iter().map(|&c| self.num_leaves(c)).sum()
    }

    /// Instructions `id` currently emits; placeholders count as zero.
    pub fn emitted_len(&self, id: NodeId) -> usize {
        let node = &self.nodes[id.0];
        if node.is_terminal() {
            return usize::from(!node.pending);
        }
        node.children.iter().map(|&c| self.emitted_len(c)).sum()
    }

    /// Swap `old` under `parent` for `new`, or drop it when `new` is `None`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: Option<NodeId>) -> Result<(), AsmError> {
        let p = &mut self.nodes[parent.0];
        let pos = p.children.iter().position(|&c| c == old).ok_or_else(|| {
            AsmError::MalformedTree(format!("node {} is not a child of node {}", old.0, parent.0))
        })?;
        match new {
            Some(n) => p.children[pos] = n,
            None => {
                p.children.remove(pos);
            }
        }
        Ok(())
    }

    /// Replace the node stored at `id`; every handle to `id` now sees `node`.
    pub fn overwrite(&mut self, id: NodeId, node: Node) {
        self.nodes[id.0] = node;
    }

    /// Renumber `distance` over the whole tree, left to right from 0.
    pub fn generate_distances(&mut self) -> usize {
        let root = self.root;
        self.nodes[root.0].distance = 0;
        let children = self.nodes[root.0].children.clone();
        children.into_iter().fold(0, |at, c| self.distances_from(c, at))
    }

    fn distances_from(&mut self, id: NodeId, at: usize) -> usize {
        let node = &mut self.nodes[id.0];
        node.distance = at;
        if node.is_terminal() {
            return if node.pending { at } else { at + 1 };
        }
        let children = node.children.clone();
        children.into_iter().fold(at, |at, c| self.distances_from(c, at))
    }

    pub fn leftmost_leaf(&self, mut id: NodeId) -> NodeId {
        while let Some(&first) = self.nodes[id.0].children.first() {
            id = first;
        }
        id
    }

    pub fn rightmost_leaf(&self, mut id: NodeId) -> NodeId {
        while let Some(&last) = self.nodes[id.0].children.last() {
            id = last;
        }
        id
    }

    /// Highest original index in the program, `None` when empty.
    pub fn max_original_index(&self) -> Option<usize> {
        if self.nodes[self.root.0].children.is_empty() {
            return None;
        }
        Some(self.nodes[self.rightmost_leaf(self.root).0].original_index)
    }

    /// Leftmost terminal whose original index is the smallest one `>= target`.
    ///
    /// Original indices never decrease left to right, so at every level the
    /// answer lies in the first child whose rightmost leaf reaches `target`.
    /// Returns `None` when `target` is past the end of the program.
    pub fn locate(&self, target: usize) -> Option<NodeId> {
        let mut id = self.root;
        loop {
            let node = &self.nodes[id.0];
            if node.is_terminal() {
                return (node.original_index >= target).then_some(id);
            }
            let split = node
                .children
                .partition_point(|&c| self.nodes[self.rightmost_leaf(c).0].original_index < target);
            id = *node.children.get(split)?;
        }
    }

    /// Terminals under `id` in left-to-right order.
    pub fn terminals(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_terminals(id, &mut out);
        out
    }

    fn collect_terminals(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let node = &self.nodes[id.0];
        if node.is_terminal() {
            out.push(id);
        } else {
            for &c in &node.children {
                self.collect_terminals(c, out);
            }
        }
    }
}
