//! Recursive-descent parser.
//!
//! ```text
//! Prog  -> Stmt* EOF
//! Stmt  -> (Chain | Op | Double) NEXT?
//! Chain -> (PFIX|NFIX) NUMBER NEXT? ... Op
//! Op    -> SINGLE NUMBER NEXT?
//! ```
//!
//! Every terminal receives its original index: its position in parse order.

use crate::error::{AsmError, Diagnostics, Located};
use crate::instructions::Width;
use crate::token::{Token, TokenKind};
use crate::tree::{Node, NodeId, NodeKind, Tree};

pub fn parse(tokens: &[Token]) -> Result<Tree, Diagnostics> {
    let mut tokens = tokens.to_vec();
    if tokens.last().map(Token::kind) != Some(TokenKind::Eof) {
        let (line, column) = tokens.last().map_or((1, 0), |t| (t.line(), t.column()));
        tokens.push(Token::new(TokenKind::Eof, "EOF", 0, line, column));
    }
    Parser { tokens, current: 0, index: 0, tree: Tree::new(), errors: Diagnostics::default() }.parse()
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Original index handed to the next terminal.
    index: usize,
    tree: Tree,
    errors: Diagnostics,
}

fn error(token: &Token, message: &'static str) -> AsmError {
    AsmError::Parse { at: Located::at(token), message }
}

impl Parser {
    fn parse(mut self) -> Result<Tree, Diagnostics> {
        let root = self.tree.root();
        while !self.at_end() {
            if self.peek().kind() == TokenKind::Next {
                self.advance();
                continue;
            }
            match self.statement() {
                Ok(stmt) => {
                    if let Err(err) = self.tree.add_child(root, stmt) {
                        self.errors.push(err);
                    }
                }
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        let tree = self.tree;
        self.errors.into_result(tree)
    }

    fn statement(&mut self) -> Result<NodeId, AsmError> {
        let token = self.peek().clone();
        match token.op() {
            Some(op) if op.width() == Width::Double => self.double(),
            Some(op) if op.is_prefix() => self.chain(),
            Some(_) => self.operation(),
            None => Err(error(&token, "Invalid Instruction")),
        }
    }

    fn chain(&mut self) -> Result<NodeId, AsmError> {
        let first = self.index;
        let mut children = Vec::new();
        while self.peek().op().is_some_and(|op| op.is_prefix()) {
            children.push(self.operation()?);
        }
        let token = self.peek().clone();
        match token.op() {
            Some(op) if op.width() == Width::Single => children.push(self.operation()?),
            _ => return Err(error(&token, "Not a Single Length Instruction")),
        }
        Ok(self.tree.alloc(Node::group(NodeKind::Chain, first).with_children(children)))
    }

    /// Single-length instruction and its literal.
    fn operation(&mut self) -> Result<NodeId, AsmError> {
        let instruction = self.advance();
        let kind = match instruction.op() {
            Some(op) if op.is_prefix() => NodeKind::Prefix,
            Some(op) if op.is_branch() => NodeKind::Offset,
            _ => NodeKind::Single,
        };
        let operand = self.peek().clone();
        if operand.kind() != TokenKind::Number {
            return Err(error(&operand, "Invalid Operand"));
        }
        self.advance();
        let mut node = Node::leaf(kind, self.index);
        node.set_instruction(instruction)?;
        node.set_operand(operand)?;
        self.index += 1;
        self.eat_next();
        Ok(self.tree.alloc(node))
    }

    /// Double-length instructions take no operand; their operate code stands in.
    fn double(&mut self) -> Result<NodeId, AsmError> {
        let instruction = self.advance();
        let code = instruction.op().map_or(0, |op| i64::from(op.code()));
        let operand = instruction.derive_number(code);
        let mut node = Node::leaf(NodeKind::Double, self.index);
        node.set_instruction(instruction)?;
        node.set_operand(operand)?;
        self.index += 1;
        self.eat_next();
        Ok(self.tree.alloc(node))
    }

    /// Skip to the start of the next statement.
    fn synchronize(&mut self) {
        while !self.at_end() {
            let token = self.advance();
            match token.op() {
                None if token.kind() == TokenKind::Next => return,
                Some(op) if op.width() == Width::Double => {
                    self.eat_next();
                    return;
                }
                Some(op) if !op.is_prefix() && self.peek().kind() == TokenKind::Number => {
                    self.advance();
                    self.eat_next();
                    return;
                }
                _ => {}
            }
        }
    }

    fn eat_next(&mut self) {
        if self.peek().kind() == TokenKind::Next {
            self.advance();
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.current].clone();
        if !self.at_end() {
            self.current += 1;
        }
        token
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn at_end(&self) -> bool {
        self.peek().kind() == TokenKind::Eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::Op;
    use crate::lexer::scan;
    use pretty_assertions::assert_eq;

    fn parse_src(src: &str) -> Result<Tree, Diagnostics> {
        parse(&scan(src).unwrap())
    }

    fn shape(tree: &Tree) -> Vec<(NodeKind, usize, usize)> {
        tree.children(tree.root())
            .iter()
            .map(|&c| {
                let n = tree.node(c);
                (n.kind(), n.original_index(), tree.num_leaves(c))
            })
            .collect()
    }

    #[test]
    fn builds_statements() {
        let tree = parse_src("LDC 1\nPFIX 1 NFIX 2; LDC 3\nADD\nJ -4").unwrap();
        assert_eq!(
            shape(&tree),
            vec![
                (NodeKind::Single, 0, 1),
                (NodeKind::Chain, 1, 3),
                (NodeKind::Double, 4, 1),
                (NodeKind::Offset, 5, 1),
            ]
        );
        let add = tree.node(tree.children(tree.root())[2]);
        assert_eq!(add.value().unwrap(), 0x05);
        assert_eq!(add.instruction().unwrap().op(), Some(Op::Add));
    }

    #[test]
    fn prefixed_branch_is_a_chain() {
        let tree = parse_src("PFIX 1 CJ 2").unwrap();
        let chain = tree.children(tree.root())[0];
        let kinds: Vec<NodeKind> = tree.terminals(chain).iter().map(|&t| tree.node(t).kind()).collect();
        assert_eq!(kinds, vec![NodeKind::Prefix, NodeKind::Offset]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let tree = parse_src("\n\nLDC 1\n\n\nREV\n").unwrap();
        assert_eq!(tree.num_children(tree.root()), 2);
    }

    #[test]
    fn reports_all_errors_and_recovers() {
        let err = parse_src("LDC\nADC 1\nPFIX 1 ADD\n7\nLDC 2").unwrap_err();
        let messages: Vec<(usize, &str)> = err
            .iter()
            .map(|e| match e {
                AsmError::Parse { at, message } => (at.line, *message),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            messages,
            vec![
                // Reported at the newline that ends line 1.
                (1, "Invalid Operand"),
                (3, "Not a Single Length Instruction"),
                (4, "Invalid Instruction"),
            ]
        );
    }
}
