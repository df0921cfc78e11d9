use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;

use transputer_rs::decoder::Decoded;
use transputer_rs::disasm::fmt_decoded;
use transputer_rs::encoder::decode;
use transputer_rs::instructions::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind { Fallthrough, Branch, CondBranch, Call }

impl EdgeKind {
    fn label(self) -> &'static str {
        match self {
            EdgeKind::Fallthrough => "ft",
            EdgeKind::Branch => "br",
            EdgeKind::CondBranch => "cbr",
            EdgeKind::Call => "call",
        }
    }
}

/// Control transfer out of the instruction at `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge { pub from: usize, pub to: i64, pub kind: EdgeKind }

#[derive(Debug, Clone, Serialize)]
pub struct Block { pub start: usize, pub end: usize, pub insns: Vec<String> }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeOut { pub from: usize, pub to: i64, pub kind: String }

#[derive(Debug, Clone, Serialize)]
pub struct FunctionOut { pub entry: usize, pub blocks: Vec<usize> }

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub entries: Vec<usize>,
    pub blocks: Vec<Block>,
    pub edges: Vec<EdgeOut>,
    pub functions: Vec<FunctionOut>,
}

/// Instruction-level edges. Prefix chains are folded so each branch sees the
/// displacement it will execute with. Returns the edges and the positions of
/// `RET`.
pub fn edges(code: &[Decoded]) -> (Vec<Edge>, HashSet<usize>) {
    let mut out = Vec::new();
    let mut rets = HashSet::new();
    let mut chain: Vec<(Op, i64)> = Vec::new();
    for (i, d) in code.iter().enumerate() {
        chain.push((d.op, i64::from(d.operand)));
        if d.op.is_prefix() {
            continue;
        }
        let value = decode(chain.drain(..));
        let next = i as i64 + 1;
        let target = next.wrapping_add(value);
        match d.op {
            Op::J => out.push(Edge { from: i, to: target, kind: EdgeKind::Branch }),
            Op::Cj => {
                out.push(Edge { from: i, to: target, kind: EdgeKind::CondBranch });
                out.push(Edge { from: i, to: next, kind: EdgeKind::Fallthrough });
            }
            Op::Call => {
                out.push(Edge { from: i, to: target, kind: EdgeKind::Call });
                out.push(Edge { from: i, to: next, kind: EdgeKind::Fallthrough });
            }
            Op::Opr if Op::from_operate(value) == Some(Op::Ret) => {
                rets.insert(i);
            }
            _ => {}
        }
    }
    (out, rets)
}

pub fn analyze(code: &[Decoded]) -> Report {
    let len = code.len();
    let (edges, rets) = edges(code);
    let in_range = |t: i64| usize::try_from(t).ok().filter(|&t| t < len);

    let mut starts: BTreeSet<usize> = BTreeSet::new();
    if len > 0 {
        starts.insert(0);
    }
    for e in &edges {
        starts.extend(in_range(e.to));
        starts.extend(in_range(e.from as i64 + 1));
    }
    for &r in &rets {
        starts.extend(in_range(r as i64 + 1));
    }

    // Split the linear list at every start.
    let bounds: Vec<usize> = starts.iter().copied().chain([len]).collect();
    let mut blocks = Vec::new();
    let mut block_of: HashMap<usize, usize> = HashMap::new();
    for w in bounds.windows(2) {
        let (start, end) = (w[0], w[1]);
        for pc in start..end {
            block_of.insert(pc, start);
        }
        let insns = code[start..end].iter().map(fmt_decoded).collect();
        blocks.push(Block { start, end, insns });
    }

    // Block-level edges; blocks ending in a plain instruction fall through.
    let mut edges_out: Vec<EdgeOut> = Vec::new();
    for b in &blocks {
        let last = b.end - 1;
        let ft = Edge { from: last, to: b.end as i64, kind: EdgeKind::Fallthrough };
        let mut from_last: Vec<&Edge> = edges.iter().filter(|e| e.from == last).collect();
        let plain = from_last.is_empty() && !rets.contains(&last);
        if plain && b.end < len {
            from_last.push(&ft);
        }
        for e in from_last {
            edges_out.push(EdgeOut { from: b.start, to: e.to, kind: e.kind.label().to_string() });
        }
    }

    // Entry 0 and every call target start a function; calls are not followed.
    let mut entries: BTreeSet<usize> = starts.iter().take(1).copied().collect();
    entries.extend(edges.iter().filter(|e| e.kind == EdgeKind::Call).filter_map(|e| in_range(e.to)));
    let mut adj: HashMap<usize, Vec<usize>> = HashMap::new();
    for e in edges_out.iter().filter(|e| e.kind != "call") {
        if let Some(to) = in_range(e.to) {
            adj.entry(e.from).or_default().push(block_of[&to]);
        }
    }
    let mut functions = Vec::new();
    for &entry in &entries {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut q = VecDeque::from([block_of[&entry]]);
        while let Some(b) = q.pop_front() {
            if !seen.insert(b) {
                continue;
            }
            if let Some(nexts) = adj.get(&b) {
                q.extend(nexts.iter().copied());
            }
        }
        let mut blks: Vec<usize> = seen.into_iter().collect();
        blks.sort_unstable();
        functions.push(FunctionOut { entry, blocks: blks });
    }

    Report { entries: entries.into_iter().collect(), blocks, edges: edges_out, functions }
}

pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    out.push_str("Analysis summary:\n");
    out.push_str(&format!("  entries   : {:?}\n", report.entries));
    out.push_str(&format!("  blocks    : {}\n", report.blocks.len()));
    out.push_str(&format!("  edges     : {}\n", report.edges.len()));
    out.push_str(&format!("  functions : {}\n", report.functions.len()));
    out.push_str("Edges:\n");
    for e in &report.edges {
        out.push_str(&format!("  {:>5} -> {:>5} ({})\n", e.from, e.to, e.kind));
    }
    out
}
