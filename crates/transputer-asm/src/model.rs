use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use transputer_rs::disasm::annotate;
use transputer_rs::{assemble, Config, Program};

/// One row of a listing: where an emitted instruction came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingRow {
    pub index: usize,
    pub byte: u8,
    pub mnemonic: &'static str,
    pub operand: u8,
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub original_index: usize,
}

pub fn load_source(path: &Path, cfg: &Config) -> Result<Program> {
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(assemble(&source, cfg)?)
}

pub fn listing(program: &Program) -> Vec<ListingRow> {
    let notes = annotate(&program.decoded());
    program
        .entries
        .iter()
        .zip(notes)
        .enumerate()
        .map(|(index, (e, text))| ListingRow {
            index,
            byte: e.decoded().to_byte(),
            mnemonic: e.op.mnemonic(),
            operand: e.operand,
            text,
            line: e.instruction.line(),
            column: e.instruction.column(),
            original_index: e.original_index,
        })
        .collect()
}

pub fn render_listing(rows: &[ListingRow]) -> String {
    let mut out = String::new();
    for r in rows {
        out.push_str(&format!(
            "{:>5}: {:02x}  {:<24} line {}[{}] #{}\n",
            r.index, r.byte, r.text, r.line, r.column, r.original_index
        ));
    }
    out
}
