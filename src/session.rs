//! Compile pipeline and a persistent execution session.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cpu::{Cpu, CpuConfig, Trap};
use crate::error::Diagnostics;
use crate::exec::IntExecutor;
use crate::expand::expand;
use crate::isa::t16::T16Decoder;
use crate::lexer::scan;
use crate::memory::LinearMemory;
use crate::parser::parse;
use crate::prefix::validate;
use crate::program::Program;
use crate::relocate::{relocate, DEFAULT_MAX_PASSES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cpu: CpuConfig,
    pub max_relocation_passes: usize,
    /// Instructions one chunk may execute.
    pub step_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cpu: CpuConfig::default(),
            max_relocation_passes: DEFAULT_MAX_PASSES,
            step_limit: 1_000_000,
        }
    }
}

impl Config {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Source text to the flat instruction list.
pub fn assemble(source: &str, cfg: &Config) -> Result<Program, Diagnostics> {
    let tokens = scan(source)?;
    debug!(tokens = tokens.len(), "scanned");
    let tree = parse(&tokens)?;
    debug!(statements = tree.num_children(tree.root()), "parsed");
    let tree = validate(tree)?;
    let tree = expand(&tree)?;
    let tree = relocate(tree, cfg.max_relocation_passes)?;
    let program = Program::from_tree(&tree)?;
    debug!(instructions = program.len(), "assembled");
    Ok(program)
}

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("{0}")]
    Compile(#[from] Diagnostics),
    #[error("Runtime error at line {line}[{column}]: {trap}")]
    Trap {
        line: usize,
        column: usize,
        #[source]
        trap: Trap,
    },
    #[error("step limit of {limit} reached")]
    StepLimit { limit: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub steps: u64,
}

/// Machine state that persists across chunks.
pub struct Session {
    pub cpu: Cpu,
    pub mem: LinearMemory,
    pub cfg: Config,
}

impl Session {
    pub fn new(cfg: Config) -> Self {
        Self {
            cpu: Cpu::new(cfg.cpu),
            mem: LinearMemory::new(cfg.cpu.memory_bytes),
            cfg,
        }
    }

    /// Assemble and execute one chunk. A chunk that fails to assemble leaves
    /// the machine untouched.
    pub fn run(&mut self, source: &str) -> Result<RunOutcome, RunError> {
        let program = assemble(source, &self.cfg)?;
        self.execute(&program)
    }

    pub fn execute(&mut self, program: &Program) -> Result<RunOutcome, RunError> {
        let code = program.to_bytes();
        let dec = T16Decoder::new();
        let exec = IntExecutor;
        let end = code.len() as i64;

        self.cpu.reset();
        let mut steps = 0;
        while self.cpu.iptr != end {
            if steps == self.cfg.step_limit {
                return Err(RunError::StepLimit { limit: self.cfg.step_limit });
            }
            let iptr = self.cpu.iptr;
            if let Err(trap) = self.cpu.step(&mut self.mem, &code, &dec, &exec) {
                let (line, column) = program
                    .position(iptr)
                    .map_or((0, 0), |e| (e.instruction.line(), e.instruction.column()));
                warn!(line, column, %trap, "trap");
                return Err(RunError::Trap { line, column, trap });
            }
            steps += 1;
        }
        info!(steps, state = %self.cpu, "chunk finished");
        Ok(RunOutcome { steps })
    }
}
