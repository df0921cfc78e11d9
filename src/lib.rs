pub mod cpu;
pub mod decoder;
pub mod disasm;
pub mod encoder;
pub mod error;
pub mod exec;
pub mod expand;
pub mod instructions;
pub mod lexer;
pub mod memory;
pub mod parser;
pub mod prefix;
pub mod program;
pub mod relocate;
pub mod session;
pub mod token;
pub mod tree;

pub mod isa {
    pub mod t16; // 16-bit transputer byte encoding
}

pub use cpu::{Cpu, CpuConfig, Trap};
pub use error::{AsmError, Diagnostics};
pub use memory::{Bus, LinearMemory};
pub use program::Program;
pub use session::{assemble, Config, RunError, Session};
