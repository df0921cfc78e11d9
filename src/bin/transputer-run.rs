use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use transputer_rs::{Config, Session};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Assemble and run transputer assembly; starts a REPL without a file"
)]
struct Opts {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    step_limit: Option<u64>,
    #[arg(long)]
    max_passes: Option<usize>,
    /// Log the machine state after every instruction (RUST_LOG=trace).
    #[arg(long)]
    trace: bool,
    #[arg(value_name = "FILE.tn")]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let mut cfg = match &opts.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(limit) = opts.step_limit {
        cfg.step_limit = limit;
    }
    if let Some(passes) = opts.max_passes {
        cfg.max_relocation_passes = passes;
    }
    cfg.cpu.trace_steps |= opts.trace;

    let mut session = Session::new(cfg);
    match &opts.input {
        Some(path) => {
            if path.extension().and_then(|e| e.to_str()) != Some("tn") {
                bail!("expected a .tn file, got {}", path.display());
            }
            let source = std::fs::read_to_string(path)?;
            session.run(&source)?;
            println!("{}", session.cpu);
        }
        None => repl(&mut session)?,
    }
    Ok(())
}

/// Lines are collected until an empty one; an empty first line exits.
fn repl(session: &mut Session) -> Result<()> {
    println!("Enter instructions, a blank line runs them.");
    println!("Type 'print' to show the machine state, or press Enter to leave.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        let mut chunk = String::new();
        let mut prompt = "> ";
        loop {
            print!("{prompt}");
            io::stdout().flush()?;
            let Some(line) = lines.next().transpose()? else {
                break;
            };
            if line.trim().is_empty() {
                break;
            }
            if !chunk.is_empty() {
                chunk.push('\n');
            }
            chunk.push_str(&line);
            prompt = " >";
        }
        if chunk.is_empty() {
            return Ok(());
        }
        if chunk.trim().eq_ignore_ascii_case("print") {
            println!("{}", session.cpu);
            continue;
        }
        match session.run(&chunk) {
            Ok(outcome) => println!("{} ({} steps)", session.cpu, outcome.steps),
            Err(err) => eprintln!("{err}"),
        }
    }
}
