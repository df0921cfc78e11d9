use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use transputer_asm::{analyze, listing, load_source, render_listing, render_report};
use transputer_rs::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Transputer assembler CLI", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the relocation pass cap
    #[arg(long)]
    max_passes: Option<usize>,
    /// Assembly source (.tn)
    #[arg(value_name = "FILE")]
    input: PathBuf,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Final instruction list with source positions
    Listing {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Byte image, one byte per instruction
    Image {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Basic blocks and branch edges of the final list
    Analyze {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat { Text, Json }

fn emit(text: String, out: Option<PathBuf>) -> Result<()> {
    if let Some(path) = out { std::fs::write(path, text)?; } else { print!("{}", text); }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(passes) = cli.max_passes {
        cfg.max_relocation_passes = passes;
    }
    let program = load_source(&cli.input, &cfg)?;

    match cli.cmd {
        Command::Listing { format, out } => {
            let rows = listing(&program);
            let text = match format {
                OutputFormat::Text => render_listing(&rows),
                OutputFormat::Json => serde_json::to_string_pretty(&rows)? + "\n",
            };
            emit(text, out)?;
        }
        Command::Image { out } => {
            let bytes = program.to_bytes();
            std::fs::write(&out, &bytes)?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
        Command::Analyze { format, out } => {
            let report = analyze(&program.decoded());
            let text = match format {
                OutputFormat::Text => render_report(&report),
                OutputFormat::Json => serde_json::to_string_pretty(&report)? + "\n",
            };
            emit(text, out)?;
        }
    }

    Ok(())
}
