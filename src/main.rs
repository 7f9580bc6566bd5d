//! dfg-fixup CLI
//!
//! Loads a JSON compilation unit, runs the fixup phase and prints the
//! resulting graph.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use quicksilver_dfg::{CompilationUnit, FixupConfig, TargetArch, VERSION};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dfg-fixup")]
#[command(author, version, about = "Run the DFG type fixup phase over a JSON graph", long_about = None)]
struct Cli {
    /// Compilation unit (graph plus profiling snapshot) as JSON
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// JSON config file; fields it leaves out come from the target preset
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Target architecture preset (ignored when --config is given)
    #[arg(short, long, default_value_t = TargetArch::default())]
    target: TargetArch,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Only validate the input graph
    #[arg(long)]
    check: bool,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => FixupConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FixupConfig::for_target(cli.target),
    };

    let mut unit = CompilationUnit::load(&cli.input)
        .with_context(|| format!("failed to load compilation unit {}", cli.input.display()))?;

    if cli.check {
        unit.graph
            .validate()
            .with_context(|| format!("{} is not a valid graph", cli.input.display()))?;
        println!("{}: ok", cli.input.display());
        return Ok(());
    }

    let start = Instant::now();
    let stats = unit
        .fixup(&config)
        .with_context(|| format!("cannot run fixup on {}", cli.input.display()))?;
    info!(elapsed = ?start.elapsed(), target = %config.target, "fixup complete");

    match cli.format {
        Format::Text => {
            println!("; dfg-fixup {} ({})", VERSION, config.target);
            print!("{}", unit.graph);
            println!("; {}", stats);
        }
        Format::Json => {
            let output = serde_json::json!({
                "graph": unit.graph,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn setup_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
