//! CLI entrypoint for the tagheap replay harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tagheap_harness::trace::{Trace, TraceRegion, generate_trace};
use tagheap_harness::{ReplayReport, fixtures, replay};

/// Replay tooling for the tagheap allocator.
#[derive(Debug, Parser)]
#[command(name = "tagheap-harness")]
#[command(about = "Trace replay harness for the tagheap allocator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay one named fixture, or every fixture when no name is given.
    Fixture {
        /// Fixture name (see `list`).
        #[arg(long)]
        name: Option<String>,
        /// Output JSONL path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the available fixture names.
    List,
    /// Generate a random trace, replay it, and report.
    Random {
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xDEAD_BEEF")]
        seed: String,
        /// Number of operations to generate.
        #[arg(long, default_value_t = 2000)]
        steps: usize,
        /// Use the best-fit policy instead of first-fit.
        #[arg(long)]
        best_fit: bool,
        /// Also write the generated trace JSON here.
        #[arg(long)]
        emit_trace: Option<PathBuf>,
        /// Output JSONL path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay a trace file.
    Replay {
        /// Trace JSON path.
        #[arg(long)]
        trace: PathBuf,
        /// Output JSONL path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Fixture { name, output } => {
            let traces = match name {
                Some(name) => {
                    let trace = fixtures::by_name(&name)
                        .ok_or_else(|| format!("unknown fixture '{name}'"))?;
                    vec![trace]
                }
                None => fixtures::all(),
            };
            let mut reports = Vec::new();
            for trace in &traces {
                let report = replay(trace).map_err(|err| format!("{}: {err}", trace.name))?;
                eprintln!(
                    "{}: ops={} allocs={} frees={} oom={}",
                    report.name, report.ops, report.allocs, report.frees, report.oom_failures
                );
                reports.push(report);
            }
            write_reports(&reports, output)?;
        }
        Command::List => {
            for name in fixtures::names() {
                println!("{name}");
            }
        }
        Command::Random {
            seed,
            steps,
            best_fit,
            emit_trace,
            output,
        } => {
            let seed = parse_seed(&seed)?;
            let regions = vec![
                TraceRegion {
                    lower: 0x1000,
                    upper: 0x1000 + 65536,
                },
                TraceRegion {
                    lower: 0x0040_0000,
                    upper: 0x0040_0000 + 65536,
                },
            ];
            let trace = generate_trace(seed, steps, regions, best_fit);
            if let Some(path) = emit_trace {
                write_with_parents(&path, &trace.to_json()?)?;
                eprintln!("Wrote trace to {}", path.display());
            }
            let report = replay(&trace).map_err(|err| format!("{}: {err}", trace.name))?;
            eprintln!(
                "{}: ops={} allocs={} frees={} reallocs={} oom={} min_free={}",
                report.name,
                report.ops,
                report.allocs,
                report.frees,
                report.reallocs,
                report.oom_failures,
                report.min_ever_free
            );
            write_reports(&[report], output)?;
        }
        Command::Replay { trace, output } => {
            let trace = Trace::from_file(&trace)?;
            let report = replay(&trace).map_err(|err| format!("{}: {err}", trace.name))?;
            write_reports(&[report], output)?;
        }
    }

    Ok(())
}

fn write_reports(
    reports: &[ReplayReport],
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut body = String::new();
    for report in reports {
        body.push_str(&serde_json::to_string(report)?);
        body.push('\n');
    }
    match output {
        Some(path) => {
            write_with_parents(&path, &body)?;
            eprintln!("Wrote {} report(s) to {}", reports.len(), path.display());
        }
        None => print!("{body}"),
    }
    Ok(())
}

fn write_with_parents(path: &std::path::Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)
}

fn parse_seed(raw: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let s = raw.trim();
    let seed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(&hex.replace('_', ""), 16)?
    } else {
        s.replace('_', "").parse::<u64>()?
    };
    Ok(seed)
}
