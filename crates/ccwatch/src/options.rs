//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

use crate::errors::FatalError;

#[derive(Parser, Debug)]
#[command(
    name = "ccwatch",
    version,
    about = "Watch a compile_commands.json project and re-parse affected translation units on change"
)]
pub struct Args {
    /// Reserved machine-interface mode; accepts no other options.
    #[arg(short = 'm')]
    pub machine_mode: bool,

    /// Worker concurrency: "auto" or a non-negative count (0 = serial, in-process).
    #[arg(short = 'c', value_name = "auto|N", default_value = "auto", value_parser = parse_concurrency)]
    pub concurrency: Concurrency,

    /// Emit the merged inclusion graph as Graphviz DOT on stdout and exit.
    #[arg(short = 'g', value_name = "includes|isIncludedBy", value_parser = parse_graph_mode)]
    pub graph: Option<GraphMode>,

    /// Collapse a node's fan-out beyond this many edges (only with `-g isIncludedBy`).
    #[arg(short = 'l', value_name = "LIMIT")]
    pub edge_limit: Option<usize>,

    /// Disable cross-command diagnostic deduplication.
    #[arg(short = 'N')]
    pub no_dedup: bool,

    /// Disable colored diagnostics.
    #[arg(short = 'P')]
    pub plain: bool,

    /// Exit after one sweep instead of watching for changes.
    #[arg(short = 'x')]
    pub exit_after_first: bool,

    #[arg(long, short)]
    pub verbose: bool,

    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Internal: run as a pool worker for one 1-based command index.
    #[arg(long, hide = true, value_name = "INDEX")]
    pub worker: Option<u32>,

    /// Internal: parse with function bodies skipped.
    #[arg(long, hide = true)]
    pub skip_fn_bodies: bool,

    /// Path to compile_commands.json.
    #[arg(value_name = "COMPDB")]
    pub compdb: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Auto,
    Fixed(usize),
}

impl Concurrency {
    /// Resolve to a live worker cap, clamped to hardware concurrency.
    pub fn resolve(self) -> usize {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        match self {
            Concurrency::Auto => hardware,
            Concurrency::Fixed(n) => n.min(hardware),
        }
    }
}

fn parse_concurrency(raw: &str) -> Result<Concurrency, String> {
    if raw == "auto" {
        return Ok(Concurrency::Auto);
    }
    raw.parse::<usize>()
        .map(Concurrency::Fixed)
        .map_err(|_| format!("expected \"auto\" or a non-negative integer, got {raw:?}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    Includes,
    IsIncludedBy,
}

impl GraphMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GraphMode::Includes => "includes",
            GraphMode::IsIncludedBy => "isIncludedBy",
        }
    }
}

fn parse_graph_mode(raw: &str) -> Result<GraphMode, String> {
    match raw {
        "includes" => Ok(GraphMode::Includes),
        "isIncludedBy" => Ok(GraphMode::IsIncludedBy),
        _ => Err(format!(
            "expected \"includes\" or \"isIncludedBy\", got {raw:?}"
        )),
    }
}

/// Cross-flag validation clap cannot express.
pub fn validate(args: &Args) -> Result<(), FatalError> {
    if args.machine_mode {
        let combined = args.graph.is_some()
            || args.edge_limit.is_some()
            || args.no_dedup
            || args.plain
            || args.exit_after_first
            || args.verbose
            || args.log_file.is_some()
            || args.worker.is_some()
            || args.skip_fn_bodies
            || args.concurrency != Concurrency::Auto;
        if combined {
            return Err(FatalError::Usage(
                "-m cannot be combined with other options".into(),
            ));
        }
    }
    if args.edge_limit.is_some() && args.graph != Some(GraphMode::IsIncludedBy) {
        return Err(FatalError::Usage("-l requires -g isIncludedBy".into()));
    }
    Ok(())
}
