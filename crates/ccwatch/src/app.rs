//! Top-level run orchestration: first sweep, optional DOT emission, then
//! the watch loop feeding incremental sweeps.

use std::collections::BTreeMap;
use std::io;

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::clang::ParseFlags;
use crate::compdb::{self, CompileCommandSet};
use crate::diagnostics::printer::{DiagPrinter, count_noun};
use crate::errors::FatalError;
use crate::graph::{InclusionGraph, dot};
use crate::options::{Args, GraphMode, validate};
use crate::pool::{self, PoolConfig, worker};
use crate::watch::{ChangeWatcher, affected_indexes};

pub fn run(args: &Args) -> Result<(), FatalError> {
    validate(args)?;
    let runtime = Runtime::new()?;

    if let Some(index) = args.worker {
        return runtime.block_on(worker::run(
            &args.compdb,
            index,
            !args.plain,
            parse_flags(args),
        ));
    }

    let db = compdb::load_file(&args.compdb)?;
    if db.is_empty() {
        warn!("compile database {} is empty", args.compdb.display());
    }
    info!("Loaded {} compile command(s)", db.len());

    let cfg = PoolConfig {
        concurrency: args.concurrency.resolve(),
        colors: !args.plain,
        flags: parse_flags(args),
        db_path: args.compdb.clone(),
    };

    let mut graphs: BTreeMap<u32, InclusionGraph> = BTreeMap::new();
    let all: Vec<u32> = db.indexes().collect();
    sweep(&runtime, &cfg, &db, &all, args, &mut graphs)?;

    if let Some(mode) = args.graph {
        return emit_graph(&graphs, mode, args.edge_limit);
    }
    if args.exit_after_first {
        return Ok(());
    }

    let db_real = args
        .compdb
        .canonicalize()
        .map_err(|source| FatalError::RealPath {
            path: args.compdb.clone(),
            source,
        })?;
    let mut watcher = ChangeWatcher::new(db_real)?;
    watcher.watch_graph_nodes(&graphs)?;
    info!("Watching {} file(s) for changes", watcher.watched_count());

    loop {
        let changed = watcher.next_modification()?;
        let affected = affected_indexes(&graphs, &changed);
        if affected.is_empty() {
            debug!("change outside any inclusion graph: {changed:?}");
            continue;
        }
        info!(
            "{} changed; re-parsing {}",
            count_noun(changed.len() as u32, "file"),
            count_noun(affected.len() as u32, "command"),
        );
        sweep(&runtime, &cfg, &db, &affected, args, &mut graphs)?;
        watcher.watch_graph_nodes(&graphs)?;
    }
}

fn parse_flags(args: &Args) -> ParseFlags {
    ParseFlags {
        // Graph-only runs never need bodies analyzed.
        skip_function_bodies: args.skip_fn_bodies || args.graph.is_some(),
    }
}

/// One controller run: print diagnostics, fold fresh per-command graphs in.
fn sweep(
    runtime: &Runtime,
    cfg: &PoolConfig,
    db: &CompileCommandSet,
    indexes: &[u32],
    args: &Args,
    graphs: &mut BTreeMap<u32, InclusionGraph>,
) -> Result<(), FatalError> {
    let mut printer = DiagPrinter::new(io::stderr(), !args.no_dedup);
    let result = runtime.block_on(pool::run_sweep(cfg, db, indexes, &mut printer))?;

    if result.autoinclude_commands > 0 {
        printer.print_note(&format!(
            "NOTE: added missing system include directory for {}.",
            count_noun(result.autoinclude_commands, "command")
        ))?;
    }
    printer.finish_run()?;

    graphs.extend(result.graphs);
    Ok(())
}

fn emit_graph(
    graphs: &BTreeMap<u32, InclusionGraph>,
    mode: GraphMode,
    edge_limit: Option<usize>,
) -> Result<(), FatalError> {
    let mut global = InclusionGraph::new();
    for graph in graphs.values() {
        global.merge(graph);
    }
    let prefix = global.common_prefix();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    dot::write_dot(
        &global,
        mode.as_str(),
        mode == GraphMode::Includes,
        &prefix,
        edge_limit,
        &mut out,
    )?;
    Ok(())
}
