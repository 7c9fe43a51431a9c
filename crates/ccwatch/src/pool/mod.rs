//! Parent-side worker-pool controller.
//!
//! One sweep processes a list of command indexes. With a concurrency cap of
//! zero everything runs in-process and serially; otherwise up to `cap`
//! worker subprocesses run at once and the controller collects results in
//! ascending command-index order: a finished worker blocks on its
//! clear-to-report byte until every earlier command has printed, so the
//! parent never buffers a result out of order.

pub mod wire;
pub mod worker;

use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::clang::{ClangIndex, ParseFlags, process_command};
use crate::compdb::CompileCommandSet;
use crate::diagnostics::printer::DiagPrinter;
use crate::diagnostics::wire as diag_wire;
use crate::diagnostics::FormattedDiagSet;
use crate::errors::FatalError;
use crate::graph::InclusionGraph;

/// Static configuration of a pool run.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Live worker cap; 0 runs serial and in-process.
    pub concurrency: usize,
    pub colors: bool,
    pub flags: ParseFlags,
    /// Database path handed to workers (they reload it themselves).
    pub db_path: PathBuf,
}

/// What one sweep leaves behind.
#[derive(Debug, Default)]
pub struct SweepResult {
    /// Per-command graphs, keyed by 1-based command index.
    pub graphs: BTreeMap<u32, InclusionGraph>,
    /// How many commands needed the include auto-recovery.
    pub autoinclude_commands: u32,
}

/// One live worker subprocess and its pipe ends.
struct WorkerSlot {
    index: u32,
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

/// Run one sweep over `indexes`, printing diagnostics in index order.
pub async fn run_sweep<W: Write>(
    cfg: &PoolConfig,
    db: &CompileCommandSet,
    indexes: &[u32],
    printer: &mut DiagPrinter<W>,
) -> Result<SweepResult, FatalError> {
    if cfg.concurrency == 0 {
        run_serial(cfg, db, indexes, printer).await
    } else {
        run_parallel(cfg, indexes, printer).await
    }
}

async fn run_serial<W: Write>(
    cfg: &PoolConfig,
    db: &CompileCommandSet,
    indexes: &[u32],
    printer: &mut DiagPrinter<W>,
) -> Result<SweepResult, FatalError> {
    let clang = ClangIndex::new();
    let mut result = SweepResult::default();

    for &index in indexes {
        let cmd = db
            .get(index)
            .ok_or_else(|| FatalError::Internal(format!("no compile command #{index}")))?;
        let output = process_command(&clang, cmd, cfg.colors, cfg.flags).await?;
        printer.print_set(&output.diags)?;
        if output.had_autoinclude {
            result.autoinclude_commands += 1;
        }
        result.graphs.insert(index, output.graph);
    }
    Ok(result)
}

async fn run_parallel<W: Write>(
    cfg: &PoolConfig,
    indexes: &[u32],
    printer: &mut DiagPrinter<W>,
) -> Result<SweepResult, FatalError> {
    let mut result = SweepResult::default();
    let mut pending: VecDeque<u32> = indexes.iter().copied().collect();
    let mut live: VecDeque<WorkerSlot> = VecDeque::new();

    for _ in 0..cfg.concurrency.min(pending.len()) {
        let index = pending.pop_front().expect("bounded by pending.len()");
        live.push_back(spawn_worker(cfg, index)?);
    }
    debug!(
        "pool: {} command(s), {} worker(s)",
        indexes.len(),
        live.len()
    );

    while let Some(mut slot) = live.pop_front() {
        match collect_worker(&mut slot).await {
            Ok((set, graph, had_autoinclude)) => {
                reap(&mut slot).await;
                printer.print_set(&set)?;
                if had_autoinclude {
                    result.autoinclude_commands += 1;
                }
                result.graphs.insert(slot.index, graph);

                if let Some(index) = pending.pop_front() {
                    live.push_back(spawn_worker(cfg, index)?);
                }
            }
            Err(error) => {
                // A worker that hit its own fatal condition exits with the
                // matching code before completing the protocol; adopt it.
                // Any other nonzero status is a crash, not a verdict.
                if let Ok(status) = slot.child.wait().await
                    && let Some(code) = status.code()
                    && code != 0
                {
                    return Err(match code {
                        2 | 3 | 255 => FatalError::Worker {
                            index: slot.index,
                            code,
                        },
                        _ => FatalError::Internal(format!(
                            "worker #{} died with exit code {code}",
                            slot.index
                        )),
                    });
                }
                return Err(error);
            }
        }
    }

    Ok(result)
}

fn spawn_worker(cfg: &PoolConfig, index: u32) -> Result<WorkerSlot, FatalError> {
    let exe = std::env::current_exe()?;
    let mut command = Command::new(exe);
    command.arg("--worker").arg(index.to_string());
    if !cfg.colors {
        command.arg("-P");
    }
    if cfg.flags.skip_function_bodies {
        command.arg("--skip-fn-bodies");
    }
    command
        .arg(&cfg.db_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| FatalError::Internal("worker stdin not captured".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| FatalError::Internal("worker stdout not captured".into()))?;

    debug!("spawned worker #{index}");
    Ok(WorkerSlot {
        index,
        child,
        stdin,
        stdout,
    })
}

async fn collect_worker(
    slot: &mut WorkerSlot,
) -> Result<(FormattedDiagSet, InclusionGraph, bool), FatalError> {
    let ready = wire::read_byte(&mut slot.stdout).await?;
    if ready != wire::READY {
        return Err(FatalError::Internal(format!(
            "worker #{}: expected ready byte, got {ready:#04x}",
            slot.index
        )));
    }
    wire::write_byte(&mut slot.stdin, wire::CLEAR).await?;

    let diag_payload = wire::read_record(&mut slot.stdout, wire::DONE_MAGIC).await?;
    let graph_payload = wire::read_record(&mut slot.stdout, wire::GRAPH_MAGIC).await?;
    let had_autoinclude = wire::read_byte(&mut slot.stdout).await? != 0;

    let set = diag_wire::decode(&diag_payload)
        .map_err(|error| FatalError::Internal(format!("worker #{}: {error}", slot.index)))?;
    let graph = InclusionGraph::from_bytes(&graph_payload)
        .map_err(|error| FatalError::Internal(format!("worker #{}: {error}", slot.index)))?;
    Ok((set, graph, had_autoinclude))
}

async fn reap(slot: &mut WorkerSlot) {
    match slot.child.wait().await {
        Ok(status) if !status.success() => {
            warn!("worker #{} exited with {status} after completing", slot.index);
        }
        Ok(_) => {}
        Err(error) => warn!("failed to reap worker #{}: {error}", slot.index),
    }
}
