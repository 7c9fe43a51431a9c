//! Child-process side of the worker pool.
//!
//! A worker is this same binary re-invoked with the hidden `--worker N`
//! flag. It parses exactly one compile command, holds the finished result
//! until the parent grants its print slot, ships the result over stdout
//! and exits. Its stderr is the parent's stderr, so tracing output lands
//! in the same place.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::wire;
use crate::clang::{ClangIndex, ParseFlags, process_command};
use crate::compdb;
use crate::diagnostics::wire as diag_wire;
use crate::errors::FatalError;

/// Entry point for `--worker <index>`.
pub async fn run(
    db_path: &Path,
    index: u32,
    colors: bool,
    flags: ParseFlags,
) -> Result<(), FatalError> {
    let db = compdb::load_file(db_path)?;
    let cmd = db.get(index).ok_or_else(|| {
        FatalError::Internal(format!(
            "worker asked for command #{index} of {}",
            db.len()
        ))
    })?;

    let clang = ClangIndex::new();
    let output = process_command(&clang, cmd, colors, flags).await?;

    let diag_payload = diag_wire::encode(&output.diags)
        .map_err(|error| FatalError::Internal(format!("encoding diagnostics: {error}")))?;
    let graph_payload = output.graph.to_bytes();

    let mut stdout = tokio::io::stdout();
    let mut stdin = tokio::io::stdin();

    wire::write_byte(&mut stdout, wire::READY).await?;
    stdout.flush().await?;

    // Blocks until the parent decides it is this command's turn.
    let grant = wire::read_byte(&mut stdin).await?;
    if grant != wire::CLEAR {
        return Err(FatalError::Internal(format!(
            "worker #{index}: expected clear-to-report, got byte {grant:#04x}"
        )));
    }

    wire::write_record(&mut stdout, wire::DONE_MAGIC, &diag_payload).await?;
    wire::write_record(&mut stdout, wire::GRAPH_MAGIC, &graph_payload).await?;
    wire::write_byte(&mut stdout, output.had_autoinclude as u8).await?;
    stdout.flush().await?;

    debug!(
        "worker #{index} done ({} diagnostic(s), {} node(s))",
        output.diags.diags.len(),
        output.graph.node_count()
    );
    Ok(())
}
