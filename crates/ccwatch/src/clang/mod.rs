//! Subprocess front-end wrapper.
//!
//! Each compile command's own compiler is invoked in syntax-only mode; its
//! stderr carries both the diagnostics and, via `-H`, the inclusion trace.
//! System include roots are probed once per compiler executable and used to
//! classify system headers.

pub mod recovery;
pub mod stderr;
pub mod walk;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, RwLock};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::compdb::{CompileCommand, sanitize_args};
use crate::diagnostics::format::format_set;
use crate::diagnostics::{Diagnostic, FormattedDiagSet};
use crate::errors::FatalError;
use crate::graph::InclusionGraph;

/// Knobs for one front-end invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseFlags {
    /// Skip function bodies; used for graph-only runs where only the
    /// preprocessor output matters.
    pub skip_function_bodies: bool,
}

/// Raw result of one front-end invocation.
#[derive(Debug, Clone, Default)]
pub struct TuParse {
    pub diags: Vec<Diagnostic>,
    pub events: Vec<IncludeEvent>,
}

/// One step of the inclusion walk: `stack[0]` is the immediate includer,
/// the TU's main file closes the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeEvent {
    pub included: PathBuf,
    pub stack: Vec<PathBuf>,
}

/// Everything one compile command produces.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub diags: FormattedDiagSet,
    pub graph: InclusionGraph,
    pub had_autoinclude: bool,
}

/// Per-process front-end state: the system include roots of every compiler
/// executable seen so far.
pub struct ClangIndex {
    system_roots: RwLock<HashMap<String, Arc<Vec<PathBuf>>>>,
    /// Serializes first-time discovery so concurrent lookups don't probe
    /// the same compiler twice.
    discovery_lock: tokio::sync::Mutex<()>,
}

impl Default for ClangIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ClangIndex {
    pub fn new() -> Self {
        Self {
            system_roots: RwLock::new(HashMap::new()),
            discovery_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// System include roots for `compiler`, probing on first use.
    pub async fn system_roots(&self, compiler: &str) -> Arc<Vec<PathBuf>> {
        if let Ok(guard) = self.system_roots.read()
            && let Some(roots) = guard.get(compiler)
        {
            return roots.clone();
        }

        let _guard = self.discovery_lock.lock().await;
        if let Ok(guard) = self.system_roots.read()
            && let Some(roots) = guard.get(compiler)
        {
            return roots.clone();
        }

        let roots = Arc::new(discover_system_roots(compiler).await);
        if let Ok(mut guard) = self.system_roots.write() {
            guard.insert(compiler.to_string(), roots.clone());
        }
        roots
    }
}

/// Run `<compiler> -E -v -x c -` and parse the search-path block from its
/// stderr. This is how `<stddef.h>` and friends are classified as system
/// headers.
pub async fn discover_system_roots(compiler: &str) -> Vec<PathBuf> {
    let output = match Command::new(compiler)
        .args(["-E", "-v", "-x", "c", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(error) => {
            warn!("Failed to probe {compiler} for system include paths: {error}");
            return Vec::new();
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut roots = Vec::new();
    let mut parsing_includes = false;

    for line in stderr.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("#include <...> search starts here:") {
            parsing_includes = true;
            continue;
        }
        if parsing_includes {
            if trimmed.starts_with("End of search list.") {
                break;
            }
            let path = PathBuf::from(trimmed.trim_end_matches(" (framework directory)"));
            if let Ok(canonical) = path.canonicalize() {
                roots.push(canonical);
            }
        }
    }

    if roots.is_empty() {
        warn!("No system include paths found in `{compiler} -v` output");
    } else {
        debug!("System include roots for {compiler}: {roots:?}");
    }
    roots
}

pub fn is_system_path(roots: &[PathBuf], path: &Path) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}

/// Invoke the front-end once on a compile command.
///
/// A spawn failure (the "no translation unit" case) is the only `Err`;
/// a compiler run that merely reports errors succeeds with diagnostics.
pub async fn parse_tu(
    cmd: &CompileCommand,
    extra_isystem: Option<&Path>,
    flags: ParseFlags,
) -> io::Result<TuParse> {
    let args = parse_invocation_args(cmd, extra_isystem, flags);
    debug!("Running: {} {}", cmd.compiler_executable, args.join(" "));

    let output = Command::new(&cmd.compiler_executable)
        .args(&args)
        .current_dir(&cmd.directory)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .output()
        .await?;

    let text = String::from_utf8_lossy(&output.stderr);
    Ok(stderr::parse_stderr(&text, &cmd.file))
}

fn parse_invocation_args(
    cmd: &CompileCommand,
    extra_isystem: Option<&Path>,
    flags: ParseFlags,
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(dir) = extra_isystem {
        args.push("-isystem".to_string());
        args.push(dir.display().to_string());
    }
    args.extend(sanitize_args(&cmd.arguments, &cmd.directory));
    args.push("-fsyntax-only".to_string());
    args.push("-fno-color-diagnostics".to_string());
    args.push("-fno-caret-diagnostics".to_string());
    args.push("-H".to_string());
    if flags.skip_function_bodies {
        args.push("-Xclang".to_string());
        args.push("-fskip-function-bodies".to_string());
    }
    args
}

/// Parse, format and graph one compile command, with the one-shot
/// missing-system-header retry.
pub async fn process_command(
    index: &ClangIndex,
    cmd: &CompileCommand,
    colors: bool,
    flags: ParseFlags,
) -> Result<CommandOutput, FatalError> {
    let roots = index.system_roots(&cmd.compiler_executable).await;

    let parse = match parse_tu(cmd, None, flags).await {
        Ok(parse) => parse,
        Err(error) => {
            warn!(
                "front-end invocation failed for {}: {error}",
                cmd.file.display()
            );
            return Ok(CommandOutput {
                diags: parse_failure_set(&error, colors),
                graph: InclusionGraph::new(),
                had_autoinclude: false,
            });
        }
    };
    let diags = format_set(&parse.diags, colors);

    if recovery::needs_include_recovery(&diags) {
        let Some(language) = recovery::guess_language(cmd) else {
            return Err(FatalError::Internal(format!(
                "cannot determine source language of {} for include recovery",
                cmd.file.display()
            )));
        };
        match recovery::recovery_include_dir(language) {
            Some(dir) => {
                info!(
                    "missing system header in {}; retrying with -isystem {}",
                    cmd.file.display(),
                    dir.display()
                );
                return retry_with_isystem(cmd, &dir, &roots, colors, flags).await;
            }
            None => warn!(
                "missing system header in {} but no fallback include directory exists",
                cmd.file.display()
            ),
        }
    }

    let graph = walk::build_tu_graph(cmd, &parse, &roots)?;
    Ok(CommandOutput {
        diags,
        graph,
        had_autoinclude: false,
    })
}

async fn retry_with_isystem(
    cmd: &CompileCommand,
    dir: &Path,
    roots: &[PathBuf],
    colors: bool,
    flags: ParseFlags,
) -> Result<CommandOutput, FatalError> {
    let parse = match parse_tu(cmd, Some(dir), flags).await {
        Ok(parse) => parse,
        Err(error) => {
            return Ok(CommandOutput {
                diags: parse_failure_set(&error, colors),
                graph: InclusionGraph::new(),
                had_autoinclude: true,
            });
        }
    };

    // The injected directory is a system root for this parse only.
    let mut roots = roots.to_vec();
    roots.push(dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()));

    let diags = format_set(&parse.diags, colors);
    let graph = walk::build_tu_graph(cmd, &parse, &roots)?;
    Ok(CommandOutput {
        diags,
        graph,
        had_autoinclude: true,
    })
}

fn parse_failure_set(error: &io::Error, colors: bool) -> FormattedDiagSet {
    let code = error
        .raw_os_error()
        .map(|code| code.to_string())
        .unwrap_or_else(|| format!("{:?}", error.kind()));
    FormattedDiagSet {
        diags: Vec::new(),
        info: Some(format!("ERROR: index:parse() failed: {code}")),
        uses_colors: colors,
    }
}
