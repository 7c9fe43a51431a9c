//! Inclusion walk and per-TU graph construction.

use std::path::{Path, PathBuf};

use super::{IncludeEvent, TuParse, is_system_path};
use crate::compdb::CompileCommand;
use crate::errors::FatalError;
use crate::graph::InclusionGraph;

/// Synchronous visitor over a TU's inclusion walk.
pub trait IncludeVisitor {
    /// Called once per inclusion. `stack[0]` is the file whose `#include`
    /// pulled `included_file` in; the last element is the TU's main file.
    fn on_include(&mut self, included_file: &Path, stack: &[PathBuf]);
}

pub fn walk_inclusions(parse: &TuParse, visitor: &mut dyn IncludeVisitor) {
    for IncludeEvent { included, stack } in &parse.events {
        visitor.on_include(included, stack);
    }
}

/// Resolve `path` against `directory` and canonicalize it.
pub fn canonicalize_in(directory: &Path, path: &Path) -> Result<PathBuf, FatalError> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    };
    joined
        .canonicalize()
        .map_err(|source| FatalError::RealPath {
            path: joined,
            source,
        })
}

/// Accumulates "is included by" edges while the walk runs; the first
/// real-path failure poisons the build and surfaces from [`finish`].
///
/// [`finish`]: GraphBuilder::finish
pub struct GraphBuilder<'a> {
    graph: InclusionGraph,
    directory: &'a Path,
    system_roots: &'a [PathBuf],
    error: Option<FatalError>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(directory: &'a Path, system_roots: &'a [PathBuf]) -> Self {
        Self {
            graph: InclusionGraph::new(),
            directory,
            system_roots,
            error: None,
        }
    }

    fn resolve(&mut self, path: &Path) -> Option<PathBuf> {
        match canonicalize_in(self.directory, path) {
            Ok(real) => Some(real),
            Err(error) => {
                if self.error.is_none() {
                    self.error = Some(error);
                }
                None
            }
        }
    }

    pub fn finish(self) -> Result<InclusionGraph, FatalError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.graph),
        }
    }
}

impl IncludeVisitor for GraphBuilder<'_> {
    fn on_include(&mut self, included_file: &Path, stack: &[PathBuf]) {
        if self.error.is_some() || stack.is_empty() {
            return;
        }

        let Some(to) = self.resolve(included_file) else {
            return;
        };
        if is_system_path(self.system_roots, &to) {
            return;
        }
        let Some(from) = self.resolve(&stack[0]) else {
            return;
        };

        assert!(
            to.is_absolute() && from.is_absolute(),
            "inclusion graph nodes must be absolute: {} <- {}",
            to.display(),
            from.display()
        );
        assert!(
            !is_system_path(self.system_roots, &from),
            "system header {} includes user header {}",
            from.display(),
            to.display()
        );

        self.graph
            .add_inclusion(&to.to_string_lossy(), &from.to_string_lossy());
    }
}

/// Build one command's inclusion graph from its parse.
///
/// The TU's own real path is always a node, so a TU without includes is
/// still visible to the watcher.
pub fn build_tu_graph(
    cmd: &CompileCommand,
    parse: &TuParse,
    system_roots: &[PathBuf],
) -> Result<InclusionGraph, FatalError> {
    let main_real = canonicalize_in(&cmd.directory, &cmd.file)?;
    let mut builder = GraphBuilder::new(&cmd.directory, system_roots);
    builder.graph.add_node(&main_real.to_string_lossy());
    walk_inclusions(parse, &mut builder);
    builder.finish()
}
