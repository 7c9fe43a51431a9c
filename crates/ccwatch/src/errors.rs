use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compdb::LoadError;

/// Conditions that terminate the process, carrying the documented exit code.
///
/// Everything else (a TU that fails to parse, a skipped recovery retry) is
/// surfaced as diagnostics output or a log line and never ends the run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("cannot resolve real path of {}: {source}", .path.display())]
    RealPath { path: PathBuf, source: io::Error },

    #[error("watched file moved or deleted: {}", .0.display())]
    WatchedFileGone(PathBuf),

    #[error("compile database changed on disk: {}", .0.display())]
    DatabaseChanged(PathBuf),

    /// A pool worker died before completing its protocol; its own exit code
    /// (already one of these) is propagated verbatim.
    #[error("worker for command #{index} exited with code {code}")]
    Worker { index: u32, code: i32 },

    #[error("file watch failed: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FatalError {
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::Usage(_) => 1,
            FatalError::Load(_) => 2,
            FatalError::RealPath { .. } => 3,
            FatalError::WatchedFileGone(_) => 100,
            FatalError::DatabaseChanged(_) => 101,
            FatalError::Worker { code, .. } => *code,
            FatalError::Watch(_) | FatalError::Io(_) | FatalError::Internal(_) => 255,
        }
    }
}
