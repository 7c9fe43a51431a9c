//! File-change watching between sweeps.
//!
//! Every node of every per-command inclusion graph gets a non-recursive
//! watch, as does the compile database itself. Content modifications feed
//! the next incremental sweep. A watched file moving or disappearing, or
//! the database changing at all, ends the process; the tool is expected
//! to be restarted on topology changes.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use crate::errors::FatalError;
use crate::graph::InclusionGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Content changed; affected commands must re-parse.
    Modified,
    /// The file itself moved or was deleted; fatal.
    Gone,
    /// Access/metadata noise.
    Ignored,
}

/// Map a notification kind onto the tool's three reactions.
pub fn classify(kind: &EventKind) -> Classification {
    match kind {
        EventKind::Remove(_) => Classification::Gone,
        EventKind::Modify(ModifyKind::Name(_)) => Classification::Gone,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            Classification::Modified
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Classification::Modified,
        EventKind::Create(_) => Classification::Modified,
        _ => Classification::Ignored,
    }
}

pub struct ChangeWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    watched: HashSet<PathBuf>,
    db_path: PathBuf,
}

impl ChangeWatcher {
    /// Start watching, with the database file always on the watch list.
    pub fn new(db_path: PathBuf) -> Result<Self, FatalError> {
        let (tx, rx) = std::sync::mpsc::channel();
        let watcher = notify::recommended_watcher(tx)?;
        let mut this = Self {
            watcher,
            rx,
            watched: HashSet::new(),
            db_path: db_path.clone(),
        };
        this.watch_path(&db_path)?;
        Ok(this)
    }

    /// Watch one path; already-watched paths are not re-registered.
    pub fn watch_path(&mut self, path: &Path) -> Result<(), FatalError> {
        if self.watched.contains(path) {
            return Ok(());
        }
        match self.watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.watched.insert(path.to_path_buf());
                Ok(())
            }
            // A node that vanished between the sweep and the registration
            // is the same topology change a delete event reports.
            Err(error) if matches!(error.kind, notify::ErrorKind::PathNotFound) => {
                Err(FatalError::WatchedFileGone(path.to_path_buf()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Register watches for every graph node not yet covered.
    pub fn watch_graph_nodes(
        &mut self,
        graphs: &BTreeMap<u32, InclusionGraph>,
    ) -> Result<(), FatalError> {
        for graph in graphs.values() {
            for name in graph.file_names() {
                self.watch_path(Path::new(name))?;
            }
        }
        Ok(())
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Block until a content modification arrives; topology changes and
    /// database events surface as the matching fatal error.
    pub fn next_modification(&mut self) -> Result<Vec<PathBuf>, FatalError> {
        loop {
            let event = self
                .rx
                .recv()
                .map_err(|_| FatalError::Internal("file-watch channel closed".into()))??;

            match classify(&event.kind) {
                Classification::Gone => {
                    let path = event.paths.into_iter().next().unwrap_or_default();
                    return Err(FatalError::WatchedFileGone(path));
                }
                Classification::Modified => {
                    if event.paths.iter().any(|p| *p == self.db_path) {
                        return Err(FatalError::DatabaseChanged(self.db_path.clone()));
                    }
                    if event.paths.is_empty() {
                        continue;
                    }
                    debug!("change event: {:?}", event.paths);
                    return Ok(event.paths);
                }
                Classification::Ignored => continue,
            }
        }
    }
}

/// Every command whose per-TU graph contains one of the changed paths.
pub fn affected_indexes(
    graphs: &BTreeMap<u32, InclusionGraph>,
    changed: &[PathBuf],
) -> Vec<u32> {
    graphs
        .iter()
        .filter(|(_, graph)| {
            changed
                .iter()
                .any(|path| graph.contains(&path.to_string_lossy()))
        })
        .map(|(index, _)| *index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    #[test]
    fn removals_and_renames_are_fatal_topology_changes() {
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File)),
            Classification::Gone
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::Any))),
            Classification::Gone
        );
    }

    #[test]
    fn content_writes_trigger_a_resweep() {
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            Classification::Modified
        );
        assert_eq!(
            classify(&EventKind::Access(AccessKind::Close(AccessMode::Write))),
            Classification::Modified
        );
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File)),
            Classification::Modified
        );
    }

    #[test]
    fn metadata_and_read_noise_is_ignored() {
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            Classification::Ignored
        );
        assert_eq!(
            classify(&EventKind::Access(AccessKind::Read)),
            Classification::Ignored
        );
        assert_eq!(classify(&EventKind::Other), Classification::Ignored);
    }

    #[test]
    fn affected_indexes_match_graph_membership() {
        let mut g1 = InclusionGraph::new();
        g1.add_inclusion("/w/shared.h", "/w/a.c");
        let mut g2 = InclusionGraph::new();
        g2.add_inclusion("/w/other.h", "/w/b.c");
        let mut g3 = InclusionGraph::new();
        g3.add_inclusion("/w/shared.h", "/w/c.c");

        let graphs = BTreeMap::from([(1u32, g1), (2u32, g2), (3u32, g3)]);
        assert_eq!(
            affected_indexes(&graphs, &[PathBuf::from("/w/shared.h")]),
            vec![1, 3]
        );
        assert_eq!(
            affected_indexes(&graphs, &[PathBuf::from("/w/b.c")]),
            vec![2]
        );
        assert!(affected_indexes(&graphs, &[PathBuf::from("/w/unrelated.h")]).is_empty());
    }
}
