//! File-level inclusion graph.
//!
//! Nodes are real (canonicalized) absolute paths; an edge `a -> b` records
//! the "is included by" relation: a `#include` in `b` reached `a`. Storage
//! is ordered maps so iteration, merging and DOT output are deterministic.

pub mod dot;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionGraph {
    nodes: BTreeMap<String, BTreeSet<String>>,
}

impl InclusionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node with no edges; a no-op if it already exists.
    pub fn add_node(&mut self, name: &str) {
        self.nodes.entry(name.to_string()).or_default();
    }

    /// Record that `to` is included by `from`. Both nodes are created on
    /// demand; a duplicate edge is a no-op.
    pub fn add_inclusion(&mut self, to: &str, from: &str) {
        self.add_node(from);
        self.nodes
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    pub fn get_node(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(BTreeSet::len).sum()
    }

    /// All node names in stable (sorted) order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set-union of nodes and edges.
    pub fn merge(&mut self, other: &InclusionGraph) {
        for (name, edges) in &other.nodes {
            let entry = self.nodes.entry(name.clone()).or_default();
            entry.extend(edges.iter().cloned());
        }
    }

    /// Longest common directory prefix of all node names (including the
    /// trailing slash), for label stripping.
    pub fn common_prefix(&self) -> String {
        let mut names = self.nodes.keys();
        let Some(first) = names.next() else {
            return String::new();
        };
        let mut prefix = first.as_str();
        for name in names {
            let mut len = prefix
                .as_bytes()
                .iter()
                .zip(name.as_bytes())
                .take_while(|(a, b)| a == b)
                .count();
            while !prefix.is_char_boundary(len) {
                len -= 1;
            }
            prefix = &prefix[..len];
        }
        match prefix.rfind('/') {
            Some(i) => prefix[..=i].to_string(),
            None => String::new(),
        }
    }

    // ── Pipe transport ───────────────────────────────────────────────────

    /// Length-prefixed binary encoding for the worker pipe.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, self.nodes.len() as u32);
        for (name, edges) in &self.nodes {
            push_str(&mut out, name);
            push_u32(&mut out, edges.len() as u32);
            for edge in edges {
                push_str(&mut out, edge);
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphWireError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        let mut graph = InclusionGraph::new();
        let node_count = cursor.read_u32()?;
        for _ in 0..node_count {
            let name = cursor.read_str()?;
            graph.add_node(&name);
            let edge_count = cursor.read_u32()?;
            for _ in 0..edge_count {
                let from = cursor.read_str()?;
                graph.add_inclusion(&name, &from);
            }
        }
        if cursor.pos != bytes.len() {
            return Err(GraphWireError::TrailingBytes);
        }
        Ok(graph)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphWireError {
    #[error("truncated inclusion-graph payload")]
    Truncated,
    #[error("trailing bytes after inclusion-graph payload")]
    TrailingBytes,
    #[error("inclusion-graph payload is not valid UTF-8")]
    InvalidUtf8,
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_str(out: &mut Vec<u8>, value: &str) {
    push_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn read_u32(&mut self) -> Result<u32, GraphWireError> {
        let end = self.pos.checked_add(4).ok_or(GraphWireError::Truncated)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(GraphWireError::Truncated)?;
        self.pos = end;
        Ok(u32::from_le_bytes(slice.try_into().expect("4-byte slice")))
    }

    fn read_str(&mut self) -> Result<String, GraphWireError> {
        let len = self.read_u32()? as usize;
        let end = self.pos.checked_add(len).ok_or(GraphWireError::Truncated)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(GraphWireError::Truncated)?;
        self.pos = end;
        std::str::from_utf8(slice)
            .map(str::to_owned)
            .map_err(|_| GraphWireError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_inclusion_is_idempotent() {
        let mut g = InclusionGraph::new();
        g.add_inclusion("/w/a.h", "/w/main.c");
        let snapshot = g.clone();
        g.add_inclusion("/w/a.h", "/w/main.c");
        assert_eq!(g, snapshot);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn edges_record_is_included_by() {
        let mut g = InclusionGraph::new();
        g.add_inclusion("/w/a.h", "/w/main.c");
        let includers = g.get_node("/w/a.h").unwrap();
        assert!(includers.contains("/w/main.c"));
        assert!(g.get_node("/w/main.c").unwrap().is_empty());
        assert!(g.get_node("/w/missing.h").is_none());
    }

    #[test]
    fn merge_is_set_union() {
        let mut a = InclusionGraph::new();
        a.add_inclusion("/w/a.h", "/w/main.c");
        a.add_inclusion("/w/b.h", "/w/main.c");

        let mut b = InclusionGraph::new();
        b.add_inclusion("/w/a.h", "/w/main.c");
        b.add_inclusion("/w/a.h", "/w/other.c");

        let mut merged = a.clone();
        merged.merge(&b);

        assert_eq!(merged.node_count(), 4);
        assert_eq!(merged.edge_count(), 3);
        let includers = merged.get_node("/w/a.h").unwrap();
        assert!(includers.contains("/w/main.c") && includers.contains("/w/other.c"));

        // Union is order-independent.
        let mut swapped = b.clone();
        swapped.merge(&a);
        assert_eq!(merged, swapped);
    }

    #[test]
    fn file_names_iterate_in_stable_order() {
        let mut g = InclusionGraph::new();
        g.add_inclusion("/w/z.h", "/w/main.c");
        g.add_inclusion("/w/a.h", "/w/main.c");
        assert_eq!(
            g.file_names().collect::<Vec<_>>(),
            vec!["/w/a.h", "/w/main.c", "/w/z.h"]
        );
    }

    #[test]
    fn common_prefix_stops_at_a_directory_boundary() {
        let mut g = InclusionGraph::new();
        g.add_inclusion("/home/dev/proj/src/a.h", "/home/dev/proj/src/main.c");
        g.add_inclusion("/home/dev/proj/include/b.h", "/home/dev/proj/src/main.c");
        assert_eq!(g.common_prefix(), "/home/dev/proj/");
    }

    #[test]
    fn common_prefix_of_a_single_node_is_its_directory() {
        let mut g = InclusionGraph::new();
        g.add_node("/w/src/main.c");
        assert_eq!(g.common_prefix(), "/w/src/");
        assert_eq!(InclusionGraph::new().common_prefix(), "");
    }

    #[test]
    fn wire_roundtrip_preserves_the_graph() {
        let mut g = InclusionGraph::new();
        g.add_inclusion("/w/a.h", "/w/main.c");
        g.add_inclusion("/w/a.h", "/w/other.c");
        g.add_node("/w/lonely.c");

        let decoded = InclusionGraph::from_bytes(&g.to_bytes()).unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn truncated_wire_payload_is_rejected() {
        let mut g = InclusionGraph::new();
        g.add_inclusion("/w/a.h", "/w/main.c");
        let bytes = g.to_bytes();
        assert_eq!(
            InclusionGraph::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err(),
            GraphWireError::Truncated
        );
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = InclusionGraph::new().to_bytes();
        bytes.push(7);
        assert_eq!(
            InclusionGraph::from_bytes(&bytes).unwrap_err(),
            GraphWireError::TrailingBytes
        );
    }
}
