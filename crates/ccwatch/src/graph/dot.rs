//! Graphviz DOT rendering of an inclusion graph.

use std::io::{self, Write};

use super::InclusionGraph;

/// Write the graph as a single `digraph`.
///
/// Node labels are the node paths with `strip_prefix` removed. With
/// `reverse`, every stored edge `a -> b` prints as `b -> a`. When
/// `edge_limit` is given and a node's stored edge count strictly exceeds
/// it, the whole fan-out collapses into a single edge to a placeholder
/// node carrying the true count.
pub fn write_dot<W: Write>(
    graph: &InclusionGraph,
    title: &str,
    reverse: bool,
    strip_prefix: &str,
    edge_limit: Option<usize>,
    w: &mut W,
) -> io::Result<()> {
    writeln!(w, "digraph \"{}\" {{", escape(title))?;

    for (name, edges) in graph.iter() {
        let label = strip(name, strip_prefix);
        writeln!(w, "  \"{}\";", escape(label))?;

        if let Some(limit) = edge_limit
            && edges.len() > limit
        {
            let placeholder = format!("{} fan-out", label);
            writeln!(
                w,
                "  \"{}\" [label=\"{} files\"];",
                escape(&placeholder),
                edges.len()
            )?;
            write_edge(w, label, &placeholder, reverse)?;
            continue;
        }

        for target in edges {
            write_edge(w, label, strip(target, strip_prefix), reverse)?;
        }
    }

    writeln!(w, "}}")
}

fn write_edge<W: Write>(w: &mut W, from: &str, to: &str, reverse: bool) -> io::Result<()> {
    let (from, to) = if reverse { (to, from) } else { (from, to) };
    writeln!(w, "  \"{}\" -> \"{}\";", escape(from), escape(to))
}

fn strip<'a>(name: &'a str, prefix: &str) -> &'a str {
    name.strip_prefix(prefix).unwrap_or(name)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn render(graph: &InclusionGraph, reverse: bool, limit: Option<usize>) -> String {
        let mut out = Vec::new();
        write_dot(graph, "t", reverse, "/w/", limit, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn sample() -> InclusionGraph {
        let mut g = InclusionGraph::new();
        g.add_inclusion("/w/a.h", "/w/main.c");
        g.add_inclusion("/w/a.h", "/w/other.c");
        g
    }

    #[test]
    fn forward_edges_follow_the_stored_direction() {
        expect![[r#"
            digraph "t" {
              "a.h";
              "a.h" -> "main.c";
              "a.h" -> "other.c";
              "main.c";
              "other.c";
            }
        "#]]
        .assert_eq(&render(&sample(), false, None));
    }

    #[test]
    fn reverse_flips_every_edge() {
        expect![[r#"
            digraph "t" {
              "a.h";
              "main.c" -> "a.h";
              "other.c" -> "a.h";
              "main.c";
              "other.c";
            }
        "#]]
        .assert_eq(&render(&sample(), true, None));
    }

    #[test]
    fn fan_out_collapses_strictly_above_the_limit() {
        let mut g = InclusionGraph::new();
        g.add_inclusion("/w/hub.h", "/w/a.c");
        g.add_inclusion("/w/hub.h", "/w/b.c");
        g.add_inclusion("/w/hub.h", "/w/c.c");

        // At the limit: printed in full.
        let full = render(&g, false, Some(3));
        assert!(full.contains("\"hub.h\" -> \"a.c\";"));
        assert!(!full.contains("fan-out"));

        // Strictly above: collapsed.
        let collapsed = render(&g, false, Some(2));
        assert!(collapsed.contains("\"hub.h fan-out\" [label=\"3 files\"];"));
        assert!(collapsed.contains("\"hub.h\" -> \"hub.h fan-out\";"));
        assert!(!collapsed.contains("\"hub.h\" -> \"a.c\";"));
    }

    #[test]
    fn labels_and_title_are_quoted_and_escaped() {
        let mut g = InclusionGraph::new();
        g.add_node("/w/we\"ird.h");
        let mut out = Vec::new();
        write_dot(&g, "inc \"graph\"", false, "/w/", None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph \"inc \\\"graph\\\"\" {"));
        assert!(text.contains("\"we\\\"ird.h\";"));
    }
}
