//! Parsing of the front-end's stderr stream.
//!
//! One pass classifies every line as an `-H` inclusion-trace entry, an
//! inclusion-chain prefix, a located diagnostic, a driver diagnostic
//! without a location, or noise ("2 errors generated.", blank lines).

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{IncludeEvent, TuParse};
use crate::diagnostics::{Diagnostic, Severity};

static DIAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?):(\d+):(\d+):\s*(fatal error|error|warning|note):\s*(.*)$").unwrap()
});

static DRIVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^\s:]+):\s*(fatal error|error|warning|note):\s*(.*)$").unwrap()
});

static HTRACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\.+) (.+)$").unwrap());

static CATEGORY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s\[([^\[\]]+)\]$").unwrap());

const INCLUDED_FROM: &str = "In file included from ";

/// Parse one stderr capture into diagnostics and inclusion events.
///
/// `main_file` anchors the `-H` depth-1 entries: it is the includer of
/// every top-level header.
pub fn parse_stderr(output: &str, main_file: &Path) -> TuParse {
    let mut parse = TuParse::default();
    // Inclusion chain of the -H trace: chain[d] is the most recent file
    // seen at depth d+1.
    let mut chain: Vec<PathBuf> = Vec::new();
    // "In file included from" lines waiting for their diagnostic.
    let mut pending_prefix: Vec<Diagnostic> = Vec::new();

    for line in output.lines() {
        if let Some(caps) = HTRACE_RE.captures(line) {
            let depth = caps[1].len();
            let included = PathBuf::from(&caps[2]);
            chain.truncate(depth - 1);

            let mut stack: Vec<PathBuf> = chain.iter().rev().cloned().collect();
            stack.push(main_file.to_path_buf());
            parse.events.push(IncludeEvent {
                included: included.clone(),
                stack,
            });
            chain.push(included);
            continue;
        }

        if let Some(rest) = line.strip_prefix(INCLUDED_FROM) {
            pending_prefix.push(Diagnostic::new(
                Severity::Note,
                format!("in file included from {rest}"),
            ));
            continue;
        }

        if let Some(diag) = parse_diagnostic_line(line) {
            attach(&mut parse.diags, &mut pending_prefix, diag);
        }
    }

    parse
}

fn attach(diags: &mut Vec<Diagnostic>, pending_prefix: &mut Vec<Diagnostic>, mut diag: Diagnostic) {
    diag.children = std::mem::take(pending_prefix);
    if diag.severity == Severity::Note
        && let Some(primary) = diags.last_mut()
    {
        primary.children.push(diag);
    } else {
        diags.push(diag);
    }
}

/// Parse `file:line:col: severity: message` or the driver's locationless
/// `program: severity: message` form.
fn parse_diagnostic_line(line: &str) -> Option<Diagnostic> {
    let (severity, message_start) = if let Some(caps) = DIAG_RE.captures(line) {
        (
            Severity::from_tag(&caps[4])?,
            caps.get(5).expect("match has message").start(),
        )
    } else if let Some(caps) = DRIVER_RE.captures(line) {
        (
            Severity::from_tag(&caps[2])?,
            caps.get(3).expect("match has message").start(),
        )
    } else {
        return None;
    };

    // Peel a trailing "[-Wfoo]" style suffix off into the category; the
    // formatter re-appends it on top-level diagnostics.
    let (spelling, category) = match CATEGORY_RE.captures_at(line, message_start) {
        Some(caps) => {
            let whole = caps.get(0).expect("whole match");
            (
                line[..whole.start()].to_string(),
                caps[1].to_string(),
            )
        }
        None => (line.to_string(), String::new()),
    };

    let mut diag = Diagnostic::new(severity, spelling);
    diag.category = category;
    Some(diag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> TuParse {
        parse_stderr(text, Path::new("/w/main.c"))
    }

    #[test]
    fn located_diagnostics_are_parsed_with_severity() {
        let parse = parse("/w/main.c:3:5: warning: unused variable 'x' [-Wunused-variable]\n");
        assert_eq!(parse.diags.len(), 1);
        let diag = &parse.diags[0];
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.spelling, "/w/main.c:3:5: warning: unused variable 'x'");
        assert_eq!(diag.category, "-Wunused-variable");
    }

    #[test]
    fn notes_attach_to_the_preceding_primary() {
        let parse = parse(
            "/w/main.c:3:5: error: redefinition of 'x'\n\
             /w/main.c:1:5: note: previous definition is here\n\
             /w/main.c:9:1: warning: other\n",
        );
        assert_eq!(parse.diags.len(), 2);
        assert_eq!(parse.diags[0].children.len(), 1);
        assert_eq!(
            parse.diags[0].children[0].spelling,
            "/w/main.c:1:5: note: previous definition is here"
        );
        assert!(parse.diags[1].children.is_empty());
    }

    #[test]
    fn inclusion_prefix_lines_become_leading_children() {
        let parse = parse(
            "In file included from /w/main.c:1:\n\
             In file included from /w/a.h:2:\n\
             /w/b.h:3:1: warning: something\n",
        );
        assert_eq!(parse.diags.len(), 1);
        let children = &parse.diags[0].children;
        assert_eq!(children.len(), 2);
        assert!(children[0].is_inclusion_prefix());
        assert_eq!(children[0].spelling, "in file included from /w/main.c:1:");
        assert_eq!(children[1].spelling, "in file included from /w/a.h:2:");
    }

    #[test]
    fn driver_diagnostics_without_location_are_kept() {
        let parse = parse("clang: error: no such file or directory: 'nope.c'\n");
        assert_eq!(parse.diags.len(), 1);
        assert_eq!(parse.diags[0].severity, Severity::Error);
        assert_eq!(
            parse.diags[0].spelling,
            "clang: error: no such file or directory: 'nope.c'"
        );
    }

    #[test]
    fn fatal_tag_is_recognized() {
        let parse = parse("/w/main.c:1:10: fatal error: 'nope.h' file not found\n");
        assert_eq!(parse.diags[0].severity, Severity::Fatal);
    }

    #[test]
    fn summary_lines_are_ignored() {
        let parse = parse("2 warnings and 1 error generated.\n");
        assert!(parse.diags.is_empty());
    }

    #[test]
    fn h_trace_builds_inclusion_stacks() {
        let parse = parse(
            ". /w/a.h\n\
             .. /w/b.h\n\
             ... /usr/include/stdio.h\n\
             . /w/c.h\n",
        );
        assert_eq!(parse.events.len(), 4);

        assert_eq!(parse.events[0].included, PathBuf::from("/w/a.h"));
        assert_eq!(parse.events[0].stack, vec![PathBuf::from("/w/main.c")]);

        assert_eq!(parse.events[1].included, PathBuf::from("/w/b.h"));
        assert_eq!(
            parse.events[1].stack,
            vec![PathBuf::from("/w/a.h"), PathBuf::from("/w/main.c")]
        );

        assert_eq!(
            parse.events[2].stack,
            vec![
                PathBuf::from("/w/b.h"),
                PathBuf::from("/w/a.h"),
                PathBuf::from("/w/main.c"),
            ]
        );

        // Depth resets pop the chain.
        assert_eq!(parse.events[3].included, PathBuf::from("/w/c.h"));
        assert_eq!(parse.events[3].stack, vec![PathBuf::from("/w/main.c")]);
    }

    #[test]
    fn trace_and_diagnostics_interleave() {
        let parse = parse(
            ". /w/a.h\n\
             /w/a.h:3:1: warning: shadow\n\
             .. /w/b.h\n",
        );
        assert_eq!(parse.events.len(), 2);
        assert_eq!(parse.diags.len(), 1);
    }

    #[test]
    fn category_with_multiple_options_is_peeled_whole() {
        let parse = parse("/w/a.c:1:1: warning: w [-Werror,-Wunused]\n");
        assert_eq!(parse.diags[0].category, "-Werror,-Wunused");
        assert_eq!(parse.diags[0].spelling, "/w/a.c:1:1: warning: w");
    }

    #[test]
    fn windows_style_message_brackets_do_not_confuse_the_peel() {
        // A bracketed fragment mid-message stays in the spelling.
        let parse = parse("/w/a.c:1:1: warning: use of [deprecated] api here\n");
        assert_eq!(parse.diags[0].category, "");
        assert_eq!(
            parse.diags[0].spelling,
            "/w/a.c:1:1: warning: use of [deprecated] api here"
        );
    }
}
