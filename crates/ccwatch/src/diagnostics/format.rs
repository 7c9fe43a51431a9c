//! Diagnostic tree rendering.

use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Diagnostic, FormattedDiag, FormattedDiagSet, Severity};

const INDENT_STEP: usize = 2;

/// Category that, on an error, truncates the rest of the set the same way a
/// fatal diagnostic does: nothing after a failed parse is trustworthy.
const PARSE_ISSUE_CATEGORY: &str = "Parse Issue";

static ANSI_RE: Lazy<Regex> = Lazy::new(|| Regex::new("\x1b\\[[0-9;]*m").unwrap());

/// Remove ANSI color sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Render a whole per-TU diagnostic batch.
///
/// Stops after the first fatal diagnostic (or parse-issue error); when that
/// truncates anything, the set's `info` line records how many diagnostics
/// were dropped.
pub fn format_set(diags: &[Diagnostic], colors: bool) -> FormattedDiagSet {
    let mut out = Vec::new();
    let mut info = None;

    for (i, diag) in diags.iter().enumerate() {
        out.push(format_diagnostic(diag, colors));
        if stops_set(diag) {
            let omitted = diags.len() - (i + 1);
            if omitted > 0 {
                info = Some(format!("NOTE: omitting {omitted} following diagnostics."));
            }
            break;
        }
    }

    FormattedDiagSet {
        diags: out,
        info,
        uses_colors: colors,
    }
}

fn stops_set(diag: &Diagnostic) -> bool {
    diag.severity == Severity::Fatal
        || (diag.severity == Severity::Error && diag.category == PARSE_ISSUE_CATEGORY)
}

/// Render one top-level diagnostic tree into indented lines.
pub fn format_diagnostic(diag: &Diagnostic, colors: bool) -> FormattedDiag {
    let mut lines = Vec::new();
    emit(diag, 0, colors, &mut lines);
    FormattedDiag { lines }
}

fn emit(diag: &Diagnostic, indent: usize, colors: bool, lines: &mut Vec<String>) {
    let pad = " ".repeat(indent);

    // Leading inclusion-chain children become prefix lines at the same
    // indentation; the first ordinary child ends the prefix run.
    let mut rest = 0;
    for child in &diag.children {
        if !child.is_inclusion_prefix() {
            break;
        }
        lines.push(format!("{pad}In{}", &child.spelling[2..]));
        rest += 1;
    }

    let mut text = if colors {
        colorize_severity(&diag.spelling)
    } else {
        diag.spelling.clone()
    };
    if indent == 0 && !diag.category.is_empty() {
        text.push_str(&format!(" [{}]", diag.category));
    }
    lines.push(format!("{pad}{text}"));

    for child in &diag.children[rest..] {
        emit(child, indent + INDENT_STEP, colors, lines);
    }
}

/// Apply the severity-tag color substitution, first matching tag wins.
fn colorize_severity(text: &str) -> String {
    const TAGS: [&str; 4] = ["fatal error: ", "error: ", "warning: ", "note: "];
    for tag in TAGS {
        let Some(pos) = text.find(tag) else { continue };
        let prefix = &text[..pos];
        let tail = &text[pos + tag.len()..];
        return match tag {
            "warning: " => format!("{}{}{}", prefix.bold(), tag.magenta().bold(), tail.bold()),
            "note: " => format!("{}{}{}", prefix.bold(), tag.bright_black().bold(), tail),
            _ => format!("{}{}{}", prefix.bold(), tag.red().bold(), tail.bold()),
        };
    }
    text.to_string()
}
