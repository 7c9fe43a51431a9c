//! Diagnostic model and rendering.
//!
//! A [`Diagnostic`] is the tree the front-end hands back: a primary message
//! with attached notes, preceded by inclusion-chain prefix lines. Rendering
//! turns one tree into a [`FormattedDiag`] (indented text lines) and a whole
//! per-TU batch into a [`FormattedDiagSet`].

pub mod format;
pub mod printer;
pub mod wire;

/// Severity scale of the front-end, weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Ignored,
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Map a severity tag as spelled in compiler output.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "note" => Some(Self::Note),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "fatal error" => Some(Self::Fatal),
            _ => None,
        }
    }
}

/// Spelling prefix marking a child diagnostic that is really an
/// inclusion-chain line, rendered as a prefix rather than nested.
pub const INCLUSION_PREFIX: &str = "in file included from ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Diagnostic category (e.g. the warning option), appended to the
    /// rendered text of top-level diagnostics.
    pub category: String,
    pub spelling: String,
    pub children: Vec<Diagnostic>,
}

impl Diagnostic {
    pub fn new(severity: Severity, spelling: impl Into<String>) -> Self {
        Self {
            severity,
            category: String::new(),
            spelling: spelling.into(),
            children: Vec::new(),
        }
    }

    pub fn is_inclusion_prefix(&self) -> bool {
        self.spelling.starts_with(INCLUSION_PREFIX)
    }
}

/// One rendered top-level diagnostic: its prefix lines, its own line, and
/// the indented lines of its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormattedDiag {
    pub lines: Vec<String>,
}

impl FormattedDiag {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// The rendered output of one compile command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormattedDiagSet {
    pub diags: Vec<FormattedDiag>,
    /// Trailing single-line summary (omission note or parse-failure report).
    pub info: Option<String>,
    pub uses_colors: bool,
}
