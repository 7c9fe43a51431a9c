//! Run-scoped diagnostic printing with cross-command deduplication.

use std::collections::HashSet;
use std::io::{self, Write};

use super::FormattedDiagSet;

/// Prints per-command diagnostic sets in ascending command order and skips
/// diagnostics already printed for an earlier command in the same run.
///
/// The dedup key is the rendered text with inclusion-chain prefix lines
/// removed, so the same header diagnostic reached through different TUs
/// still counts as a repeat. State lives for exactly one sweep.
pub struct DiagPrinter<W: Write> {
    out: W,
    dedup: bool,
    seen: HashSet<String>,
    commands_with_omissions: u32,
    total_omitted: u32,
}

impl<W: Write> DiagPrinter<W> {
    pub fn new(out: W, dedup: bool) -> Self {
        Self {
            out,
            dedup,
            seen: HashSet::new(),
            commands_with_omissions: 0,
            total_omitted: 0,
        }
    }

    pub fn print_set(&mut self, set: &FormattedDiagSet) -> io::Result<()> {
        let mut skipped = 0u32;
        let mut last_skipped = false;
        let mut printed = Vec::new();

        for diag in &set.diags {
            let text = diag.text();
            let normalized = normalized_form(&text);
            if self.dedup && self.seen.contains(&normalized) {
                skipped += 1;
                last_skipped = true;
                continue;
            }
            last_skipped = false;
            writeln!(self.out, "{text}")?;
            printed.push(normalized);
        }

        // Newly printed diagnostics only join the seen-set once the whole
        // set is decided; repeats inside one command print normally.
        self.seen.extend(printed);

        // The omission note belongs to the set's last diagnostic; if dedup
        // swallowed that one, the note would dangle.
        if let Some(info) = &set.info
            && !last_skipped
        {
            writeln!(self.out, "{info}")?;
        }

        if skipped > 0 {
            self.commands_with_omissions += 1;
            self.total_omitted += skipped;
        }
        Ok(())
    }

    pub fn print_note(&mut self, note: &str) -> io::Result<()> {
        writeln!(self.out, "{note}")
    }

    /// Emit the end-of-run dedup tally and reset for the next sweep.
    pub fn finish_run(&mut self) -> io::Result<()> {
        if self.commands_with_omissions > 0 {
            writeln!(
                self.out,
                "NOTE: omitted {} from {}.",
                count_noun(self.total_omitted, "repeated diagnostic"),
                count_noun(self.commands_with_omissions, "command"),
            )?;
        }
        self.seen.clear();
        self.commands_with_omissions = 0;
        self.total_omitted = 0;
        Ok(())
    }
}

/// Dedup key: the rendered diagnostic minus inclusion-chain prefix lines.
pub fn normalized_form(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("In file included from "))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn count_noun(n: u32, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
