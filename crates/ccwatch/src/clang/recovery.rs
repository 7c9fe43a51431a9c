//! Missing-system-header auto-recovery.
//!
//! When a first parse dies on `fatal error: '...' file not found`, the
//! command is retried once with an extra `-isystem` directory chosen for
//! the TU's language: the newest Clang resource include directory for C,
//! the newest libstdc++ header directory for C++.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::compdb::CompileCommand;
use crate::diagnostics::FormattedDiagSet;
use crate::diagnostics::format::strip_ansi;

static FILE_NOT_FOUND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'[^']+' file not found").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    C,
    Cpp,
}

/// Does this output look like a missing-system-header failure?
pub fn needs_include_recovery(set: &FormattedDiagSet) -> bool {
    let plain = set
        .diags
        .iter()
        .flat_map(|diag| diag.lines.iter())
        .map(|line| strip_ansi(line))
        .collect::<Vec<_>>()
        .join("\n");
    plain.contains("fatal error: ") && FILE_NOT_FOUND_RE.is_match(&plain)
}

/// `.c` means C; an explicit `-std=c++` argument means C++; anything else
/// is undetermined and aborts recovery.
pub fn guess_language(cmd: &CompileCommand) -> Option<SourceLanguage> {
    if cmd.file.extension().is_some_and(|ext| ext == "c") {
        return Some(SourceLanguage::C);
    }
    if cmd.arguments.iter().any(|arg| arg.contains("-std=c++")) {
        return Some(SourceLanguage::Cpp);
    }
    None
}

/// The built-in fallback directory for a language, or `None` when this
/// machine has none.
pub fn recovery_include_dir(language: SourceLanguage) -> Option<PathBuf> {
    match language {
        SourceLanguage::C => c_resource_include_dir(),
        SourceLanguage::Cpp => newest_versioned_subdir(Path::new("/usr/include/c++")),
    }
}

fn c_resource_include_dir() -> Option<PathBuf> {
    // Prefer the newest packaged LLVM's resource headers, then the
    // unversioned /usr/lib/clang layout.
    let mut llvm_roots: Vec<(Vec<u32>, PathBuf)> = std::fs::read_dir("/usr/lib")
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("llvm")
                .then(|| (version_key(&name), entry.path()))
        })
        .collect();
    llvm_roots.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, root) in llvm_roots {
        if let Some(versioned) = newest_versioned_subdir(&root.join("lib/clang")) {
            let include = versioned.join("include");
            if include.is_dir() {
                return Some(include);
            }
        }
    }

    newest_versioned_subdir(Path::new("/usr/lib/clang"))
        .map(|dir| dir.join("include"))
        .filter(|dir| dir.is_dir())
}

/// The subdirectory of `base` with the greatest dotted-version name.
fn newest_versioned_subdir(base: &Path) -> Option<PathBuf> {
    let mut best: Option<(Vec<u32>, PathBuf)> = None;
    for entry in std::fs::read_dir(base).ok()?.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let key = version_key(&entry.file_name().to_string_lossy());
        if key.is_empty() {
            continue;
        }
        if best.as_ref().is_none_or(|(k, _)| key > *k) {
            best = Some((key, path));
        }
    }
    best.map(|(_, path)| path)
}

fn version_key(name: &str) -> Vec<u32> {
    name.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FormattedDiag;
    use tempfile::TempDir;

    fn set_with_lines(lines: &[&str]) -> FormattedDiagSet {
        FormattedDiagSet {
            diags: vec![FormattedDiag {
                lines: lines.iter().map(|l| (*l).to_string()).collect(),
            }],
            info: None,
            uses_colors: false,
        }
    }

    #[test]
    fn detects_a_missing_header_failure() {
        let set = set_with_lines(&["/w/a.c:1:10: fatal error: 'stddef.h' file not found"]);
        assert!(needs_include_recovery(&set));
    }

    #[test]
    fn both_fragments_are_required() {
        assert!(!needs_include_recovery(&set_with_lines(&[
            "/w/a.c:1:10: error: 'stddef.h' file not found"
        ])));
        assert!(!needs_include_recovery(&set_with_lines(&[
            "/w/a.c:1:10: fatal error: too many errors"
        ])));
    }

    #[test]
    fn detection_sees_through_colors() {
        let set = set_with_lines(&[
            "\u{1b}[1m/w/a.c:1:10:\u{1b}[0m \u{1b}[31;1mfatal error: \u{1b}[0m'x.h' file not found",
        ]);
        assert!(needs_include_recovery(&set));
    }

    fn command(file: &str, arguments: &[&str]) -> CompileCommand {
        CompileCommand {
            directory: PathBuf::from("/w"),
            file: PathBuf::from(file),
            compiler_executable: "cc".to_string(),
            arguments: arguments.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    #[test]
    fn c_files_guess_c() {
        assert_eq!(
            guess_language(&command("/w/main.c", &["/w/main.c"])),
            Some(SourceLanguage::C)
        );
    }

    #[test]
    fn std_flag_guesses_cpp() {
        assert_eq!(
            guess_language(&command("/w/main.cpp", &["-std=c++17", "/w/main.cpp"])),
            Some(SourceLanguage::Cpp)
        );
    }

    #[test]
    fn unknown_language_stays_unknown() {
        assert_eq!(guess_language(&command("/w/main.cpp", &["/w/main.cpp"])), None);
    }

    #[test]
    fn newest_versioned_subdir_orders_numerically() {
        let tmp = TempDir::new().unwrap();
        for name in ["9", "10", "10.2", "2.9.1", "unversioned"] {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }
        assert_eq!(
            newest_versioned_subdir(tmp.path()),
            Some(tmp.path().join("10.2"))
        );
    }

    #[test]
    fn newest_versioned_subdir_of_nothing_is_none() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(newest_versioned_subdir(&tmp.path().join("absent")), None);
        assert_eq!(newest_versioned_subdir(tmp.path()), None);
    }

    #[test]
    fn version_keys_compare_componentwise() {
        assert!(version_key("19.1.7") > version_key("19.1"));
        assert!(version_key("llvm-18") < version_key("llvm-19"));
        assert!(version_key("v13") > version_key("9"));
        assert!(version_key("plain").is_empty());
    }
}
