//! Compile-database loading.
//!
//! Accepts the two `compile_commands.json` entry shapes (`arguments` array
//! or whitespace-split `command` string) and normalizes every entry into a
//! [`CompileCommand`] with absolute paths. Loading is all-or-nothing: any
//! malformed entry rejects the whole database.

pub(crate) mod sanitize;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub use sanitize::sanitize_args;

/// One canonical compile command.
///
/// `file` is absolute (resolved against `directory`), and exactly one
/// element of `arguments` is that absolute file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub file: PathBuf,
    pub compiler_executable: String,
    pub arguments: Vec<String>,
}

/// The immutable, 1-indexed command list for one run of the tool.
#[derive(Debug, Clone, Default)]
pub struct CompileCommandSet {
    commands: Vec<CompileCommand>,
}

impl CompileCommandSet {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Look up a command by its external 1-based index.
    pub fn get(&self, index: u32) -> Option<&CompileCommand> {
        index
            .checked_sub(1)
            .and_then(|i| self.commands.get(i as usize))
    }

    /// All external indexes, in order.
    pub fn indexes(&self) -> impl Iterator<Item = u32> + use<> {
        1..=self.commands.len() as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &CompileCommand)> {
        self.commands
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u32 + 1, c))
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read compile database: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed compile database: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entry #{index}: neither \"arguments\" nor \"command\" present")]
    MissingShape { index: usize },

    #[error("entry #{index}: database mixes \"arguments\" and \"command\" entry shapes")]
    MixedShape { index: usize },

    #[error("entry #{index}: \"directory\" is not an absolute path: {directory}")]
    RelativeDirectory { index: usize, directory: String },

    #[error("entry #{index}: backslash-whitespace escapes in \"command\" are not supported")]
    BackslashWhitespace { index: usize },

    #[error("entry #{index}: empty argument list")]
    EmptyArguments { index: usize },

    #[error("entry #{index}: \"file\" ({file}) matches {count} argv elements, expected exactly 1")]
    FileArgCount {
        index: usize,
        file: String,
        count: usize,
    },
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    directory: String,
    file: String,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryShape {
    Arguments,
    Command,
}

/// Load and canonicalize a compile database from a file on disk.
pub fn load_file(path: &Path) -> Result<CompileCommandSet, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let set = load_str(&text)?;
    debug!(
        "Loaded {} compile command(s) from {}",
        set.len(),
        path.display()
    );
    Ok(set)
}

/// Load and canonicalize a compile database from an in-memory JSON string.
pub fn load_str(text: &str) -> Result<CompileCommandSet, LoadError> {
    let raw: Vec<RawEntry> = serde_json::from_str(text)?;

    let mut shape = None;
    let mut commands = Vec::with_capacity(raw.len());
    for (i, entry) in raw.into_iter().enumerate() {
        let index = i + 1;
        let entry_shape = match (&entry.arguments, &entry.command) {
            (Some(_), _) => EntryShape::Arguments,
            (None, Some(_)) => EntryShape::Command,
            (None, None) => return Err(LoadError::MissingShape { index }),
        };
        match shape {
            None => shape = Some(entry_shape),
            Some(s) if s != entry_shape => return Err(LoadError::MixedShape { index }),
            Some(_) => {}
        }
        commands.push(canonicalize_entry(index, entry, entry_shape)?);
    }

    Ok(CompileCommandSet { commands })
}

fn canonicalize_entry(
    index: usize,
    entry: RawEntry,
    shape: EntryShape,
) -> Result<CompileCommand, LoadError> {
    if !Path::new(&entry.directory).is_absolute() {
        return Err(LoadError::RelativeDirectory {
            index,
            directory: entry.directory,
        });
    }

    let argv = match shape {
        EntryShape::Arguments => entry.arguments.expect("shape checked"),
        EntryShape::Command => split_command(index, &entry.command.expect("shape checked"))?,
    };
    let mut argv = argv.into_iter();
    let Some(compiler_executable) = argv.next() else {
        return Err(LoadError::EmptyArguments { index });
    };
    let mut arguments: Vec<String> = argv.collect();

    let directory = PathBuf::from(&entry.directory);
    let file = if Path::new(&entry.file).is_absolute() {
        PathBuf::from(&entry.file)
    } else {
        directory.join(&entry.file)
    };

    // The original (possibly relative) file spelling must occur exactly once
    // in argv and is replaced with the absolute form.
    let count = arguments.iter().filter(|a| **a == entry.file).count();
    if count != 1 {
        return Err(LoadError::FileArgCount {
            index,
            file: entry.file,
            count,
        });
    }
    let pos = arguments
        .iter()
        .position(|a| *a == entry.file)
        .expect("count checked");
    arguments[pos] = file.to_string_lossy().into_owned();

    Ok(CompileCommand {
        directory,
        file,
        compiler_executable,
        arguments,
    })
}

fn split_command(index: usize, command: &str) -> Result<Vec<String>, LoadError> {
    let bytes = command.as_bytes();
    for window in bytes.windows(2) {
        if window[0] == b'\\' && window[1].is_ascii_whitespace() {
            return Err(LoadError::BackslashWhitespace { index });
        }
    }
    Ok(command.split_ascii_whitespace().map(String::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_shape_is_canonicalized() {
        let db = load_str(
            r#"[{
                "directory": "/w",
                "file": "main.c",
                "arguments": ["cc", "-c", "main.c", "-o", "main.o"]
            }]"#,
        )
        .unwrap();

        assert_eq!(db.len(), 1);
        let cmd = db.get(1).unwrap();
        assert_eq!(cmd.directory, PathBuf::from("/w"));
        assert_eq!(cmd.file, PathBuf::from("/w/main.c"));
        assert_eq!(cmd.compiler_executable, "cc");
        assert_eq!(cmd.arguments, vec!["-c", "/w/main.c", "-o", "main.o"]);
    }

    #[test]
    fn absolute_file_is_kept_as_is() {
        let db = load_str(
            r#"[{
                "directory": "/w",
                "file": "/w/main.c",
                "arguments": ["cc", "-c", "/w/main.c", "-o", "main.o"]
            }]"#,
        )
        .unwrap();
        let cmd = db.get(1).unwrap();
        assert_eq!(cmd.file, PathBuf::from("/w/main.c"));
        assert_eq!(cmd.arguments[1], "/w/main.c");
    }

    #[test]
    fn command_shape_is_split_on_whitespace() {
        let db = load_str(
            r#"[{
                "directory": "/w",
                "file": "main.c",
                "command": "cc -Iinclude  main.c"
            }]"#,
        )
        .unwrap();
        let cmd = db.get(1).unwrap();
        assert_eq!(cmd.compiler_executable, "cc");
        assert_eq!(cmd.arguments, vec!["-Iinclude", "/w/main.c"]);
    }

    #[test]
    fn backslash_whitespace_in_command_is_rejected() {
        let err = load_str(
            r#"[{
                "directory": "/w",
                "file": "file.c",
                "command": "cc \\ file.c"
            }]"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::BackslashWhitespace { index: 1 }
        ));
    }

    #[test]
    fn mixed_shapes_are_rejected() {
        let err = load_str(
            r#"[
                {"directory": "/w", "file": "a.c", "arguments": ["cc", "a.c"]},
                {"directory": "/w", "file": "b.c", "command": "cc b.c"}
            ]"#,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::MixedShape { index: 2 }));
    }

    #[test]
    fn file_must_appear_exactly_once_in_argv() {
        let none = load_str(
            r#"[{"directory": "/w", "file": "a.c", "arguments": ["cc", "b.c"]}]"#,
        )
        .unwrap_err();
        assert!(matches!(none, LoadError::FileArgCount { count: 0, .. }));

        let twice = load_str(
            r#"[{"directory": "/w", "file": "a.c", "arguments": ["cc", "a.c", "a.c"]}]"#,
        )
        .unwrap_err();
        assert!(matches!(twice, LoadError::FileArgCount { count: 2, .. }));
    }

    #[test]
    fn relative_directory_is_a_load_error() {
        let err = load_str(
            r#"[{"directory": "w", "file": "a.c", "arguments": ["cc", "a.c"]}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::RelativeDirectory { index: 1, .. }));
    }

    #[test]
    fn entry_without_either_shape_is_rejected() {
        let err = load_str(r#"[{"directory": "/w", "file": "a.c"}]"#).unwrap_err();
        assert!(matches!(err, LoadError::MissingShape { index: 1 }));
    }

    #[test]
    fn top_level_object_is_a_json_error() {
        assert!(matches!(
            load_str(r#"{"directory": "/w"}"#).unwrap_err(),
            LoadError::Json(_)
        ));
    }

    #[test]
    fn indexes_are_one_based() {
        let db = load_str(
            r#"[
                {"directory": "/w", "file": "a.c", "arguments": ["cc", "a.c"]},
                {"directory": "/w", "file": "b.c", "arguments": ["cc", "b.c"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(db.indexes().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(db.get(2).unwrap().file, PathBuf::from("/w/b.c"));
        assert!(db.get(0).is_none());
        assert!(db.get(3).is_none());
    }
}
