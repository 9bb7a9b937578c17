//! a2ledit is a library that allows you to edit a2l files at the text level.
//!
//! Unlike a full parser, it never rebuilds the file from a data model: every operation works on the
//! nested `/begin KIND NAME ... /end KIND` structure that is recovered directly from the text, and
//! all text that is not explicitly modified is preserved byte for byte.
//!
//! # Features
//!
//! - `check`: perform a consistency check on the block structure and the references between objects
//! - `merge`: merge other a2l files into a primary file on the level of the objects inside each `MODULE`
//! - `update`: read symbols from an ELF/DWARF or PE file and update `ECU_ADDRESS` and `DATA_TYPE` fields;
//!   also allows the creation of a minimal a2l file from a list of symbols

#[cfg(feature = "check")]
mod checker;
#[cfg(feature = "update")]
mod create;
#[cfg(feature = "update")]
mod debuginfo;
mod document;
mod include;
mod loader;
#[cfg(feature = "merge")]
mod merge;
mod scanner;
#[cfg(feature = "update")]
mod update;
mod version;
mod xcp;

use std::convert::AsRef;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

// re-export for the crate user
#[cfg(feature = "update")]
pub use create::CreateFilter;
#[cfg(feature = "update")]
pub use debuginfo::{A2lDataType, Symbol, SymbolOrigin, SymbolTable, load_symbols};
pub use document::{A2lDocument, MergeKey, ModuleIndex};
pub use scanner::{BlockSpan, line_of};
pub use version::A2lVersion;
pub use xcp::XcpInfo;

/// The kinds of blocks inside a `MODULE` that are identified by their kind and name.
///
/// Only blocks of these kinds take part in merging and in address updates.
pub const MERGE_OBJECT_KINDS: [&str; 9] = [
    "MEASUREMENT",
    "CHARACTERISTIC",
    "AXIS_PTS",
    "RECORD_LAYOUT",
    "COMPU_METHOD",
    "COMPU_VTAB",
    "COMPU_VTAB_RANGE",
    "COMPU_TAB",
    "FUNCTION",
];

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum A2lError {
    /// `FileOpenError`: An `IoError` that occurred while loading a file
    #[error("Failed to load {filename}: {ioerror}")]
    FileOpenError {
        filename: PathBuf,
        ioerror: std::io::Error,
    },

    /// `FileReadError`: An `IoError` that occurred while reading from a file
    #[error("Could not read from {filename}: {ioerror}")]
    FileReadError {
        filename: PathBuf,
        ioerror: std::io::Error,
    },

    /// `FileWriteError`: An `IoError` that occurred while writing to a file
    #[error("Could not write to {filename}: {ioerror}")]
    FileWriteError {
        filename: PathBuf,
        ioerror: std::io::Error,
    },

    /// `MergeConflict`: two objects with the same kind and name have different content (strict mode only)
    #[error("Merge conflict in MODULE {module} for {blockname} {item_name}")]
    MergeConflict {
        module: String,
        blockname: String,
        item_name: String,
    },

    /// `SymbolNotFound`: an object could not be updated, because its name is not in the symbol table (strict mode only)
    #[error("Symbol for {blockname} {item_name} not found")]
    SymbolNotFound {
        blockname: String,
        item_name: String,
    },

    /// `InvalidPattern`: a regular expression supplied by the caller could not be compiled
    #[error("Invalid regular expression \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// `UnmatchedBegin`: a `/begin` marker has no corresponding `/end`
    #[error("Unmatched /begin {blockname} at line {line}")]
    UnmatchedBegin { blockname: String, line: u32 },

    /// `UnmatchedEnd`: an `/end` marker was found while no block was open
    #[error("Unmatched /end {blockname} at line {line}")]
    UnmatchedEnd { blockname: String, line: u32 },

    /// `MismatchedEnd`: an `/end` marker closes a different kind of block than the one that is open
    #[error("Mismatched /end {blockname} at line {line}, expected {expected} from line {begin_line}")]
    MismatchedEnd {
        blockname: String,
        line: u32,
        expected: String,
        begin_line: u32,
    },

    /// `NameCollisionError`: A name collision occurred between two blocks of the same type
    #[error(
        "Name collision: {blockname} blocks on line {line_1} and {line_2} in MODULE {module} both use the name \"{item_name}\""
    )]
    NameCollisionError {
        item_name: String,
        blockname: String,
        module: String,
        line_1: u32,
        line_2: u32,
    },

    /// `CrossReferenceError`: A reference to a non-existent item was found
    #[error(
        "Cross-reference error: {source_type} {source_name} on line {source_line} references a non-existent {target_type} {target_name}"
    )]
    CrossReferenceError {
        source_type: String,
        source_name: String,
        source_line: u32,
        target_type: String,
        target_name: String,
    },
}

/// How conflicts are handled by merge and update operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictMode {
    /// keep the existing content; conflicts are skipped, and during a merge they are marked with a comment
    #[default]
    Preserve,
    /// any conflict aborts the operation with an error
    Strict,
}

/// Which fields are modified by an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateScope {
    /// update addresses and data types
    #[default]
    All,
    /// only update addresses
    Addresses,
}

/// Error returned when a mode or scope name is not recognized
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown option \"{0}\"")]
pub struct UnknownOptionError(String);

impl FromStr for ConflictMode {
    type Err = UnknownOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("PRESERVE") {
            Ok(Self::Preserve)
        } else if s.eq_ignore_ascii_case("STRICT") {
            Ok(Self::Strict)
        } else {
            Err(UnknownOptionError(s.to_string()))
        }
    }
}

impl Display for ConflictMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preserve => f.write_str("PRESERVE"),
            Self::Strict => f.write_str("STRICT"),
        }
    }
}

impl FromStr for UpdateScope {
    type Err = UnknownOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("ALL") {
            Ok(Self::All)
        } else if s.eq_ignore_ascii_case("ADDRESSES") {
            Ok(Self::Addresses)
        } else {
            Err(UnknownOptionError(s.to_string()))
        }
    }
}

impl Display for UpdateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::Addresses => f.write_str("ADDRESSES"),
        }
    }
}

/**
Create a new, empty a2l document

```rust
let doc = a2ledit::new();
assert_eq!(doc.to_text(), "");
```
 */
#[must_use]
pub fn new() -> A2lDocument {
    A2lDocument::new()
}

/**
Load an a2l file

The encoding of the file is detected automatically (UTF-8, UTF-16 and UTF-32 with or without BOM);
files that are not valid in any of these encodings are read as ISO-8859-1.

# Example
```
match a2ledit::load("example.a2l") {
    Ok(doc) => {/* do something with it*/},
    Err(error_message) => println!("{error_message}")
}
```

# Errors

An `A2lError` provides details information if loading the file fails.
 */
pub fn load<P: AsRef<Path>>(path: P) -> Result<A2lDocument, A2lError> {
    A2lDocument::read(path)
}

/**
Create an a2l document from a string

```rust
let text = r#"
ASAP2_VERSION 1 71
/begin PROJECT new_project ""
  /begin MODULE new_module ""
  /end MODULE
/end PROJECT
"#;
let doc = a2ledit::load_from_string(text);
assert_eq!(doc.find_modules()[0].name, "new_module");
```
 */
#[must_use]
pub fn load_from_string(a2ldata: &str) -> A2lDocument {
    A2lDocument::from_text(a2ldata)
}

/// Check if a block kind takes part in merging and updating
pub(crate) fn is_merge_object_kind(kind: &str) -> bool {
    MERGE_OBJECT_KINDS.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_empty_string() {
        let doc = load_from_string("");
        assert_eq!(doc.to_text(), "");
        assert!(doc.scan_blocks(None).is_empty());
        assert_eq!(new(), doc);
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();

        // create a file in a temp directory and load it
        let path = dir.path().join("test.a2l");

        let text = r#"
            ASAP2_VERSION 1 71
            /begin PROJECT new_project ""
                /begin MODULE new_module ""
                /end MODULE
            /end PROJECT
        "#;
        std::fs::write(&path, text).unwrap();

        let doc = load(&path).unwrap();
        assert_eq!(doc.to_text(), text);
        assert_eq!(doc.find_modules()[0].name, "new_module");

        // try to load a file that does not exist
        let nonexistent_path = dir.path().join("nonexistent.a2l");
        let result = load(nonexistent_path);
        assert!(matches!(result, Err(A2lError::FileOpenError { .. })));
    }

    #[test]
    fn parse_options() {
        assert_eq!("preserve".parse::<ConflictMode>(), Ok(ConflictMode::Preserve));
        assert_eq!("STRICT".parse::<ConflictMode>(), Ok(ConflictMode::Strict));
        assert!("lenient".parse::<ConflictMode>().is_err());
        assert_eq!("All".parse::<UpdateScope>(), Ok(UpdateScope::All));
        assert_eq!("ADDRESSES".parse::<UpdateScope>(), Ok(UpdateScope::Addresses));
        assert!("types".parse::<UpdateScope>().is_err());

        assert_eq!(ConflictMode::default().to_string(), "PRESERVE");
        assert_eq!(UpdateScope::default().to_string(), "ALL");
    }

    #[test]
    fn error_messages() {
        let err = A2lError::MergeConflict {
            module: "M".to_string(),
            blockname: "MEASUREMENT".to_string(),
            item_name: "speed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Merge conflict in MODULE M for MEASUREMENT speed"
        );

        let err = A2lError::SymbolNotFound {
            blockname: "CHARACTERISTIC".to_string(),
            item_name: "curve".to_string(),
        };
        assert_eq!(err.to_string(), "Symbol for CHARACTERISTIC curve not found");
    }

    #[test]
    fn merge_object_kinds() {
        assert!(is_merge_object_kind("MEASUREMENT"));
        assert!(is_merge_object_kind("COMPU_VTAB_RANGE"));
        assert!(!is_merge_object_kind("MODULE"));
        assert!(!is_merge_object_kind("measurement"));
    }
}
