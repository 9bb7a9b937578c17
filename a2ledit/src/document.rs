use crate::scanner::{self, BlockSpan};
use crate::{A2lError, include, loader, version, xcp};
#[cfg(feature = "update")]
use crate::{ConflictMode, UpdateScope};
use fnv::FnvHashMap;
use std::path::Path;

/// Identity of an object inside a `MODULE`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub kind: String,
    pub name: String,
}

/// Direct children of a module, keyed by kind and name.
///
/// The value is the ordinal of the child among all direct children of the module and its span.
pub type ModuleIndex = FnvHashMap<MergeKey, (usize, BlockSpan)>;

/// An a2l file, held as text
///
/// The document does not cache any structure: every query scans the text again, so offsets can never
/// refer to an outdated version of the text. All editing operations return a new document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct A2lDocument {
    text: String,
}

impl A2lDocument {
    /// create a new, empty document
    #[must_use]
    pub fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    /// create a document from text
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// read a document from a file
    ///
    /// # Errors
    ///
    /// `FileOpenError` or `FileReadError` if the file can't be read
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, A2lError> {
        let text = loader::load(path.as_ref())?;
        Ok(Self { text })
    }

    /// get the full text of the document
    #[must_use]
    pub fn to_text(&self) -> &str {
        &self.text
    }

    /// consume the document and return its text
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    /// write the document to a file
    ///
    /// If a banner is given, it is written as a comment before the text of the document.
    ///
    /// # Errors
    ///
    /// `FileWriteError` if the file can't be written
    pub fn write<P: AsRef<Path>>(&self, path: P, banner: Option<&str>) -> Result<(), A2lError> {
        let path = path.as_ref();
        let output = match banner {
            Some(banner) => {
                let separator = if self.text.starts_with('\n') { "" } else { "\n" };
                format!("/* {banner} */{separator}{}", self.text)
            }
            None => self.text.clone(),
        };
        std::fs::write(path, output).map_err(|ioerror| A2lError::FileWriteError {
            filename: path.to_path_buf(),
            ioerror,
        })
    }

    /// find all blocks in the document, or only those inside of the given byte range
    #[must_use]
    pub fn scan_blocks(&self, region: Option<(usize, usize)>) -> Vec<BlockSpan> {
        scanner::scan_blocks(&self.text, region)
    }

    /// find all `MODULE` blocks
    #[must_use]
    pub fn find_modules(&self) -> Vec<BlockSpan> {
        self.scan_blocks(None)
            .into_iter()
            .filter(|block| block.kind == "MODULE")
            .collect()
    }

    /// get the direct children of a block, in document order
    #[must_use]
    pub fn module_children(&self, module: &BlockSpan) -> Vec<BlockSpan> {
        scanner::top_level(self.scan_blocks(Some((module.header_end, module.end))))
    }

    /// build an index of the direct children of a module whose kind is in `kinds`
    ///
    /// If several children have the same kind and name, the last one is stored in the index.
    #[must_use]
    pub fn index_module_objects(&self, module: &BlockSpan, kinds: &[&str]) -> ModuleIndex {
        let mut index = ModuleIndex::default();
        for (ordinal, child) in self.module_children(module).into_iter().enumerate() {
            if kinds.contains(&child.kind.as_str()) {
                let key = MergeKey {
                    kind: child.kind.clone(),
                    name: child.name.clone(),
                };
                index.insert(key, (ordinal, child));
            }
        }
        index
    }

    /// replace all include directives with the content of the included files
    ///
    /// Relative file names are resolved against `base_dir`. Includes that can't be read are left unchanged.
    #[must_use]
    pub fn inline_includes<P: AsRef<Path>>(&self, base_dir: P) -> Self {
        Self {
            text: include::inline_includes(&self.text, base_dir.as_ref()),
        }
    }

    /// merge the objects of other documents into this one
    ///
    /// # Errors
    ///
    /// `MergeConflict` in `ConflictMode::Strict` if two objects with the same kind and name differ
    #[cfg(feature = "merge")]
    pub fn merge_with(
        &self,
        others: &[A2lDocument],
        mode: crate::ConflictMode,
    ) -> Result<Self, A2lError> {
        let text = crate::merge::merge_documents(self, others, mode)?;
        Ok(Self { text })
    }

    /// update addresses and data types of all objects from the symbol table
    ///
    /// # Errors
    ///
    /// `SymbolNotFound` in `ConflictMode::Strict` if an object has no matching symbol
    #[cfg(feature = "update")]
    pub fn update_addresses_and_types(
        &self,
        symbols: &crate::SymbolTable,
        scope: UpdateScope,
        mode: ConflictMode,
    ) -> Result<Self, A2lError> {
        let text = crate::update::update_document(self, symbols, scope, mode)?;
        Ok(Self { text })
    }

    /// load the symbols of an ELF or PE file and update the document with them
    ///
    /// # Errors
    ///
    /// `SymbolNotFound` in `ConflictMode::Strict` if an object has no matching symbol.
    /// A binary that can't be read provides no symbols.
    #[cfg(feature = "update")]
    pub fn update_from_binary<P: AsRef<Path>>(
        &self,
        path: P,
        scope: UpdateScope,
        mode: ConflictMode,
    ) -> Result<Self, A2lError> {
        let symbols = crate::load_symbols(path);
        self.update_addresses_and_types(&symbols, scope, mode)
    }

    /// create a minimal document with a `MEASUREMENT` for each selected symbol
    ///
    /// # Errors
    ///
    /// `InvalidPattern` if the filter contains an invalid regular expression
    #[cfg(feature = "update")]
    pub fn create_from_symbols(
        symbols: &crate::SymbolTable,
        filter: &crate::CreateFilter,
    ) -> Result<Self, A2lError> {
        let text = crate::create::create_from_symbols(symbols, filter)?;
        Ok(Self { text })
    }

    /// add a comment recording the target version at the start of the document, unless there already is one
    #[must_use]
    pub fn annotate_version(&self, target: &str) -> Self {
        Self {
            text: version::annotate_version(&self.text, target),
        }
    }

    /// convert the document to a different version of the a2l standard
    ///
    /// The `ASAP2_VERSION` header is rewritten, and lines with keywords that are not available in the
    /// target version are removed.
    #[must_use]
    pub fn change_version(&self, target: &str) -> Self {
        Self {
            text: version::change_version(&self.text, target),
        }
    }

    /// check the document for structural problems
    ///
    /// In strict mode, the references between objects are checked too.
    #[cfg(feature = "check")]
    #[must_use]
    pub fn check(&self, strict: bool) -> Vec<A2lError> {
        crate::checker::check(self, strict)
    }

    /// check the document and describe the result in a human readable way
    #[cfg(feature = "check")]
    #[must_use]
    pub fn check_report(&self, strict: bool) -> String {
        crate::checker::report(&self.check(strict))
    }

    /// summarize the settings of all XCP `IF_DATA` blocks
    #[must_use]
    pub fn extract_xcp_info(&self) -> Option<xcp::XcpInfo> {
        xcp::extract_xcp_info(self)
    }
}

impl From<String> for A2lDocument {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl std::fmt::Display for A2lDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
