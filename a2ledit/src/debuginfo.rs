use fnv::FnvHashMap;
use object::{Object, ObjectSymbol, SymbolKind};
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;

mod elf;
mod pe;

/// Symbols read from a binary, keyed by name
pub type SymbolTable = FnvHashMap<String, Symbol>;

/// The data types that can be used in the `DATA_TYPE` field of an a2l object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum A2lDataType {
    Ubyte,
    Uword,
    Ulong,
    AUint64,
    Sbyte,
    Sword,
    Slong,
    AInt64,
    Float32Ieee,
    Float64Ieee,
}

/// The kind of file a symbol was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolOrigin {
    Elf,
    Pe,
}

/// A symbol read from a binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u64,
    pub size: Option<u64>,
    pub datatype: Option<A2lDataType>,
    pub origin: SymbolOrigin,
}

#[derive(Debug, Error)]
pub(crate) enum DebugInfoError {
    #[error("could not read the file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse the file: {0}")]
    Object(#[from] object::read::Error),

    #[error("invalid DWARF debug info: {0}")]
    Dwarf(#[from] gimli::Error),
}

impl A2lDataType {
    /// Map a DWARF base type encoding (`DW_ATE_*`) and a size in bytes to an a2l data type
    #[must_use]
    pub fn from_encoding(encoding: u8, byte_size: u64) -> Option<Self> {
        match (encoding, byte_size) {
            // DW_ATE_unsigned
            (0x07, 1) => Some(Self::Ubyte),
            (0x07, 2) => Some(Self::Uword),
            (0x07, 4) => Some(Self::Ulong),
            (0x07, 8) => Some(Self::AUint64),
            // DW_ATE_signed
            (0x05, 1) => Some(Self::Sbyte),
            (0x05, 2) => Some(Self::Sword),
            (0x05, 4) => Some(Self::Slong),
            (0x05, 8) => Some(Self::AInt64),
            // DW_ATE_float
            (0x04, 4) => Some(Self::Float32Ieee),
            (0x04, 8) => Some(Self::Float64Ieee),
            _ => None,
        }
    }

    /// get the keyword for this data type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ubyte => "UBYTE",
            Self::Uword => "UWORD",
            Self::Ulong => "ULONG",
            Self::AUint64 => "A_UINT64",
            Self::Sbyte => "SBYTE",
            Self::Sword => "SWORD",
            Self::Slong => "SLONG",
            Self::AInt64 => "A_INT64",
            Self::Float32Ieee => "FLOAT32_IEEE",
            Self::Float64Ieee => "FLOAT64_IEEE",
        }
    }
}

impl Display for A2lDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/**
Load the symbols of an ELF or PE file

The file type is selected based on the extension: `.exe`, `.dll` and `.sys` files are read as PE images,
everything else is read as ELF. For ELF files, the DWARF debug info is used to refine the addresses and to
find the data types of variables.

Symbol loading is best-effort: if the file can't be read, an empty table is returned.
`.pdb` files are not supported and always produce an empty table.
 */
pub fn load_symbols<P: AsRef<Path>>(path: P) -> SymbolTable {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let result = match extension.as_str() {
        "pdb" => {
            tracing::debug!(path = %path.display(), "PDB files are not supported, no symbols loaded");
            return SymbolTable::default();
        }
        "exe" | "dll" | "sys" => std::fs::read(path)
            .map_err(DebugInfoError::from)
            .and_then(|data| pe::load_pe(&data)),
        _ => std::fs::read(path)
            .map_err(DebugInfoError::from)
            .and_then(|data| elf::load_elf(&data)),
    };

    match result {
        Ok(symbols) => {
            tracing::debug!(path = %path.display(), count = symbols.len(), "loaded symbols");
            symbols
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "could not load symbols");
            SymbolTable::default()
        }
    }
}

// collect_symbols()
// Read the symbol table and the dynamic symbol table of a file.
// If a name occurs more than once, the first occurrence is used.
fn collect_symbols(file: &object::File, origin: SymbolOrigin) -> SymbolTable {
    let mut symbols = SymbolTable::default();
    for symbol in file.symbols().chain(file.dynamic_symbols()) {
        if matches!(symbol.kind(), SymbolKind::File | SymbolKind::Section) {
            continue;
        }
        let Ok(name) = symbol.name() else {
            continue;
        };
        if name.is_empty() || symbols.contains_key(name) {
            continue;
        }
        let size = symbol.size();
        symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                address: symbol.address(),
                size: (size != 0).then_some(size),
                datatype: None,
                origin,
            },
        );
    }
    symbols
}

/*************************************************************************************************/

#[cfg(test)]
mod tests {
    use super::*;
    use object::write::{Object as WriteObject, StandardSection, Symbol as WriteSymbol, SymbolSection};
    use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolScope};
    use tempfile::tempdir;

    fn make_elf(symbols: &[(&str, u64, u64)]) -> Vec<u8> {
        let mut obj = WriteObject::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let section = obj.section_id(StandardSection::Data);
        obj.append_section_data(section, &[0u8; 64], 8);
        for (name, value, size) in symbols {
            obj.add_symbol(WriteSymbol {
                name: name.as_bytes().to_vec(),
                value: *value,
                size: *size,
                kind: SymbolKind::Data,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(section),
                flags: SymbolFlags::None,
            });
        }
        obj.write().unwrap()
    }

    #[test]
    fn datatype_from_encoding() {
        assert_eq!(A2lDataType::from_encoding(0x07, 1), Some(A2lDataType::Ubyte));
        assert_eq!(A2lDataType::from_encoding(0x07, 8), Some(A2lDataType::AUint64));
        assert_eq!(A2lDataType::from_encoding(0x05, 4), Some(A2lDataType::Slong));
        assert_eq!(A2lDataType::from_encoding(0x04, 8), Some(A2lDataType::Float64Ieee));
        assert_eq!(A2lDataType::from_encoding(0x04, 2), None);
        assert_eq!(A2lDataType::from_encoding(0x07, 3), None);
        // DW_ATE_boolean is not mapped
        assert_eq!(A2lDataType::from_encoding(0x02, 1), None);

        assert_eq!(A2lDataType::AUint64.to_string(), "A_UINT64");
        assert_eq!(A2lDataType::Float32Ieee.to_string(), "FLOAT32_IEEE");
    }

    #[test]
    fn load_elf_symbols() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.elf");
        std::fs::write(&path, make_elf(&[("speed", 0x10, 4), ("flag", 0x20, 0)])).unwrap();

        let symbols = load_symbols(&path);
        let speed = &symbols["speed"];
        assert_eq!(speed.address, 0x10);
        assert_eq!(speed.size, Some(4));
        assert_eq!(speed.datatype, None);
        assert_eq!(speed.origin, SymbolOrigin::Elf);
        // a size of zero means that the size is unknown
        assert_eq!(symbols["flag"].size, None);
    }

    #[test]
    fn unreadable_files() {
        let dir = tempdir().unwrap();

        // missing file
        assert!(load_symbols(dir.path().join("missing.elf")).is_empty());

        // not an object file
        let path = dir.path().join("garbage.elf");
        std::fs::write(&path, b"this is not an ELF file").unwrap();
        assert!(load_symbols(&path).is_empty());

        let path = dir.path().join("garbage.dll");
        std::fs::write(&path, b"this is not a PE file").unwrap();
        assert!(load_symbols(&path).is_empty());

        // pdb files are not read at all
        let path = dir.path().join("program.PDB");
        std::fs::write(&path, make_elf(&[("speed", 0x10, 4)])).unwrap();
        assert!(load_symbols(&path).is_empty());
    }
}
