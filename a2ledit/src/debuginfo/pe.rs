use super::{DebugInfoError, Symbol, SymbolOrigin, SymbolTable};
use object::Object;

// load_pe()
// PE images rarely carry a COFF symbol table, so the exported names are added as well.
// Exports don't provide a size or a data type.
pub(crate) fn load_pe(data: &[u8]) -> Result<SymbolTable, DebugInfoError> {
    let file = object::File::parse(data)?;
    let mut symbols = super::collect_symbols(&file, SymbolOrigin::Pe);

    for export in file.exports()? {
        let name = String::from_utf8_lossy(export.name()).into_owned();
        if name.is_empty() {
            continue;
        }
        symbols.entry(name.clone()).or_insert_with(|| Symbol {
            name,
            address: export.address(),
            size: None,
            datatype: None,
            origin: SymbolOrigin::Pe,
        });
    }

    Ok(symbols)
}
