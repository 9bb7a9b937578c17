use super::{A2lDataType, DebugInfoError, Symbol, SymbolOrigin, SymbolTable};
use fnv::FnvHashSet;
use gimli::{
    AttributeValue, DebuggingInformationEntry, Dwarf, EndianArcSlice, Reader, RunTimeEndian,
    SectionId, Unit, UnitOffset, constants,
};
use object::{Object, ObjectSection};
use std::borrow::Cow;
use std::sync::Arc;

type DwarfReader = EndianArcSlice<RunTimeEndian>;

/// Type entries that only rename or qualify the type they refer to
const TRANSPARENT_TYPE_TAGS: [constants::DwTag; 5] = [
    constants::DW_TAG_typedef,
    constants::DW_TAG_const_type,
    constants::DW_TAG_volatile_type,
    constants::DW_TAG_restrict_type,
    constants::DW_TAG_atomic_type,
];

pub(crate) fn load_elf(data: &[u8]) -> Result<SymbolTable, DebugInfoError> {
    let file = object::File::parse(data)?;
    let mut symbols = super::collect_symbols(&file, SymbolOrigin::Elf);

    if file.section_by_name(".debug_info").is_some() {
        // the symbol table is still useful if the debug info is broken
        if let Err(error) = read_dwarf_variables(&file, &mut symbols) {
            tracing::warn!(%error, "could not read the DWARF debug info");
        }
    }

    Ok(symbols)
}

fn section_reader(file: &object::File, id: SectionId, endian: RunTimeEndian) -> DwarfReader {
    let data: Arc<[u8]> = match file
        .section_by_name(id.name())
        .and_then(|section| section.uncompressed_data().ok())
    {
        Some(Cow::Borrowed(bytes)) => Arc::from(bytes),
        Some(Cow::Owned(vec)) => vec.into(),
        None => Arc::from(Vec::new()),
    };
    EndianArcSlice::new(data, endian)
}

// read_dwarf_variables()
// Walk the DIE tree of every compilation unit and merge the information about global variables into the symbol table
fn read_dwarf_variables(
    file: &object::File,
    symbols: &mut SymbolTable,
) -> Result<(), DebugInfoError> {
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };
    let dwarf = Dwarf::load(|id| Ok::<_, gimli::Error>(section_reader(file, id, endian)))?;

    let mut headers = dwarf.units();
    while let Some(header) = headers.next()? {
        let unit = match dwarf.unit(header) {
            Ok(unit) => unit,
            Err(error) => {
                tracing::warn!(%error, "skipping DWARF unit that could not be parsed");
                continue;
            }
        };
        if let Err(error) = read_unit_variables(&dwarf, &unit, symbols) {
            tracing::warn!(%error, "skipping the rest of a DWARF unit");
        }
    }

    Ok(())
}

fn read_unit_variables(
    dwarf: &Dwarf<DwarfReader>,
    unit: &Unit<DwarfReader>,
    symbols: &mut SymbolTable,
) -> Result<(), gimli::Error> {
    let address_size = unit.encoding().address_size;
    let mut cursor = unit.entries();

    while let Some((_, entry)) = cursor.next_dfs()? {
        if entry.tag() != constants::DW_TAG_variable {
            continue;
        }
        let Some(name) = variable_name(dwarf, unit, entry) else {
            continue;
        };
        let address = entry
            .attr(constants::DW_AT_location)
            .ok()
            .flatten()
            .and_then(|attr| location_address(attr.value(), address_size));
        let datatype = entry
            .attr(constants::DW_AT_type)
            .ok()
            .flatten()
            .and_then(|attr| resolve_datatype(unit, attr.value()));

        merge_variable(symbols, name, address, datatype);
    }

    Ok(())
}

fn variable_name(
    dwarf: &Dwarf<DwarfReader>,
    unit: &Unit<DwarfReader>,
    entry: &DebuggingInformationEntry<'_, '_, DwarfReader>,
) -> Option<String> {
    let attr = entry.attr(constants::DW_AT_name).ok()??;
    let name = dwarf.attr_string(unit, attr.value()).ok()?;
    let name = name.to_string_lossy().ok()?.into_owned();
    (!name.is_empty()).then_some(name)
}

// location_address()
// only a location expression that consists of a single DW_OP_addr provides a static address
fn location_address(value: AttributeValue<DwarfReader>, address_size: u8) -> Option<u64> {
    let bytes = match value {
        AttributeValue::Exprloc(expression) => expression.0.to_slice().ok()?.into_owned(),
        AttributeValue::Block(block) => block.to_slice().ok()?.into_owned(),
        _ => return None,
    };
    address_from_expression(&bytes, address_size)
}

fn address_from_expression(bytes: &[u8], address_size: u8) -> Option<u64> {
    let size = usize::from(address_size);
    if size == 0 || size > 8 || bytes.len() != size + 1 || bytes[0] != constants::DW_OP_addr.0 {
        return None;
    }
    Some(
        bytes[1..]
            .iter()
            .rev()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte)),
    )
}

// resolve_datatype()
// Follow the chain of typedefs and type qualifiers until a base type is reached.
// Pointers, arrays, structs and all other derived types have no a2l data type.
// Every offset is visited at most once, so that cyclic type graphs can't cause an endless loop.
fn resolve_datatype(
    unit: &Unit<DwarfReader>,
    value: AttributeValue<DwarfReader>,
) -> Option<A2lDataType> {
    let mut visited: FnvHashSet<UnitOffset> = FnvHashSet::default();
    let mut next = value;

    loop {
        // references into other units are not followed
        let AttributeValue::UnitRef(offset) = next else {
            return None;
        };
        if !visited.insert(offset) {
            return None;
        }

        let entry = unit.entry(offset).ok()?;
        if entry.tag() == constants::DW_TAG_base_type {
            let AttributeValue::Encoding(encoding) =
                entry.attr(constants::DW_AT_encoding).ok()??.value()
            else {
                return None;
            };
            let byte_size = entry
                .attr(constants::DW_AT_byte_size)
                .ok()??
                .udata_value()?;
            return A2lDataType::from_encoding(encoding.0, byte_size);
        }
        if !TRANSPARENT_TYPE_TAGS.contains(&entry.tag()) {
            return None;
        }

        next = entry.attr(constants::DW_AT_type).ok()??.value();
    }
}

// merge_variable()
// A non-zero DWARF address replaces the address from the symbol table.
// Variables that are not in the symbol table are only added if their address is known.
fn merge_variable(
    symbols: &mut SymbolTable,
    name: String,
    address: Option<u64>,
    datatype: Option<A2lDataType>,
) {
    if let Some(symbol) = symbols.get_mut(&name) {
        if let Some(address) = address.filter(|&address| address != 0) {
            symbol.address = address;
        }
        if datatype.is_some() {
            symbol.datatype = datatype;
        }
    } else if let Some(address) = address {
        symbols.insert(
            name.clone(),
            Symbol {
                name,
                address,
                size: None,
                datatype,
                origin: SymbolOrigin::Elf,
            },
        );
    }
}

/*************************************************************************************************/
