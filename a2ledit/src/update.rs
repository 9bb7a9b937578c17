use crate::debuginfo::{Symbol, SymbolTable};
use crate::{A2lDocument, A2lError, ConflictMode, UpdateScope};
use regex::{Captures, Regex};

struct FieldPatterns {
    ecu_address: Regex,
    address: Regex,
    data_type: Regex,
}

impl FieldPatterns {
    fn new() -> Result<Self, A2lError> {
        Ok(Self {
            ecu_address: compile(r"(?mi)^([ \t]*ECU_ADDRESS[ \t]+)(?:0x[0-9A-Fa-f]+|\d+)([ \t]*\r?)$")?,
            address: compile(r"(?mi)^([ \t]*ADDRESS[ \t]+)(?:0x[0-9A-Fa-f]+|\d+)([ \t]*\r?)$")?,
            data_type: compile(r"(?mi)^([ \t]*DATA_TYPE[ \t]+)[A-Za-z0-9_]+([ \t]*\r?)$")?,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, A2lError> {
    Regex::new(pattern).map_err(|error| A2lError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: error.to_string(),
    })
}

// update_document()
// Update the address (and optionally the data type) of every object in every module.
// All edits are collected first and then applied from the end of the text towards the start,
// so that the offsets of the edits that are still pending remain valid.
pub(crate) fn update_document(
    doc: &A2lDocument,
    symbols: &SymbolTable,
    scope: UpdateScope,
    mode: ConflictMode,
) -> Result<String, A2lError> {
    let patterns = FieldPatterns::new()?;
    let text = doc.to_text();
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    for module in doc.find_modules() {
        for child in doc.module_children(&module) {
            if !crate::is_merge_object_kind(&child.kind) {
                continue;
            }
            let Some(symbol) = symbols.get(&child.name) else {
                if mode == ConflictMode::Strict {
                    return Err(A2lError::SymbolNotFound {
                        blockname: child.kind,
                        item_name: child.name,
                    });
                }
                tracing::debug!(kind = %child.kind, name = %child.name, "no symbol found, object not updated");
                continue;
            };

            let block = child.slice(text);
            let end_marker = child.end_marker_start(text) - child.start;
            let updated = update_block(block, end_marker, symbol, scope, &patterns);
            if updated != block {
                edits.push((child.start, child.end, updated));
            }
        }
    }

    let mut output = text.to_string();
    for (start, end, replacement) in edits.iter().rev() {
        output.replace_range(*start..*end, replacement);
    }
    Ok(output)
}

fn update_block(
    block: &str,
    end_marker: usize,
    symbol: &Symbol,
    scope: UpdateScope,
    patterns: &FieldPatterns,
) -> String {
    let address = format!("0x{:X}", symbol.address);

    // ECU_ADDRESS is preferred; ADDRESS is only used if there is no ECU_ADDRESS
    let address_field = [&patterns.ecu_address, &patterns.address]
        .into_iter()
        .find(|pattern| pattern.is_match(block));
    let mut updated = if let Some(pattern) = address_field {
        pattern
            .replace_all(block, |caps: &Captures| {
                format!("{}{address}{}", &caps[1], &caps[2])
            })
            .into_owned()
    } else {
        insert_address(block, end_marker, &address)
    };

    if scope == UpdateScope::All {
        if let Some(datatype) = symbol.datatype {
            // an existing DATA_TYPE is updated, but the field is never added
            updated = patterns
                .data_type
                .replace_all(&updated, |caps: &Captures| {
                    format!("{}{datatype}{}", &caps[1], &caps[2])
                })
                .into_owned();
        }
    }

    updated
}

// insert_address()
// Add an ECU_ADDRESS line in front of the /end marker that closes the block (at offset end_marker).
// If the marker is the first token on its line, the new line goes in front of that line.
fn insert_address(block: &str, end_marker: usize, address: &str) -> String {
    let indent = detect_indent(block);
    let newline = if block.contains("\r\n") { "\r\n" } else { "\n" };
    let line = format!("{indent}ECU_ADDRESS {address}{newline}");

    let end_marker = end_marker.min(block.len());
    let line_start = block[..end_marker].rfind('\n').map_or(0, |pos| pos + 1);
    if line_start > 0 && block[line_start..end_marker].trim().is_empty() {
        format!("{}{line}{}", &block[..line_start], &block[line_start..])
    } else if end_marker > 0 {
        // the /end marker shares its line with other content
        format!("{}{newline}{line}{}", &block[..end_marker], &block[end_marker..])
    } else {
        let separator = if block.ends_with('\n') { "" } else { newline };
        format!("{block}{separator}{line}")
    }
}

// detect_indent()
// the indentation of the first indented line in the block
fn detect_indent(block: &str) -> &str {
    block
        .lines()
        .find_map(|line| {
            let content = line.trim_start_matches([' ', '\t']);
            (content.len() < line.len() && !content.trim().is_empty())
                .then(|| &line[..line.len() - content.len()])
        })
        .unwrap_or("  ")
}

/*************************************************************************************************/

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{A2lDataType, SymbolOrigin};

    static DOC: &str = r#"/begin PROJECT P ""
  /begin MODULE M ""
    /begin MEASUREMENT speed "" SLONG 1 0 0 0
      ECU_ADDRESS 0x0
    /end MEASUREMENT
    /begin MEASUREMENT temp "" SLONG 1 0 0 0
    /end MEASUREMENT
    /begin CHARACTERISTIC curve ""
      CURVE 0 RL NO_COMPU_METHOD 0 0 100
      ADDRESS 17
      DATA_TYPE UWORD
    /end CHARACTERISTIC
    /begin GROUP speed ""
    /end GROUP
  /end MODULE
/end PROJECT
"#;

    fn symbol(name: &str, address: u64, datatype: Option<A2lDataType>) -> (String, Symbol) {
        (
            name.to_string(),
            Symbol {
                name: name.to_string(),
                address,
                size: None,
                datatype,
                origin: SymbolOrigin::Elf,
            },
        )
    }

    fn symbols() -> SymbolTable {
        [
            symbol("speed", 0x1234, Some(A2lDataType::Ulong)),
            symbol("temp", 0x2000, Some(A2lDataType::Float32Ieee)),
            symbol("curve", 0xABCD, Some(A2lDataType::Sword)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn update_all() {
        let doc = A2lDocument::from_text(DOC);
        let result =
            update_document(&doc, &symbols(), UpdateScope::All, ConflictMode::Strict).unwrap();
        let expected = DOC
            .replace("ECU_ADDRESS 0x0", "ECU_ADDRESS 0x1234")
            .replace(
                "SLONG 1 0 0 0\n    /end MEASUREMENT",
                "SLONG 1 0 0 0\n    ECU_ADDRESS 0x2000\n    /end MEASUREMENT",
            )
            .replace("ADDRESS 17", "ADDRESS 0xABCD")
            .replace("DATA_TYPE UWORD", "DATA_TYPE SWORD");
        assert_eq!(result, expected);
    }

    #[test]
    fn update_addresses_only() {
        let doc = A2lDocument::from_text(DOC);
        let result =
            update_document(&doc, &symbols(), UpdateScope::Addresses, ConflictMode::Strict)
                .unwrap();
        assert!(result.contains("ECU_ADDRESS 0x1234"));
        assert!(result.contains("ADDRESS 0xABCD"));
        assert!(result.contains("DATA_TYPE UWORD"));
    }

    #[test]
    fn missing_symbols() {
        let doc = A2lDocument::from_text(DOC);
        let symbols: SymbolTable = [symbol("speed", 0x1234, None)].into_iter().collect();

        let result =
            update_document(&doc, &symbols, UpdateScope::All, ConflictMode::Preserve).unwrap();
        assert!(result.contains("ECU_ADDRESS 0x1234"));
        assert!(result.contains("ADDRESS 17"));

        let result = update_document(&doc, &symbols, UpdateScope::All, ConflictMode::Strict);
        let Err(A2lError::SymbolNotFound {
            blockname,
            item_name,
        }) = result
        else {
            panic!("expected SymbolNotFound");
        };
        assert_eq!(blockname, "MEASUREMENT");
        assert_eq!(item_name, "temp");
    }

    fn insert(block: &str, address: &str) -> String {
        insert_address(block, block.rfind('/').unwrap(), address)
    }

    #[test]
    fn address_insertion() {
        // /end on a separate line
        assert_eq!(
            insert("/begin MEASUREMENT m \"\"\n\t\tUBYTE\n\t/end MEASUREMENT", "0x10"),
            "/begin MEASUREMENT m \"\"\n\t\tUBYTE\n\t\tECU_ADDRESS 0x10\n\t/end MEASUREMENT"
        );
        // /end shares a line with the header
        assert_eq!(
            insert("/begin MEASUREMENT m \"\" /end MEASUREMENT", "0x10"),
            "/begin MEASUREMENT m \"\" \n  ECU_ADDRESS 0x10\n/end MEASUREMENT"
        );
        // nested blocks: the line of the last /end is used
        assert_eq!(
            insert(
                "/begin CHARACTERISTIC c \"\"\n  /begin IF_DATA x\n  /end IF_DATA\n/end CHARACTERISTIC",
                "0x10"
            ),
            "/begin CHARACTERISTIC c \"\"\n  /begin IF_DATA x\n  /end IF_DATA\n  ECU_ADDRESS 0x10\n/end CHARACTERISTIC"
        );
        // the nested block is closed on the same line as the outer block
        assert_eq!(
            insert(
                "/begin MEASUREMENT m \"\"\n  /begin IF_DATA x\n  /end IF_DATA /end MEASUREMENT",
                "0x10"
            ),
            "/begin MEASUREMENT m \"\"\n  /begin IF_DATA x\n  /end IF_DATA \n  ECU_ADDRESS 0x10\n/end MEASUREMENT"
        );
    }

    #[test]
    fn insert_after_nested_block() {
        let text = "/begin MODULE M \"\"\n  /begin MEASUREMENT speed \"\"\n    /begin IF_DATA XCP\n    /end IF_DATA /end MEASUREMENT\n/end MODULE\n";
        let doc = A2lDocument::from_text(text);
        let result =
            update_document(&doc, &symbols(), UpdateScope::All, ConflictMode::Preserve).unwrap();
        assert_eq!(
            result,
            "/begin MODULE M \"\"\n  /begin MEASUREMENT speed \"\"\n    /begin IF_DATA XCP\n    /end IF_DATA \n    ECU_ADDRESS 0x1234\n/end MEASUREMENT\n/end MODULE\n"
        );
        // the IF_DATA block is unchanged
        let updated = A2lDocument::from_text(result);
        let if_data = updated
            .scan_blocks(None)
            .into_iter()
            .find(|block| block.kind == "IF_DATA")
            .unwrap();
        assert!(!if_data.slice(updated.to_text()).contains("ECU_ADDRESS"));
    }

    #[test]
    fn crlf_line_endings() {
        let doc = A2lDocument::from_text(DOC.replace('\n', "\r\n"));
        let result =
            update_document(&doc, &symbols(), UpdateScope::All, ConflictMode::Strict).unwrap();
        assert!(result.contains("ECU_ADDRESS 0x1234\r\n"));
        assert!(result.contains("DATA_TYPE SWORD\r\n"));
        assert!(result.contains("    ECU_ADDRESS 0x2000\r\n    /end MEASUREMENT"));
    }
}
