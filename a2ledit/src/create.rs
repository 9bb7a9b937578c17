use crate::A2lError;
use crate::debuginfo::{A2lDataType, SymbolTable};
use regex::Regex;
use std::collections::BTreeSet;

/// Selects the symbols that are used to create a new a2l file
///
/// A symbol is selected if it matches any of the criteria. The default filter selects nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateFilter {
    /// select the symbol with exactly this name
    pub characteristic: Option<String>,
    /// select all symbols whose name matches this regular expression
    pub measurement_regex: Option<String>,
    /// select all symbols whose address is inside this range (inclusive)
    pub measurement_range: Option<(u64, u64)>,
}

pub(crate) fn create_from_symbols(
    symbols: &SymbolTable,
    filter: &CreateFilter,
) -> Result<String, A2lError> {
    let name_regex = filter
        .measurement_regex
        .as_deref()
        .map(|pattern| {
            Regex::new(pattern).map_err(|error| A2lError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: error.to_string(),
            })
        })
        .transpose()?;

    let selected: BTreeSet<&str> = symbols
        .values()
        .filter(|symbol| {
            filter.characteristic.as_deref() == Some(symbol.name.as_str())
                || name_regex
                    .as_ref()
                    .is_some_and(|regex| regex.is_match(&symbol.name))
                || filter
                    .measurement_range
                    .is_some_and(|(lower, upper)| (lower..=upper).contains(&symbol.address))
        })
        .map(|symbol| symbol.name.as_str())
        .collect();
    tracing::debug!(count = selected.len(), "selected symbols for a new a2l file");

    let mut text = String::new();
    text.push_str("/begin PROJECT AutoProject \"\"\n");
    text.push_str("  /begin MODULE AutoModule \"\"\n");
    for name in selected {
        let symbol = &symbols[name];
        let datatype = symbol.datatype.unwrap_or(A2lDataType::Slong);
        text.push_str(&format!(
            "    /begin MEASUREMENT {name} \"\" {datatype} 1.0 0 0 0\n      ECU_ADDRESS 0x{:X}\n    /end MEASUREMENT\n",
            symbol.address
        ));
    }
    text.push_str("  /end MODULE\n");
    text.push_str("/end PROJECT\n");

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{A2lDocument, Symbol, SymbolOrigin};

    fn symbols() -> SymbolTable {
        [
            ("speed", 0x1000, Some(A2lDataType::Ulong)),
            ("rpm", 0x1004, None),
            ("temp", 0x2000, Some(A2lDataType::Float32Ieee)),
            ("curve", 0x3000, None),
        ]
        .into_iter()
        .map(|(name, address, datatype)| {
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
        })
        .collect()
    }

    #[test]
    fn create_empty() {
        let text = create_from_symbols(&symbols(), &CreateFilter::default()).unwrap();
        assert_eq!(
            text,
            "/begin PROJECT AutoProject \"\"\n  /begin MODULE AutoModule \"\"\n  /end MODULE\n/end PROJECT\n"
        );
    }

    #[test]
    fn create_with_filters() {
        let filter = CreateFilter {
            characteristic: Some("curve".to_string()),
            measurement_regex: Some("^s".to_string()),
            measurement_range: Some((0x1004, 0x1004)),
        };
        let text = create_from_symbols(&symbols(), &filter).unwrap();
        let doc = A2lDocument::from_text(text);
        let module = &doc.find_modules()[0];
        assert_eq!(module.name, "AutoModule");

        // sorted by name
        let names: Vec<String> = doc
            .module_children(module)
            .into_iter()
            .map(|child| child.name)
            .collect();
        assert_eq!(names, vec!["curve", "rpm", "speed"]);

        assert!(doc.to_text().contains(
            "    /begin MEASUREMENT speed \"\" ULONG 1.0 0 0 0\n      ECU_ADDRESS 0x1000\n    /end MEASUREMENT\n"
        ));
        // SLONG is used if the data type is unknown
        assert!(doc.to_text().contains("/begin MEASUREMENT rpm \"\" SLONG 1.0 0 0 0"));
    }

    #[test]
    fn invalid_regex() {
        let filter = CreateFilter {
            measurement_regex: Some("(unclosed".to_string()),
            ..Default::default()
        };
        let result = create_from_symbols(&symbols(), &filter);
        assert!(matches!(result, Err(A2lError::InvalidPattern { .. })));
    }
}
