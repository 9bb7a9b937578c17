use crate::scanner::{BlockSpan, line_of};
use crate::{A2lDocument, A2lError};
use fnv::FnvHashMap;
use fnv::FnvHashSet;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Token<'a> {
    text: &'a str,
    line: u32,
    quoted: bool,
}

impl Token<'_> {
    fn is_begin(&self) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case("/begin")
    }

    fn is_end(&self) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case("/end")
    }
}

// check the block structure, the names, and optionally the cross references of the document
pub(crate) fn check(doc: &A2lDocument, strict: bool) -> Vec<A2lError> {
    let text = doc.to_text();
    let mut results = Vec::new();

    check_balance(text, &mut results);

    for module in doc.find_modules() {
        let children = doc.module_children(&module);
        check_duplicates(text, &module, &children, &mut results);
        if strict {
            check_references(text, &children, &mut results);
        }
    }

    results
}

/// Render the result of a check as text
pub(crate) fn report(results: &[A2lError]) -> String {
    if results.is_empty() {
        "Consistency check passed.".to_string()
    } else {
        let mut report = "Consistency check failed:".to_string();
        for error in results {
            report.push_str(&format!("\n  - {error}"));
        }
        report
    }
}

// check_balance()
// every /begin must be closed by an /end of the same kind
fn check_balance(text: &str, log_msgs: &mut Vec<A2lError>) {
    let tokens = tokenize(text);
    let mut stack: Vec<(String, u32)> = Vec::new();

    let mut idx = 0;
    while idx < tokens.len() {
        let token = &tokens[idx];
        idx += 1;
        if !token.is_begin() && !token.is_end() {
            continue;
        }
        let Some(kind_token) = tokens.get(idx).filter(|t| !t.quoted) else {
            continue;
        };
        idx += 1;
        let kind = kind_token.text.to_ascii_uppercase();

        if token.is_begin() {
            stack.push((kind, token.line));
        } else if let Some((expected, begin_line)) = stack.pop() {
            if expected != kind {
                log_msgs.push(A2lError::MismatchedEnd {
                    blockname: kind,
                    line: token.line,
                    expected,
                    begin_line,
                });
            }
        } else {
            log_msgs.push(A2lError::UnmatchedEnd {
                blockname: kind,
                line: token.line,
            });
        }
    }

    for (blockname, line) in stack {
        log_msgs.push(A2lError::UnmatchedBegin { blockname, line });
    }
}

// check_duplicates()
// objects of the same kind inside one module must have different names
fn check_duplicates(
    text: &str,
    module: &BlockSpan,
    children: &[BlockSpan],
    log_msgs: &mut Vec<A2lError>,
) {
    let mut seen: FnvHashMap<(&str, &str), u32> = FnvHashMap::default();
    for child in children {
        if child.name.is_empty() {
            continue;
        }
        let line = line_of(text, child.start);
        if let Some(first_line) = seen.get(&(child.kind.as_str(), child.name.as_str())) {
            log_msgs.push(A2lError::NameCollisionError {
                item_name: child.name.clone(),
                blockname: child.kind.clone(),
                module: module.name.clone(),
                line_1: *first_line,
                line_2: line,
            });
        } else {
            seen.insert((child.kind.as_str(), child.name.as_str()), line);
        }
    }
}

// check_references()
// verify that conversions, record layouts and conversion tables refer to objects in the same module
fn check_references(text: &str, children: &[BlockSpan], log_msgs: &mut Vec<A2lError>) {
    let defined: FnvHashSet<(&str, &str)> = children
        .iter()
        .map(|child| (child.kind.as_str(), child.name.as_str()))
        .collect();
    let is_defined =
        |kinds: &[&str], name: &str| kinds.iter().any(|kind| defined.contains(&(*kind, name)));

    for child in children {
        let tokens = block_tokens(child.slice(text));
        let mut references: Vec<(&[&str], &str)> = Vec::new();
        match child.kind.as_str() {
            "MEASUREMENT" => {
                // KIND NAME LONG_IDENTIFIER DATATYPE CONVERSION ...
                if let Some(conversion) = tokens.get(4) {
                    references.push((&["COMPU_METHOD"], conversion));
                }
            }
            "CHARACTERISTIC" | "AXIS_PTS" => {
                // CHARACTERISTIC: KIND NAME LONG_IDENTIFIER TYPE ADDRESS DEPOSIT MAXDIFF CONVERSION ...
                // AXIS_PTS: KIND NAME LONG_IDENTIFIER ADDRESS INPUT_QUANTITY DEPOSIT MAXDIFF CONVERSION ...
                if let Some(deposit) = tokens.get(5) {
                    references.push((&["RECORD_LAYOUT"], deposit));
                }
                if let Some(conversion) = tokens.get(7) {
                    references.push((&["COMPU_METHOD"], conversion));
                }
            }
            "COMPU_METHOD" => {
                if let Some(pos) = tokens.iter().position(|t| *t == "COMPU_TAB_REF") {
                    if let Some(tab) = tokens.get(pos + 1) {
                        references.push((&["COMPU_TAB", "COMPU_VTAB", "COMPU_VTAB_RANGE"], tab));
                    }
                }
            }
            _ => {}
        }

        for (target_kinds, target_name) in references {
            if target_name == "NO_COMPU_METHOD" || is_defined(target_kinds, target_name) {
                continue;
            }
            log_msgs.push(A2lError::CrossReferenceError {
                source_type: child.kind.clone(),
                source_name: child.name.clone(),
                source_line: line_of(text, child.start),
                target_type: target_kinds[0].to_string(),
                target_name: target_name.to_string(),
            });
        }
    }
}

// block_tokens()
// get the tokens of a block, without the tokens of any nested blocks
// The kind of the block is the first token.
fn block_tokens(block_text: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut depth = 0usize;
    let mut tokens = tokenize(block_text).into_iter();

    while let Some(token) = tokens.next() {
        if token.is_begin() {
            depth += 1;
        } else if token.is_end() {
            depth = depth.saturating_sub(1);
            // skip the kind of the closed block
            tokens.next();
        } else if depth == 1 {
            result.push(token.text);
        }
    }

    result
}

// tokenize()
// Split the text into whitespace separated tokens. Comments are skipped and strings are returned
// as a single token without the enclosing quotes.
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut line = 1u32;
    let mut bytepos = 0;

    while bytepos < bytes.len() {
        let c = bytes[bytepos];
        if c == b'\n' {
            line += 1;
            bytepos += 1;
        } else if c.is_ascii_whitespace() {
            bytepos += 1;
        } else if bytes[bytepos..].starts_with(b"/*") {
            let end = text[bytepos + 2..]
                .find("*/")
                .map_or(bytes.len(), |pos| bytepos + 2 + pos + 2);
            line += count_newlines(&bytes[bytepos..end]);
            bytepos = end;
        } else if bytes[bytepos..].starts_with(b"//") {
            bytepos = text[bytepos..]
                .find('\n')
                .map_or(bytes.len(), |pos| bytepos + pos);
        } else if c == b'"' {
            let startpos = bytepos + 1;
            let mut endpos = startpos;
            while endpos < bytes.len() && bytes[endpos] != b'"' {
                if bytes[endpos] == b'\\' {
                    endpos += 1;
                }
                endpos += 1;
            }
            let endpos = endpos.min(bytes.len());
            tokens.push(Token {
                text: &text[startpos..endpos],
                line,
                quoted: true,
            });
            line += count_newlines(&bytes[startpos..endpos]);
            bytepos = endpos + 1;
        } else {
            let startpos = bytepos;
            while bytepos < bytes.len()
                && !bytes[bytepos].is_ascii_whitespace()
                && bytes[bytepos] != b'"'
                && !(bytepos > startpos && bytes[bytepos..].starts_with(b"/*"))
            {
                bytepos += 1;
            }
            tokens.push(Token {
                text: &text[startpos..bytepos],
                line,
                quoted: false,
            });
        }
    }

    tokens
}

fn count_newlines(bytes: &[u8]) -> u32 {
    let count = bytes.iter().filter(|&&c| c == b'\n').count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/*************************************************************************************************/

#[cfg(test)]
mod tests {
    use super::*;

    static VALID: &str = r#"ASAP2_VERSION 1 71
/begin PROJECT p ""
  /begin MODULE m ""
    /begin MEASUREMENT speed "" UWORD cm 0 0 0 100
      ECU_ADDRESS 0x1000
    /end MEASUREMENT
    /begin CHARACTERISTIC curve "" CURVE 0x2000 rl 0 NO_COMPU_METHOD 0 100
      /begin AXIS_DESCR STD_AXIS NO_INPUT_QUANTITY missing_cm 8 0 7
      /end AXIS_DESCR
    /end CHARACTERISTIC
    /begin AXIS_PTS axis "" 0x3000 NO_INPUT_QUANTITY rl 0 cm 8 0 7
    /end AXIS_PTS
    /begin COMPU_METHOD cm "" TAB_VERB "%6.3" ""
      COMPU_TAB_REF vtab
    /end COMPU_METHOD
    /begin COMPU_VTAB vtab "" TAB_VERB 1
      0 "off"
    /end COMPU_VTAB
    /begin RECORD_LAYOUT rl FNC_VALUES 1 UWORD ROW_DIR DIRECT /end RECORD_LAYOUT
  /end MODULE
/end PROJECT
"#;

    #[test]
    fn check_valid() {
        let doc = A2lDocument::from_text(VALID);
        let results = check(&doc, true);
        assert!(results.is_empty(), "{results:?}");
        assert_eq!(report(&results), "Consistency check passed.");
    }

    #[test]
    fn unbalanced_blocks() {
        let text = "/begin PROJECT p \"\"\n  /end MODULE\n/end PROJECT\n/begin MODULE m \"\"\n";
        let results = check(&A2lDocument::from_text(text), false);
        assert_eq!(results.len(), 3);
        assert!(matches!(
            &results[0],
            A2lError::MismatchedEnd { blockname, line: 2, expected, begin_line: 1 }
                if blockname == "MODULE" && expected == "PROJECT"
        ));
        assert!(matches!(
            &results[1],
            A2lError::UnmatchedEnd { blockname, line: 3 } if blockname == "PROJECT"
        ));
        assert!(matches!(
            &results[2],
            A2lError::UnmatchedBegin { blockname, line: 4 } if blockname == "MODULE"
        ));
        assert_eq!(
            report(&results),
            "Consistency check failed:\n  - Mismatched /end MODULE at line 2, expected PROJECT from line 1\n  - Unmatched /end PROJECT at line 3\n  - Unmatched /begin MODULE at line 4"
        );
    }

    #[test]
    fn markers_in_strings_and_comments() {
        let text = "/begin MEASUREMENT m \"text /end MEASUREMENT\"\n  /* /begin IF_DATA */\n  // /end X\n/end MEASUREMENT /begin A x /end A\n";
        let mut results = Vec::new();
        check_balance(text, &mut results);
        assert!(results.is_empty(), "{results:?}");
    }

    #[test]
    fn duplicate_names() {
        let text = "/begin MODULE m \"\"\n  /begin MEASUREMENT a \"\"\n  /end MEASUREMENT\n  /begin CHARACTERISTIC a \"\"\n  /end CHARACTERISTIC\n  /begin MEASUREMENT a \"\"\n  /end MEASUREMENT\n/end MODULE\n";
        let results = check(&A2lDocument::from_text(text), false);
        assert_eq!(results.len(), 1);
        assert!(matches!(
            &results[0],
            A2lError::NameCollisionError { item_name, blockname, module, line_1: 2, line_2: 6 }
                if item_name == "a" && blockname == "MEASUREMENT" && module == "m"
        ));
    }

    #[test]
    fn missing_references() {
        let text = VALID
            .replace("UWORD cm 0 0 0 100", "UWORD cm_missing 0 0 0 100")
            .replace("COMPU_TAB_REF vtab", "COMPU_TAB_REF vtab_missing")
            .replace("CURVE 0x2000 rl", "CURVE 0x2000 rl_missing");
        let doc = A2lDocument::from_text(text);

        // references are only checked in strict mode
        assert!(check(&doc, false).is_empty());

        let results = check(&doc, true);
        assert_eq!(results.len(), 3);
        assert!(matches!(
            &results[0],
            A2lError::CrossReferenceError { source_type, source_name, source_line: 4, target_type, target_name }
                if source_type == "MEASUREMENT" && source_name == "speed" && target_type == "COMPU_METHOD" && target_name == "cm_missing"
        ));
        assert!(matches!(
            &results[1],
            A2lError::CrossReferenceError { target_type, target_name, .. }
                if target_type == "RECORD_LAYOUT" && target_name == "rl_missing"
        ));
        assert!(matches!(
            &results[2],
            A2lError::CrossReferenceError { source_type, target_type, target_name, .. }
                if source_type == "COMPU_METHOD" && target_type == "COMPU_TAB" && target_name == "vtab_missing"
        ));
    }

    #[test]
    fn tokens() {
        let tokens = tokenize("/begin A \"x y\" // comment\n/*c\n*/ B/*c*/C \"esc\\\"aped\"");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["/begin", "A", "x y", "B", "C", "esc\\\"aped"]);
        assert_eq!(tokens[3].line, 3);
        assert!(tokens[2].quoted);

        let block = "/begin MEASUREMENT m \"\" UBYTE cm /begin IF_DATA x /end IF_DATA 0 1 /end MEASUREMENT";
        assert_eq!(
            block_tokens(block),
            vec!["MEASUREMENT", "m", "", "UBYTE", "cm", "0", "1"]
        );
    }
}
