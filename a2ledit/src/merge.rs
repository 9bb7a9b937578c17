use crate::document::{A2lDocument, MergeKey};
use crate::scanner::{self, BlockSpan};
use crate::{A2lError, ConflictMode, MERGE_OBJECT_KINDS};
use fnv::FnvHashMap;

/// Merges each of the `others` into `doc`, one after the other.
/// The result of each step is the base document of the next step.
pub(crate) fn merge_documents(
    doc: &A2lDocument,
    others: &[A2lDocument],
    mode: ConflictMode,
) -> Result<String, A2lError> {
    let mut merged = doc.clone();
    for other in others {
        merged = A2lDocument::from_text(merge_document_pair(&merged, other, mode)?);
    }
    Ok(merged.into_text())
}

fn merge_document_pair(
    base: &A2lDocument,
    other: &A2lDocument,
    mode: ConflictMode,
) -> Result<String, A2lError> {
    if base.find_modules().is_empty() {
        // nothing to merge into: the other document is taken over completely
        let mut text = base.to_text().to_string();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("\n/* merge appended */\n");
        text.push_str(other.to_text());
        return Ok(text);
    }

    let other_text = other.to_text();
    let mut merged = base.clone();
    for other_module in other.find_modules() {
        // the text changes in every step, so the module positions must be determined again
        let base_module = merged
            .find_modules()
            .into_iter()
            .find(|module| module.name == other_module.name);
        let text = if let Some(base_module) = base_module {
            merge_module_text(&merged, &base_module, other, &other_module, mode)?
        } else {
            tracing::debug!(module = %other_module.name, "appending module");
            append_module(&merged, other_module.slice(other_text))
        };
        merged = A2lDocument::from_text(text);
    }

    Ok(merged.into_text())
}

// merge_module_text()
// Merge the objects of other_module into base_module.
// New objects are added at the end of the base module; objects that already exist are never modified.
fn merge_module_text(
    base: &A2lDocument,
    base_module: &BlockSpan,
    other: &A2lDocument,
    other_module: &BlockSpan,
    mode: ConflictMode,
) -> Result<String, A2lError> {
    let base_text = base.to_text();
    let other_text = other.to_text();

    // normalized text of every object that is present in the base module, or that will be added to it
    let mut known: FnvHashMap<MergeKey, String> = base
        .index_module_objects(base_module, &MERGE_OBJECT_KINDS)
        .into_iter()
        .map(|(key, (_, span))| (key, normalize_whitespace(span.slice(base_text))))
        .collect();

    let mut insertion = String::new();
    for child in other.module_children(other_module) {
        if !crate::is_merge_object_kind(&child.kind) {
            continue;
        }
        let child_text = child.slice(other_text);
        let normalized = normalize_whitespace(child_text);
        let indent = line_indent(other_text, child.start);
        let key = MergeKey {
            kind: child.kind.clone(),
            name: child.name.clone(),
        };

        match known.get(&key) {
            Some(existing) if *existing == normalized => {
                // identical duplicate
            }
            Some(_) => match mode {
                ConflictMode::Strict => {
                    return Err(A2lError::MergeConflict {
                        module: base_module.name.clone(),
                        blockname: child.kind,
                        item_name: child.name,
                    });
                }
                ConflictMode::Preserve => {
                    tracing::debug!(
                        module = %base_module.name,
                        kind = %child.kind,
                        name = %child.name,
                        "skipped conflicting duplicate"
                    );
                    insertion.push_str(&format!(
                        "{indent}/* merge skipped duplicate {} {} */\n",
                        child.kind, child.name
                    ));
                }
            },
            None => {
                insertion.push('\n');
                insertion.push_str(indent);
                insertion.push_str(child_text);
                insertion.push('\n');
                known.insert(key, normalized);
            }
        }
    }

    if insertion.is_empty() {
        return Ok(base_text.to_string());
    }

    // insert before the line that holds "/end MODULE", or directly before the marker if it shares its line with other content
    let end_marker = base_module.end_marker_start(base_text);
    let line_start = base_text[..end_marker].rfind('\n').map_or(0, |pos| pos + 1);
    let (insert_pos, prefix) = if base_text[line_start..end_marker].trim().is_empty() {
        (line_start, "")
    } else {
        (end_marker, "\n")
    };

    Ok(format!(
        "{}{prefix}{insertion}{}",
        &base_text[..insert_pos],
        &base_text[insert_pos..]
    ))
}

// append_module()
// add a module that doesn't exist in the base document after the last top-level PROJECT
fn append_module(base: &A2lDocument, module_text: &str) -> String {
    let base_text = base.to_text();
    let insert_pos = scanner::top_level(base.scan_blocks(None))
        .iter()
        .rev()
        .find(|block| block.kind == "PROJECT")
        .map_or(base_text.len(), |project| project.end);

    format!(
        "{}\n/* merge appended MODULE */\n{module_text}{}",
        &base_text[..insert_pos],
        &base_text[insert_pos..]
    )
}

// line_indent()
// get the whitespace before pos on its line, or nothing if other text precedes pos on the line
fn line_indent(text: &str, pos: usize) -> &str {
    let line_start = text[..pos].rfind('\n').map_or(0, |nl| nl + 1);
    let prefix = &text[line_start..pos];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix
    } else {
        ""
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/*************************************************************************************************/
