use crate::loader;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    InBlockComment,
}

// inline_includes()
// Replace each include directive with the content of the included file.
// A directive is only recognized if it stands on its own line outside of any string or comment.
// The included text is not scanned for further includes.
pub(crate) fn inline_includes(text: &str, base_dir: &Path) -> String {
    let bytes = text.as_bytes();
    let mut output = String::with_capacity(text.len());
    // everything before copied_until has already been transferred to the output
    let mut copied_until = 0;
    let mut state = ScanState::Normal;
    let mut line_start = 0;
    let mut bytepos = 0;

    while bytepos < bytes.len() {
        if state == ScanState::Normal && bytepos == line_start {
            let line_end = text[bytepos..]
                .find('\n')
                .map_or(text.len(), |nl| bytepos + nl);
            if let Some(filename) = match_include_line(&text[bytepos..line_end]) {
                if let Some(content) = read_include(filename, base_dir) {
                    output.push_str(&text[copied_until..bytepos]);
                    output.push_str(&format!("/* begin include: {filename} */\n"));
                    output.push_str(&content);
                    if !content.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&format!("/* end include: {filename} */\n"));

                    // the directive line is consumed, including its newline
                    bytepos = (line_end + 1).min(bytes.len());
                    copied_until = bytepos;
                    line_start = bytepos;
                    continue;
                }
            }
        }

        let c = bytes[bytepos];
        match state {
            ScanState::Normal => {
                if c == b'"' {
                    state = ScanState::InString;
                } else if c == b'/' && bytes.get(bytepos + 1) == Some(&b'*') {
                    state = ScanState::InBlockComment;
                    bytepos += 1;
                }
            }
            ScanState::InString => {
                if c == b'\\' {
                    // skip the escaped character; it might be a quote or a newline
                    if bytes.get(bytepos + 1) == Some(&b'\n') {
                        line_start = bytepos + 2;
                    }
                    bytepos += 1;
                } else if c == b'"' {
                    state = ScanState::Normal;
                }
            }
            ScanState::InBlockComment => {
                if c == b'*' && bytes.get(bytepos + 1) == Some(&b'/') {
                    state = ScanState::Normal;
                    bytepos += 1;
                }
            }
        }
        if c == b'\n' {
            line_start = bytepos + 1;
        }
        bytepos += 1;
    }

    output.push_str(&text[copied_until..]);
    output
}

// match_include_line()
// A directive is: optional '/', the keyword "include" (any case), whitespace, and a quoted non-empty file name.
// Nothing but whitespace may follow the file name.
fn match_include_line(line: &str) -> Option<&str> {
    let line = line.trim();
    let line = line.strip_prefix('/').unwrap_or(line);
    if line.len() < 7 || !line.as_bytes()[..7].eq_ignore_ascii_case(b"include") {
        return None;
    }
    let rest = &line[7..];
    let quoted = rest.trim_start();
    if quoted.len() == rest.len() {
        // no separator between the keyword and the file name
        return None;
    }
    let quoted = quoted.strip_prefix('"')?;
    let end = quoted.find('"')?;
    let filename = &quoted[..end];
    if filename.is_empty() || !quoted[end + 1..].trim().is_empty() {
        return None;
    }
    Some(filename)
}

fn read_include(filename: &str, base_dir: &Path) -> Option<String> {
    let path = loader::make_include_filename(filename, base_dir);
    match loader::load(&path) {
        Ok(content) => {
            tracing::debug!(path = %path.display(), "inlined include file");
            Some(content)
        }
        Err(error) => {
            tracing::warn!(%error, "include directive left unchanged");
            None
        }
    }
}

/*************************************************************************************************/
