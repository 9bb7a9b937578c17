//! Recovery of the nested block structure of an a2l file from the raw text

/// The location of a `/begin KIND NAME ... /end KIND` block in a text
///
/// All offsets are byte offsets into the text that was scanned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockSpan {
    /// kind of the block, always upper case
    pub kind: String,
    /// name of the block, with any surrounding quotes removed
    pub name: String,
    /// offset of the `/begin` marker
    pub start: usize,
    /// offset just past the end of the `/end KIND` marker
    pub end: usize,
    /// offset of the `/begin` marker; the header line is `header_start .. header_end`
    pub header_start: usize,
    /// offset just past the first newline after the `/begin` marker
    pub header_end: usize,
}

impl BlockSpan {
    /// the full text of the block, from `/begin` to the end of `/end KIND`
    #[must_use]
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    /// everything after the header line, including the `/end KIND` marker
    #[must_use]
    pub fn body_slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.header_end.min(self.end)..self.end]
    }

    /// the header line of the block, including its newline
    #[must_use]
    pub fn header_slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.header_start..self.header_end]
    }

    /// offset of the `/end` marker that closes this block
    #[must_use]
    pub fn end_marker_start(&self, text: &str) -> usize {
        // the kind of the block can't contain a '/', so the last one belongs to the end marker
        self.slice(text)
            .rfind('/')
            .map_or(self.end, |pos| self.start + pos)
    }

    /// check if another block lies entirely inside of this one
    #[must_use]
    pub fn contains(&self, other: &BlockSpan) -> bool {
        self.start <= other.start && other.end <= self.end && self != other
    }
}

#[derive(Debug)]
enum Marker<'a> {
    Begin {
        kind: &'a str,
        name: &'a str,
        startpos: usize,
        endpos: usize,
    },
    End {
        kind: &'a str,
        endpos: usize,
    },
}

#[derive(Debug)]
struct OpenBlock<'a> {
    kind: String,
    name: &'a str,
    start: usize,
    header_end: usize,
}

/// Find all well-matched blocks in `text`, optionally restricted to the byte range `region`.
///
/// The result is sorted by the start offset. Markers that can't be matched up are dropped silently:
/// an `/end` without an open block is ignored, and a block that is closed by an `/end` of a different
/// kind is discarded.
pub(crate) fn scan_blocks(text: &str, region: Option<(usize, usize)>) -> Vec<BlockSpan> {
    let (region_start, region_end) = region.unwrap_or((0, text.len()));
    let region_end = region_end.min(text.len());
    let Some(regiontext) = text.get(region_start..region_end) else {
        return Vec::new();
    };
    let bytes = regiontext.as_bytes();

    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut blocks: Vec<BlockSpan> = Vec::new();
    let mut bytepos = 0;

    while bytepos < bytes.len() {
        if bytes[bytepos] != b'/' {
            bytepos += 1;
            continue;
        }

        match match_marker(regiontext, bytepos) {
            Some(Marker::Begin {
                kind,
                name,
                startpos,
                endpos,
            }) => {
                let header_end = regiontext[startpos..]
                    .find('\n')
                    .map_or(regiontext.len(), |nl| startpos + nl + 1);
                stack.push(OpenBlock {
                    kind: kind.to_ascii_uppercase(),
                    name: unquote(name),
                    start: region_start + startpos,
                    header_end: region_start + header_end,
                });
                bytepos = endpos;
            }
            Some(Marker::End { kind, endpos }) => {
                if let Some(open_block) = stack.pop() {
                    if open_block.kind.eq_ignore_ascii_case(kind) {
                        let end = region_start + endpos;
                        blocks.push(BlockSpan {
                            kind: open_block.kind,
                            name: open_block.name.to_string(),
                            start: open_block.start,
                            end,
                            header_start: open_block.start,
                            header_end: open_block.header_end.min(end),
                        });
                    }
                }
                bytepos = endpos;
            }
            None => {
                bytepos += 1;
            }
        }
    }

    blocks.sort_by_key(|block| block.start);
    blocks
}

/// Reduce a list of blocks sorted by start offset to the outermost ones
pub(crate) fn top_level(blocks: Vec<BlockSpan>) -> Vec<BlockSpan> {
    let mut outer: Vec<BlockSpan> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if outer.last().is_none_or(|prev| block.start >= prev.end) {
            outer.push(block);
        }
    }
    outer
}

/// Get the 1-based line number of a byte offset in the text
#[must_use]
pub fn line_of(text: &str, offset: usize) -> u32 {
    let offset = offset.min(text.len());
    let newlines = text.as_bytes()[..offset]
        .iter()
        .filter(|&&c| c == b'\n')
        .count();
    u32::try_from(newlines + 1).unwrap_or(u32::MAX)
}

// match_marker()
// try to match "/begin KIND NAME" or "/end KIND" at bytepos, which must point to a '/'
fn match_marker(text: &str, bytepos: usize) -> Option<Marker<'_>> {
    let bytes = text.as_bytes();
    let keyword_start = bytepos + 1;

    if starts_with_ignore_case(&bytes[keyword_start..], b"begin") {
        let kind_start = skip_whitespace(bytes, keyword_start + 5)?;
        let kind_end = scan_identifier(bytes, kind_start)?;
        let kind = &text[kind_start..kind_end];

        // a block without a name is still recorded, so that its /end does not close the enclosing block
        let (name, endpos) = match skip_whitespace(bytes, kind_end) {
            Some(name_start) if bytes[name_start] == b'"' => {
                match text[name_start + 1..].find('"') {
                    Some(len) => {
                        let name_end = name_start + len + 2;
                        (&text[name_start..name_end], name_end)
                    }
                    None => ("", kind_end),
                }
            }
            Some(name_start) => match scan_identifier(bytes, name_start) {
                Some(name_end) => (&text[name_start..name_end], name_end),
                None => ("", kind_end),
            },
            None => ("", kind_end),
        };

        Some(Marker::Begin {
            kind,
            name,
            startpos: bytepos,
            endpos,
        })
    } else if starts_with_ignore_case(&bytes[keyword_start..], b"end") {
        let kind_start = skip_whitespace(bytes, keyword_start + 3)?;
        let kind_end = scan_identifier(bytes, kind_start)?;
        Some(Marker::End {
            kind: &text[kind_start..kind_end],
            endpos: kind_end,
        })
    } else {
        None
    }
}

// skip_whitespace()
// at least one whitespace character is required; returns the position of the following non-whitespace character
fn skip_whitespace(bytes: &[u8], mut bytepos: usize) -> Option<usize> {
    let startpos = bytepos;
    while bytepos < bytes.len() && bytes[bytepos].is_ascii_whitespace() {
        bytepos += 1;
    }
    if bytepos > startpos && bytepos < bytes.len() {
        Some(bytepos)
    } else {
        None
    }
}

// scan_identifier()
// returns the end position of the identifier starting at bytepos, if there is one
fn scan_identifier(bytes: &[u8], mut bytepos: usize) -> Option<usize> {
    let startpos = bytepos;
    while bytepos < bytes.len() && is_identchar(bytes[bytepos]) {
        bytepos += 1;
    }
    (bytepos > startpos).then_some(bytepos)
}

fn starts_with_ignore_case(bytes: &[u8], keyword: &[u8]) -> bool {
    bytes.len() >= keyword.len() && bytes[..keyword.len()].eq_ignore_ascii_case(keyword)
}

fn unquote(name: &str) -> &str {
    name.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(name)
}

// is_identchar()
// is this char allowed in a block kind or an unquoted name
pub(crate) fn is_identchar(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'.' || c == b'[' || c == b']' || c == b'_' || c == b'-'
}

/*************************************************************************************************/
