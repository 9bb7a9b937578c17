use std::fmt::Display;

const ANNOTATION_PREFIX: &str = "/* a2ledit set version:";

/// Keywords that must be removed when converting to a version below the threshold
static VERSION_RESTRICTIONS: [(A2lVersion, &[&str]); 2] = [
    (
        A2lVersion::V1_6_0,
        &[
            "AXIS_PTS_X",
            "AXIS_PTS_Y",
            "AXIS_PTS_Z",
            "AXIS_PTS_4",
            "AXIS_PTS_5",
            "ANNOTATION",
            "ANNOTATION_LABEL",
            "ANNOTATION_ORIGIN",
            "ANNOTATION_TEXT",
            "READ_WRITE",
        ],
    ),
    (
        A2lVersion::V1_5_1,
        &[
            "VIRTUAL",
            "VIRTUAL_CHARACTERISTIC",
            "TYPEDEF_CHARACTERISTIC",
        ],
    ),
];

/// A version of the a2l standard, as stored in the `ASAP2_VERSION` header
///
/// The minor version combines the minor and patch numbers: version 1.6.1 is stored as `major = 1, minor = 61`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct A2lVersion {
    pub major: u16,
    pub minor: u16,
}

impl A2lVersion {
    pub const V1_5_0: Self = Self::new(1, 50);
    pub const V1_5_1: Self = Self::new(1, 51);
    pub const V1_6_0: Self = Self::new(1, 60);
    pub const V1_6_1: Self = Self::new(1, 61);
    pub const V1_7_0: Self = Self::new(1, 70);
    pub const V1_7_1: Self = Self::new(1, 71);

    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parse a version string of the form `MAJOR.MINOR[.PATCH]`
    ///
    /// The minor number is normally combined as `minor * 10 + patch`, with a missing patch counting as 0.
    /// A two digit minor number without a patch number is the exception: it is taken as already combined,
    /// so both "1.7.1" and "1.71" result in version 1.71 (and not 1.710).
    /// If the string can't be parsed, the latest version 1.71 is returned.
    #[must_use]
    pub fn parse(version: &str) -> Self {
        Self::try_parse(version).unwrap_or(Self::V1_7_1)
    }

    fn try_parse(version: &str) -> Option<Self> {
        let mut parts = version.trim().split('.');
        let major = parts.next()?.parse::<u16>().ok()?;
        let minor_str = parts.next()?;
        let minor = minor_str.parse::<u16>().ok()?;
        let patch = match parts.next() {
            Some(patch_str) => Some(patch_str.parse::<u16>().ok()?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }

        let minor = match patch {
            Some(patch) => minor.checked_mul(10)?.checked_add(patch)?,
            None if minor_str.len() >= 2 => minor,
            None => minor.checked_mul(10)?,
        };
        Some(Self { major, minor })
    }
}

impl Display for A2lVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor / 10, self.minor % 10)
    }
}

// annotate_version()
// Add a comment with the target version at the beginning of the text.
// If the text already starts with such a comment, it is returned unchanged.
pub(crate) fn annotate_version(text: &str, target: &str) -> String {
    if text.starts_with(ANNOTATION_PREFIX) {
        text.to_string()
    } else {
        format!("{ANNOTATION_PREFIX} {target} */\n{text}")
    }
}

pub(crate) fn change_version(text: &str, target: &str) -> String {
    let version = A2lVersion::parse(target);
    let text = rewrite_version_header(text, version);
    let text = strip_unsupported_keywords(&text, version);
    annotate_version(&text, target)
}

// rewrite_version_header()
// Replace the two numbers after the first ASAP2_VERSION keyword; all whitespace is kept as it is.
fn rewrite_version_header(text: &str, version: A2lVersion) -> String {
    let Some(keyword_pos) = find_keyword(text, "ASAP2_VERSION") else {
        return text.to_string();
    };
    let bytes = text.as_bytes();
    let mut pos = keyword_pos + "ASAP2_VERSION".len();

    let mut number_ranges = Vec::with_capacity(2);
    for _ in 0..2 {
        let ws_start = pos;
        while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
            pos += 1;
        }
        let num_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if ws_start == num_start || num_start == pos {
            return text.to_string();
        }
        number_ranges.push((num_start, pos));
    }

    let (major_range, minor_range) = (number_ranges[0], number_ranges[1]);
    format!(
        "{}{}{}{}{}",
        &text[..major_range.0],
        version.major,
        &text[major_range.1..minor_range.0],
        version.minor,
        &text[minor_range.1..]
    )
}

// find_keyword()
// find a keyword that is not part of a longer identifier
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    text.match_indices(keyword).map(|(pos, _)| pos).find(|&pos| {
        let before_ok = pos == 0 || !crate::scanner::is_identchar(bytes[pos - 1]);
        let after = pos + keyword.len();
        let after_ok = after >= bytes.len() || !crate::scanner::is_identchar(bytes[after]);
        before_ok && after_ok
    })
}

// strip_unsupported_keywords()
// Remove every line whose first token is a keyword that the target version does not support
fn strip_unsupported_keywords(text: &str, version: A2lVersion) -> String {
    let removed: Vec<&str> = VERSION_RESTRICTIONS
        .iter()
        .filter(|(threshold, _)| version < *threshold)
        .flat_map(|(_, keywords)| keywords.iter().copied())
        .collect();
    if removed.is_empty() {
        return text.to_string();
    }

    let mut output = String::with_capacity(text.len());
    let mut removed_count = 0;
    for line in text.split_inclusive('\n') {
        let first_token = line.split_whitespace().next().unwrap_or("");
        if removed.contains(&first_token) {
            removed_count += 1;
        } else {
            output.push_str(line);
        }
    }
    if removed_count > 0 {
        tracing::debug!(removed_count, %version, "removed lines with unsupported keywords");
    }
    output
}

/*************************************************************************************************/
