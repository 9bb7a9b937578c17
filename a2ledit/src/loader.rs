use crate::A2lError;
use std::fs::File;
use std::io::Read;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

// make_include_filename()
// Resolve the file name given in an include directive against the base directory.
// Both '/' and '\' are accepted as path separators, so that files written on Windows can be used elsewhere and vice versa
pub(crate) fn make_include_filename(incname: &str, base_dir: &Path) -> PathBuf {
    let separator = MAIN_SEPARATOR.to_string();
    let normalized_incname = incname.replace(['\\', '/'], &separator);
    let inc_path = Path::new(&normalized_incname);

    if inc_path.is_absolute() {
        inc_path.to_path_buf()
    } else {
        base_dir.join(inc_path)
    }
}

pub(crate) fn load(path: &Path) -> Result<String, A2lError> {
    let mut file = File::open(path).map_err(|ioerror| A2lError::FileOpenError {
        filename: path.to_path_buf(),
        ioerror,
    })?;

    let filedata = read_data(&mut file, path)?;
    let text = decode_raw_bytes(&filedata);

    // if the file has a BOM, strip that off here
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

fn read_data(file: &mut File, path: &Path) -> Result<Vec<u8>, A2lError> {
    let make_error = |ioerror| A2lError::FileReadError {
        filename: path.to_path_buf(),
        ioerror,
    };
    let filesize = file.metadata().map_err(make_error)?.len();
    let mut buffer = Vec::with_capacity(usize::try_from(filesize).unwrap_or(0));
    file.read_to_end(&mut buffer).map_err(make_error)?;
    Ok(buffer)
}

// decode_raw_bytes()
// An a2l file must start with either a BOM or a character from the basic ASCII set.
// The nul-bytes that UTF-16 and UTF-32 produce for these characters are used to guess the encoding.
fn decode_raw_bytes(filedata: &[u8]) -> String {
    if let Some(text) = decode_utf32(filedata) {
        return text;
    }
    if let Some(text) = decode_utf16(filedata) {
        return text;
    }
    if let Ok(text) = std::str::from_utf8(filedata) {
        return text.to_string();
    }
    if let Some(text) = decode_utf8_lossy(filedata) {
        return text;
    }
    // ISO-8859-1 always succeeds, because every byte is a valid latin-1 character
    filedata.iter().map(|&byte| char::from(byte)).collect()
}

// decode_utf8_lossy()
// If the data contains at least one valid multi-byte UTF-8 sequence, it is taken as UTF-8 with some damage:
// the invalid bytes are dropped and all other text is kept unchanged.
// Data without any multi-byte sequence is most likely ISO-8859-1, so None is returned.
fn decode_utf8_lossy(filedata: &[u8]) -> Option<String> {
    let has_multibyte = filedata
        .utf8_chunks()
        .any(|chunk| !chunk.valid().is_ascii());
    if !has_multibyte {
        return None;
    }

    let mut text = String::with_capacity(filedata.len());
    let mut invalid_count = 0;
    for chunk in filedata.utf8_chunks() {
        text.push_str(chunk.valid());
        invalid_count += chunk.invalid().len();
    }
    tracing::debug!(invalid_count, "dropped invalid UTF-8 bytes");
    Some(text)
}

fn decode_utf32(filedata: &[u8]) -> Option<String> {
    if filedata.len() < 4 || filedata.len() % 4 != 0 {
        return None;
    }
    // big endian: 00 00 FE FF (BOM) or 00 00 00 xx; little endian: FF FE 00 00 (BOM) or xx 00 00 00
    let conversion: fn([u8; 4]) -> u32 = if filedata[0] == 0 && filedata[1] == 0 && filedata[3] != 0 {
        u32::from_be_bytes
    } else if filedata[0] != 0 && filedata[2] == 0 && filedata[3] == 0 {
        u32::from_le_bytes
    } else {
        return None;
    };

    filedata
        .chunks_exact(4)
        .map(|chunk| char::from_u32(conversion([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect()
}

fn decode_utf16(filedata: &[u8]) -> Option<String> {
    if filedata.len() < 2 || filedata.len() % 2 != 0 {
        return None;
    }
    let conversion: fn([u8; 2]) -> u16 = match (filedata[0], filedata[1]) {
        (0xfe, 0xff) => u16::from_be_bytes,
        (0xff, 0xfe) => u16::from_le_bytes,
        (0, second) if second != 0 => u16::from_be_bytes,
        (first, 0) if first != 0 => u16::from_le_bytes,
        _ => return None,
    };

    let units: Vec<u16> = filedata
        .chunks_exact(2)
        .map(|chunk| conversion([chunk[0], chunk[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/*************************************************************************************************/
