//! Text decoding and mojibake repair.
//!
//! Catalog spreadsheets often pass through tools that read UTF-8 bytes as
//! Windows-1252, sometimes twice. Repair is table-driven: for every
//! non-ASCII character Windows-1252 can represent, the single- and
//! double-garbled forms are precomputed and replaced with the intended
//! character. Correct text contains none of these sequences and is left
//! untouched.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;

/// Windows-1252 code points for bytes 0x80..=0x9F. Bytes the code page
/// leaves undefined map to the C1 control of the same value, which is how
/// most decoders surface them.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

/// Decode one byte as Windows-1252.
pub fn cp1252_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

/// Decode a byte slice as Windows-1252. Never fails.
pub fn decode_cp1252(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| cp1252_char(b)).collect()
}

/// Garble `text` once: encode as UTF-8, decode as Windows-1252.
fn garble(text: &str) -> String {
    decode_cp1252(text.as_bytes())
}

/// Repair patterns indexed by their first character, longest first.
static PATTERNS: Lazy<HashMap<char, Vec<(String, char)>>> = Lazy::new(|| {
    let targets = (0xA0u8..=0xFF)
        .map(char::from)
        .chain(CP1252_HIGH.iter().copied().filter(|c| !c.is_control()));

    let mut table: HashMap<char, Vec<(String, char)>> = HashMap::new();
    for target in targets {
        let once = garble(&target.to_string());
        let twice = garble(&once);
        for pattern in [once, twice] {
            if let Some(first) = pattern.chars().next() {
                table.entry(first).or_default().push((pattern, target));
            }
        }
    }
    for patterns in table.values_mut() {
        patterns.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
    }
    table
});

/// Restore characters garbled by UTF-8/Windows-1252 confusion and strip
/// control characters (tab, newline and carriage return are kept).
///
/// Idempotent: repairing already repaired text returns it unchanged.
pub fn repair_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    'scan: while let Some(first) = rest.chars().next() {
        if let Some(candidates) = PATTERNS.get(&first) {
            for (pattern, target) in candidates {
                if rest.starts_with(pattern.as_str()) {
                    out.push(*target);
                    rest = &rest[pattern.len()..];
                    continue 'scan;
                }
            }
        }
        out.push(first);
        rest = &rest[first.len_utf8()..];
    }

    strip_controls(&out)
}

/// Remove control characters other than tab, newline and carriage return.
pub fn strip_controls(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Input bytes were not valid UTF-8 and were decoded as Windows-1252.
///
/// Reported as a warning; decoding never fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("input is not valid UTF-8 (first bad byte at offset {offset}); decoded as Windows-1252")]
pub struct EncodingError {
    pub offset: usize,
}

/// Result of decoding a spreadsheet file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub warning: Option<EncodingError>,
}

/// Decode file contents: UTF-8 with the BOM stripped, falling back to
/// Windows-1252.
pub fn decode_input(bytes: &[u8]) -> DecodedText {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => DecodedText {
            text: text.to_string(),
            warning: None,
        },
        Err(e) => DecodedText {
            text: decode_cp1252(bytes),
            warning: Some(EncodingError {
                offset: e.valid_up_to(),
            }),
        },
    }
}
