//! Wire formats.
//!
//! Two textual forms share one escape scheme:
//!
//! - the compact delta produced by [`crate::diff::to_delta`], and
//! - the portable patch text produced by [`patches_to_text`], shaped like a
//!   GNU unidiff (`@@ -1,11 +1,12 @@` headers, one line per edit).
//!
//! The escape scheme is URI-style percent-encoding that leaves
//! `A–Z a–z 0–9`, space, and `-_.!~*'();/?:@&=+$,#` verbatim and encodes
//! everything else as uppercase `%HH` over UTF-8 bytes.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::diff::Edit;
use crate::patch::Patch;

/// Errors from decoding a wire form.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// A `%` escape was truncated or not followed by two hex digits.
    #[error("malformed percent escape near {0:?}")]
    BadEscape(String),
    /// Decoded bytes were not valid UTF-8.
    #[error("escaped bytes are not valid UTF-8")]
    InvalidUtf8,
    /// A patch header line did not match `@@ -S1[,L1] +S2[,L2] @@`.
    #[error("invalid patch header: {0:?}")]
    BadHeader(String),
    /// An edit line started with something other than `' '`, `-`, `+`.
    #[error("invalid edit sign {sign:?} in line {line:?}")]
    BadSign {
        /// The offending sign character.
        sign: char,
        /// The full line it appeared in.
        line: String,
    },
}

const PRESERVED: &[u8] = b"-_.!~*'();/?:@&=+$,# ";

/// Percent-encode `text`, preserving the characters listed in the module
/// docs.
pub fn percent_encode(text: &str) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        if b.is_ascii_alphanumeric() || PRESERVED.contains(&b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

/// Decode a percent-encoded string. `%HH` accepts either hex case; every
/// other character (including `+`) passes through literally.
pub fn percent_decode(text: &str) -> Result<String, EncodingError> {
    let bytes = text.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let (Some(&hi), Some(&lo)) = (bytes.get(i + 1), bytes.get(i + 2)) else {
                return Err(EncodingError::BadEscape(
                    String::from_utf8_lossy(&bytes[i..]).into_owned(),
                ));
            };
            let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) else {
                return Err(EncodingError::BadEscape(
                    String::from_utf8_lossy(&bytes[i..(i + 3).min(bytes.len())]).into_owned(),
                ));
            };
            out.push(hi * 16 + lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| EncodingError::InvalidUtf8)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Serialize a patch list to its portable text representation.
pub fn patches_to_text(patches: &[Patch]) -> String {
    patches.iter().map(ToString::to_string).collect()
}

static PATCH_HEADER: OnceLock<Regex> = OnceLock::new();

fn header_regex() -> &'static Regex {
    PATCH_HEADER.get_or_init(|| Regex::new(r"^@@ -(\d+),?(\d*) \+(\d+),?(\d*) @@$").unwrap())
}

// Header coordinates are 1-based except for zero-length ranges, which keep
// the 0-based start: `start,0`; a bare `start` means length 1.
fn decode_coords(start_text: &str, length_text: &str, header: &str) -> Result<(usize, usize), EncodingError> {
    let bad = || EncodingError::BadHeader(header.to_string());
    let start: usize = start_text.parse().map_err(|_| bad())?;
    if length_text.is_empty() {
        Ok((start.checked_sub(1).ok_or_else(bad)?, 1))
    } else if length_text == "0" {
        Ok((start, 0))
    } else {
        let length: usize = length_text.parse().map_err(|_| bad())?;
        Ok((start.checked_sub(1).ok_or_else(bad)?, length))
    }
}

/// Parse a textual representation of patches back into a patch list.
pub fn patches_from_text(text: &str) -> Result<Vec<Patch>, EncodingError> {
    let mut patches = Vec::new();
    if text.is_empty() {
        return Ok(patches);
    }
    let lines: Vec<&str> = text.split('\n').collect();
    let mut idx = 0;
    while idx < lines.len() {
        if lines[idx].is_empty() {
            idx += 1;
            continue;
        }
        let caps = header_regex()
            .captures(lines[idx])
            .ok_or_else(|| EncodingError::BadHeader(lines[idx].to_string()))?;
        let mut patch = Patch::default();
        (patch.start1, patch.length1) = decode_coords(&caps[1], &caps[2], lines[idx])?;
        (patch.start2, patch.length2) = decode_coords(&caps[3], &caps[4], lines[idx])?;
        idx += 1;

        while idx < lines.len() {
            let line = lines[idx];
            let Some(sign) = line.chars().next() else {
                // Blank line; skip it.
                idx += 1;
                continue;
            };
            if sign == '@' {
                // Start of the next patch.
                break;
            }
            let body = percent_decode(&line[sign.len_utf8()..])?;
            match sign {
                '-' => patch.edits.push(Edit::delete(body)),
                '+' => patch.edits.push(Edit::insert(body)),
                ' ' => patch.edits.push(Edit::equal(body)),
                other => {
                    return Err(EncodingError::BadSign {
                        sign: other,
                        line: line.to_string(),
                    })
                }
            }
            idx += 1;
        }
        patches.push(patch);
    }
    Ok(patches)
}
