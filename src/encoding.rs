//! Text decoding for input buffers.
//!
//! Gabmap tables circulate in whatever encoding the spreadsheet that
//! produced them used, so [`decode_text`] walks an ordered list of
//! candidates and keeps the first that decodes cleanly. The last resort is
//! an explicit lossy UTF-8 decode, so decoding a Gabmap table never fails.

use encoding_rs::{UTF_16BE, UTF_16LE, WINDOWS_1252};
use std::borrow::Cow;
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, with a leading byte-order mark stripped if present.
    Utf8Sig,
    /// UTF-16 with a byte-order mark selecting the endianness.
    Utf16,
    Utf8,
    Latin1,
    Windows1252,
}

/// Candidates in the order they are tried.
pub const CANDIDATES: [TextEncoding; 5] = [
    TextEncoding::Utf8Sig,
    TextEncoding::Utf16,
    TextEncoding::Utf8,
    TextEncoding::Latin1,
    TextEncoding::Windows1252,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// The candidate needs a byte-order mark and the buffer has none.
    MissingBom,
    /// Malformed sequence; `offset` is the length of the valid prefix when known.
    InvalidSequence { offset: usize },
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> std::result::Result<String, DecodeFailure> {
        match self {
            TextEncoding::Utf8Sig => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                utf8(body)
            }
            TextEncoding::Utf16 => {
                let (codec, body) = match bytes {
                    [0xFF, 0xFE, rest @ ..] => (UTF_16LE, rest),
                    [0xFE, 0xFF, rest @ ..] => (UTF_16BE, rest),
                    _ => return Err(DecodeFailure::MissingBom),
                };
                codec
                    .decode_without_bom_handling_and_without_replacement(body)
                    .map(Cow::into_owned)
                    .ok_or(DecodeFailure::InvalidSequence { offset: 0 })
            }
            TextEncoding::Utf8 => utf8(bytes),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Windows1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned)
                .ok_or(DecodeFailure::InvalidSequence { offset: 0 }),
        }
    }
}

fn utf8(bytes: &[u8]) -> std::result::Result<String, DecodeFailure> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| DecodeFailure::InvalidSequence {
            offset: e.valid_up_to(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    /// `None` when every candidate failed and the lossy fallback was used.
    pub encoding: Option<TextEncoding>,
}

/// Decodes `bytes` with the first candidate in [`CANDIDATES`] that succeeds.
pub fn decode_text(bytes: &[u8]) -> Decoded {
    for encoding in CANDIDATES {
        match encoding.decode(bytes) {
            Ok(text) => {
                debug!("Decoded {} bytes as {:?}", bytes.len(), encoding);
                return Decoded {
                    text,
                    encoding: Some(encoding),
                };
            }
            Err(failure) => debug!("{:?} rejected input: {:?}", encoding, failure),
        }
    }

    warn!("No candidate encoding matched; decoding as lossy UTF-8");
    Decoded {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: None,
    }
}

/// Strict UTF-8 decode used for Diatech files. A leading BOM is dropped.
pub fn decode_utf8_strict(bytes: &[u8], what: &'static str) -> Result<String> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    utf8(body).map_err(|failure| match failure {
        DecodeFailure::InvalidSequence { offset } => ConvertError::Decode {
            what,
            offset: offset + (bytes.len() - body.len()),
        },
        DecodeFailure::MissingBom => ConvertError::Decode { what, offset: 0 },
    })
}

/// Splits text into lines, accepting `\n`, `\r\n` and bare `\r` terminators.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text);
    std::iter::from_fn(move || {
        let current = rest?;
        if current.is_empty() {
            rest = None;
            return None;
        }
        match current.find(|c: char| c == '\r' || c == '\n') {
            Some(i) => {
                let skip = if current[i..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&current[i + skip..]);
                Some(&current[..i])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_with_bom_is_stripped() {
        let decoded = decode_text(b"\xEF\xBB\xBFBogot\xC3\xA1");
        assert_eq!(decoded.text, "Bogotá");
        assert_eq!(decoded.encoding, Some(TextEncoding::Utf8Sig));
    }

    #[test]
    fn test_utf16_requires_bom() {
        let le: Vec<u8> = [0xFF, 0xFE]
            .into_iter()
            .chain("Cali".encode_utf16().flat_map(u16::to_le_bytes))
            .collect();
        let decoded = decode_text(&le);
        assert_eq!(decoded.text, "Cali");
        assert_eq!(decoded.encoding, Some(TextEncoding::Utf16));

        assert_eq!(
            TextEncoding::Utf16.decode(b"Ca"),
            Err(DecodeFailure::MissingBom)
        );
    }

    #[test]
    fn test_latin1_fallback() {
        // "Bogotá" encoded as ISO-8859-1
        let decoded = decode_text(b"Bogot\xE1");
        assert_eq!(decoded.text, "Bogotá");
        assert_eq!(decoded.encoding, Some(TextEncoding::Latin1));
    }

    #[test]
    fn test_strict_utf8_reports_offset() {
        let err = decode_utf8_strict(b"ab\xFFcd", "Diatech table").unwrap_err();
        match err {
            ConvertError::Decode { what, offset } => {
                assert_eq!(what, "Diatech table");
                assert_eq!(offset, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_split_lines_mixed_terminators() {
        let lines: Vec<_> = split_lines("a\r\nb\nc\rd").collect();
        assert_eq!(lines, vec!["a", "b", "c", "d"]);

        let lines: Vec<_> = split_lines("a\n\nb\n").collect();
        assert_eq!(lines, vec!["a", "", "b"]);

        assert_eq!(split_lines("").count(), 0);
    }
}
