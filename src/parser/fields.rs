//! Lazy header field reader.
//!
//! Streams a message window into header lines, then hands the caller the
//! body offset. Folded continuation lines are reported as flagged fragments
//! rather than concatenated, so the caller decides folding policy (the tree
//! parser keeps the raw bytes for round-tripping and unfolds on demand).
//!
//! The reader is single-pass and not restartable; a caller that needs to
//! re-scan reopens the source at a saved offset.

use crate::error::{MimeError, Result};

/// Maximum accepted length of a header field name, in bytes.
///
/// RFC 5322 limits whole lines to 998 octets; a name this long is always
/// garbage and gets a hard error rather than silent truncation.
pub const MAX_NAME_LEN: usize = 998;

/// One physical header line.
#[derive(Debug)]
pub struct FieldLine<'a> {
    /// Field name for the first line of a field, `None` for continuations.
    pub name: Option<String>,
    /// Exact bytes of this line, terminator included.
    pub raw: &'a [u8],
    /// True when this line is a folded continuation of the previous field.
    pub continuation: bool,
}

/// Reader state: header lines first, then the body marker.
pub struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
    in_body: bool,
    separator: &'a [u8],
}

impl<'a> FieldReader<'a> {
    /// Create a reader over a message window.
    ///
    /// `base` is the absolute offset of the window start in the backing
    /// source, used only for diagnostics. For nested messages the caller
    /// passes the sub-window, which bounds the scan.
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self {
            data,
            pos: 0,
            base,
            in_body: false,
            separator: b"",
        }
    }

    /// Next header line, or `None` once the header block is finished.
    ///
    /// After `None` the reader has consumed the separating blank line (if
    /// any) and [`body_offset`](Self::body_offset) is valid.
    pub fn next_field(&mut self) -> Result<Option<FieldLine<'a>>> {
        if self.in_body {
            return Ok(None);
        }
        if self.pos >= self.data.len() {
            self.in_body = true;
            return Ok(None);
        }

        let line = self.take_line();

        if is_blank(line) {
            self.in_body = true;
            self.separator = line;
            return Ok(None);
        }

        if line[0] == b' ' || line[0] == b'\t' {
            return Ok(Some(FieldLine {
                name: None,
                raw: line,
                continuation: true,
            }));
        }

        match find_colon(line) {
            Some(colon) => {
                if colon > MAX_NAME_LEN {
                    return Err(MimeError::FieldTooLong {
                        offset: self.base + (self.pos - line.len()) as u64,
                        limit: MAX_NAME_LEN,
                    });
                }
                let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
                Ok(Some(FieldLine {
                    name: Some(name),
                    raw: line,
                    continuation: false,
                }))
            }
            None => {
                // A line with no colon that is not a continuation: real-world
                // messages sometimes omit the blank separator. Treat it as
                // the first body line.
                self.pos -= line.len();
                self.in_body = true;
                Ok(None)
            }
        }
    }

    /// Offset of the first body byte within the window.
    pub fn body_offset(&self) -> usize {
        debug_assert!(self.in_body);
        self.pos
    }

    /// Exact bytes of the blank line that separated headers from body
    /// (empty when the message had no separator).
    pub fn separator(&self) -> &'a [u8] {
        self.separator
    }

    fn take_line(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        let end = match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => nl + 1,
            None => rest.len(),
        };
        self.pos += end;
        &rest[..end]
    }
}

/// Blank line: nothing but the terminator.
fn is_blank(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n")
}

/// Position of the name/value colon, rejecting colons after whitespace
/// (those indicate a garbled line, not a field).
fn find_colon(line: &[u8]) -> Option<usize> {
    for (i, &b) in line.iter().enumerate() {
        match b {
            b':' => return Some(i),
            b' ' | b'\t' | b'\n' | b'\r' => return None,
            _ => {}
        }
    }
    None
}
