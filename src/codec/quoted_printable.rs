//! Quoted-printable decode/encode.
//!
//! Decoding is lenient: a literal `=` not followed by two hex digits or a
//! soft line break is passed through unchanged and flagged, rather than
//! aborting. Real-world mail contains plenty of these.

use crate::model::content::LineEnding;

/// Hex digit value, or None.
fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Decode quoted-printable content.
///
/// Returns the decoded bytes and a flag that is true when any invalid
/// escape was passed through leniently.
pub fn decode(input: &[u8]) -> (Vec<u8>, bool) {
    let mut out = Vec::with_capacity(input.len());
    let mut lenient = false;
    let mut i = 0;

    while i < input.len() {
        let b = input[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }

        // Soft line break: `=` at end of line swallows the terminator.
        if input.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }
        if input.get(i + 1) == Some(&b'\r') && input.get(i + 2) == Some(&b'\n') {
            i += 3;
            continue;
        }
        // `=` at end of input: a soft break cut off by truncation.
        if i + 1 >= input.len() {
            i += 1;
            continue;
        }

        match (
            input.get(i + 1).copied().and_then(hex_val),
            input.get(i + 2).copied().and_then(hex_val),
        ) {
            (Some(hi), Some(lo)) => {
                out.push((hi << 4) | lo);
                i += 3;
            }
            _ => {
                // Not a valid escape; keep the literal byte and flag it.
                lenient = true;
                out.push(b'=');
                i += 1;
            }
        }
    }

    (out, lenient)
}

/// Maximum encoded line length before a soft break (RFC 2045 limit is 76
/// including the soft-break `=`).
const MAX_LINE: usize = 75;

/// Encode bytes as quoted-printable with soft line breaks.
pub fn encode(input: &[u8], ending: LineEnding) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 8);
    let mut col = 0;

    let push_escaped = |out: &mut Vec<u8>, col: &mut usize, b: u8| {
        if *col + 3 > MAX_LINE {
            out.push(b'=');
            out.extend_from_slice(ending.as_bytes());
            *col = 0;
        }
        out.extend_from_slice(format!("={b:02X}").as_bytes());
        *col += 3;
    };

    let mut i = 0;
    while i < input.len() {
        let b = input[i];

        // Hard line break: emit as-is and reset the column.
        if b == b'\n' || (b == b'\r' && input.get(i + 1) == Some(&b'\n')) {
            // Trailing space/tab before a break must be escaped.
            if let Some(&last) = out.last() {
                if last == b' ' || last == b'\t' {
                    out.pop();
                    out.extend_from_slice(if last == b' ' { b"=20" } else { b"=09" });
                }
            }
            out.extend_from_slice(ending.as_bytes());
            col = 0;
            i += if b == b'\r' { 2 } else { 1 };
            continue;
        }

        match b {
            b'=' => push_escaped(&mut out, &mut col, b),
            b' ' | b'\t' => {
                if col + 1 > MAX_LINE {
                    out.push(b'=');
                    out.extend_from_slice(ending.as_bytes());
                    col = 0;
                }
                out.push(b);
                col += 1;
            }
            0x21..=0x7e => {
                if col + 1 > MAX_LINE {
                    out.push(b'=');
                    out.extend_from_slice(ending.as_bytes());
                    col = 0;
                }
                out.push(b);
                col += 1;
            }
            _ => push_escaped(&mut out, &mut col, b),
        }
        i += 1;
    }

    // A trailing space/tab with no following break also needs escaping.
    if let Some(&last) = out.last() {
        if last == b' ' || last == b'\t' {
            out.pop();
            out.extend_from_slice(if last == b' ' { b"=20" } else { b"=09" });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_escape() {
        let (out, lenient) = decode(b"caf=C3=A9");
        assert_eq!(out, "café".as_bytes());
        assert!(!lenient);
    }

    #[test]
    fn test_decode_soft_break() {
        let (out, _) = decode(b"one=\ntwo");
        assert_eq!(out, b"onetwo");
        let (out, _) = decode(b"one=\r\ntwo");
        assert_eq!(out, b"onetwo");
    }

    #[test]
    fn test_decode_invalid_escape_is_lenient() {
        let (out, lenient) = decode(b"price =1x00");
        assert_eq!(out, b"price =1x00");
        assert!(lenient);
    }

    #[test]
    fn test_encode_escapes_equals_and_high_bytes() {
        let enc = encode("a=b caf\u{e9}".as_bytes(), LineEnding::Lf);
        assert_eq!(enc, b"a=3Db caf=C3=A9");
    }

    #[test]
    fn test_encode_preserves_line_breaks() {
        let enc = encode(b"line one\nline two\n", LineEnding::Lf);
        assert_eq!(enc, b"line one\nline two\n");
    }

    #[test]
    fn test_encode_trailing_space_escaped() {
        let enc = encode(b"ends with space \nnext", LineEnding::Lf);
        assert_eq!(enc, b"ends with space=20\nnext");
    }

    #[test]
    fn test_encode_soft_wraps_long_lines() {
        let long = vec![b'x'; 200];
        let enc = encode(&long, LineEnding::Lf);
        for line in enc.split(|&b| b == b'\n') {
            assert!(line.len() <= 76);
        }
        let (decoded, lenient) = decode(&enc);
        assert_eq!(decoded, long);
        assert!(!lenient);
    }

    #[test]
    fn test_roundtrip_text() {
        let text = "Grüße aus München!\nZeile zwei mit = Zeichen.\n".as_bytes();
        let enc = encode(text, LineEnding::Lf);
        let (dec, lenient) = decode(&enc);
        assert_eq!(dec, text);
        assert!(!lenient);
    }
}
