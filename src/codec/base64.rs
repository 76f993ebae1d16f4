//! Base64 decode/encode for message bodies.
//!
//! The decoder accepts embedded whitespace and newlines anywhere (mail in
//! the wild folds base64 freely) and rejects only truly invalid characters.
//! The encoder wraps at the RFC 2045 76-column limit.

use crate::model::content::LineEnding;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Wrap column for encoded output.
const WRAP: usize = 76;

fn value_of(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decode base64, skipping whitespace, stopping at padding.
///
/// Returns a reason string on invalid input.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut quad = [0u8; 4];
    let mut qi = 0;
    let mut done = false;

    for (pos, &b) in input.iter().enumerate() {
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => continue,
            b'=' if qi >= 2 => {
                // Padding: flush the final partial quad.
                let n = qi;
                while qi < 4 {
                    quad[qi] = 0;
                    qi += 1;
                }
                out.push((quad[0] << 2) | (quad[1] >> 4));
                if n == 3 {
                    out.push((quad[1] << 4) | (quad[2] >> 2));
                }
                done = true;
                qi = 0;
            }
            _ if done => {
                // Trailing padding and whitespace are fine, data is not.
                if b != b'=' {
                    return Err(format!("data after padding at offset {pos}"));
                }
            }
            _ => match value_of(b) {
                Some(v) => {
                    quad[qi] = v;
                    qi += 1;
                    if qi == 4 {
                        out.push((quad[0] << 2) | (quad[1] >> 4));
                        out.push((quad[1] << 4) | (quad[2] >> 2));
                        out.push((quad[2] << 6) | quad[3]);
                        qi = 0;
                    }
                }
                None => {
                    return Err(format!(
                        "invalid base64 character {:?} at offset {pos}",
                        b as char
                    ))
                }
            },
        }
    }

    // Unpadded trailing quad: tolerate it, mail truncates padding often.
    match qi {
        0 | 1 => {}
        2 => out.push((quad[0] << 2) | (quad[1] >> 4)),
        3 => {
            out.push((quad[0] << 2) | (quad[1] >> 4));
            out.push((quad[1] << 4) | (quad[2] >> 2));
        }
        _ => unreachable!(),
    }

    Ok(out)
}

/// Encode to base64 wrapped at 76 columns with the given line ending.
pub fn encode(input: &[u8], ending: LineEnding) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() / 3 * 4 + input.len() / 54 + 4);
    let mut col = 0;

    for chunk in input.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied().unwrap_or(0);
        let b2 = chunk.get(2).copied().unwrap_or(0);

        let mut enc = [
            ALPHABET[(b0 >> 2) as usize],
            ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize],
            ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize],
            ALPHABET[(b2 & 0x3f) as usize],
        ];
        if chunk.len() < 3 {
            enc[3] = b'=';
        }
        if chunk.len() < 2 {
            enc[2] = b'=';
        }

        if col >= WRAP {
            out.extend_from_slice(ending.as_bytes());
            col = 0;
        }
        out.extend_from_slice(&enc);
        col += 4;
    }

    if !input.is_empty() {
        out.extend_from_slice(ending.as_bytes());
    }
    out
}
