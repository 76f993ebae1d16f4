//! RFC 2047 encoded-word decoding.
//!
//! Used by the filename normalization pass: parameter values carrying
//! `=?charset?B?...?=` words (which RFC 2231 §5 forbids in parameters) are
//! decoded here and re-emitted as proper RFC 2231 extended values.
//!
//! If decoding fails for any token, the original text is preserved.

use encoding_rs::Encoding;
use tracing::warn;

use crate::codec::base64;

/// Decode all encoded-words in a header text fragment.
///
/// Returns the decoded text and whether any encoded-word was found (callers
/// use the flag to decide if a rewrite is needed at all).
pub fn decode_encoded_words(input: &str) -> (String, bool) {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut any = false;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded words is dropped
        // (RFC 2047 §6.2).
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        if let Some(word) = try_decode_one_word(after_start) {
            result.push_str(&word.text);
            remaining = &after_start[word.consumed..];
            any = true;
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    (result, any)
}

/// True when the text contains something that looks like an encoded word.
pub fn contains_encoded_word(s: &str) -> bool {
    let mut rest = s;
    while let Some(start) = rest.find("=?") {
        if try_decode_one_word(&rest[start + 2..]).is_some() {
            return true;
        }
        rest = &rest[start + 2..];
    }
    false
}

struct DecodedWord {
    text: String,
    /// Bytes consumed from the string *after* the initial `=?`.
    consumed: usize,
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding {
        "B" | "b" => base64::decode(encoded_text.as_bytes()).ok()?,
        "Q" | "q" => decode_q(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed,
    })
}

/// Q-encoding: underscores become spaces, `=XX` becomes a byte.
fn decode_q(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match u8::from_str_radix(
                    std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("zz"),
                    16,
                ) {
                    Ok(v) => {
                        out.push(v);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    match Encoding::for_label(charset.as_bytes()) {
        Some(enc) => {
            let (decoded, _, _) = enc.decode(bytes);
            decoded.into_owned()
        }
        None => {
            warn!(charset, "Unknown encoded-word charset, using UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_word() {
        let (text, any) = decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?=");
        assert_eq!(text, "Hola mundo");
        assert!(any);
    }

    #[test]
    fn test_decode_q_word() {
        let (text, _) = decode_encoded_words("=?ISO-8859-1?Q?caf=E9?=");
        assert_eq!(text, "café");
    }

    #[test]
    fn test_adjacent_words_drop_whitespace() {
        let (text, _) = decode_encoded_words("=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=");
        assert_eq!(text, "Hola mundo");
    }

    #[test]
    fn test_plain_text_passthrough() {
        let (text, any) = decode_encoded_words("report.pdf");
        assert_eq!(text, "report.pdf");
        assert!(!any);
    }

    #[test]
    fn test_malformed_word_preserved() {
        let (text, any) = decode_encoded_words("=?broken");
        assert_eq!(text, "=?broken");
        assert!(!any);
    }

    #[test]
    fn test_contains_encoded_word() {
        assert!(contains_encoded_word("=?UTF-8?Q?r=C3=A9sum=C3=A9.pdf?="));
        assert!(!contains_encoded_word("plain.pdf"));
        assert!(!contains_encoded_word("price =? unknown"));
    }

    #[test]
    fn test_underscore_is_space_in_q() {
        let (text, _) = decode_encoded_words("=?ISO-8859-1?Q?R=E9sum=E9_du_projet?=");
        assert_eq!(text, "Résumé du projet");
    }
}
