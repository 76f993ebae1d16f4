//! Data classification: the least-restrictive encoding a byte stream needs.
//!
//! This feeds the repair engine's encoding-selection policy and must be
//! exact: a transform only removes a transfer encoding when the classified
//! result would stay transportable.

use std::fmt;

/// Transport class of a decoded byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataClass {
    SevenBit,
    EightBit,
    Binary,
}

impl fmt::Display for DataClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
        })
    }
}

/// Classification result with the reason that forced it.
#[derive(Debug, Clone)]
pub struct Classification {
    pub class: DataClass,
    /// Why the stream is Binary (None for 7bit/8bit).
    pub reason: Option<String>,
}

/// Maximum line length in octets, terminator excluded (RFC 5322 §2.1.1).
const MAX_LINE_OCTETS: usize = 998;

/// Classify decoded bytes.
///
/// Binary: a NUL byte, any line exceeding 998 octets, or a carriage return
/// not immediately followed by a line feed. EightBit: any non-ASCII byte
/// without a binary condition. SevenBit otherwise.
pub fn classify(bytes: &[u8]) -> Classification {
    let mut line_len = 0usize;
    let mut has_high = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            0 => {
                return Classification {
                    class: DataClass::Binary,
                    reason: Some(format!("NUL byte at offset {i}")),
                }
            }
            b'\n' => line_len = 0,
            b'\r' => {
                if bytes.get(i + 1) != Some(&b'\n') {
                    return Classification {
                        class: DataClass::Binary,
                        reason: Some(format!("bare CR at offset {i}")),
                    };
                }
                // CR of a CRLF pair does not count toward line length.
            }
            b => {
                if b >= 0x80 {
                    has_high = true;
                }
                line_len += 1;
                if line_len > MAX_LINE_OCTETS {
                    return Classification {
                        class: DataClass::Binary,
                        reason: Some(format!("line length > {MAX_LINE_OCTETS}")),
                    };
                }
            }
        }
        i += 1;
    }

    Classification {
        class: if has_high {
            DataClass::EightBit
        } else {
            DataClass::SevenBit
        },
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seven_bit() {
        assert_eq!(classify(b"plain ascii text\n").class, DataClass::SevenBit);
        assert_eq!(classify(b"").class, DataClass::SevenBit);
    }

    #[test]
    fn test_eight_bit() {
        assert_eq!(classify("héllo\n".as_bytes()).class, DataClass::EightBit);
    }

    #[test]
    fn test_nul_is_binary() {
        let c = classify(b"abc\0def");
        assert_eq!(c.class, DataClass::Binary);
        assert!(c.reason.unwrap().contains("NUL"));
    }

    #[test]
    fn test_long_line_is_binary() {
        let mut data = vec![b'a'; 1100];
        data.push(b'\n');
        let c = classify(&data);
        assert_eq!(c.class, DataClass::Binary);
        assert_eq!(c.reason.as_deref(), Some("line length > 998"));
    }

    #[test]
    fn test_line_at_limit_is_fine() {
        let mut data = vec![b'a'; 998];
        data.push(b'\n');
        data.extend_from_slice(b"next line\n");
        assert_eq!(classify(&data).class, DataClass::SevenBit);
    }

    #[test]
    fn test_bare_cr_is_binary() {
        let c = classify(b"line one\rline two\n");
        assert_eq!(c.class, DataClass::Binary);
        assert!(c.reason.unwrap().contains("bare CR"));
    }

    #[test]
    fn test_crlf_is_not_binary() {
        assert_eq!(classify(b"one\r\ntwo\r\n").class, DataClass::SevenBit);
    }
}
