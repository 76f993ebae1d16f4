//! Content-Type / Content-Disposition parameter model.
//!
//! Parameters keep their original order because output fidelity depends on
//! it. Names are case-insensitively unique in practice, but duplicates are
//! tolerated here and surfaced as a parse defect, not an error.

/// One `name=value` parameter, possibly carrying RFC 2231 charset/language.
///
/// The value is stored decoded (quoted-string unescaped, RFC 2231
/// percent-decoding applied and converted to UTF-8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Attribute name, lowercased.
    pub name: String,
    /// Decoded value.
    pub value: String,
    /// Original charset label from an RFC 2231 extended value.
    pub charset: Option<String>,
    /// Language tag from an RFC 2231 extended value.
    pub language: Option<String>,
}

impl Parameter {
    /// Plain parameter without charset or language.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            value: value.into(),
            charset: None,
            language: None,
        }
    }

    /// Render this parameter as it should appear in a regenerated header.
    ///
    /// Token values are emitted bare, values with specials are quoted, and
    /// values that carried (or need) a charset become RFC 2231 extended
    /// values.
    pub fn format(&self) -> String {
        if self.charset.is_some() || self.language.is_some() || !self.value.is_ascii() {
            let charset = self.charset.as_deref().unwrap_or("utf-8");
            let language = self.language.as_deref().unwrap_or("");
            format!(
                "{}*={}'{}'{}",
                self.name,
                charset,
                language,
                percent_encode(self.value.as_bytes())
            )
        } else if is_token(&self.value) && !self.value.is_empty() {
            format!("{}={}", self.name, self.value)
        } else {
            format!("{}=\"{}\"", self.name, quote_escape(&self.value))
        }
    }
}

/// A Content-Disposition value: disposition type plus its parameters.
#[derive(Debug, Clone, Default)]
pub struct Disposition {
    /// Disposition type, lowercased (`inline`, `attachment`, ...).
    pub kind: String,
    /// Ordered parameter list.
    pub params: Vec<Parameter>,
}

/// Find a parameter by name, case-insensitively.
pub fn find_param<'a>(params: &'a [Parameter], name: &str) -> Option<&'a Parameter> {
    params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Find a parameter by name and return a mutable reference.
pub fn find_param_mut<'a>(params: &'a mut [Parameter], name: &str) -> Option<&'a mut Parameter> {
    params
        .iter_mut()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Format a parameter list as `; name=value; ...` (empty string when empty).
pub fn format_params(params: &[Parameter]) -> String {
    let mut out = String::new();
    for p in params {
        out.push_str("; ");
        out.push_str(&p.format());
    }
    out
}

/// RFC 2045 token check: printable US-ASCII with no tspecials.
pub fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}

/// A single RFC 2045 token character.
pub fn is_token_char(b: u8) -> bool {
    matches!(b, 0x21..=0x7e)
        && !matches!(
            b,
            b'(' | b')'
                | b'<'
                | b'>'
                | b'@'
                | b','
                | b';'
                | b':'
                | b'\\'
                | b'"'
                | b'/'
                | b'['
                | b']'
                | b'?'
                | b'='
        )
}

/// Escape backslashes and quotes for a quoted-string value.
fn quote_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Percent-encode bytes for an RFC 2231 extended value.
///
/// Attribute characters pass through; everything else becomes `%XX`.
pub fn percent_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if is_token_char(b) && b != b'%' && b != b'\'' && b != b'*' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Percent-decode an RFC 2231 extended value. Invalid escapes pass through.
pub fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(hex) = bytes.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok()) {
                if let Ok(v) = u8::from_str_radix(hex, 16) {
                    out.push(v);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_value_bare() {
        let p = Parameter::new("charset", "us-ascii");
        assert_eq!(p.format(), "charset=us-ascii");
    }

    #[test]
    fn test_value_with_specials_is_quoted() {
        let p = Parameter::new("name", "hello world.txt");
        assert_eq!(p.format(), "name=\"hello world.txt\"");
    }

    #[test]
    fn test_quote_escaping() {
        let p = Parameter::new("name", "a\"b\\c");
        assert_eq!(p.format(), "name=\"a\\\"b\\\\c\"");
    }

    #[test]
    fn test_extended_value_format() {
        let mut p = Parameter::new("filename", "café.txt");
        p.charset = Some("utf-8".to_string());
        assert_eq!(p.format(), "filename*=utf-8''caf%C3%A9.txt");
    }

    #[test]
    fn test_percent_roundtrip() {
        let original = "r\u{e9}sum\u{e9} final.pdf";
        let enc = percent_encode(original.as_bytes());
        assert_eq!(percent_decode(&enc), original.as_bytes());
    }

    #[test]
    fn test_find_param_case_insensitive() {
        let params = vec![Parameter::new("Boundary", "abc")];
        assert!(find_param(&params, "boundary").is_some());
        assert!(find_param(&params, "BOUNDARY").is_some());
        assert!(find_param(&params, "charset").is_none());
    }

    #[test]
    fn test_format_params_ordering() {
        let params = vec![
            Parameter::new("charset", "utf-8"),
            Parameter::new("format", "flowed"),
        ];
        assert_eq!(format_params(&params), "; charset=utf-8; format=flowed");
    }
}
