//! Content-Type / Content-Disposition value grammar.
//!
//! Parses `type "/" subtype *(";" parameter)` per RFC 2045, with RFC 2231
//! extended and continued parameters reassembled into single logical
//! parameters. Deliberately lenient: malformed parameter lists surface as
//! recoverable defects while the type/subtype prefix is still returned, so
//! the tree can be built for further processing.

use encoding_rs::Encoding;
use tracing::warn;

use crate::error::{MimeError, Result};
use crate::model::content::Defect;
use crate::model::params::{is_token_char, percent_decode, Parameter};

/// Result of parsing a Content-Type value.
#[derive(Debug)]
pub struct ParsedContentType {
    pub type_name: String,
    pub subtype_name: String,
    pub params: Vec<Parameter>,
    pub defects: Vec<Defect>,
}

/// Result of parsing a Content-Disposition value.
#[derive(Debug)]
pub struct ParsedDisposition {
    pub kind: String,
    pub params: Vec<Parameter>,
    pub defects: Vec<Defect>,
}

/// Parse a Content-Type header value.
///
/// Fails only when not even the `type/subtype` prefix can be read; every
/// parameter-level problem is a defect, not an error.
pub fn parse_content_type(value: &str) -> Result<ParsedContentType> {
    let mut s = Scanner::new(value);
    s.skip_cfws();
    let type_name = s.take_token();
    if type_name.is_empty() || !s.eat(b'/') {
        return Err(MimeError::ParseError {
            offset: 0,
            reason: format!("not a type/subtype value: {value:?}"),
        });
    }
    let subtype_name = s.take_token();
    if subtype_name.is_empty() {
        return Err(MimeError::ParseError {
            offset: 0,
            reason: format!("missing subtype in {value:?}"),
        });
    }

    let mut defects = Vec::new();
    let params = parse_params(&mut s, &mut defects);
    Ok(ParsedContentType {
        type_name,
        subtype_name,
        params,
        defects,
    })
}

/// Parse a Content-Disposition header value.
pub fn parse_disposition(value: &str) -> Result<ParsedDisposition> {
    let mut s = Scanner::new(value);
    s.skip_cfws();
    let kind = s.take_token();
    if kind.is_empty() {
        return Err(MimeError::ParseError {
            offset: 0,
            reason: format!("empty disposition in {value:?}"),
        });
    }
    let mut defects = Vec::new();
    let params = parse_params(&mut s, &mut defects);
    Ok(ParsedDisposition {
        kind: kind.to_ascii_lowercase(),
        params,
        defects,
    })
}

/// One raw parameter before RFC 2231 reassembly.
struct RawParam {
    base: String,
    section: Option<u32>,
    extended: bool,
    value: String,
}

/// Parse the `*(";" parameter)` tail and reassemble RFC 2231 segments.
fn parse_params(s: &mut Scanner, defects: &mut Vec<Defect>) -> Vec<Parameter> {
    let mut raw: Vec<RawParam> = Vec::new();

    loop {
        s.skip_cfws();
        if s.at_end() {
            break;
        }
        if !s.eat(b';') {
            defects.push(Defect::ParamSyntax(format!(
                "expected ';' before {:?}",
                s.rest()
            )));
            break;
        }
        s.skip_cfws();
        if s.at_end() {
            // `type/subtype;` with nothing after — the trailing-punctuation
            // defect the normalization pass strips.
            defects.push(Defect::TrailingPunctuation);
            break;
        }

        let attr = s.take_token();
        if attr.is_empty() {
            defects.push(Defect::ParamSyntax(format!(
                "missing attribute name before {:?}",
                s.rest()
            )));
            break;
        }
        s.skip_cfws();
        if !s.eat(b'=') {
            defects.push(Defect::ParamSyntax(format!("missing '=' after '{attr}'")));
            // Resync at the next ';' so later parameters still parse.
            s.skip_to_semicolon();
            continue;
        }
        s.skip_cfws();

        let value = match s.take_value() {
            Ok(v) => v,
            Err(msg) => {
                defects.push(Defect::ParamSyntax(msg));
                s.skip_to_semicolon();
                continue;
            }
        };

        let (base, section, extended) = split_rfc2231_name(&attr);
        raw.push(RawParam {
            base,
            section,
            extended,
            value,
        });
    }

    assemble(raw, defects)
}

/// Split `name*0*` style attributes into (base, section, extended).
fn split_rfc2231_name(attr: &str) -> (String, Option<u32>, bool) {
    let mut name = attr;
    let mut extended = false;
    if let Some(stripped) = name.strip_suffix('*') {
        extended = true;
        name = stripped;
    }
    let mut section = None;
    if let Some((base, digits)) = name.rsplit_once('*') {
        if let Ok(n) = digits.parse::<u32>() {
            section = Some(n);
            name = base;
        }
    }
    (name.to_ascii_lowercase(), section, extended)
}

/// Reassemble continuation segments in section order and decode extended
/// values into a single logical parameter per attribute.
fn assemble(raw: Vec<RawParam>, defects: &mut Vec<Defect>) -> Vec<Parameter> {
    let mut out: Vec<Parameter> = Vec::new();
    let mut consumed = vec![false; raw.len()];

    for i in 0..raw.len() {
        if consumed[i] {
            continue;
        }
        let base = raw[i].base.clone();

        if out.iter().any(|p| p.name == base) {
            defects.push(Defect::DuplicateParameter(base.clone()));
        }

        if raw[i].section.is_none() {
            consumed[i] = true;
            let p = &raw[i];
            if p.extended {
                out.push(decode_extended_initial(&base, &p.value));
            } else {
                out.push(Parameter::new(base, p.value.clone()));
            }
            continue;
        }

        // Continued parameter: gather every segment of this attribute.
        let mut segments: Vec<(u32, usize)> = Vec::new();
        for (j, p) in raw.iter().enumerate() {
            if !consumed[j] && p.base == base {
                if let Some(n) = p.section {
                    segments.push((n, j));
                    consumed[j] = true;
                }
            }
        }
        segments.sort_by_key(|&(n, _)| n);

        let mut charset = None;
        let mut language = None;
        let mut bytes: Vec<u8> = Vec::new();
        for (k, &(_, j)) in segments.iter().enumerate() {
            let p = &raw[j];
            if p.extended {
                let text = if k == 0 {
                    let (cs, lang, rest) = split_charset_prefix(&p.value);
                    charset = cs;
                    language = lang;
                    rest
                } else {
                    p.value.clone()
                };
                bytes.extend_from_slice(&percent_decode(&text));
            } else {
                bytes.extend_from_slice(p.value.as_bytes());
            }
        }

        let value = decode_with_charset(charset.as_deref(), &bytes);
        out.push(Parameter {
            name: base,
            value,
            charset,
            language,
        });
    }

    out
}

/// Decode a single-segment extended value (`name*=charset'lang'pct`).
fn decode_extended_initial(base: &str, raw_value: &str) -> Parameter {
    let (charset, language, rest) = split_charset_prefix(raw_value);
    let bytes = percent_decode(&rest);
    let value = decode_with_charset(charset.as_deref(), &bytes);
    Parameter {
        name: base.to_string(),
        value,
        charset,
        language,
    }
}

/// Split the `charset'language'` prefix off an extended value.
fn split_charset_prefix(v: &str) -> (Option<String>, Option<String>, String) {
    let mut it = v.splitn(3, '\'');
    match (it.next(), it.next(), it.next()) {
        (Some(cs), Some(lang), Some(rest)) => (
            (!cs.is_empty()).then(|| cs.to_string()),
            (!lang.is_empty()).then(|| lang.to_string()),
            rest.to_string(),
        ),
        // No prefix at all; treat the whole thing as the value.
        _ => (None, None, v.to_string()),
    }
}

/// Convert raw bytes to UTF-8 using the declared charset, if known.
fn decode_with_charset(charset: Option<&str>, bytes: &[u8]) -> String {
    match charset {
        Some(label) => match Encoding::for_label(label.as_bytes()) {
            Some(enc) => {
                let (decoded, _, _) = enc.decode(bytes);
                decoded.into_owned()
            }
            None => {
                warn!(charset = label, "Unknown RFC 2231 charset, using UTF-8 lossy");
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Byte scanner over a header value.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn rest(&self) -> String {
        String::from_utf8_lossy(&self.bytes[self.pos.min(self.bytes.len())..]).into_owned()
    }

    /// Skip whitespace and RFC 822 comments (nested parentheses).
    fn skip_cfws(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                self.pos += 1;
            }
            if self.peek() == Some(b'(') {
                let mut depth = 0usize;
                while let Some(b) = self.peek() {
                    self.pos += 1;
                    match b {
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        b'\\' => {
                            self.pos += 1;
                        }
                        _ => {}
                    }
                }
            } else {
                return;
            }
        }
    }

    fn take_token(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_token_char(b) {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    /// A parameter value: token or quoted-string with backslash escapes.
    fn take_value(&mut self) -> std::result::Result<String, String> {
        if self.eat(b'"') {
            let mut out = String::new();
            loop {
                match self.peek() {
                    None => return Err(format!("unterminated quoted string: \"{out}")),
                    Some(b'"') => {
                        self.pos += 1;
                        return Ok(out);
                    }
                    Some(b'\\') => {
                        self.pos += 1;
                        if let Some(b) = self.peek() {
                            out.push(b as char);
                            self.pos += 1;
                        }
                    }
                    Some(b) => {
                        out.push(b as char);
                        self.pos += 1;
                    }
                }
            }
        } else {
            let tok = self.take_token();
            if tok.is_empty() {
                Err(format!("empty parameter value before {:?}", self.rest()))
            } else {
                Ok(tok)
            }
        }
    }

    fn skip_to_semicolon(&mut self) {
        while let Some(b) = self.peek() {
            if b == b';' {
                return;
            }
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::find_param;

    #[test]
    fn test_basic_type_subtype() {
        let ct = parse_content_type("text/plain").unwrap();
        assert_eq!(ct.type_name, "text");
        assert_eq!(ct.subtype_name, "plain");
        assert!(ct.params.is_empty());
        assert!(ct.defects.is_empty());
    }

    #[test]
    fn test_params_with_quoting() {
        let ct = parse_content_type("multipart/mixed; boundary=\"=_abc def\"; charset=us-ascii")
            .unwrap();
        assert_eq!(find_param(&ct.params, "boundary").unwrap().value, "=_abc def");
        assert_eq!(find_param(&ct.params, "charset").unwrap().value, "us-ascii");
    }

    #[test]
    fn test_quoted_escapes() {
        let ct = parse_content_type(r#"application/pdf; name="a\"b\\c""#).unwrap();
        assert_eq!(find_param(&ct.params, "name").unwrap().value, "a\"b\\c");
    }

    #[test]
    fn test_comment_skipping() {
        let ct = parse_content_type("text/plain (plain text); charset=utf-8 (Unicode)").unwrap();
        assert_eq!(ct.type_name, "text");
        assert_eq!(find_param(&ct.params, "charset").unwrap().value, "utf-8");
    }

    #[test]
    fn test_rfc2231_extended_value() {
        let ct =
            parse_content_type("application/x-stuff; title*=us-ascii'en-us'This%20is%20a%20test")
                .unwrap();
        let p = find_param(&ct.params, "title").unwrap();
        assert_eq!(p.value, "This is a test");
        assert_eq!(p.charset.as_deref(), Some("us-ascii"));
        assert_eq!(p.language.as_deref(), Some("en-us"));
    }

    #[test]
    fn test_rfc2231_continuations() {
        let ct = parse_content_type(
            "message/external-body; access-type=URL; \
             URL*0=\"ftp://\"; URL*1=\"cs.utk.edu/pub/moore/bulk-mailer/bulk-mailer.tar\"",
        )
        .unwrap();
        let p = find_param(&ct.params, "url").unwrap();
        assert_eq!(
            p.value,
            "ftp://cs.utk.edu/pub/moore/bulk-mailer/bulk-mailer.tar"
        );
    }

    #[test]
    fn test_rfc2231_mixed_continuation() {
        let ct = parse_content_type(
            "application/x-stuff; title*0*=us-ascii'en'This%20is%20even%20more%20; \
             title*1*=%2A%2A%2Afun%2A%2A%2A%20; title*2=\"isn't it!\"",
        )
        .unwrap();
        let p = find_param(&ct.params, "title").unwrap();
        assert_eq!(p.value, "This is even more ***fun*** isn't it!");
        assert_eq!(p.charset.as_deref(), Some("us-ascii"));
    }

    #[test]
    fn test_rfc2231_utf8_filename() {
        let ct = parse_content_type(
            "application/pdf; filename*=UTF-8''caf%C3%A9%20menu.pdf",
        )
        .unwrap();
        assert_eq!(find_param(&ct.params, "filename").unwrap().value, "café menu.pdf");
    }

    #[test]
    fn test_trailing_semicolon_is_defect() {
        let ct = parse_content_type("text/plain; charset=utf-8;").unwrap();
        assert_eq!(find_param(&ct.params, "charset").unwrap().value, "utf-8");
        assert!(ct.defects.contains(&Defect::TrailingPunctuation));
    }

    #[test]
    fn test_unterminated_quote_recovers_type() {
        let ct = parse_content_type("text/plain; name=\"oops").unwrap();
        assert_eq!(ct.type_name, "text");
        assert!(ct
            .defects
            .iter()
            .any(|d| matches!(d, Defect::ParamSyntax(_))));
    }

    #[test]
    fn test_missing_equals_resyncs() {
        let ct = parse_content_type("text/plain; charset; format=flowed").unwrap();
        assert!(find_param(&ct.params, "format").is_some());
        assert!(ct
            .defects
            .iter()
            .any(|d| matches!(d, Defect::ParamSyntax(_))));
    }

    #[test]
    fn test_duplicate_parameter_flagged() {
        let ct = parse_content_type("text/plain; charset=utf-8; charset=latin1").unwrap();
        assert_eq!(ct.params.len(), 2);
        assert!(ct
            .defects
            .contains(&Defect::DuplicateParameter("charset".to_string())));
    }

    #[test]
    fn test_garbage_value_is_error() {
        assert!(parse_content_type("not a content type").is_err());
        assert!(parse_content_type("text").is_err());
    }

    #[test]
    fn test_disposition() {
        let d = parse_disposition("attachment; filename=report.pdf").unwrap();
        assert_eq!(d.kind, "attachment");
        assert_eq!(find_param(&d.params, "filename").unwrap().value, "report.pdf");
    }
}
