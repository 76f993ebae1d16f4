//! Recursive MIME tree parser.
//!
//! Turns a message window into a [`ContentNode`] tree. Parts keep byte
//! ranges into the shared source rather than copying bytes; a multipart's
//! children are parsed recursively on their own sub-windows. Tolerant of
//! real-world damage: parameter-list problems, boundary mismatches and
//! illegal composite encodings become node defects, and an unparsable child
//! inside a multipart is demoted to an opaque leaf so its siblings survive.

use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::error::{MimeError, Result};
use crate::model::content::{
    Children, ContentKind, ContentNode, ContentSource, Defect, HeaderField, LineEnding,
    MessageSubtype, MultipartBody, MultipartSubtype, TransferEncoding,
};
use crate::model::params::{find_param, Parameter};
use crate::parser::content_type::{parse_content_type, parse_disposition};
use crate::parser::fields::FieldReader;
use crate::source::MessageSource;

/// Default nesting depth limit, matching the config default.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Recursive parser with a configurable depth budget.
pub struct TreeParser {
    max_depth: usize,
}

impl Default for TreeParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl TreeParser {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Parse a complete message source into a content tree.
    pub fn parse(&self, source: &Arc<MessageSource>) -> Result<ContentNode> {
        let mut root = self.parse_window(source, 0, source.len(), 1, false)?;
        root.renumber();
        Ok(root)
    }

    /// Parse an in-memory buffer (used when re-inspecting transform output).
    pub fn parse_bytes(&self, bytes: Vec<u8>) -> Result<ContentNode> {
        let source = MessageSource::from_bytes(bytes);
        self.parse(&source)
    }

    /// Parse one `[begin, end)` window of the source at the given depth.
    ///
    /// `in_digest` selects the multipart/digest default child type
    /// (message/rfc822 instead of text/plain, RFC 2046 §5.1.5).
    fn parse_window(
        &self,
        source: &Arc<MessageSource>,
        begin: u64,
        end: u64,
        depth: usize,
        in_digest: bool,
    ) -> Result<ContentNode> {
        if depth > self.max_depth {
            return Err(MimeError::NestingTooDeep {
                part: String::new(),
                depth,
                limit: self.max_depth,
            });
        }

        let window = source.range(begin, end);
        let mut reader = FieldReader::new(window, begin);
        let mut headers: Vec<HeaderField> = Vec::new();

        while let Some(line) = reader.next_field()? {
            if line.continuation {
                match headers.last_mut() {
                    Some(last) => last.raw.extend_from_slice(line.raw),
                    // A continuation with nothing to continue; keep the
                    // bytes so the round trip stays exact.
                    None => headers.push(HeaderField {
                        name: String::new(),
                        raw: line.raw.to_vec(),
                    }),
                }
            } else {
                headers.push(HeaderField {
                    name: line.name.unwrap_or_default(),
                    raw: line.raw.to_vec(),
                });
            }
        }

        let body_begin = begin + reader.body_offset() as u64;
        let body_separator = reader.separator().to_vec();
        let line_ending = detect_line_ending(&headers, &body_separator);

        let mut defects: Vec<Defect> = Vec::new();

        // Classify the content type, defaulting per context when absent.
        let ct_header = headers.iter().find(|h| h.is("Content-Type"));
        let (type_name, subtype_name, parameters) = match ct_header {
            Some(h) => match parse_content_type(&h.value()) {
                Ok(ct) => {
                    defects.extend(ct.defects);
                    (ct.type_name, ct.subtype_name, ct.params)
                }
                Err(e) => {
                    // Unparsable Content-Type: treat the content as opaque.
                    defects.push(Defect::ParamSyntax(e.to_string()));
                    ("application".to_string(), "octet-stream".to_string(), vec![])
                }
            },
            None if in_digest => ("message".to_string(), "rfc822".to_string(), vec![]),
            None => (
                "text".to_string(),
                "plain".to_string(),
                vec![Parameter::new("charset", "us-ascii")],
            ),
        };
        let kind = ContentKind::classify(&type_name, &subtype_name);

        let transfer_encoding = match headers
            .iter()
            .find(|h| h.is("Content-Transfer-Encoding"))
            .map(|h| h.value())
        {
            Some(v) => match TransferEncoding::from_str(&v) {
                Ok(enc) => enc,
                Err(_) => {
                    defects.push(Defect::ParamSyntax(format!(
                        "unknown transfer encoding '{v}'"
                    )));
                    // Conservative: unknown encodings are treated as opaque
                    // binary so nothing re-interprets the bytes.
                    TransferEncoding::Binary
                }
            },
            None => TransferEncoding::SevenBit,
        };

        if kind.is_composite() && !transfer_encoding.is_composite_safe() {
            defects.push(Defect::IllegalCompositeEncoding(
                transfer_encoding.to_string(),
            ));
        }

        let disposition = match headers
            .iter()
            .find(|h| h.is("Content-Disposition"))
            .map(|h| h.value())
        {
            Some(v) => match parse_disposition(&v) {
                Ok(d) => {
                    defects.extend(d.defects);
                    Some(crate::model::params::Disposition {
                        kind: d.kind,
                        params: d.params,
                    })
                }
                Err(e) => {
                    defects.push(Defect::ParamSyntax(e.to_string()));
                    None
                }
            },
            None => None,
        };

        let mut node = ContentNode {
            kind,
            type_name,
            subtype_name,
            parameters,
            headers,
            disposition,
            transfer_encoding,
            requested_encoding: transfer_encoding,
            body: ContentSource::Range {
                source: Arc::clone(source),
                begin: body_begin,
                end,
            },
            body_separator,
            children: Children::None,
            part_number: String::new(),
            line_ending,
            defects,
            dirty: false,
            external_parent: None,
        };

        match node.kind {
            ContentKind::Multipart(_) => {
                self.parse_multipart(source, &mut node, body_begin, end, depth)?
            }
            ContentKind::Message(MessageSubtype::Rfc822 | MessageSubtype::Partial) => {
                let inner = self.parse_window(source, body_begin, end, depth + 1, false)?;
                node.children = Children::Message(Box::new(inner));
            }
            ContentKind::Message(MessageSubtype::External) => {
                let mut phantom = self.parse_phantom(source, body_begin, end)?;
                phantom.external_parent = Some(String::new());
                node.children = Children::Message(Box::new(phantom));
            }
            _ => {}
        }

        Ok(node)
    }

    /// Split a multipart body into children along its boundary delimiters.
    fn parse_multipart(
        &self,
        source: &Arc<MessageSource>,
        node: &mut ContentNode,
        body_begin: u64,
        body_end: u64,
        depth: usize,
    ) -> Result<()> {
        let boundary = match find_param(&node.parameters, "boundary") {
            Some(p) if !p.value.is_empty() => p.value.clone(),
            _ => {
                return Err(MimeError::MissingBoundary {
                    part: node.part_number.clone(),
                })
            }
        };

        let in_digest = node.kind == ContentKind::Multipart(MultipartSubtype::Digest);
        match self.split_multipart_body(source, body_begin, body_end, &boundary, depth, in_digest)? {
            Some(mp) => node.children = Children::Multipart(mp),
            None => {
                // Header boundary never appears in the body: flag for the
                // repair pass, keep the node childless with its body intact.
                warn!(boundary = %boundary, "Multipart boundary not found in body");
                node.defects.push(Defect::BoundaryMismatch {
                    declared: boundary.clone(),
                });
                node.children = Children::Multipart(MultipartBody {
                    boundary,
                    preamble: Vec::new(),
                    epilogue: Vec::new(),
                    parts: Vec::new(),
                });
            }
        }
        Ok(())
    }

    /// Split a multipart body window along a boundary token and parse the
    /// children. Returns `None` when the token matches no delimiter line.
    /// Also used by the boundary-repair pass to re-split with a corrected
    /// token.
    pub(crate) fn split_multipart_body(
        &self,
        source: &Arc<MessageSource>,
        body_begin: u64,
        body_end: u64,
        boundary: &str,
        depth: usize,
        in_digest: bool,
    ) -> Result<Option<MultipartBody>> {
        let body = source.range(body_begin, body_end);
        let delims = scan_delimiters(body, boundary.as_bytes());
        if delims.is_empty() {
            return Ok(None);
        }

        let preamble = body[..delims[0].line_start].to_vec();
        let mut parts: Vec<ContentNode> = Vec::new();
        let mut epilogue = Vec::new();
        let mut closed = false;

        for (i, d) in delims.iter().enumerate() {
            if d.closing {
                epilogue = body[d.line_end..].to_vec();
                closed = true;
                break;
            }
            let child_begin = body_begin + d.line_end as u64;
            let child_end = match delims.get(i + 1) {
                Some(next) => body_begin + next.line_start as u64,
                None => body_end,
            };
            match self.parse_window(source, child_begin, child_end, depth + 1, in_digest) {
                Ok(child) => parts.push(child),
                Err(e @ MimeError::NestingTooDeep { .. }) => return Err(e),
                Err(e) if e.is_subtree_fatal() => {
                    // Keep the bytes opaque so siblings still parse.
                    warn!(error = %e, "Demoting unparsable child part to opaque leaf");
                    let mut leaf = opaque_leaf(source, child_begin, child_end);
                    leaf.defects.push(Defect::UnparsableChild(e.to_string()));
                    parts.push(leaf);
                }
                Err(e) => return Err(e),
            }
        }

        if !closed {
            warn!(boundary = %boundary, "Multipart not terminated by a closing delimiter");
        }

        Ok(Some(MultipartBody {
            boundary: boundary.to_string(),
            preamble,
            epilogue,
            parts,
        }))
    }

    /// Read the phantom headers of a message/external-body without
    /// recursing into content — there is none locally.
    fn parse_phantom(
        &self,
        source: &Arc<MessageSource>,
        begin: u64,
        end: u64,
    ) -> Result<ContentNode> {
        let window = source.range(begin, end);
        let mut reader = FieldReader::new(window, begin);
        let mut headers: Vec<HeaderField> = Vec::new();
        while let Some(line) = reader.next_field()? {
            if line.continuation {
                if let Some(last) = headers.last_mut() {
                    last.raw.extend_from_slice(line.raw);
                }
            } else {
                headers.push(HeaderField {
                    name: line.name.unwrap_or_default(),
                    raw: line.raw.to_vec(),
                });
            }
        }
        let body_begin = begin + reader.body_offset() as u64;
        let separator = reader.separator().to_vec();
        let ending = detect_line_ending(&headers, &separator);

        let (type_name, subtype_name, parameters) = headers
            .iter()
            .find(|h| h.is("Content-Type"))
            .and_then(|h| parse_content_type(&h.value()).ok())
            .map(|ct| (ct.type_name, ct.subtype_name, ct.params))
            .unwrap_or_else(|| {
                (
                    "text".to_string(),
                    "plain".to_string(),
                    vec![Parameter::new("charset", "us-ascii")],
                )
            });

        Ok(ContentNode {
            kind: ContentKind::classify(&type_name, &subtype_name),
            type_name,
            subtype_name,
            parameters,
            headers,
            disposition: None,
            transfer_encoding: TransferEncoding::SevenBit,
            requested_encoding: TransferEncoding::SevenBit,
            body: ContentSource::Range {
                source: Arc::clone(source),
                begin: body_begin,
                end,
            },
            body_separator: separator,
            children: Children::None,
            part_number: String::new(),
            line_ending: ending,
            defects: Vec::new(),
            dirty: false,
            external_parent: None,
        })
    }
}

/// Build an opaque leaf covering a window whose structure could not be
/// parsed. The window is kept verbatim as the body.
fn opaque_leaf(source: &Arc<MessageSource>, begin: u64, end: u64) -> ContentNode {
    ContentNode {
        kind: ContentKind::Application,
        type_name: "application".to_string(),
        subtype_name: "octet-stream".to_string(),
        parameters: Vec::new(),
        headers: Vec::new(),
        disposition: None,
        transfer_encoding: TransferEncoding::Binary,
        requested_encoding: TransferEncoding::Binary,
        body: ContentSource::Range {
            source: Arc::clone(source),
            begin,
            end,
        },
        body_separator: Vec::new(),
        children: Children::None,
        part_number: String::new(),
        line_ending: LineEnding::Lf,
        defects: Vec::new(),
        dirty: false,
        external_parent: None,
    }
}

/// Detect the line ending convention from the header block.
fn detect_line_ending(headers: &[HeaderField], separator: &[u8]) -> LineEnding {
    let probe = headers
        .first()
        .map(|h| h.raw.as_slice())
        .unwrap_or(separator);
    if probe.ends_with(b"\r\n") {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    }
}

/// One boundary delimiter line within a multipart body.
#[derive(Debug)]
pub struct Delimiter {
    /// Offset of the `--` within the body window.
    pub line_start: usize,
    /// Offset one past the line terminator.
    pub line_end: usize,
    /// True for the terminal `--boundary--` form.
    pub closing: bool,
}

/// Scan a body for RFC 2046 §5.1.1 delimiter lines: `--boundary` at the
/// start of a line, optional terminal `--`, trailing whitespace ignored.
pub fn scan_delimiters(body: &[u8], boundary: &[u8]) -> Vec<Delimiter> {
    let mut out = Vec::new();
    let mut line_start = 0;

    while line_start < body.len() {
        let line_end = match body[line_start..].iter().position(|&b| b == b'\n') {
            Some(nl) => line_start + nl + 1,
            None => body.len(),
        };
        let line = &body[line_start..line_end];

        if let Some(closing) = match_delimiter(line, boundary) {
            out.push(Delimiter {
                line_start,
                line_end,
                closing,
            });
        }
        line_start = line_end;
    }
    out
}

/// Check one line against `--boundary[--]` + optional whitespace.
/// Returns `Some(closing)` when it is a delimiter.
fn match_delimiter(line: &[u8], boundary: &[u8]) -> Option<bool> {
    let rest = line.strip_prefix(b"--")?;
    let rest = rest.strip_prefix(boundary)?;
    let (rest, closing) = match rest.strip_prefix(b"--") {
        Some(r) => (r, true),
        None => (rest, false),
    };
    if rest
        .iter()
        .all(|&b| b == b' ' || b == b'\t' || b == b'\r' || b == b'\n')
    {
        Some(closing)
    } else {
        None
    }
}
