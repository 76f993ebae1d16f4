//! The content node tree.
//!
//! A [`ContentNode`] is one node of a parsed MIME message. Nodes are created
//! only by the tree parser (from wire bytes) or by a transform pass
//! (synthetic nodes). Ownership is strictly tree-shaped: multiparts own an
//! ordered child list, message nodes own a single nested node, leaves own
//! nothing. Body bytes live either as a `[begin, end)` range into the shared
//! [`MessageSource`] or as an owned buffer produced by a transform — never
//! both.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::MimeError;
use crate::model::params::{format_params, Disposition, Parameter};
use crate::source::MessageSource;

/// Coarse classification of a part, derived from its `type/subtype`.
///
/// Unknown subtypes keep the coarse kind; the literal strings on the node
/// preserve the raw text for round-tripping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
    Audio,
    Video,
    Application,
    Message(MessageSubtype),
    Multipart(MultipartSubtype),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSubtype {
    Rfc822,
    Partial,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartSubtype {
    Mixed,
    Alternative,
    Digest,
    Parallel,
    Related,
    Unknown,
}

impl ContentKind {
    /// Classify literal type/subtype strings.
    ///
    /// Unrecognized top-level types fall back to `Application`, matching the
    /// RFC 2046 default treatment of unknown content.
    pub fn classify(type_name: &str, subtype_name: &str) -> Self {
        match type_name.to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "message" => Self::Message(match subtype_name.to_ascii_lowercase().as_str() {
                "partial" => MessageSubtype::Partial,
                "external-body" => MessageSubtype::External,
                _ => MessageSubtype::Rfc822,
            }),
            "multipart" => Self::Multipart(match subtype_name.to_ascii_lowercase().as_str() {
                "mixed" => MultipartSubtype::Mixed,
                "alternative" => MultipartSubtype::Alternative,
                "digest" => MultipartSubtype::Digest,
                "parallel" => MultipartSubtype::Parallel,
                "related" => MultipartSubtype::Related,
                _ => MultipartSubtype::Unknown,
            }),
            _ => Self::Application,
        }
    }

    /// Multipart or Message: a type that contains nested content.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Multipart(_) | Self::Message(_))
    }
}

/// Declared Content-Transfer-Encoding of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    #[default]
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
}

impl TransferEncoding {
    /// The only encodings RFC 2045 permits on a composite type.
    pub fn is_composite_safe(&self) -> bool {
        matches!(self, Self::SevenBit | Self::EightBit | Self::Binary)
    }

    /// True when decoding is the identity function.
    pub fn is_identity(&self) -> bool {
        self.is_composite_safe()
    }
}

impl FromStr for TransferEncoding {
    type Err = MimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("7bit") {
            Ok(Self::SevenBit)
        } else if s.eq_ignore_ascii_case("8bit") {
            Ok(Self::EightBit)
        } else if s.eq_ignore_ascii_case("binary") {
            Ok(Self::Binary)
        } else if s.eq_ignore_ascii_case("base64") {
            Ok(Self::Base64)
        } else if s.eq_ignore_ascii_case("quoted-printable") {
            Ok(Self::QuotedPrintable)
        } else {
            Err(MimeError::UnsupportedEncoding(s.to_string()))
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
        })
    }
}

/// Line ending convention of the message, detected from the header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }
}

/// One header field, kept byte-exact.
///
/// `raw` holds the complete original line(s): name, colon, folded
/// continuations and line terminators. The serializer re-emits it verbatim
/// for headers this engine does not regenerate.
#[derive(Debug, Clone)]
pub struct HeaderField {
    /// Field name as written (original case).
    pub name: String,
    /// Full raw bytes of the field, terminator included.
    pub raw: Vec<u8>,
}

impl HeaderField {
    /// Build a field from a name and value, using the given line ending.
    pub fn new(name: &str, value: &str, ending: LineEnding) -> Self {
        let mut raw = Vec::with_capacity(name.len() + value.len() + 4);
        raw.extend_from_slice(name.as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(ending.as_bytes());
        Self {
            name: name.to_string(),
            raw,
        }
    }

    /// Case-insensitive name match.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// The unfolded, trimmed field value.
    pub fn value(&self) -> String {
        let text = String::from_utf8_lossy(&self.raw);
        let mut out = String::new();
        for (i, line) in text.lines().enumerate() {
            let piece = if i == 0 {
                match line.find(':') {
                    Some(pos) => line[pos + 1..].trim(),
                    None => line.trim(),
                }
            } else {
                line.trim()
            };
            if !out.is_empty() && !piece.is_empty() {
                out.push(' ');
            }
            out.push_str(piece);
        }
        out
    }
}

/// Where a node's body bytes live. Exactly one variant is active; switching
/// from range to buffer invalidates the old range.
pub enum ContentSource {
    /// Zero-copy window into the shared backing source.
    Range {
        source: Arc<MessageSource>,
        begin: u64,
        end: u64,
    },
    /// Owned bytes produced by a transform or synthesized from scratch.
    Buffer(Vec<u8>),
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { begin, end, .. } => write!(f, "Range({begin}..{end})"),
            Self::Buffer(b) => write!(f, "Buffer({} bytes)", b.len()),
        }
    }
}

impl ContentSource {
    /// The body bytes, wherever they live.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Range { source, begin, end } => source.range(*begin, *end),
            Self::Buffer(b) => b,
        }
    }

    /// Length of the body in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Range { begin, end, .. } => end - begin,
            Self::Buffer(b) => b.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Child ownership: exactly one shape applies per kind.
#[derive(Debug)]
pub enum Children {
    /// Leaf kinds own nothing.
    None,
    /// Multipart owns an ordered part list plus framing bytes.
    Multipart(MultipartBody),
    /// Message/rfc822, message/partial and message/external-body own a
    /// single nested node.
    Message(Box<ContentNode>),
}

/// The structured body of a multipart node.
#[derive(Debug)]
pub struct MultipartBody {
    /// Boundary token as currently declared in the header.
    pub boundary: String,
    /// Literal bytes before the first delimiter, kept verbatim.
    pub preamble: Vec<u8>,
    /// Literal bytes after the closing delimiter, kept verbatim.
    pub epilogue: Vec<u8>,
    /// Ordered child parts.
    pub parts: Vec<ContentNode>,
}

/// Non-fatal conditions recorded during parsing or decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Defect {
    /// Malformed parameter list; parsing continued with what was salvaged.
    ParamSyntax(String),
    /// The same parameter name appeared more than once.
    DuplicateParameter(String),
    /// base64/quoted-printable declared on a multipart or message.
    IllegalCompositeEncoding(String),
    /// The declared boundary never matched the body delimiters.
    BoundaryMismatch { declared: String },
    /// Trailing `;` (or other spurious punctuation) after the last parameter.
    TrailingPunctuation,
    /// A `=` in quoted-printable content was not a valid escape.
    LenientQuotedPrintable,
    /// A child of a multipart could not be parsed and was kept opaque.
    UnparsableChild(String),
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParamSyntax(msg) => write!(f, "malformed parameter list: {msg}"),
            Self::DuplicateParameter(name) => write!(f, "duplicate parameter '{name}'"),
            Self::IllegalCompositeEncoding(enc) => {
                write!(f, "illegal '{enc}' encoding on a composite type")
            }
            Self::BoundaryMismatch { declared } => {
                write!(f, "declared boundary \"{declared}\" not found in body")
            }
            Self::TrailingPunctuation => write!(f, "trailing punctuation after parameters"),
            Self::LenientQuotedPrintable => write!(f, "invalid quoted-printable escape"),
            Self::UnparsableChild(msg) => write!(f, "unparsable child part: {msg}"),
        }
    }
}

/// One node in the parsed MIME tree.
#[derive(Debug)]
pub struct ContentNode {
    /// Coarse kind derived from the literal type/subtype.
    pub kind: ContentKind,
    /// Literal media type as parsed (original case preserved).
    pub type_name: String,
    /// Literal subtype as parsed.
    pub subtype_name: String,
    /// Ordered Content-Type parameters.
    pub parameters: Vec<Parameter>,
    /// All headers of this part, byte-exact and in order.
    pub headers: Vec<HeaderField>,
    /// Parsed Content-Disposition, if present.
    pub disposition: Option<Disposition>,
    /// Declared transfer encoding.
    pub transfer_encoding: TransferEncoding,
    /// Target encoding for re-serialization. Defaults to the declared one.
    pub requested_encoding: TransferEncoding,
    /// The raw (still transfer-encoded) body bytes.
    pub body: ContentSource,
    /// Exact bytes of the blank line separating headers from body.
    pub body_separator: Vec<u8>,
    /// Child ownership per kind.
    pub children: Children,
    /// Dotted-decimal address of this node ("1", "1.2", ...).
    pub part_number: String,
    /// Line ending convention detected in this part's header block.
    pub line_ending: LineEnding,
    /// Non-fatal conditions found while parsing this node.
    pub defects: Vec<Defect>,
    /// Set when a transform changed this node; the serializer regenerates
    /// dirty nodes instead of copying their source range.
    pub dirty: bool,
    /// Part number of the controlling node, set only on the placeholder
    /// child of a message/external-body (non-owning, diagnostics only).
    pub external_parent: Option<String>,
}

impl ContentNode {
    /// Build an empty leaf with an owned body, used for synthetic parts.
    pub fn synthetic(
        type_name: &str,
        subtype_name: &str,
        parameters: Vec<Parameter>,
        body: Vec<u8>,
        ending: LineEnding,
    ) -> Self {
        Self {
            kind: ContentKind::classify(type_name, subtype_name),
            type_name: type_name.to_string(),
            subtype_name: subtype_name.to_string(),
            parameters,
            headers: Vec::new(),
            disposition: None,
            transfer_encoding: TransferEncoding::SevenBit,
            requested_encoding: TransferEncoding::SevenBit,
            body: ContentSource::Buffer(body),
            body_separator: ending.as_bytes().to_vec(),
            children: Children::None,
            part_number: String::new(),
            line_ending: ending,
            defects: Vec::new(),
            dirty: true,
            external_parent: None,
        }
    }

    /// `type/subtype` with the literal spelling preserved.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.type_name, self.subtype_name)
    }

    /// True when this node matches a `type` or `type/subtype` pattern,
    /// case-insensitively.
    pub fn matches_type(&self, pattern: &str) -> bool {
        match pattern.split_once('/') {
            Some((t, s)) => {
                self.type_name.eq_ignore_ascii_case(t) && self.subtype_name.eq_ignore_ascii_case(s)
            }
            None => self.type_name.eq_ignore_ascii_case(pattern),
        }
    }

    /// Regenerate the Content-Type header value from current node state.
    pub fn content_type_value(&self) -> String {
        format!("{}{}", self.mime_type(), format_params(&self.parameters))
    }

    /// Regenerate the Content-Disposition header value, if any.
    pub fn disposition_value(&self) -> Option<String> {
        self.disposition
            .as_ref()
            .map(|d| format!("{}{}", d.kind, format_params(&d.params)))
    }

    /// First header with the given name.
    pub fn header(&self, name: &str) -> Option<&HeaderField> {
        self.headers.iter().find(|h| h.is(name))
    }

    /// Unfolded value of the first header with the given name.
    pub fn header_value(&self, name: &str) -> Option<String> {
        self.header(name).map(HeaderField::value)
    }

    /// Replace the raw text of a header in place, preserving its position.
    /// Returns false when no such header exists.
    pub fn replace_header(&mut self, name: &str, value: &str) -> bool {
        let ending = self.line_ending;
        match self.headers.iter_mut().find(|h| h.is(name)) {
            Some(h) => {
                let name = h.name.clone();
                *h = HeaderField::new(&name, value, ending);
                true
            }
            None => false,
        }
    }

    /// Rename a header, keeping its raw value text. Builds a new list and
    /// swaps it in rather than mutating during iteration.
    pub fn rename_header(&mut self, old: &str, new: &str) -> bool {
        let mut renamed = false;
        let ending = self.line_ending;
        let mut rebuilt = Vec::with_capacity(self.headers.len());
        for h in self.headers.drain(..) {
            if !renamed && h.is(old) {
                rebuilt.push(HeaderField::new(new, &h.value(), ending));
                renamed = true;
            } else {
                rebuilt.push(h);
            }
        }
        self.headers = rebuilt;
        renamed
    }

    /// Remove every header with the given name. Build-new-then-swap.
    pub fn remove_header(&mut self, name: &str) {
        let rebuilt: Vec<HeaderField> = self.headers.drain(..).filter(|h| !h.is(name)).collect();
        self.headers = rebuilt;
    }

    /// Append a header with the node's line ending.
    pub fn push_header(&mut self, name: &str, value: &str) {
        let ending = self.line_ending;
        self.headers.push(HeaderField::new(name, value, ending));
    }

    /// Raw body bytes (still transfer-encoded).
    pub fn body_bytes(&self) -> &[u8] {
        self.body.bytes()
    }

    /// Detach the node from the shared source by materializing its body
    /// into an owned buffer. Invalidates the old range.
    pub fn materialize_body(&mut self, bytes: Vec<u8>) {
        self.body = ContentSource::Buffer(bytes);
        self.dirty = true;
    }

    /// True when this node or any descendant was modified.
    pub fn subtree_dirty(&self) -> bool {
        if self.dirty {
            return true;
        }
        match &self.children {
            Children::None => false,
            Children::Message(inner) => inner.subtree_dirty(),
            Children::Multipart(mp) => mp.parts.iter().any(ContentNode::subtree_dirty),
        }
    }

    /// Assign part numbers for the whole tree, root first.
    ///
    /// Must be called after any structural rewrite (insertion, removal, or
    /// a kind change such as related → alternative).
    pub fn renumber(&mut self) {
        self.assign_number("1".to_string());
    }

    fn assign_number(&mut self, number: String) {
        self.part_number = number.clone();
        match &mut self.children {
            Children::None => {}
            Children::Message(inner) => {
                // A nested message body is addressed as its own subtree.
                inner.assign_number(number);
                if let Some(parent) = inner.external_parent.as_mut() {
                    *parent = self.part_number.clone();
                }
            }
            Children::Multipart(mp) => {
                for (i, part) in mp.parts.iter_mut().enumerate() {
                    part.assign_number(format!("{}.{}", number, i + 1));
                }
            }
        }
    }

    /// Find a node by part number.
    pub fn find_part(&self, number: &str) -> Option<&ContentNode> {
        if self.part_number == number {
            return Some(self);
        }
        match &self.children {
            Children::None => None,
            Children::Message(inner) => inner.find_part(number),
            Children::Multipart(mp) => mp.parts.iter().find_map(|p| p.find_part(number)),
        }
    }

    /// Total number of nodes in this subtree, self included.
    pub fn count_parts(&self) -> usize {
        1 + match &self.children {
            Children::None => 0,
            Children::Message(inner) => inner.count_parts(),
            Children::Multipart(mp) => mp.parts.iter().map(ContentNode::count_parts).sum(),
        }
    }

    /// Collect all defects in the subtree, tagged with their part numbers.
    pub fn collect_defects(&self) -> Vec<(String, Defect)> {
        let mut out = Vec::new();
        self.collect_defects_into(&mut out);
        out
    }

    fn collect_defects_into(&self, out: &mut Vec<(String, Defect)>) {
        for d in &self.defects {
            out.push((self.part_number.clone(), d.clone()));
        }
        match &self.children {
            Children::None => {}
            Children::Message(inner) => inner.collect_defects_into(out),
            Children::Multipart(mp) => {
                for p in &mp.parts {
                    p.collect_defects_into(out);
                }
            }
        }
    }
}
