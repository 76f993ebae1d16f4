//! Plain-text rendering of leaf content, used when the transform engine
//! synthesizes a text/plain member.
//!
//! HTML gets a tag-stripping rendition good enough for a text-only reader;
//! other text passes through; non-text content becomes a one-line
//! description so the plain alternative is never empty.

use crate::error::Result;
use crate::model::content::{ContentKind, ContentNode};
use crate::model::params::find_param;
use crate::transform::PlainRenderer;

#[derive(Default)]
pub struct TextRenderer;

impl PlainRenderer for TextRenderer {
    fn render(&self, node: &ContentNode, decoded: &[u8]) -> Result<Vec<u8>> {
        if node.matches_type("text/html") {
            let text = html_to_text(&String::from_utf8_lossy(decoded));
            return Ok(text.into_bytes());
        }
        if node.kind == ContentKind::Text {
            return Ok(decoded.to_vec());
        }
        Ok(describe_attachment(node, decoded.len()).into_bytes())
    }
}

fn describe_attachment(node: &ContentNode, len: usize) -> String {
    let name = find_param(&node.parameters, "name")
        .map(|p| p.value.clone())
        .or_else(|| {
            node.disposition
                .as_ref()
                .and_then(|d| find_param(&d.params, "filename"))
                .map(|p| p.value.clone())
        });
    match name {
        Some(name) => format!("[{} attachment \"{}\", {} bytes]\n", node.mime_type(), name, len),
        None => format!("[{} content, {} bytes]\n", node.mime_type(), len),
    }
}

/// Tags that force a line break in the text rendition.
const BLOCK_TAGS: &[&str] = &[
    "p", "/p", "div", "/div", "br", "br/", "li", "/ul", "/ol", "tr", "/table", "h1", "/h1", "h2",
    "/h2", "h3", "/h3", "blockquote", "/blockquote",
];

/// Strip markup from HTML, keeping the visible text. Script and style
/// content is dropped entirely; block-level tags become newlines; a small
/// set of common entities is decoded.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut rest = html;

    loop {
        let Some(pos) = rest.find(['<', '&']) else {
            push_text(&mut out, rest);
            break;
        };
        push_text(&mut out, &rest[..pos]);
        let marker = rest.as_bytes()[pos];
        rest = &rest[pos..];

        if marker == b'<' {
            let Some(end) = rest.find('>') else { break };
            let tag = rest[1..end]
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            rest = &rest[end + 1..];
            if tag == "script" || tag == "style" {
                let close = if tag == "script" { "</script>" } else { "</style>" };
                match rest.to_ascii_lowercase().find(close) {
                    Some(p) => rest = &rest[p + close.len()..],
                    None => break,
                }
            } else if BLOCK_TAGS.contains(&tag.as_str()) && !out.ends_with('\n') {
                out.push('\n');
            }
        } else {
            // Entity reference; anything longer than 8 chars is not one.
            match rest[1..].find(';').filter(|&e| e <= 8) {
                Some(e) => {
                    out.push_str(decode_entity(&rest[1..1 + e]));
                    rest = &rest[e + 2..];
                }
                None => {
                    out.push('&');
                    rest = &rest[1..];
                }
            }
        }
    }

    // Collapse runs of blank space the tag stripping left behind.
    let mut cleaned = String::with_capacity(out.len());
    let mut last_blank = true;
    for line in out.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !last_blank {
                cleaned.push('\n');
            }
            last_blank = true;
        } else {
            cleaned.push_str(line);
            cleaned.push('\n');
            last_blank = false;
        }
    }
    cleaned
}

/// Append visible text, folding raw whitespace into single spaces.
fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '\n' | '\r' | '\t' => {
                if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
                    out.push(' ');
                }
            }
            _ => out.push(c),
        }
    }
}

fn decode_entity(entity: &str) -> &'static str {
    match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" | "#39" => "'",
        "nbsp" | "#160" => " ",
        _ => "",
    }
}
