//! Tree serialization.
//!
//! The guiding rule is byte exactness: any subtree the transform engine did
//! not touch is copied verbatim from its backing source, raw header lines
//! and framing bytes included. Only dirty nodes get their Content-* headers
//! regenerated from node state; everything else about them (other headers,
//! the header/body separator, sibling framing) is preserved as read.

use crate::model::content::{Children, ContentNode, HeaderField, TransferEncoding};

/// Serialize a content tree back to wire bytes.
pub fn serialize(node: &ContentNode) -> Vec<u8> {
    let mut out = Vec::with_capacity(node.body.len() as usize + 512);
    write_node(node, &mut out);
    out
}

fn write_node(node: &ContentNode, out: &mut Vec<u8>) {
    // Untouched subtree: the original bytes are exactly right.
    if !node.subtree_dirty() {
        for h in &node.headers {
            out.extend_from_slice(&h.raw);
        }
        out.extend_from_slice(&node.body_separator);
        out.extend_from_slice(node.body_bytes());
        return;
    }

    if node.dirty {
        write_regenerated_headers(node, out);
    } else {
        for h in &node.headers {
            out.extend_from_slice(&h.raw);
        }
    }

    if node.body_separator.is_empty() {
        out.extend_from_slice(node.line_ending.as_bytes());
    } else {
        out.extend_from_slice(&node.body_separator);
    }

    match &node.children {
        Children::None => out.extend_from_slice(node.body_bytes()),
        Children::Message(inner) => write_node(inner, out),
        Children::Multipart(mp) => {
            // No parts means the body was never successfully split (e.g. a
            // boundary mismatch the repair pass could not resolve). The raw
            // body is the only faithful rendition; reconstructing delimiter
            // framing here would discard it.
            if mp.parts.is_empty() {
                out.extend_from_slice(node.body_bytes());
                return;
            }
            let ending = node.line_ending.as_bytes();
            out.extend_from_slice(&mp.preamble);
            for part in &mp.parts {
                out.extend_from_slice(b"--");
                out.extend_from_slice(mp.boundary.as_bytes());
                out.extend_from_slice(ending);
                let mark = out.len();
                write_node(part, out);
                // A delimiter must start its own line.
                if out.len() > mark && !out.ends_with(b"\n") {
                    out.extend_from_slice(ending);
                }
            }
            out.extend_from_slice(b"--");
            out.extend_from_slice(mp.boundary.as_bytes());
            out.extend_from_slice(b"--");
            out.extend_from_slice(ending);
            out.extend_from_slice(&mp.epilogue);
        }
    }
}

/// Emit the header block of a dirty node: Content-Type, Content-Transfer-
/// Encoding and Content-Disposition are regenerated from node state (in
/// their original positions, duplicates dropped), every other header is
/// copied raw.
fn write_regenerated_headers(node: &ContentNode, out: &mut Vec<u8>) {
    let mut wrote_type = false;
    let mut wrote_encoding = false;
    let mut wrote_disposition = false;

    for h in &node.headers {
        if h.is("Content-Type") {
            if !wrote_type {
                write_folded(out, "Content-Type", &node.content_type_value(), node);
                wrote_type = true;
            }
        } else if h.is("Content-Transfer-Encoding") {
            if !wrote_encoding {
                write_simple(out, "Content-Transfer-Encoding", &node.transfer_encoding.to_string(), node);
                wrote_encoding = true;
            }
        } else if h.is("Content-Disposition") {
            if !wrote_disposition {
                if let Some(v) = node.disposition_value() {
                    write_folded(out, "Content-Disposition", &v, node);
                }
                wrote_disposition = true;
            }
        } else {
            out.extend_from_slice(&h.raw);
        }
    }

    if !wrote_type {
        write_folded(out, "Content-Type", &node.content_type_value(), node);
    }
    if !wrote_encoding && node.transfer_encoding != TransferEncoding::SevenBit {
        write_simple(out, "Content-Transfer-Encoding", &node.transfer_encoding.to_string(), node);
    }
    if !wrote_disposition {
        if let Some(v) = node.disposition_value() {
            write_folded(out, "Content-Disposition", &v, node);
        }
    }
}

fn write_simple(out: &mut Vec<u8>, name: &str, value: &str, node: &ContentNode) {
    let field = HeaderField::new(name, value, node.line_ending);
    out.extend_from_slice(&field.raw);
}

/// Preferred folded line length; well under the 998-octet hard limit.
const FOLD_AT: usize = 78;

/// Emit a header, folding before parameter separators once the line would
/// pass the preferred width.
fn write_folded(out: &mut Vec<u8>, name: &str, value: &str, node: &ContentNode) {
    if name.len() + 2 + value.len() <= FOLD_AT {
        write_simple(out, name, value, node);
        return;
    }

    let ending = node.line_ending.as_bytes();
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    let mut col = name.len() + 2;

    for (i, piece) in value.split("; ").enumerate() {
        if i > 0 {
            out.push(b';');
            if col + 2 + piece.len() > FOLD_AT {
                out.extend_from_slice(ending);
                out.push(b'\t');
                col = 1;
            } else {
                out.push(b' ');
                col += 2;
            }
        }
        out.extend_from_slice(piece.as_bytes());
        col += piece.len();
    }
    out.extend_from_slice(ending);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::Parameter;
    use crate::parser::TreeParser;

    fn roundtrip(msg: &[u8]) -> Vec<u8> {
        let node = TreeParser::default().parse_bytes(msg.to_vec()).unwrap();
        serialize(&node)
    }

    #[test]
    fn test_clean_simple_message_is_byte_exact() {
        let msg = b"Subject: hi\nContent-Type: text/plain\n\nbody line\n";
        assert_eq!(roundtrip(msg), msg);
    }

    #[test]
    fn test_clean_multipart_is_byte_exact() {
        let msg = concat!(
            "MIME-Version: 1.0\n",
            "Content-Type: multipart/mixed; boundary=\"=_aaa\"\n",
            "\n",
            "This is a preamble.\n",
            "--=_aaa\n",
            "Content-Type: text/plain; charset=utf-8\n",
            "Content-Transfer-Encoding: quoted-printable\n",
            "\n",
            "caf=C3=A9\n",
            "--=_aaa\n",
            "Content-Type: application/octet-stream\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "aGVsbG8K\n",
            "--=_aaa--\n",
            "trailing epilogue\n"
        )
        .as_bytes();
        assert_eq!(roundtrip(msg), msg);
    }

    #[test]
    fn test_clean_nested_message_is_byte_exact() {
        let msg = concat!(
            "Content-Type: message/rfc822\n",
            "\n",
            "Subject: inner\n",
            "X-Odd-Header:   spacing kept   \n",
            "\n",
            "inner body\n"
        )
        .as_bytes();
        assert_eq!(roundtrip(msg), msg);
    }

    #[test]
    fn test_clean_crlf_message_is_byte_exact() {
        let msg = b"Subject: hi\r\nContent-Type: text/plain\r\n\r\nbody\r\n";
        assert_eq!(roundtrip(msg), msg);
    }

    #[test]
    fn test_folded_header_survives_verbatim() {
        let msg = concat!(
            "Content-Type: multipart/mixed;\n",
            "\tboundary=\"=_folded\"\n",
            "\n",
            "--=_folded\n",
            "\n",
            "x\n",
            "--=_folded--\n"
        )
        .as_bytes();
        assert_eq!(roundtrip(msg), msg);
    }

    #[test]
    fn test_dirty_leaf_regenerates_content_headers() {
        let msg = concat!(
            "Subject: keep me\n",
            "Content-Type: text/plain; charset=iso-8859-1\n",
            "Content-Transfer-Encoding: quoted-printable\n",
            "\n",
            "caf=E9\n"
        );
        let mut node = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        node.parameters = vec![Parameter::new("charset", "utf-8")];
        node.transfer_encoding = TransferEncoding::EightBit;
        node.materialize_body("café\n".as_bytes().to_vec());

        let out = serialize(&node);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Subject: keep me\n"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\n"));
        assert!(text.contains("Content-Transfer-Encoding: 8bit\n"));
        assert!(text.ends_with("café\n"));
    }

    #[test]
    fn test_dirty_child_leaves_clean_sibling_verbatim() {
        let msg = concat!(
            "Content-Type: multipart/mixed; boundary=bb\n",
            "\n",
            "--bb\n",
            "Content-Type: text/plain\n",
            "\n",
            "first\n",
            "--bb\n",
            "Content-Type: text/plain\n",
            "\n",
            "second\n",
            "--bb--\n"
        );
        let mut node = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        if let Children::Multipart(mp) = &mut node.children {
            mp.parts[0].materialize_body(b"rewritten\n".to_vec());
        }
        let out = serialize(&node);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("rewritten\n"));
        assert!(text.contains("Content-Type: text/plain\n\nsecond\n"));
        assert!(text.contains("--bb--\n"));
    }

    #[test]
    fn test_dirty_unsplit_multipart_keeps_body_verbatim() {
        // Boundary never matched, so the node has no parts; a header-only
        // change must not cost the body.
        let msg = concat!(
            "Content-Type: multipart/mixed; boundary=zz\n",
            "\n",
            "--first\n",
            "body text that must survive\n",
            "--second--\n"
        );
        let mut node = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        assert!(matches!(&node.children, Children::Multipart(mp) if mp.parts.is_empty()));
        node.dirty = true;

        let out = serialize(&node);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("body text that must survive\n"));
        assert!(text.contains("--first\n"));
        assert!(!text.contains("--zz--"));
    }

    #[test]
    fn test_long_parameter_list_folds() {
        let mut node = ContentNode::synthetic(
            "application",
            "octet-stream",
            vec![
                Parameter::new("name", "a-fairly-long-descriptive-file-name-for-folding.bin"),
                Parameter::new("x-extra", "another-long-parameter-value-here"),
            ],
            Vec::new(),
            crate::model::content::LineEnding::Lf,
        );
        node.dirty = true;
        let out = serialize(&node);
        let text = String::from_utf8_lossy(&out);
        let first_line = text.lines().next().unwrap();
        assert!(first_line.len() <= 78);
        assert!(text.contains("\n\t"));
    }
}
