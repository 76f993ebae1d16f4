//! Text/plain insertion.
//!
//! Guarantees every reader sees a plain-text rendition:
//!
//! - a multipart/alternative with no text/plain member gets one synthesized
//!   from its most renderable sibling, inserted first (plainest-first order);
//! - a multipart/related with no text/plain member is promoted to
//!   multipart/alternative and gets one synthesized from its root part;
//! - a lone non-text leaf at the top level is wrapped in a new
//!   multipart/alternative together with a synthesized plain part.
//!
//! Boundary tokens invented here are checked against both the raw and the
//! decoded bytes of every part they will frame, with a bounded retry count.

use crate::codec::{classify, encoding_for_class};
use crate::model::content::{
    Children, ContentKind, ContentNode, LineEnding, MultipartBody, MultipartSubtype,
};
use crate::model::params::{find_param_mut, Parameter};
use crate::transform::{TransformReport, Transformer};

const PASS: &str = "ensure-text-plain";

pub fn run(tree: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    if matches!(tree.children, Children::None) && tree.kind != ContentKind::Text {
        wrap_lone_leaf(tree, tf, report);
        return;
    }
    ensure(tree, tf, report);
}

fn ensure(node: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    match node.kind {
        ContentKind::Multipart(MultipartSubtype::Alternative) => {
            ensure_group(node, tf, report, false)
        }
        ContentKind::Multipart(MultipartSubtype::Related) => ensure_group(node, tf, report, true),
        _ => {}
    }

    match &mut node.children {
        Children::None => {}
        Children::Message(inner) => ensure(inner, tf, report),
        Children::Multipart(mp) => {
            for part in &mut mp.parts {
                ensure(part, tf, report);
            }
        }
    }
}

/// Insert a synthesized text/plain into an alternative group, promoting a
/// related group to alternative first when `promote` is set.
fn ensure_group(node: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport, promote: bool) {
    let part = node.part_number.clone();
    let ending = node.line_ending;

    let Children::Multipart(mp) = &mut node.children else {
        return;
    };
    if mp.parts.iter().any(|p| p.matches_type("text/plain")) {
        return;
    }

    // Most renderable source: prefer a text sibling, fall back to any leaf.
    let source_idx = mp
        .parts
        .iter()
        .position(|p| p.kind == ContentKind::Text)
        .or_else(|| {
            mp.parts
                .iter()
                .position(|p| matches!(p.children, Children::None))
        });
    let Some(source_idx) = source_idx else {
        report.skipped(&part, &tf.context, "no renderable member for text/plain insertion");
        return;
    };

    let rendered = match render_part(&mp.parts[source_idx], tf) {
        Ok(r) => r,
        Err(reason) => {
            report.failed(&part, PASS, reason);
            return;
        }
    };
    let plain = synthesize_plain(rendered, ending);

    // The existing boundary must not occur inside the new member.
    if contains(plain.body_bytes(), mp.boundary.as_bytes()) {
        let mut scan = collect_scan_bytes(&mp.parts);
        scan.push(plain.body_bytes().to_vec());
        match unique_boundary(&scan, &part, tf.policy.boundary_retry_limit) {
            Ok(token) => {
                mp.boundary = token.clone();
                match find_param_mut(&mut node.parameters, "boundary") {
                    Some(p) => p.value = token.clone(),
                    None => node.parameters.push(Parameter::new("boundary", &token)),
                }
            }
            Err(reason) => {
                report.failed(&part, PASS, reason);
                return;
            }
        }
        // Reborrow after touching node.parameters.
        let Children::Multipart(mp) = &mut node.children else {
            return;
        };
        mp.parts.insert(0, plain);
    } else {
        mp.parts.insert(0, plain);
    }

    if promote {
        node.subtype_name = "alternative".to_string();
        node.kind = ContentKind::Multipart(MultipartSubtype::Alternative);
    }
    node.dirty = true;
    report.modified(
        &part,
        &tf.context,
        if promote {
            "promoted multipart/related to alternative with a text/plain member"
        } else {
            "inserted synthesized text/plain member"
        },
    );
}

/// Wrap a lone non-text leaf in a fresh multipart/alternative next to a
/// synthesized plain rendition. Non-content headers move to the wrapper so
/// the message envelope stays at the top.
fn wrap_lone_leaf(tree: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    let part = tree.part_number.clone();
    let ending = tree.line_ending;

    let rendered = match render_part(tree, tf) {
        Ok(r) => r,
        Err(reason) => {
            report.failed(&part, PASS, reason);
            return;
        }
    };
    let plain = synthesize_plain(rendered, ending);

    let scan = vec![
        tree.body_bytes().to_vec(),
        decoded_or_empty(tree),
        plain.body_bytes().to_vec(),
    ];
    let boundary = match unique_boundary(&scan, &part, tf.policy.boundary_retry_limit) {
        Ok(b) => b,
        Err(reason) => {
            report.failed(&part, PASS, reason);
            return;
        }
    };

    let wrapper = ContentNode::synthetic(
        "multipart",
        "alternative",
        vec![Parameter::new("boundary", &boundary)],
        Vec::new(),
        ending,
    );
    let mut inner = std::mem::replace(tree, wrapper);

    // Envelope headers (Subject, From, MIME-Version, ...) belong to the
    // wrapper; the inner part keeps only its Content-* headers.
    let mut envelope = Vec::new();
    let mut content = Vec::new();
    for h in inner.headers.drain(..) {
        if h.name.to_ascii_lowercase().starts_with("content-") {
            content.push(h);
        } else {
            envelope.push(h);
        }
    }
    inner.headers = content;
    inner.dirty = true;

    tree.headers = envelope;
    tree.body_separator = inner.body_separator.clone();
    tree.children = Children::Multipart(MultipartBody {
        boundary,
        preamble: Vec::new(),
        epilogue: Vec::new(),
        parts: vec![plain, inner],
    });
    tree.dirty = true;

    report.modified(
        &part,
        &tf.context,
        "wrapped lone non-text part in multipart/alternative with text/plain",
    );
}

fn render_part(node: &ContentNode, tf: &Transformer<'_>) -> Result<Vec<u8>, String> {
    let decoded = crate::codec::decode(node).map_err(|e| e.to_string())?;
    tf.renderer
        .render(node, &decoded.bytes)
        .map_err(|e| e.to_string())
}

fn synthesize_plain(rendered: Vec<u8>, ending: LineEnding) -> ContentNode {
    let charset = if rendered.is_ascii() { "us-ascii" } else { "utf-8" };
    let class = classify(&rendered).class;
    let mut node = ContentNode::synthetic(
        "text",
        "plain",
        vec![Parameter::new("charset", charset)],
        rendered,
        ending,
    );
    node.transfer_encoding = encoding_for_class(class);
    node.requested_encoding = node.transfer_encoding;
    node
}

fn decoded_or_empty(node: &ContentNode) -> Vec<u8> {
    crate::codec::decode(node)
        .map(|d| d.bytes.into_owned())
        .unwrap_or_default()
}

/// Raw plus decoded bytes of every part, for collision checks.
fn collect_scan_bytes(parts: &[ContentNode]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for p in parts {
        out.push(p.body_bytes().to_vec());
        out.push(decoded_or_empty(p));
    }
    out
}

/// Generate a boundary token that appears in none of the scan buffers.
fn unique_boundary(scan: &[Vec<u8>], part: &str, retry_limit: usize) -> Result<String, String> {
    let part = if part.is_empty() { "1" } else { part };
    for i in 0..retry_limit.max(1) {
        let candidate = format!("=_fix-{part}-{i}");
        if !scan.iter().any(|buf| contains(buf, candidate.as_bytes())) {
            return Ok(candidate);
        }
    }
    Err(format!("no collision-free boundary after {retry_limit} attempts"))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TreeParser;
    use crate::transform::testutil::run_pass;
    use crate::transform::TransformPolicy;

    fn parse(msg: &str) -> ContentNode {
        TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn test_alternative_without_plain_gets_one() {
        let mut tree = parse(concat!(
            "Content-Type: multipart/alternative; boundary=alt\n",
            "\n",
            "--alt\n",
            "Content-Type: text/html\n",
            "\n",
            "<p>hello <b>world</b></p>\n",
            "--alt--\n"
        ));
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);

        assert_eq!(report.modifications, 1);
        let Children::Multipart(mp) = &tree.children else {
            panic!();
        };
        assert_eq!(mp.parts.len(), 2);
        assert!(mp.parts[0].matches_type("text/plain"));
        let text = String::from_utf8_lossy(mp.parts[0].body_bytes()).into_owned();
        assert!(text.contains("hello world"));
        assert_eq!(mp.parts[0].part_number, "1.1");
        assert_eq!(mp.parts[1].part_number, "1.2");
    }

    #[test]
    fn test_alternative_with_plain_untouched() {
        let mut tree = parse(concat!(
            "Content-Type: multipart/alternative; boundary=alt\n",
            "\n",
            "--alt\n",
            "Content-Type: text/plain\n",
            "\n",
            "already here\n",
            "--alt\n",
            "Content-Type: text/html\n",
            "\n",
            "<p>already here</p>\n",
            "--alt--\n"
        ));
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);
        assert_eq!(report.modifications, 0);
        assert!(!tree.subtree_dirty());
    }

    #[test]
    fn test_related_without_plain_promoted() {
        let mut tree = parse(concat!(
            "Content-Type: multipart/related; boundary=rel; type=text/html\n",
            "\n",
            "--rel\n",
            "Content-Type: text/html\n",
            "\n",
            "<p>body</p>\n",
            "--rel\n",
            "Content-Type: image/png\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "iVBORw0KGgo=\n",
            "--rel--\n"
        ));
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);

        assert_eq!(report.modifications, 1);
        assert_eq!(tree.subtype_name, "alternative");
        assert_eq!(tree.kind, ContentKind::Multipart(MultipartSubtype::Alternative));
        let Children::Multipart(mp) = &tree.children else {
            panic!();
        };
        assert_eq!(mp.parts.len(), 3);
        assert!(mp.parts[0].matches_type("text/plain"));
    }

    #[test]
    fn test_lone_non_text_leaf_wrapped() {
        let mut tree = parse(concat!(
            "Subject: an attachment\n",
            "Content-Type: application/pdf; name=doc.pdf\n",
            "\n",
            "%PDF-1.4 pretend content\n"
        ));
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);

        assert_eq!(report.modifications, 1);
        assert_eq!(tree.mime_type(), "multipart/alternative");
        assert_eq!(tree.header_value("Subject").unwrap(), "an attachment");
        let Children::Multipart(mp) = &tree.children else {
            panic!();
        };
        assert_eq!(mp.parts.len(), 2);
        assert!(mp.parts[0].matches_type("text/plain"));
        assert!(mp.parts[1].matches_type("application/pdf"));
        assert!(mp.parts[1].header("Subject").is_none());
    }

    #[test]
    fn test_lone_text_leaf_untouched() {
        let mut tree = parse("Content-Type: text/plain\n\nfine as is\n");
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);
        assert_eq!(report.modifications, 0);
        assert_eq!(tree.mime_type(), "text/plain");
    }

    #[test]
    fn test_new_boundary_avoids_collisions() {
        let scan = vec![b"text mentioning =_fix-1-0 explicitly".to_vec()];
        let token = unique_boundary(&scan, "1", 8).unwrap();
        assert_eq!(token, "=_fix-1-1");
        assert!(!contains(&scan[0], token.as_bytes()));
    }

    #[test]
    fn test_boundary_retries_exhausted() {
        let mut hay = Vec::new();
        for i in 0..8 {
            hay.extend_from_slice(format!("=_fix-1-{i} ").as_bytes());
        }
        assert!(unique_boundary(&[hay], "1", 8).is_err());
    }
}
