//! Text decoding.
//!
//! Removes a base64 or quoted-printable encoding from leaves whose type is
//! on the caller's decodable list, but only when the decoded bytes stay
//! transportable: content that classifies as binary keeps its encoding and
//! the reason is recorded. Line endings are normalized to the policy's
//! convention, only for charsets where stripping a CR is unambiguous.

use crate::codec::{classify, encoding_for_class, DataClass};
use crate::model::content::{Children, ContentNode, LineEnding, TransferEncoding};
use crate::model::params::find_param;
use crate::transform::{walk_mut, TransformReport, Transformer};

const PASS: &str = "decode-text";

pub fn run(tree: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    walk_mut(tree, &mut |node| {
        if !matches!(node.children, Children::None) || node.transfer_encoding.is_identity() {
            return;
        }
        if !tf
            .policy
            .decode_types
            .iter()
            .any(|pattern| node.matches_type(pattern))
        {
            return;
        }
        decode_node(node, tf, report);
    });
}

fn decode_node(node: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    let part = node.part_number.clone();
    let old = node.transfer_encoding;

    let (mut bytes, lenient) = match crate::codec::decode(node) {
        Ok(d) => (d.bytes.into_owned(), d.lenient),
        Err(e) => {
            report.failed(&part, PASS, e.to_string());
            return;
        }
    };

    let classified = classify(&bytes);
    if classified.class == DataClass::Binary {
        report.skipped(
            &part,
            &tf.context,
            format!(
                "left {old} encoded: {}",
                classified.reason.unwrap_or_else(|| "binary content".to_string())
            ),
        );
        return;
    }

    // A 7bit request is not silently satisfied with 8bit output.
    let limit = match node.requested_encoding {
        TransferEncoding::SevenBit => DataClass::SevenBit,
        _ => DataClass::EightBit,
    };
    if classified.class > limit {
        report.skipped(
            &part,
            &tf.context,
            format!("left {old} encoded: content is 8bit but 7bit was requested"),
        );
        return;
    }

    let charset = find_param(&node.parameters, "charset")
        .map(|p| p.value.clone())
        .unwrap_or_else(|| "us-ascii".to_string());
    if tf.policy.line_ending == LineEnding::Lf && charset_safe_for_cr_strip(&charset) {
        strip_crs(&mut bytes);
    }

    let new = encoding_for_class(classify(&bytes).class);
    node.transfer_encoding = new;
    node.requested_encoding = new;
    node.materialize_body(bytes);

    let note = if lenient {
        " (lenient quoted-printable input)"
    } else {
        ""
    };
    report.modified(&part, &tf.context, format!("decoded {old} to {new}{note}"));
}

/// Charsets where a CR byte can only be a line-ending artifact, never part
/// of a multibyte sequence.
fn charset_safe_for_cr_strip(charset: &str) -> bool {
    let c = charset.to_ascii_lowercase();
    c == "us-ascii"
        || c == "utf-8"
        || c.starts_with("iso-8859-")
        || c.starts_with("windows-125")
}

/// Drop every CR that immediately precedes an LF.
fn strip_crs(bytes: &mut Vec<u8>) {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    *bytes = out;
}
