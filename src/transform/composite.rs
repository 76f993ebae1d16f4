//! Composite transfer-encoding fixup.
//!
//! RFC 2045 §6.4 allows only 7bit, 8bit and binary on multipart and
//! message types; anything else makes the part undecodable by strict
//! readers. The offending header is renamed to a diagnostic name (keeping
//! an audit trail in the message itself) and the effective encoding forced
//! to 8bit.

use crate::model::content::{ContentNode, Defect, TransferEncoding};
use crate::transform::{walk_mut, TransformReport, Transformer};

/// Diagnostic name the illegal header is renamed to.
pub const ORIGINAL_CTE_HEADER: &str = "X-Original-Content-Transfer-Encoding";

pub fn run(tree: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    walk_mut(tree, &mut |node| {
        if !node.kind.is_composite() || node.transfer_encoding.is_composite_safe() {
            return;
        }
        let part = node.part_number.clone();
        let old = node.transfer_encoding;

        node.rename_header("Content-Transfer-Encoding", ORIGINAL_CTE_HEADER);
        node.transfer_encoding = TransferEncoding::EightBit;
        node.requested_encoding = TransferEncoding::EightBit;
        node.defects
            .retain(|d| !matches!(d, Defect::IllegalCompositeEncoding(_)));
        node.dirty = true;

        report.modified(
            &part,
            &tf.context,
            format!("illegal '{old}' encoding on {} forced to 8bit", node.mime_type()),
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TreeParser;
    use crate::serialize::serialize;
    use crate::transform::testutil::run_pass;
    use crate::transform::TransformPolicy;

    #[test]
    fn test_quoted_printable_multipart_forced_to_8bit() {
        let msg = concat!(
            "Content-Type: multipart/mixed; boundary=xy\n",
            "Content-Transfer-Encoding: quoted-printable\n",
            "\n",
            "--xy\n",
            "Content-Type: text/plain\n",
            "\n",
            "hello\n",
            "--xy--\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);

        assert_eq!(report.modifications, 1);
        assert_eq!(tree.transfer_encoding, TransferEncoding::EightBit);
        assert_eq!(
            tree.header_value(ORIGINAL_CTE_HEADER).unwrap(),
            "quoted-printable"
        );
        assert!(tree.defects.is_empty());

        let out = serialize(&tree);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Content-Transfer-Encoding: 8bit\n"));
        assert!(text.contains("X-Original-Content-Transfer-Encoding: quoted-printable\n"));
        // Children framing survives the header rewrite.
        assert!(text.contains("--xy\n"));
        assert!(text.contains("--xy--\n"));
    }

    #[test]
    fn test_legal_composite_encoding_untouched() {
        let msg = concat!(
            "Content-Type: multipart/mixed; boundary=xy\n",
            "Content-Transfer-Encoding: 8bit\n",
            "\n",
            "--xy\n",
            "\n",
            "hi\n",
            "--xy--\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);
        assert_eq!(report.modifications, 0);
        assert!(!tree.subtree_dirty());
    }

    #[test]
    fn test_base64_on_leaf_is_fine() {
        let msg = concat!(
            "Content-Type: application/octet-stream\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "aGVsbG8K\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);
        assert_eq!(report.modifications, 0);
    }
}
