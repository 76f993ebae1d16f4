//! Content-type fixup by sniffing.
//!
//! Mail in the wild often labels attachments `application/octet-stream`
//! (or worse) when the bytes are plainly something else. For each leaf
//! whose declared type is on the caller's rewrite list, the decoded content
//! is run through the type sniffer and the declared type corrected in place
//! when they disagree.

use crate::model::content::{Children, ContentKind, ContentNode};
use crate::transform::{walk_mut, TransformReport, Transformer};

const PASS: &str = "type-fixup";

pub fn run(tree: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    walk_mut(tree, &mut |node| {
        if !matches!(node.children, Children::None) {
            return;
        }
        if !tf
            .policy
            .sniff_types
            .iter()
            .any(|pattern| node.matches_type(pattern))
        {
            return;
        }
        fixup_node(node, tf, report);
    });
}

fn fixup_node(node: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    let part = node.part_number.clone();

    let sniffed = {
        let decoded = match crate::codec::decode(node) {
            Ok(d) => d,
            Err(e) => {
                report.failed(&part, PASS, e.to_string());
                return;
            }
        };
        tf.sniffer.sniff(&decoded.bytes)
    };

    let Some(sniffed) = sniffed else {
        return;
    };
    if node.mime_type().eq_ignore_ascii_case(&sniffed) {
        return;
    }
    let Some((type_name, subtype_name)) = sniffed.split_once('/') else {
        return;
    };

    let old = node.mime_type();
    node.type_name = type_name.to_string();
    node.subtype_name = subtype_name.to_string();
    node.kind = ContentKind::classify(type_name, subtype_name);
    node.dirty = true;
    report.modified(&part, &tf.context, format!("content type {old} corrected to {sniffed}"));
}
