//! Parameter normalization.
//!
//! Two cleanups run here, ahead of every other pass:
//!
//! - `name`/`filename` parameter values carrying RFC 2047 encoded-words
//!   (forbidden in parameters, RFC 2231 §5) are decoded and re-emitted as
//!   proper RFC 2231 extended values.
//! - Parameter lists that ended in spurious punctuation are rewritten
//!   without it.

use crate::model::content::{ContentNode, Defect};
use crate::model::params::Parameter;
use crate::parser::encoded_word::{contains_encoded_word, decode_encoded_words};
use crate::transform::{walk_mut, TransformReport, Transformer};

pub fn run(tree: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    walk_mut(tree, &mut |node| {
        normalize_node(node, tf, report);
    });
}

fn normalize_node(node: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    let part = node.part_number.clone();
    let mut touched = false;

    for p in &mut node.parameters {
        if rewrite_param(p) {
            report.modified(
                &part,
                &tf.context,
                format!("decoded encoded-word in parameter '{}'", p.name),
            );
            touched = true;
        }
    }
    if let Some(disp) = node.disposition.as_mut() {
        for p in &mut disp.params {
            if rewrite_param(p) {
                report.modified(
                    &part,
                    &tf.context,
                    format!("decoded encoded-word in disposition parameter '{}'", p.name),
                );
                touched = true;
            }
        }
    }

    if node.defects.contains(&Defect::TrailingPunctuation) {
        node.defects.retain(|d| *d != Defect::TrailingPunctuation);
        report.modified(&part, &tf.context, "stripped trailing parameter punctuation");
        touched = true;
    }

    if touched {
        node.dirty = true;
    }
}

/// Decode an encoded-word parameter value in place. Non-ASCII results get
/// the RFC 2231 extended form with an explicit UTF-8 charset.
fn rewrite_param(p: &mut Parameter) -> bool {
    if !matches!(p.name.as_str(), "name" | "filename") || !contains_encoded_word(&p.value) {
        return false;
    }
    let (decoded, any) = decode_encoded_words(&p.value);
    if !any {
        return false;
    }
    if !decoded.is_ascii() {
        p.charset = Some("UTF-8".to_string());
    }
    p.value = decoded;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::find_param;
    use crate::parser::TreeParser;
    use crate::transform::testutil::run_pass;
    use crate::transform::TransformPolicy;

    #[test]
    fn test_encoded_word_filename_becomes_rfc2231() {
        let msg = concat!(
            "Content-Type: application/pdf; name=\"=?UTF-8?Q?r=C3=A9sum=C3=A9.pdf?=\"\n",
            "Content-Disposition: attachment;\n",
            " filename=\"=?UTF-8?Q?r=C3=A9sum=C3=A9.pdf?=\"\n",
            "\n",
            "%PDF-1.4\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);

        let name = find_param(&tree.parameters, "name").unwrap();
        assert_eq!(name.value, "résumé.pdf");
        assert_eq!(name.charset.as_deref(), Some("UTF-8"));
        let filename = find_param(&tree.disposition.as_ref().unwrap().params, "filename").unwrap();
        assert_eq!(filename.value, "résumé.pdf");
        assert!(report.modifications >= 2);
        assert!(tree.dirty);
    }

    #[test]
    fn test_ascii_encoded_word_stays_plain_value() {
        let msg = concat!(
            "Content-Type: application/pdf; name=\"=?US-ASCII?Q?report.pdf?=\"\n",
            "\n",
            "%PDF-1.4\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        run_pass(&mut tree, &TransformPolicy::default(), super::run);
        let name = find_param(&tree.parameters, "name").unwrap();
        assert_eq!(name.value, "report.pdf");
        assert!(name.charset.is_none());
    }

    #[test]
    fn test_plain_filenames_untouched() {
        let msg = concat!(
            "Content-Type: application/pdf; name=report.pdf\n",
            "\n",
            "%PDF-1.4\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let report = run_pass(&mut tree, &TransformPolicy::default(), super::run);
        assert_eq!(report.modifications, 0);
    }
}
