//! Charset conversion for text/plain parts.
//!
//! Re-encodes decoded text from its declared charset to the policy target.
//! A failed conversion is reported for that part and the tree continues
//! unchanged there. The part's transfer encoding is preserved: content that
//! arrived quoted-printable leaves quoted-printable.

use encoding_rs::Encoding;

use crate::error::{MimeError, Result};
use crate::model::content::{Children, ContentNode};
use crate::model::params::{find_param, find_param_mut, Parameter};
use crate::transform::{walk_mut, CharsetConverter, TransformReport, Transformer};

const PASS: &str = "charset-conversion";

pub fn run(tree: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    let Some(target) = tf.policy.target_charset.clone() else {
        return;
    };
    walk_mut(tree, &mut |node| {
        if !matches!(node.children, Children::None) || !node.matches_type("text/plain") {
            return;
        }
        convert_node(node, &target, tf, report);
    });
}

fn convert_node(
    node: &mut ContentNode,
    target: &str,
    tf: &Transformer<'_>,
    report: &mut TransformReport,
) {
    let part = node.part_number.clone();
    let declared = find_param(&node.parameters, "charset")
        .map(|p| p.value.clone())
        .unwrap_or_else(|| "us-ascii".to_string());
    if declared.eq_ignore_ascii_case(target) {
        return;
    }

    let converted = {
        let decoded = match crate::codec::decode(node) {
            Ok(d) => d,
            Err(e) => {
                report.failed(&part, PASS, e.to_string());
                return;
            }
        };
        match tf.converter.convert(&decoded.bytes, &declared, target) {
            Ok(c) => c,
            Err(e) => {
                report.failed(&part, PASS, e.to_string());
                return;
            }
        }
    };

    let body = crate::codec::encode(&converted, node.transfer_encoding, node.line_ending);
    match find_param_mut(&mut node.parameters, "charset") {
        Some(p) => {
            p.value = target.to_string();
            p.charset = None;
            p.language = None;
        }
        None => node.parameters.push(Parameter::new("charset", target)),
    }
    node.materialize_body(body);
    report.modified(
        &part,
        &tf.context,
        format!("converted charset {declared} to {target}"),
    );
}

/// Charset converter backed by the WHATWG encoding tables.
pub struct EncodingRsConverter;

impl CharsetConverter for EncodingRsConverter {
    fn convert(&self, bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>> {
        let from_enc = Encoding::for_label(from.as_bytes())
            .ok_or_else(|| MimeError::UnsupportedCharset(from.to_string()))?;
        let to_enc = Encoding::for_label(to.as_bytes())
            .ok_or_else(|| MimeError::UnsupportedCharset(to.to_string()))?;

        let (text, _, malformed) = from_enc.decode(bytes);
        if malformed {
            return Err(MimeError::DecodeError {
                part: String::new(),
                reason: format!("input is not valid {from}"),
            });
        }
        let (out, _, unmappable) = to_enc.encode(&text);
        if unmappable {
            return Err(MimeError::DecodeError {
                part: String::new(),
                reason: format!("content not representable in {to}"),
            });
        }
        Ok(out.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::content::TransferEncoding;
    use crate::parser::TreeParser;
    use crate::transform::testutil::run_pass;
    use crate::transform::TransformPolicy;

    fn policy_targeting(charset: &str) -> TransformPolicy {
        TransformPolicy {
            target_charset: Some(charset.to_string()),
            ..TransformPolicy::default()
        }
    }

    #[test]
    fn test_latin1_converted_to_utf8() {
        let mut msg = concat!(
            "Content-Type: text/plain; charset=iso-8859-1\n",
            "Content-Transfer-Encoding: 8bit\n",
            "\n"
        )
        .as_bytes()
        .to_vec();
        msg.extend_from_slice(b"caf\xe9\n");

        let mut tree = TreeParser::default().parse_bytes(msg).unwrap();
        let report = run_pass(&mut tree, &policy_targeting("utf-8"), super::run);

        assert_eq!(report.modifications, 1);
        assert_eq!(tree.body_bytes(), "café\n".as_bytes());
        assert_eq!(
            find_param(&tree.parameters, "charset").unwrap().value,
            "utf-8"
        );
    }

    #[test]
    fn test_already_target_charset_untouched() {
        let msg = "Content-Type: text/plain; charset=UTF-8\n\nfine\n";
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let report = run_pass(&mut tree, &policy_targeting("utf-8"), super::run);
        assert_eq!(report.modifications, 0);
        assert!(!tree.dirty);
    }

    #[test]
    fn test_quoted_printable_part_stays_quoted_printable() {
        let msg = concat!(
            "Content-Type: text/plain; charset=iso-8859-1\n",
            "Content-Transfer-Encoding: quoted-printable\n",
            "\n",
            "caf=E9\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let report = run_pass(&mut tree, &policy_targeting("utf-8"), super::run);

        assert_eq!(report.modifications, 1);
        assert_eq!(tree.transfer_encoding, TransferEncoding::QuotedPrintable);
        assert_eq!(tree.body_bytes(), b"caf=C3=A9\n");
    }

    #[test]
    fn test_unsupported_charset_fails_per_part() {
        let msg = concat!(
            "Content-Type: multipart/mixed; boundary=mm\n",
            "\n",
            "--mm\n",
            "Content-Type: text/plain; charset=x-no-such-charset\n",
            "\n",
            "mystery bytes\n",
            "--mm\n",
            "Content-Type: text/plain; charset=iso-8859-1\n",
            "\n",
            "plain ascii\n",
            "--mm--\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let report = run_pass(&mut tree, &policy_targeting("utf-8"), super::run);

        // First child fails, second still converts.
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.modifications, 1);
        let Children::Multipart(mp) = &tree.children else {
            panic!();
        };
        assert_eq!(
            find_param(&mp.parts[1].parameters, "charset").unwrap().value,
            "utf-8"
        );
        assert_eq!(mp.parts[0].body_bytes(), b"mystery bytes\n");
    }

    #[test]
    fn test_converter_rejects_malformed_input() {
        let err = EncodingRsConverter
            .convert(b"caf\xff\xfe\x01", "utf-8", "iso-8859-1")
            .unwrap_err();
        assert!(matches!(err, MimeError::DecodeError { .. }));
    }
}
