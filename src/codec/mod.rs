//! Transfer-encoding codec: decode a node's body, re-encode for output,
//! classify arbitrary bytes.

pub mod base64;
pub mod classify;
pub mod quoted_printable;

use std::borrow::Cow;

use crate::error::{MimeError, Result};
use crate::model::content::{ContentKind, ContentNode, LineEnding, MessageSubtype, TransferEncoding};

pub use classify::{classify, Classification, DataClass};

/// A lazily-materialized decoded body.
pub struct Decoded<'a> {
    /// Decoded bytes: borrowed for identity encodings, owned otherwise.
    pub bytes: Cow<'a, [u8]>,
    /// True when quoted-printable content contained invalid escapes that
    /// were passed through leniently.
    pub lenient: bool,
}

/// Open the decoded byte stream of a node's body.
///
/// Identity encodings (7bit/8bit/binary) borrow straight from the node's
/// source window; base64 and quoted-printable materialize an owned buffer.
/// The placeholder body of a message/external-body has no local content and
/// decodes to nothing.
pub fn decode(node: &ContentNode) -> Result<Decoded<'_>> {
    if node.kind == ContentKind::Message(MessageSubtype::External) {
        return Ok(Decoded {
            bytes: Cow::Borrowed(&[]),
            lenient: false,
        });
    }

    match node.transfer_encoding {
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            Ok(Decoded {
                bytes: Cow::Borrowed(node.body_bytes()),
                lenient: false,
            })
        }
        TransferEncoding::Base64 => {
            let bytes = base64::decode(node.body_bytes()).map_err(|reason| {
                MimeError::DecodeError {
                    part: node.part_number.clone(),
                    reason,
                }
            })?;
            Ok(Decoded {
                bytes: Cow::Owned(bytes),
                lenient: false,
            })
        }
        TransferEncoding::QuotedPrintable => {
            let (bytes, lenient) = quoted_printable::decode(node.body_bytes());
            Ok(Decoded {
                bytes: Cow::Owned(bytes),
                lenient,
            })
        }
    }
}

/// Re-apply a transfer encoding to decoded bytes for serialization.
pub fn encode(bytes: &[u8], encoding: TransferEncoding, ending: LineEnding) -> Vec<u8> {
    match encoding {
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            bytes.to_vec()
        }
        TransferEncoding::Base64 => base64::encode(bytes, ending),
        TransferEncoding::QuotedPrintable => quoted_printable::encode(bytes, ending),
    }
}

/// The least-restrictive transfer encoding for a data class.
pub fn encoding_for_class(class: DataClass) -> TransferEncoding {
    match class {
        DataClass::SevenBit => TransferEncoding::SevenBit,
        DataClass::EightBit => TransferEncoding::EightBit,
        DataClass::Binary => TransferEncoding::Binary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::content::ContentNode;

    fn leaf_with(encoding: TransferEncoding, body: &[u8]) -> ContentNode {
        let mut node =
            ContentNode::synthetic("text", "plain", vec![], body.to_vec(), LineEnding::Lf);
        node.transfer_encoding = encoding;
        node
    }

    #[test]
    fn test_identity_decode_borrows() {
        let node = leaf_with(TransferEncoding::SevenBit, b"hello\n");
        let d = decode(&node).unwrap();
        assert!(matches!(d.bytes, Cow::Borrowed(_)));
        assert_eq!(&*d.bytes, b"hello\n");
    }

    #[test]
    fn test_base64_decode() {
        let node = leaf_with(TransferEncoding::Base64, b"aGVsbG8K\n");
        let d = decode(&node).unwrap();
        assert_eq!(&*d.bytes, b"hello\n");
    }

    #[test]
    fn test_qp_decode_flags_leniency() {
        let node = leaf_with(TransferEncoding::QuotedPrintable, b"a =zz b");
        let d = decode(&node).unwrap();
        assert!(d.lenient);
    }

    #[test]
    fn test_classification_survives_base64_roundtrip() {
        for data in [
            b"plain ascii\n".to_vec(),
            "utf-8 caf\u{e9}\n".as_bytes().to_vec(),
            b"binary\0data".to_vec(),
        ] {
            let before = classify(&data).class;
            let enc = base64::encode(&data, LineEnding::Lf);
            let dec = base64::decode(&enc).unwrap();
            assert_eq!(classify(&dec).class, before);
        }
    }
}
