//! The structural repair and transform engine.
//!
//! Each pass rewrites the tree in place and is independently invocable, but
//! [`Transformer::run`] applies them in a fixed order because later passes
//! rely on invariants the earlier ones restore:
//!
//! 1. parameter normalization (encoded-word filenames, trailing punctuation)
//! 2. boundary repair
//! 3. content-type fixup by sniffing
//! 4. composite transfer-encoding fixup
//! 5. text/plain insertion for alternative/related groups
//! 6. text decoding
//! 7. charset conversion
//!
//! A pass failure on one node aborts only that pass for that node; the tree
//! keeps its pre-pass state there and processing continues with the other
//! nodes. Every successful mutation increments the shared modification
//! counter and appends one audit record.

pub mod boundary;
pub mod charset;
pub mod composite;
pub mod decode_text;
pub mod ensure_plain;
pub mod filenames;
pub mod type_fixup;

use tracing::{debug, info, warn};

use crate::error::MimeError;
use crate::model::content::{ContentNode, LineEnding};

/// Caller policy for the transform pipeline.
#[derive(Debug, Clone)]
pub struct TransformPolicy {
    /// Types eligible for the text-decoding pass, as `type` or
    /// `type/subtype` patterns.
    pub decode_types: Vec<String>,
    /// Types whose content is sniffed and corrected by the type-fixup pass.
    pub sniff_types: Vec<String>,
    /// Target charset for text/plain conversion; None disables the pass.
    pub target_charset: Option<String>,
    /// Line ending convention to normalize decoded text toward.
    pub line_ending: LineEnding,
    /// Nesting depth budget used when a pass re-parses a subtree.
    pub max_nesting_depth: usize,
    /// Retry budget when generating a collision-free boundary token.
    pub boundary_retry_limit: usize,
}

impl Default for TransformPolicy {
    fn default() -> Self {
        Self {
            decode_types: vec!["text".to_string()],
            sniff_types: Vec::new(),
            target_charset: None,
            line_ending: LineEnding::Lf,
            max_nesting_depth: crate::parser::DEFAULT_MAX_DEPTH,
            boundary_retry_limit: 8,
        }
    }
}

/// Detects the real media type of decoded content. Used only by the
/// type-fixup pass.
pub trait TypeSniffer {
    /// Returns `type/subtype` when the content is recognized.
    fn sniff(&self, bytes: &[u8]) -> Option<String>;
}

/// Produces a plain-text rendition of a leaf's decoded content. Used only
/// by the ensure-text-plain pass.
pub trait PlainRenderer {
    fn render(&self, node: &ContentNode, decoded: &[u8]) -> crate::error::Result<Vec<u8>>;
}

/// Converts text between character sets.
pub trait CharsetConverter {
    fn convert(&self, bytes: &[u8], from: &str, to: &str) -> crate::error::Result<Vec<u8>>;
}

/// One audit line describing a performed transformation.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub part_number: String,
    pub context: String,
    pub message: String,
}

/// Outcome of a pipeline run over one tree.
#[derive(Debug, Default)]
pub struct TransformReport {
    /// Count of successful mutations. Zero means the serialized output
    /// would be identical and the caller can keep the original file.
    pub modifications: u32,
    /// One record per mutation or recorded skip.
    pub audit: Vec<AuditRecord>,
    /// Per-node pass failures; the tree stays valid despite these.
    pub failures: Vec<MimeError>,
}

impl TransformReport {
    /// Record a successful mutation.
    fn modified(&mut self, part: &str, context: &str, message: impl Into<String>) {
        let message = message.into();
        info!(part, context, "{message}");
        self.modifications += 1;
        self.audit.push(AuditRecord {
            part_number: part.to_string(),
            context: context.to_string(),
            message,
        });
    }

    /// Record a deliberate skip with its reason. Does not count as a
    /// modification.
    fn skipped(&mut self, part: &str, context: &str, message: impl Into<String>) {
        let message = message.into();
        debug!(part, context, "{message}");
        self.audit.push(AuditRecord {
            part_number: part.to_string(),
            context: context.to_string(),
            message,
        });
    }

    /// Record a pass failure on one node.
    fn failed(&mut self, part: &str, pass: &'static str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(part, pass, "{reason}");
        self.failures.push(MimeError::TransformFailure {
            part: part.to_string(),
            pass,
            reason,
        });
    }
}

/// The pipeline driver, holding policy and external collaborators.
pub struct Transformer<'a> {
    pub policy: &'a TransformPolicy,
    pub sniffer: &'a dyn TypeSniffer,
    pub renderer: &'a dyn PlainRenderer,
    pub converter: &'a dyn CharsetConverter,
    /// File name or other identity used in audit records.
    pub context: String,
}

impl Transformer<'_> {
    /// Run the full fixed-order pipeline over a tree.
    pub fn run(&self, tree: &mut ContentNode) -> TransformReport {
        let mut report = TransformReport::default();

        filenames::run(tree, self, &mut report);
        boundary::run(tree, self, &mut report);
        // Repair may have split new children; number them before the
        // per-part passes so audit records address real parts.
        tree.renumber();
        type_fixup::run(tree, self, &mut report);
        composite::run(tree, self, &mut report);
        ensure_plain::run(tree, self, &mut report);
        tree.renumber();
        decode_text::run(tree, self, &mut report);
        charset::run(tree, self, &mut report);
        report
    }
}

/// Depth-first mutable walk, parent before children.
fn walk_mut(node: &mut ContentNode, f: &mut dyn FnMut(&mut ContentNode)) {
    f(node);
    match &mut node.children {
        crate::model::content::Children::None => {}
        crate::model::content::Children::Message(inner) => walk_mut(inner, f),
        crate::model::content::Children::Multipart(mp) => {
            for part in &mut mp.parts {
                walk_mut(part, f);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::run_pipeline;
    use super::*;
    use crate::parser::TreeParser;

    #[test]
    fn test_pipeline_is_idempotent() {
        let msg = concat!(
            "Content-Type: multipart/alternative; boundary=bb\n",
            "Content-Transfer-Encoding: quoted-printable\n",
            "\n",
            "--bb\n",
            "Content-Type: text/html\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "PHA+aGVsbG8gd29ybGQ8L3A+Cg==\n",
            "--bb--\n"
        );
        let mut tree = TreeParser::default()
            .parse_bytes(msg.as_bytes().to_vec())
            .unwrap();
        let policy = TransformPolicy::default();

        let first = run_pipeline(&mut tree, &policy);
        assert!(first.modifications > 0);

        let second = run_pipeline(&mut tree, &policy);
        assert_eq!(second.modifications, 0);
    }

    #[test]
    fn test_clean_message_reports_zero_modifications() {
        let msg = b"Content-Type: text/plain\n\nnothing to do here\n";
        let mut tree = TreeParser::default().parse_bytes(msg.to_vec()).unwrap();
        let report = run_pipeline(&mut tree, &TransformPolicy::default());
        assert_eq!(report.modifications, 0);
        assert!(!tree.subtree_dirty());
    }
}
