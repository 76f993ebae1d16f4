//! Boundary repair.
//!
//! Runs only on multiparts the parser flagged with a boundary mismatch:
//! the header declared one token, the body delimiters use another. The true
//! token is re-derived from the body itself by scanning forward for the
//! opening delimiter and backward for the last one; if the two disagree the
//! repair fails for that node rather than guessing. On success the header
//! parameter is rewritten and the body re-split into children.

use std::sync::Arc;

use crate::model::content::{Children, ContentKind, ContentNode, ContentSource, Defect, MultipartSubtype};
use crate::model::params::find_param_mut;
use crate::parser::TreeParser;
use crate::transform::{TransformReport, Transformer};

const PASS: &str = "boundary-repair";

pub fn run(tree: &mut ContentNode, tf: &Transformer<'_>, report: &mut TransformReport) {
    repair(tree, 1, tf, report);
}

fn repair(node: &mut ContentNode, depth: usize, tf: &Transformer<'_>, report: &mut TransformReport) {
    if node
        .defects
        .iter()
        .any(|d| matches!(d, Defect::BoundaryMismatch { .. }))
    {
        repair_node(node, depth, tf, report);
    }

    // Recurse after the repair so freshly split children are covered too.
    match &mut node.children {
        Children::None => {}
        Children::Message(inner) => repair(inner, depth + 1, tf, report),
        Children::Multipart(mp) => {
            for part in &mut mp.parts {
                repair(part, depth + 1, tf, report);
            }
        }
    }
}

fn repair_node(
    node: &mut ContentNode,
    depth: usize,
    tf: &Transformer<'_>,
    report: &mut TransformReport,
) {
    let part = node.part_number.clone();

    let (source, begin, end) = match &node.body {
        ContentSource::Range { source, begin, end } => (Arc::clone(source), *begin, *end),
        ContentSource::Buffer(_) => {
            report.failed(&part, PASS, "multipart body no longer backed by source");
            return;
        }
    };

    let Some(token) = derive_boundary(source.range(begin, end)) else {
        report.failed(&part, PASS, "no consistent boundary token in body");
        return;
    };

    let parser = TreeParser::new(tf.policy.max_nesting_depth);
    let in_digest = node.kind == ContentKind::Multipart(MultipartSubtype::Digest);
    // Children of the re-split subtree count against the same nesting
    // budget they would have had on the first pass.
    let mp = match parser.split_multipart_body(&source, begin, end, &token, depth, in_digest) {
        Ok(Some(mp)) => mp,
        Ok(None) => {
            report.failed(&part, PASS, format!("derived token \"{token}\" matches no delimiter"));
            return;
        }
        Err(e) => {
            report.failed(&part, PASS, e.to_string());
            return;
        }
    };

    match find_param_mut(&mut node.parameters, "boundary") {
        Some(p) => p.value = token.clone(),
        None => node
            .parameters
            .push(crate::model::params::Parameter::new("boundary", &token)),
    }
    let children = mp.parts.len();
    node.children = Children::Multipart(mp);
    node.defects
        .retain(|d| !matches!(d, Defect::BoundaryMismatch { .. }));
    node.dirty = true;
    report.modified(
        &part,
        &tf.context,
        format!("rewrote boundary to \"{token}\" ({children} parts recovered)"),
    );
}

/// Derive the boundary token actually used by a body: the first delimiter-
/// shaped line scanning forward must agree with the last one scanning
/// backward (closing `--` stripped). Returns None on disagreement.
fn derive_boundary(body: &[u8]) -> Option<String> {
    let mut first = None;
    let mut last = None;
    for line in body.split(|&b| b == b'\n') {
        if let Some(token) = delimiter_token(line) {
            if first.is_none() {
                first = Some(token.clone());
            }
            last = Some(token);
        }
    }
    match (first, last) {
        (Some(a), Some(b)) if a == b => Some(a),
        _ => None,
    }
}

/// Token of a `--token` / `--token--` line, trailing whitespace ignored.
fn delimiter_token(line: &[u8]) -> Option<String> {
    let rest = line.strip_prefix(b"--")?;
    let mut end = rest.len();
    while end > 0 && matches!(rest[end - 1], b' ' | b'\t' | b'\r') {
        end -= 1;
    }
    let mut token = &rest[..end];
    if let Some(t) = token.strip_suffix(b"--") {
        token = t;
    }
    if token.is_empty() {
        return None;
    }
    std::str::from_utf8(token).ok().map(str::to_string)
}
