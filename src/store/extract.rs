//! Write decoded parts to disk.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{MimeError, Result};
use crate::model::content::{Children, ContentKind, ContentNode};
use crate::model::params::find_param;
use crate::store::PartStore;

/// Extract one part's decoded content into `output_dir`.
///
/// The filename comes from the part's disposition or type parameters; an
/// existing file is an error unless `clobber` is set.
pub fn extract_part(
    store: &mut PartStore,
    message: &Path,
    part_number: &str,
    output_dir: &Path,
    clobber: bool,
) -> Result<PathBuf> {
    let tree = store.tree(message)?;
    let node = tree
        .find_part(part_number)
        .ok_or_else(|| MimeError::PartNotFound(part_number.to_string()))?;

    let data = crate::codec::decode(node)?.bytes.into_owned();
    let filename = part_filename(node);
    let path = output_dir.join(&filename);
    if path.exists() && !clobber {
        return Err(MimeError::WouldClobber(path));
    }

    write_atomically(&path, &data)?;
    info!(part = part_number, path = %path.display(), "Extracted part");
    Ok(path)
}

/// Extract every attachment-like leaf of a message. Failures on one part
/// are logged and the rest still extract.
pub fn extract_attachments(
    store: &mut PartStore,
    message: &Path,
    output_dir: &Path,
    clobber: bool,
) -> Result<Vec<PathBuf>> {
    let tree = store.tree(message)?;
    let mut numbers = Vec::new();
    collect_attachment_numbers(&tree, &mut numbers);

    std::fs::create_dir_all(output_dir).map_err(|e| MimeError::io(output_dir, e))?;
    let mut paths = Vec::new();
    for number in numbers {
        match extract_part(store, message, &number, output_dir, clobber) {
            Ok(path) => paths.push(path),
            Err(e) => warn!(part = %number, error = %e, "Failed to extract part"),
        }
    }
    Ok(paths)
}

fn collect_attachment_numbers(node: &ContentNode, out: &mut Vec<String>) {
    match &node.children {
        Children::None => {
            let is_attachment = node
                .disposition
                .as_ref()
                .is_some_and(|d| d.kind.eq_ignore_ascii_case("attachment"))
                || (node.kind != ContentKind::Text && !node.body.is_empty());
            if is_attachment {
                out.push(node.part_number.clone());
            }
        }
        Children::Message(inner) => collect_attachment_numbers(inner, out),
        Children::Multipart(mp) => {
            for p in &mp.parts {
                collect_attachment_numbers(p, out);
            }
        }
    }
}

/// Pick a filename for a part: disposition filename, then the type's name
/// parameter, then a generated `part-N` name.
pub fn part_filename(node: &ContentNode) -> String {
    let declared = node
        .disposition
        .as_ref()
        .and_then(|d| find_param(&d.params, "filename"))
        .or_else(|| find_param(&node.parameters, "name"))
        .map(|p| p.value.clone());
    match declared {
        Some(name) if !name.trim().is_empty() => sanitize_filename(&name, 150),
        _ => format!("part-{}{}", node.part_number, extension_for(node)),
    }
}

fn extension_for(node: &ContentNode) -> &'static str {
    match node.mime_type().to_ascii_lowercase().as_str() {
        "text/plain" => ".txt",
        "text/html" => ".html",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "message/rfc822" => ".eml",
        _ => ".bin",
    }
}

/// Keep a filename shell- and filesystem-safe: path separators and control
/// characters become underscores, length is capped.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0'..='\x1f' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches(['.', ' ']).to_string();
    if cleaned.is_empty() {
        return "unnamed".to_string();
    }
    cleaned.chars().take(max_len).collect()
}

/// Write via a temp file in the target directory, then rename into place,
/// so readers never observe a half-written file.
fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| MimeError::io(dir, e))?;
    std::io::Write::write_all(&mut tmp, data).map_err(|e| MimeError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| MimeError::io(path, e.error))?;
    Ok(())
}
