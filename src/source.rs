//! Byte-addressable message sources.
//!
//! A [`MessageSource`] backs every content tree. Nodes in range mode keep an
//! `Arc` to the source and address it by `[begin, end)` offsets, so sibling
//! parts share one open handle and no message bytes are copied during
//! parsing. The handle stays valid for as long as any node still references
//! it; dropping the last tree releases the mapping.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;

use crate::error::{MimeError, Result};

/// A read-only message source: a memory-mapped file or an owned buffer.
pub struct MessageSource {
    path: PathBuf,
    data: SourceData,
}

enum SourceData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

// Manual impl: the mapped variant has nothing useful to derive.
impl std::fmt::Debug for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSource")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

impl MessageSource {
    /// Map a message file into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MimeError::FileNotFound(path.clone())
            } else {
                MimeError::io(&path, e)
            }
        })?;
        let len = file.metadata().map_err(|e| MimeError::io(&path, e))?.len();
        if len == 0 {
            // Zero-length files cannot be mapped on every platform.
            return Ok(Arc::new(Self {
                path,
                data: SourceData::Owned(Vec::new()),
            }));
        }
        // SAFETY: the mapping is read-only and the file is opened read-only.
        // Concurrent truncation of the underlying file is undefined behavior
        // for any mmap user; callers own the message file for the duration.
        let map = unsafe { Mmap::map(&file).map_err(|e| MimeError::io(&path, e))? };
        debug!(path = %path.display(), len = map.len(), "Mapped message source");
        Ok(Arc::new(Self {
            path,
            data: SourceData::Mapped(map),
        }))
    }

    /// Wrap an in-memory buffer (used when a transform re-parses the bytes
    /// it just produced).
    pub fn from_bytes(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            path: PathBuf::from("<buffer>"),
            data: SourceData::Owned(bytes),
        })
    }

    /// Path of the backing file, or `<buffer>` for in-memory sources.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full byte contents.
    pub fn bytes(&self) -> &[u8] {
        match &self.data {
            SourceData::Mapped(m) => m,
            SourceData::Owned(v) => v,
        }
    }

    /// Total length in bytes.
    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    /// True when the source holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Slice a `[begin, end)` range out of the source.
    ///
    /// Ranges come from the parser and always satisfy `begin <= end <= len`;
    /// a violation means the range outlived a rewrite and is a logic error.
    pub fn range(&self, begin: u64, end: u64) -> &[u8] {
        debug_assert!(begin <= end && end <= self.len());
        &self.bytes()[begin as usize..end as usize]
    }
}
