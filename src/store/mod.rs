//! Part store: random access to parsed message trees with LRU caching.
//!
//! Repeatedly showing or extracting parts of the same message should not
//! re-run the tree parser each time, so parsed trees are kept in a small
//! LRU cache keyed by path. Trees are shared out behind `Arc` and never
//! mutated here; the transform engine works on freshly parsed trees.

pub mod extract;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use crate::error::{MimeError, Result};
use crate::model::content::ContentNode;
use crate::parser::TreeParser;
use crate::source::MessageSource;

/// Default number of parsed trees to keep cached.
const DEFAULT_CACHE_SIZE: usize = 16;

pub struct PartStore {
    parser: TreeParser,
    cache: LruCache<PathBuf, Arc<ContentNode>>,
}

impl PartStore {
    pub fn new(max_nesting_depth: usize) -> Self {
        Self::with_cache_size(max_nesting_depth, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(max_nesting_depth: usize, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size.max(1)).expect("clamped to at least 1");
        Self {
            parser: TreeParser::new(max_nesting_depth),
            cache: LruCache::new(cache_size),
        }
    }

    /// Parse (or fetch the cached tree of) a message file.
    pub fn tree(&mut self, path: impl AsRef<Path>) -> Result<Arc<ContentNode>> {
        let path = path.as_ref().to_path_buf();
        if let Some(tree) = self.cache.get(&path) {
            debug!(path = %path.display(), "Tree cache hit");
            return Ok(Arc::clone(tree));
        }
        let source = MessageSource::open(&path)?;
        let tree = Arc::new(self.parser.parse(&source)?);
        self.cache.put(path, Arc::clone(&tree));
        Ok(tree)
    }

    /// Decoded content of one part, addressed by part number.
    pub fn decoded_part(&mut self, path: impl AsRef<Path>, part_number: &str) -> Result<Vec<u8>> {
        let tree = self.tree(path)?;
        let node = tree
            .find_part(part_number)
            .ok_or_else(|| MimeError::PartNotFound(part_number.to_string()))?;
        Ok(crate::codec::decode(node)?.bytes.into_owned())
    }

    /// Drop a cached tree, e.g. after the file on disk was rewritten.
    pub fn invalidate(&mut self, path: impl AsRef<Path>) {
        self.cache.pop(&path.as_ref().to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(msg: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(msg).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_decoded_part_by_number() {
        let f = write_fixture(
            concat!(
                "Content-Type: multipart/mixed; boundary=bb\n",
                "\n",
                "--bb\n",
                "Content-Type: text/plain\n",
                "Content-Transfer-Encoding: base64\n",
                "\n",
                "aGVsbG8K\n",
                "--bb--\n"
            )
            .as_bytes(),
        );
        let mut store = PartStore::new(20);
        assert_eq!(store.decoded_part(f.path(), "1.1").unwrap(), b"hello\n");
    }

    #[test]
    fn test_missing_part_number() {
        let f = write_fixture(b"Content-Type: text/plain\n\nhi\n");
        let mut store = PartStore::new(20);
        let err = store.decoded_part(f.path(), "1.9").unwrap_err();
        assert!(matches!(err, MimeError::PartNotFound(_)));
    }

    #[test]
    fn test_cache_returns_same_tree() {
        let f = write_fixture(b"Content-Type: text/plain\n\nhi\n");
        let mut store = PartStore::new(20);
        let a = store.tree(f.path()).unwrap();
        let b = store.tree(f.path()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        store.invalidate(f.path());
        let c = store.tree(f.path()).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
