//! Message parsing: header field splitting, structured Content-* values,
//! RFC 2047 encoded-words and the recursive tree builder.

pub mod content_type;
pub mod encoded_word;
pub mod fields;
pub mod tree;

pub use tree::{TreeParser, DEFAULT_MAX_DEPTH};
