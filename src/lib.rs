//! `mimefix` — parse, repair and re-serialize MIME mail messages.
//!
//! The library builds a content tree from a wire-format message, keeps
//! every untouched byte range zero-copy against the source file, applies
//! structural repair passes (boundary reconciliation, composite encoding
//! fixup, text/plain insertion, text decoding, charset conversion), and
//! serializes the result with a byte-exact round trip for anything the
//! passes did not change.

pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod render;
pub mod serialize;
pub mod sniff;
pub mod source;
pub mod store;
pub mod transform;

pub use error::{MimeError, Result};
pub use model::content::ContentNode;
pub use parser::TreeParser;
pub use serialize::serialize;
pub use source::MessageSource;
