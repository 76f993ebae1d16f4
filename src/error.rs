//! Centralized error types for mimefix.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mimefix library.
#[derive(Error, Debug)]
pub enum MimeError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified message file does not exist.
    #[error("Message file not found: {0}")]
    FileNotFound(PathBuf),

    /// A multipart declared no boundary parameter. Fatal for that subtree.
    #[error("Part {part}: multipart has no boundary parameter")]
    MissingBoundary { part: String },

    /// Message nesting exceeded the configured depth limit.
    #[error("Part {part}: nesting depth {depth} exceeds limit {limit}")]
    NestingTooDeep {
        part: String,
        depth: usize,
        limit: usize,
    },

    /// A header field name or line exceeded the maximum length.
    #[error("Header field at offset {offset} exceeds {limit} bytes")]
    FieldTooLong { offset: u64, limit: usize },

    /// The message ended before the structure it declared was complete.
    #[error("Truncated message at offset {offset}: {reason}")]
    Truncated { offset: u64, reason: String },

    /// A structural parse error at a specific byte offset.
    #[error("Parse error at offset {offset}: {reason}")]
    ParseError { offset: u64, reason: String },

    /// A Content-Transfer-Encoding value this engine does not know.
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedEncoding(String),

    /// The character set is unknown to the converter.
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// Encoded content could not be decoded (invalid base64, etc.).
    #[error("Part {part}: decode failed: {reason}")]
    DecodeError { part: String, reason: String },

    /// A transform pass failed for one node. The node is left untouched.
    #[error("Part {part}: {pass} failed: {reason}")]
    TransformFailure {
        part: String,
        pass: &'static str,
        reason: String,
    },

    /// No part with the requested part number exists in the tree.
    #[error("No such part: {0}")]
    PartNotFound(String),

    /// Refused to overwrite an existing output file.
    #[error("Output file exists and clobbering is disabled: {0}")]
    WouldClobber(PathBuf),
}

/// Convenience alias for `Result<T, MimeError>`.
pub type Result<T> = std::result::Result<T, MimeError>;

impl MimeError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that are fatal only for the subtree that produced
    /// them: a surrounding multipart may still parse its other children.
    pub fn is_subtree_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingBoundary { .. }
                | Self::NestingTooDeep { .. }
                | Self::FieldTooLong { .. }
                | Self::Truncated { .. }
                | Self::ParseError { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `MimeError`
/// when no path context is available (rare — prefer `MimeError::io`).
impl From<std::io::Error> for MimeError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
