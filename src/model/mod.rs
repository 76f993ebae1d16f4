//! Data model: content nodes and header parameters.

pub mod content;
pub mod params;
