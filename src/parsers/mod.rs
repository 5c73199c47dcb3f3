//! Document chunkers: split source files into addressable chunks
//!
//! One parser per supported document family: heading-structured markdown
//! and hierarchical key/value YAML.

pub mod markdown;
pub mod yaml;

pub use markdown::MarkdownChunker;
pub use yaml::YamlChunker;

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;

/// Errors that can occur while parsing a source file into chunks
#[derive(Error, Debug)]
pub enum ParseError {
    /// Source file does not exist
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Document could not be parsed
    #[error("invalid document format: {0}")]
    InvalidFormat(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source file modification time as Unix seconds
pub(crate) fn source_mtime(path: &Path) -> Result<f64, ParseError> {
    let modified = std::fs::metadata(path)?.modified()?;
    let mtime = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(mtime)
}
