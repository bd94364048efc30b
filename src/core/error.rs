use super::value::ObjectId;
use thiserror::Error;

/// Fatal errors returned by [`parse`](crate::parse).
///
/// Only input that cannot be recognised as a PDF at all is fatal. Every other
/// problem is recovered locally and reported as an [`Issue`](crate::Issue).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input buffer is empty.
    #[error("input is empty")]
    Empty,

    /// No `%PDF-` marker was found in the leading search window.
    #[error("no %PDF- header found in the first {searched} bytes")]
    MissingHeader { searched: usize },
}

/// Recoverable error raised inside a single pipeline stage.
///
/// These never cross the public `parse` boundary; each stage converts them
/// into diagnostics or issues and falls back to a degraded strategy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PDFError {
    /// Offset outside the buffer
    #[error("offset {offset} is outside the buffer of length {length}")]
    InvalidOffset { offset: usize, length: usize },

    /// A specific keyword or token was expected
    #[error("expected {expected} at offset {offset}")]
    Expected { expected: &'static str, offset: usize },

    /// Cross-reference data could not be read
    #[error("xref error: {0}")]
    XRef(String),

    /// A stream filter failed or is not supported
    #[error("filter {filter} failed: {reason}")]
    Filter { filter: String, reason: String },

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Result type alias for internal stage operations
pub type PDFResult<T> = Result<T, PDFError>;

/// Returned by [`ObjectTable::insert`](crate::ObjectTable::insert) when the
/// identity is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("object {0} is already present")]
pub struct DuplicateObject(pub ObjectId);
