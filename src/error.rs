//! Centralized error types for lazymime.

use std::path::PathBuf;
use thiserror::Error;

use crate::proxy::PartId;

/// All errors produced by the lazymime library.
///
/// Malformed MIME structure is never an error: missing or misplaced
/// boundaries degrade to an end-of-part interpretation. Only I/O on the
/// underlying source and misuse of the offset ledger are surfaced.
#[derive(Error, Debug)]
pub enum MimeError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("Message file not found: {0}")]
    FileNotFound(PathBuf),

    /// The source stream failed while a part was being parsed.
    #[error("Read failure at offset {offset} while parsing part {part}: {source}")]
    Read {
        part: PartId,
        offset: u64,
        source: std::io::Error,
    },

    /// The offset ledger of a part was written inconsistently.
    #[error("Ledger inconsistency in part {part}: {reason}")]
    Ledger { part: PartId, reason: String },

    /// A bounded view was requested over a range that is still open.
    #[error("The {range} range of part {part} is not closed yet")]
    RangeNotClosed { part: PartId, range: &'static str },

    /// A part path (e.g. `1.2.3`) could not be resolved.
    #[error("Invalid part path: {0}")]
    InvalidPartPath(String),
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

    /// Wrap a source read failure with the part being parsed.
    pub fn read(part: PartId, offset: u64, source: std::io::Error) -> Self {
        Self::Read {
            part,
            offset,
            source,
        }
    }

    /// Create a `Ledger` variant.
    pub fn ledger(part: PartId, reason: impl Into<String>) -> Self {
        Self::Ledger {
            part,
            reason: reason.into(),
        }
    }
}
