//! Error types.
//!
//! Every failure surfaced by the library is an [`Error`]. Callers that only
//! care about the broad category use [`Error::kind`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input file could not be opened, mapped or read.
    Io,
    /// The object file or its DWARF is malformed or unexpected.
    Format,
    /// The extractor adapter or const fixer was misconfigured.
    Config,
    /// A bug in this crate, such as a panicking worker.
    Internal,
}

/// Main error type for extraction.
#[derive(Error, Debug)]
pub enum Error {
    /// Opening or mapping a file failed.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a parseable object file.
    #[error("invalid object file: {0}")]
    Object(#[from] object::Error),

    /// gimli rejected the debug information.
    #[error("malformed DWARF: {0}")]
    Dwarf(#[from] gimli::Error),

    /// The debug information parsed but does not have the expected shape.
    ///
    /// Examples:
    /// - a top-level entry that is not a compile unit
    /// - a base type without `DW_AT_encoding`
    /// - a struct offset resolving to something other than a struct or typedef
    #[error("unexpected DWARF at offset {offset:#x}: {message}")]
    UnexpectedDwarf { offset: usize, message: String },

    /// The object file is well-formed but not something we can process.
    #[error("unsupported object file: {0}")]
    Unsupported(String),

    /// The extractor adapter or const fixer was misconfigured.
    #[error("configuration error: {0}")]
    Config(String),

    /// A pipeline worker panicked.
    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),
}

impl Error {
    pub(crate) fn unexpected(offset: usize, message: impl Into<String>) -> Self {
        Self::UnexpectedDwarf {
            offset,
            message: message.into(),
        }
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { .. } | Self::Io(_) => ErrorKind::Io,
            Self::Object(_)
            | Self::Dwarf(_)
            | Self::UnexpectedDwarf { .. }
            | Self::Unsupported(_) => ErrorKind::Format,
            Self::Config(_) => ErrorKind::Config,
            Self::WorkerPanicked(_) => ErrorKind::Internal,
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_dwarf_reports_offset_in_hex() {
        let err = Error::unexpected(0x2a, "found unexpected tag DW_TAG_subprogram on top level");
        let message = err.to_string();
        assert!(message.contains("0x2a"));
        assert!(message.contains("DW_TAG_subprogram"));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn open_failure_is_io() {
        let err = Error::Open {
            path: PathBuf::from("/nonexistent/kernel.full"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("/nonexistent/kernel.full"));
    }

    #[test]
    fn worker_panics_are_internal() {
        let err = Error::WorkerPanicked("struct resolver");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.to_string(), "struct resolver worker panicked");
    }

    #[test]
    fn config_errors_have_config_kind() {
        assert_eq!(Error::Config("cheribsd requires -build flag".into()).kind(), ErrorKind::Config);
    }
}
