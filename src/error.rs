//! Error types for Scanco file I/O.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reading or writing a Scanco file.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The first 16 bytes match none of the known Scanco signatures.
    #[error("unrecognized Scanco file version")]
    UnrecognizedVersion,

    /// AIM data-type word outside the supported table, or a payload
    /// (e.g. vector pixels) the decoder does not handle.
    #[error("unsupported component type {0:#010x}")]
    UnsupportedComponent(i32),

    /// Writing was requested for a format that is read-only, or with
    /// pixel data the target format cannot carry.
    #[error("unsupported write format: {0}")]
    UnsupportedWriteFormat(String),

    /// File extension is none of .isq/.rsq/.rad/.aim.
    #[error("unrecognized file extension: {0}")]
    UnrecognizedExtension(String),

    /// Short read inside a header or pixel payload.
    #[error("file is truncated, {missing} bytes are missing")]
    Truncated {
        /// Number of bytes the file is short of the declared size.
        missing: u64,
    },

    /// Numeric sanity check failed: zero dimension, inconsistent section
    /// lengths, invalid multi-header chain, unparseable date.
    #[error("invalid header: {0}")]
    BadHeader(String),

    /// Operation called out of order (pixels before header) or with an
    /// undersized caller buffer.
    #[error("operation out of sequence: {0}")]
    Sequence(String),

    /// An empty path was supplied.
    #[error("file name is empty")]
    EmptyFileName,
}
