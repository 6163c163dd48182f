//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file does not start with the BSA signature
    #[error("file is not a bsa archive")]
    #[diagnostic(help("BSA archives start with the bytes `BSA\\0`"))]
    BadMagic,

    /// archive version {0} is not supported
    #[error("unsupported bsa version {0:#x}")]
    #[diagnostic(help("only Fallout 3 / New Vegas archives (version 0x68) are supported"))]
    UnsupportedVersion(u32),

    /// archive structure is malformed
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// not enough bytes to decode a fixed size record
    #[error("truncated {record}: expected {expected} bytes, {available} available")]
    TruncatedRecord {
        /// The record being decoded
        record: &'static str,
        /// Fixed size of the record
        expected: usize,
        /// Bytes left in the window
        available: usize,
    },

    /// a single file's payload failed to compress or decompress
    #[error("compression failure in {name}: {reason}")]
    CompressionFailure {
        /// Full path of the file within the archive
        name: String,
        /// What went wrong
        reason: String,
    },

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// name cannot be represented in Windows-1252
    #[error("name {0:?} cannot be encoded as windows-1252")]
    UnencodableName(String),

    /// name does not fit in a length prefixed string
    #[error("name {0:?} is longer than 255 bytes")]
    NameTooLong(String),

    /// sizes or offsets no longer fit the 32 bit fields of the format
    #[error("archive exceeds the 4GiB limit of the format")]
    ArchiveTooLarge,

    /// a stored path would escape the extraction directory
    #[error("refusing to extract unsafe path {0:?}")]
    UnsafePath(String),

    /// a bulk operation was cancelled before completion
    #[error("operation cancelled")]
    Cancelled,

    /// Transparent wrapper for [`rayon::ThreadPoolBuildError`]
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// by folder path {0}
    #[error("by folder {0}")]
    Folder(String),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
