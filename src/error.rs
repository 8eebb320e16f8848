//! Error types for TAR parsing and construction.
//!
//! This module provides the [`TarError`] type covering the container codec:
//! streaming reads ([`ArchiveReader`]), archive construction
//! ([`ArchiveWriter`]), and fixed-width header encoding.
//!
//! ## Error Categories
//!
//! | Category | Errors | Description |
//! |----------|--------|-------------|
//! | Structural | [`Truncated`] | Input ended mid-block or mid-content |
//! | Encoding | [`FieldOverflow`] | Value does not fit its fixed-width field |
//! | Integrity | [`InvalidChecksum`] | Explicit checksum verification failed |
//! | I/O | [`Io`] | Read/write errors from an underlying sink |
//!
//! Malformations the format community treats as benign (unterminated or empty
//! octal fields, a single trailing zero block, unknown PAX keys) are
//! normalized silently and never reach this type.
//!
//! [`ArchiveReader`]: crate::ArchiveReader
//! [`ArchiveWriter`]: crate::ArchiveWriter
//! [`Truncated`]: TarError::Truncated
//! [`FieldOverflow`]: TarError::FieldOverflow
//! [`InvalidChecksum`]: TarError::InvalidChecksum
//! [`Io`]: TarError::Io

use std::fmt;
use std::io;

/// Error type for TAR container operations.
#[derive(Debug)]
pub enum TarError {
    /// The input ended while a header block, PAX data region, or content
    /// region was still incomplete.
    ///
    /// Reported by [`ArchiveReader::finish`] when `feed` never delivered the
    /// bytes a previously decoded header promised.
    ///
    /// [`ArchiveReader::finish`]: crate::ArchiveReader::finish
    Truncated {
        /// Number of bytes still owed when the input ended.
        missing: usize,
    },

    /// A value does not fit the fixed-width octal or text field assigned to
    /// it in the 512-byte header layout.
    ///
    /// Callers are expected to consult
    /// [`needs_pax_headers`](crate::parsing::needs_pax_headers) and emit PAX
    /// blocks before encoding; reaching this error means that precondition
    /// was skipped.
    FieldOverflow {
        /// Header field name (`"name"`, `"size"`, ...).
        field: &'static str,
    },

    /// Explicit checksum verification found a mismatch.
    ///
    /// The reader never verifies checksums implicitly; this is only produced
    /// when a caller invokes [`HeaderCodec::verify_checksum`] and chooses to
    /// treat a `false` result as fatal.
    ///
    /// [`HeaderCodec::verify_checksum`]: crate::parsing::HeaderCodec::verify_checksum
    InvalidChecksum {
        /// Checksum computed over the block.
        computed: u32,
        /// Checksum stored in the header field.
        stored: u32,
    },

    /// An I/O error occurred while writing archive bytes to a sink.
    Io(io::Error),
}

impl fmt::Display for TarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { missing } => {
                write!(f, "Truncated archive: {} bytes still expected", missing)
            }
            Self::FieldOverflow { field } => {
                write!(f, "Value does not fit fixed-width header field '{}'", field)
            }
            Self::InvalidChecksum { computed, stored } => {
                write!(
                    f,
                    "Header checksum mismatch: computed {:o}, stored {:o}",
                    computed, stored
                )
            }
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for TarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TarError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, TarError>;
