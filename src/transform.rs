//! Contract for the external compression/decompression primitive.
//!
//! The actual transform (XZ/LZMA2) is a black-box collaborator: it accepts a
//! byte sequence plus a small configuration and either produces an output
//! byte sequence or fails with one of a fixed taxonomy of error kinds. This
//! crate only specifies and consumes that contract; it ships no
//! implementation of the algorithm itself.

use std::fmt;

#[cfg(feature = "async")]
use std::future::Future;
#[cfg(feature = "async")]
use std::pin::Pin;

/// The coder rejects filter chains longer than this (one slot of the
/// underlying chain is reserved for its terminator).
pub const FILTERS_MAX: usize = 3;

/// Failure kinds the external primitive can signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Cannot allocate memory.
    Memory,
    /// Memory usage limit was reached.
    MemoryLimit,
    /// File format not recognized.
    Format,
    /// Invalid or unsupported options.
    Options,
    /// Data is corrupt.
    Data,
    /// No progress is possible (truncated input or full output buffer).
    Buffer,
    /// Internal programming error in the primitive.
    Internal,
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "Cannot allocate memory"),
            Self::MemoryLimit => write!(f, "Memory usage limit was reached"),
            Self::Format => write!(f, "File format not recognized"),
            Self::Options => write!(f, "Invalid or unsupported options"),
            Self::Data => write!(f, "Data is corrupt"),
            Self::Buffer => write!(f, "No progress is possible"),
            Self::Internal => write!(f, "Internal error (bug)"),
        }
    }
}

impl std::error::Error for TransformError {}

/// Integrity check calculated over the uncompressed data.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityCheck {
    None,
    Crc32,
    #[default]
    Crc64,
    Sha256,
}

/// Preprocessing filters the primitive can chain before the entropy coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Lzma1,
    Lzma2,
    /// Byte delta encoding (audio, images).
    Delta,
    /// x86 CALL/JMP preprocessing.
    X86,
    PowerPc,
    Ia64,
    Arm,
    ArmThumb,
    Sparc,
}

/// Configuration handed to the primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Compression level 0-9.
    pub level: u32,
    pub check: IntegrityCheck,
    /// Optional filter chain, at most [`FILTERS_MAX`] entries.
    pub filters: Vec<Filter>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            level: 6,
            check: IntegrityCheck::default(),
            filters: Vec::new(),
        }
    }
}

impl TransformOptions {
    /// Validate before constructing a coder, mirroring the primitive's own
    /// rejection of bad presets and over-long filter chains.
    pub fn validate(&self) -> Result<(), TransformError> {
        if self.level > 9 {
            return Err(TransformError::Options);
        }
        if self.filters.len() > FILTERS_MAX {
            return Err(TransformError::Options);
        }
        Ok(())
    }
}

/// Outcome of one transform invocation.
pub type TransformResult = Result<Vec<u8>, TransformError>;

/// The black-box compress/decompress primitive.
///
/// Implement this for a concrete coder (an XZ binding, a test stub, a remote
/// service). The [`CodingPool`](crate::CodingPool) throttles concurrent
/// invocations of implementations of this trait.
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub trait Transform: Send + Sync {
    fn apply(
        &self,
        input: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = TransformResult> + Send + '_>>;
}
