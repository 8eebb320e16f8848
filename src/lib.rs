//! Streaming TAR/USTAR/PAX archive codec.
//!
//! Parses and constructs tar archives incrementally across arbitrarily
//! sized, arbitrarily aligned byte chunks, with byte-exact round-trip
//! fidelity (checksums, padding, end-of-archive sentinel included). PAX
//! extended headers overlay the fixed-width ustar fields, so long names and
//! large sizes survive the trip.
//!
//! The compression side is deliberately external: the crate specifies the
//! contract of an XZ-shaped transform ([`Transform`], [`TransformError`])
//! and, with the `async` feature, a bounded-concurrency pool
//! ([`CodingPool`]) that throttles and instruments invocations of it.
//!
//! ## Features
//! - Core codec has **zero dependencies**
//! - `async` - coding pool and async transform trait (tokio-based)

pub mod error;
pub mod parsing;
pub mod reader;
pub mod transform;
pub mod writer;

// Async modules (require 'async' feature)
#[cfg(feature = "async")]
pub mod pool;

pub use error::TarError;
pub use parsing::{
    is_zero_block, needs_pax_headers, padding_for, Entry, EntryType, HeaderCodec, PaxAttributes,
    PaxValue, BLOCK_SIZE, SIZE_FIELD_MAX,
};
pub use reader::{ArchiveEntry, ArchiveReader};
pub use transform::{Filter, IntegrityCheck, TransformError, TransformOptions};
pub use writer::ArchiveWriter;

#[cfg(feature = "async")]
pub use transform::Transform;

#[cfg(feature = "async")]
pub use pool::{CodingPool, PoolError, PoolMetrics, TaskHandle};
