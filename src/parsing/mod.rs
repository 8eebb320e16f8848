//! TAR record codecs: fixed-layout primary headers and the PAX
//! extended-attribute overlay format.

pub mod header;
pub mod pax;

pub use header::{
    is_zero_block, padding_for, Entry, EntryType, HeaderCodec, BLOCK_SIZE, SIZE_FIELD_MAX,
};
pub use pax::{
    encode_record, needs_pax_headers, pax_header_blocks, PaxAttributes, PaxValue, LINKNAME_MAX,
    NAME_MAX,
};
