//! Primary (USTAR) header codec.
//!
//! Every record in a tar archive is described by one fixed 512-byte header
//! block. Numeric fields are zero-padded octal ASCII, NUL- or
//! space-terminated; the checksum field is self-referential (it is computed
//! with its own eight bytes treated as spaces).

use crate::error::{Result, TarError};

/// Fixed block size: the alignment quantum for headers, padding and the
/// end-of-archive sentinel.
pub const BLOCK_SIZE: usize = 512;

/// Largest value representable in the 12-byte octal size field
/// (11 octal digits, 8 GiB - 1).
pub const SIZE_FIELD_MAX: u64 = 0o77_777_777_777;

// Fixed field offsets per POSIX ustar.
const NAME: (usize, usize) = (0, 100);
const MODE: (usize, usize) = (100, 8);
const UID: (usize, usize) = (108, 8);
const GID: (usize, usize) = (116, 8);
const SIZE: (usize, usize) = (124, 12);
const MTIME: (usize, usize) = (136, 12);
const CHKSUM: (usize, usize) = (148, 8);
const TYPEFLAG: usize = 156;
const LINKNAME: (usize, usize) = (157, 100);
const MAGIC: (usize, usize) = (257, 6);
const VERSION: (usize, usize) = (263, 2);
const UNAME: (usize, usize) = (265, 32);
const GNAME: (usize, usize) = (297, 32);
const DEVMAJOR: (usize, usize) = (329, 8);
const DEVMINOR: (usize, usize) = (337, 8);
const PREFIX: (usize, usize) = (345, 155);

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
const USTAR_VERSION: &[u8; 2] = b"00";

/// Type of an archive member.
///
/// `PaxHeader` and `PaxGlobal` are internal control types: they carry PAX
/// attribute data inside the archive and are never surfaced by the reader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    #[default]
    Regular,
    HardLink,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
    Contiguous,
    /// PAX extended header (`x`), decorating the immediately following entry.
    PaxHeader,
    /// PAX global extended header (`g`).
    PaxGlobal,
}

impl EntryType {
    /// Decode a typeflag byte. Old-style archives use NUL for regular files;
    /// unknown flags also fall back to `Regular` (tolerated malformation).
    pub fn from_flag(flag: u8) -> Self {
        match flag {
            b'1' => Self::HardLink,
            b'2' => Self::Symlink,
            b'3' => Self::CharDevice,
            b'4' => Self::BlockDevice,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            b'7' => Self::Contiguous,
            b'x' => Self::PaxHeader,
            b'g' => Self::PaxGlobal,
            _ => Self::Regular,
        }
    }

    /// Typeflag byte written into the header.
    pub fn flag(self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::HardLink => b'1',
            Self::Symlink => b'2',
            Self::CharDevice => b'3',
            Self::BlockDevice => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::Contiguous => b'7',
            Self::PaxHeader => b'x',
            Self::PaxGlobal => b'g',
        }
    }

    /// Whether this is one of the internal PAX control types.
    pub fn is_pax_control(self) -> bool {
        matches!(self, Self::PaxHeader | Self::PaxGlobal)
    }
}

/// Logical description of one archive member.
///
/// Constructed by [`HeaderCodec::decode`] on the read path or by the caller
/// on the write path. PAX attributes overlay a decoded entry exactly once
/// (see [`PaxAttributes::apply`]); entries are never mutated after being
/// yielded.
///
/// [`PaxAttributes::apply`]: crate::parsing::PaxAttributes::apply
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub entry_type: EntryType,
    /// Content length in bytes; header blocks and padding are not counted.
    pub size: u64,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    /// Seconds since the epoch. Sub-second PAX precision is floored.
    pub mtime: u64,
    pub uname: String,
    pub gname: String,
    pub devmajor: u64,
    pub devminor: u64,
    pub linkname: String,
}

/// Codec for single 512-byte ustar header blocks.
pub struct HeaderCodec;

impl HeaderCodec {
    /// Encode an entry into one header block, including checksum.
    ///
    /// Fails with [`TarError::FieldOverflow`] when a value does not fit its
    /// fixed-width field. Callers are expected to have promoted overflowing
    /// entries to PAX form first (see
    /// [`needs_pax_headers`](crate::parsing::needs_pax_headers)).
    pub fn encode(entry: &Entry) -> Result<[u8; BLOCK_SIZE]> {
        let mut block = [0u8; BLOCK_SIZE];

        let (name, prefix) = split_name(&entry.name)?;
        write_string(&mut block, NAME, name, "name")?;
        write_string(&mut block, PREFIX, prefix, "name")?;

        write_octal(&mut block, MODE, u64::from(entry.mode), "mode")?;
        write_octal(&mut block, UID, entry.uid, "uid")?;
        write_octal(&mut block, GID, entry.gid, "gid")?;
        write_octal(&mut block, SIZE, entry.size, "size")?;
        write_octal(&mut block, MTIME, entry.mtime, "mtime")?;

        block[TYPEFLAG] = entry.entry_type.flag();
        write_string(&mut block, LINKNAME, &entry.linkname, "linkname")?;

        block[MAGIC.0..MAGIC.0 + MAGIC.1].copy_from_slice(USTAR_MAGIC);
        block[VERSION.0..VERSION.0 + VERSION.1].copy_from_slice(USTAR_VERSION);

        write_string(&mut block, UNAME, &entry.uname, "uname")?;
        write_string(&mut block, GNAME, &entry.gname, "gname")?;
        write_octal(&mut block, DEVMAJOR, entry.devmajor, "devmajor")?;
        write_octal(&mut block, DEVMINOR, entry.devminor, "devminor")?;

        write_checksum(&mut block);
        Ok(block)
    }

    /// Decode one header block.
    ///
    /// Returns `None` for the all-zero sentinel block. Otherwise decoding is
    /// permissive and never fails: unterminated or empty numeric fields
    /// decode to zero, strings are lossy UTF-8. The checksum is *not*
    /// verified here; that is a separate, explicit operation.
    pub fn decode(block: &[u8; BLOCK_SIZE]) -> Option<Entry> {
        if is_zero_block(block) {
            return None;
        }

        let mut name = read_string(block, NAME);
        let prefix = read_string(block, PREFIX);
        if !prefix.is_empty() {
            name = format!("{}/{}", prefix, name);
        }

        Some(Entry {
            name,
            entry_type: EntryType::from_flag(block[TYPEFLAG]),
            size: read_octal(block, SIZE),
            mode: read_octal(block, MODE) as u32,
            uid: read_octal(block, UID),
            gid: read_octal(block, GID),
            mtime: read_octal(block, MTIME),
            uname: read_string(block, UNAME),
            gname: read_string(block, GNAME),
            devmajor: read_octal(block, DEVMAJOR),
            devminor: read_octal(block, DEVMINOR),
            linkname: read_string(block, LINKNAME),
        })
    }

    /// Unsigned byte sum of the block with the checksum field's eight bytes
    /// treated as ASCII spaces, regardless of their actual contents.
    pub fn compute_checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
        let mut sum = 0u32;
        for (i, &b) in block.iter().enumerate() {
            if (CHKSUM.0..CHKSUM.0 + CHKSUM.1).contains(&i) {
                sum += u32::from(b' ');
            } else {
                sum += u32::from(b);
            }
        }
        sum
    }

    /// Compare the computed checksum against the stored field value.
    ///
    /// A mismatch signals corruption; the streaming reader treats this as a
    /// soft condition and leaves the decision to the caller.
    pub fn verify_checksum(block: &[u8; BLOCK_SIZE]) -> bool {
        Self::require_checksum(block).is_ok()
    }

    /// Explicit verification that surfaces a mismatch as
    /// [`TarError::InvalidChecksum`].
    pub fn require_checksum(block: &[u8; BLOCK_SIZE]) -> Result<()> {
        let stored = parse_octal(&block[CHKSUM.0..CHKSUM.0 + CHKSUM.1]) as u32;
        let computed = Self::compute_checksum(block);
        if computed == stored {
            Ok(())
        } else {
            Err(TarError::InvalidChecksum { computed, stored })
        }
    }
}

/// A block is the sentinel marker if and only if all 512 bytes are zero.
pub fn is_zero_block(block: &[u8; BLOCK_SIZE]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Bytes of zero padding needed after `size` content bytes to reach the next
/// block boundary.
pub fn padding_for(size: u64) -> usize {
    ((BLOCK_SIZE as u64 - (size % BLOCK_SIZE as u64)) % BLOCK_SIZE as u64) as usize
}

/// Split an over-long name across the ustar prefix field.
///
/// Names up to 100 bytes go in the name field untouched. Longer names are
/// split at a `/` so that the suffix fits 100 bytes and the prefix 155; a
/// long name with no such split point cannot be represented and must go
/// through PAX instead.
fn split_name(name: &str) -> Result<(&str, &str)> {
    if name.len() <= NAME.1 {
        return Ok((name, ""));
    }
    let bytes = name.as_bytes();
    let min = name.len().saturating_sub(NAME.1 + 1);
    for i in min..=PREFIX.1.min(name.len() - 1) {
        if bytes[i] == b'/' {
            return Ok((&name[i + 1..], &name[..i]));
        }
    }
    Err(TarError::FieldOverflow { field: "name" })
}

fn write_string(
    block: &mut [u8; BLOCK_SIZE],
    field: (usize, usize),
    value: &str,
    name: &'static str,
) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > field.1 {
        return Err(TarError::FieldOverflow { field: name });
    }
    block[field.0..field.0 + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Write `value` as zero-padded octal digits followed by a NUL terminator.
fn write_octal(
    block: &mut [u8; BLOCK_SIZE],
    field: (usize, usize),
    value: u64,
    name: &'static str,
) -> Result<()> {
    let digits = field.1 - 1;
    if value > max_octal(digits) {
        return Err(TarError::FieldOverflow { field: name });
    }
    let text = format!("{:0width$o}", value, width = digits);
    block[field.0..field.0 + digits].copy_from_slice(text.as_bytes());
    block[field.0 + digits] = 0;
    Ok(())
}

/// The checksum is written last: blank-fill the field with spaces, sum the
/// whole block, then format the sum back in as six octal digits, NUL, space.
fn write_checksum(block: &mut [u8; BLOCK_SIZE]) {
    block[CHKSUM.0..CHKSUM.0 + CHKSUM.1].fill(b' ');
    let sum = HeaderCodec::compute_checksum(block);
    let text = format!("{:06o}", sum);
    block[CHKSUM.0..CHKSUM.0 + 6].copy_from_slice(text.as_bytes());
    block[CHKSUM.0 + 6] = 0;
    block[CHKSUM.0 + 7] = b' ';
}

fn max_octal(digits: usize) -> u64 {
    (1u64 << (3 * digits as u64)) - 1
}

fn read_octal(block: &[u8; BLOCK_SIZE], field: (usize, usize)) -> u64 {
    parse_octal(&block[field.0..field.0 + field.1])
}

/// Permissive octal parsing: bytes up to the first NUL or space, interpreted
/// as octal. An empty or malformed field decodes to zero, never an error.
pub(crate) fn parse_octal(field: &[u8]) -> u64 {
    let mut value = 0u64;
    let mut seen = false;
    for &b in field {
        match b {
            0 | b' ' => break,
            b'0'..=b'7' => {
                value = (value << 3) | u64::from(b - b'0');
                seen = true;
            }
            _ => return 0,
        }
    }
    if seen {
        value
    } else {
        0
    }
}

fn read_string(block: &[u8; BLOCK_SIZE], field: (usize, usize)) -> String {
    let bytes = &block[field.0..field.0 + field.1];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Entry {
        Entry {
            name: "a.txt".to_string(),
            entry_type: EntryType::Regular,
            size: 5,
            mode: 0o644,
            uid: 1000,
            gid: 1000,
            mtime: 1_600_000_000,
            uname: "user".to_string(),
            gname: "group".to_string(),
            ..Entry::default()
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let entry = sample_entry();
        let block = HeaderCodec::encode(&entry).unwrap();
        let decoded = HeaderCodec::decode(&block).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_magic_and_layout() {
        let block = HeaderCodec::encode(&sample_entry()).unwrap();
        assert_eq!(&block[257..263], b"ustar\0");
        assert_eq!(&block[263..265], b"00");
        assert_eq!(block[156], b'0');
        // size = 5 -> "00000000005\0"
        assert_eq!(&block[124..136], b"00000000005\0");
    }

    #[test]
    fn test_checksum_verifies() {
        let block = HeaderCodec::encode(&sample_entry()).unwrap();
        assert!(HeaderCodec::verify_checksum(&block));
    }

    #[test]
    fn test_checksum_detects_flip() {
        let mut block = HeaderCodec::encode(&sample_entry()).unwrap();
        block[0] ^= 0x01;
        assert!(!HeaderCodec::verify_checksum(&block));
        assert!(matches!(
            HeaderCodec::require_checksum(&block),
            Err(TarError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn test_zero_block_is_sentinel() {
        let block = [0u8; BLOCK_SIZE];
        assert!(is_zero_block(&block));
        assert!(HeaderCodec::decode(&block).is_none());
    }

    #[test]
    fn test_nonzero_byte_breaks_sentinel() {
        let mut block = [0u8; BLOCK_SIZE];
        block[511] = 1;
        assert!(!is_zero_block(&block));
        assert!(HeaderCodec::decode(&block).is_some());
    }

    #[test]
    fn test_permissive_octal() {
        assert_eq!(parse_octal(b"0000644\0"), 0o644);
        assert_eq!(parse_octal(b"644 "), 0o644);
        // unterminated, exactly filling the field
        assert_eq!(parse_octal(b"77777777"), 0o77_777_777);
        // empty and malformed fields decode to zero
        assert_eq!(parse_octal(b"\0\0\0\0"), 0);
        assert_eq!(parse_octal(b"        "), 0);
        assert_eq!(parse_octal(b"12x45\0\0\0"), 0);
    }

    #[test]
    fn test_old_style_typeflag() {
        assert_eq!(EntryType::from_flag(0), EntryType::Regular);
        assert_eq!(EntryType::from_flag(b'0'), EntryType::Regular);
        assert_eq!(EntryType::from_flag(b'z'), EntryType::Regular);
        assert_eq!(EntryType::from_flag(b'x'), EntryType::PaxHeader);
    }

    #[test]
    fn test_prefix_split_round_trip() {
        let name = format!("{}/{}", "d".repeat(120), "f".repeat(80));
        let entry = Entry {
            name: name.clone(),
            ..sample_entry()
        };
        let block = HeaderCodec::encode(&entry).unwrap();
        let decoded = HeaderCodec::decode(&block).unwrap();
        assert_eq!(decoded.name, name);
    }

    #[test]
    fn test_unsplittable_name_overflows() {
        let entry = Entry {
            name: "x".repeat(150),
            ..sample_entry()
        };
        assert!(matches!(
            HeaderCodec::encode(&entry),
            Err(TarError::FieldOverflow { field: "name" })
        ));
    }

    #[test]
    fn test_size_overflow_fails_fast() {
        let entry = Entry {
            size: SIZE_FIELD_MAX + 1,
            ..sample_entry()
        };
        assert!(matches!(
            HeaderCodec::encode(&entry),
            Err(TarError::FieldOverflow { field: "size" })
        ));
    }

    #[test]
    fn test_padding_for() {
        assert_eq!(padding_for(0), 0);
        assert_eq!(padding_for(5), 507);
        assert_eq!(padding_for(512), 0);
        assert_eq!(padding_for(513), 511);
    }
}
