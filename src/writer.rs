//! Archive construction.
//!
//! [`ArchiveWriter`] turns an ordered sequence of logical entries with
//! content into the block sequence the codecs define: PAX overflow blocks
//! where needed, primary headers with checksums, content, padding, and the
//! two-zero-block end-of-archive sentinel. Output is deterministic for fixed
//! inputs.

use std::io::Write;

use crate::error::Result;
use crate::parsing::{
    needs_pax_headers, padding_for, pax_header_blocks, Entry, EntryType, HeaderCodec,
    PaxAttributes, PaxValue, BLOCK_SIZE, LINKNAME_MAX, NAME_MAX, SIZE_FIELD_MAX,
};

/// Serializes entries into an in-memory archive.
pub struct ArchiveWriter {
    out: Vec<u8>,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self { out: Vec::new() }
    }

    /// Bytes emitted so far (headers, PAX blocks, content and padding; the
    /// sentinel is added by [`finish`](Self::finish)).
    pub fn bytes_written(&self) -> usize {
        self.out.len()
    }

    /// Serialize one entry followed by its content and padding.
    ///
    /// The path separator is normalized to `/`, and a zero-size entry whose
    /// name ends in `/` is typed as a directory. Entries whose name,
    /// linkname or size overflow the fixed-width header fields are promoted:
    /// PAX blocks carrying the overflowing values are emitted first, and the
    /// primary header gets truncated fallback values for PAX-unaware
    /// readers.
    pub fn append(&mut self, entry: &Entry, content: &[u8]) -> Result<()> {
        let mut entry = entry.clone();
        entry.name = entry.name.replace('\\', "/");
        entry.size = content.len() as u64;
        if entry.name.ends_with('/') && entry.size == 0 {
            entry.entry_type = EntryType::Directory;
        }

        if needs_pax_headers(&entry) {
            let mut attrs = PaxAttributes::new();
            if entry.name.len() > NAME_MAX {
                attrs.insert("path", PaxValue::Text(entry.name.clone()));
            }
            if entry.linkname.len() > LINKNAME_MAX {
                attrs.insert("linkpath", PaxValue::Text(entry.linkname.clone()));
            }
            if entry.size > SIZE_FIELD_MAX {
                attrs.insert("size", PaxValue::Number(entry.size as f64));
            }
            self.out
                .extend_from_slice(&pax_header_blocks(&entry.name, &attrs)?);

            // fallback values for the primary header; the PAX data is
            // authoritative
            if entry.name.len() > NAME_MAX {
                entry.name = truncate_str(&entry.name, 100).to_string();
            }
            if entry.linkname.len() > LINKNAME_MAX {
                entry.linkname = truncate_str(&entry.linkname, LINKNAME_MAX).to_string();
            }
            entry.size = entry.size.min(SIZE_FIELD_MAX);
        }

        self.out.extend_from_slice(&HeaderCodec::encode(&entry)?);
        self.out.extend_from_slice(content);
        let padding = padding_for(content.len() as u64);
        self.out.resize(self.out.len() + padding, 0);
        Ok(())
    }

    /// Append the end-of-archive sentinel and return the archive bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.out.resize(self.out.len() + 2 * BLOCK_SIZE, 0);
        self.out
    }

    /// Like [`finish`](Self::finish), writing the archive into an
    /// [`io::Write`](std::io::Write) sink instead of returning the buffer.
    pub fn finish_into<W: Write>(self, sink: &mut W) -> Result<()> {
        sink.write_all(&self.finish())?;
        Ok(())
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_entry_layout() {
        let mut writer = ArchiveWriter::new();
        let entry = Entry {
            name: "a.txt".to_string(),
            mode: 0o644,
            ..Entry::default()
        };
        writer.append(&entry, b"hello").unwrap();
        assert_eq!(writer.bytes_written(), 1024);
        let bytes = writer.finish();

        // header + padded content + two sentinel blocks
        assert_eq!(bytes.len(), 2048);
        assert_eq!(&bytes[512..517], b"hello");
        assert!(bytes[517..1024].iter().all(|&b| b == 0));
        assert!(bytes[1024..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_archive_is_just_sentinel() {
        let bytes = ArchiveWriter::new().finish();
        assert_eq!(bytes.len(), 1024);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_backslash_normalization_and_directory_typing() {
        let mut writer = ArchiveWriter::new();
        let entry = Entry {
            name: "dir\\sub/".to_string(),
            ..Entry::default()
        };
        writer.append(&entry, b"").unwrap();
        let bytes = writer.finish();

        let header: &[u8; 512] = bytes[..512].try_into().unwrap();
        let decoded = HeaderCodec::decode(header).unwrap();
        assert_eq!(decoded.name, "dir/sub/");
        assert_eq!(decoded.entry_type, EntryType::Directory);
    }

    #[test]
    fn test_long_name_promoted_to_pax() {
        let mut writer = ArchiveWriter::new();
        let long = "n".repeat(300);
        let entry = Entry {
            name: long.clone(),
            ..Entry::default()
        };
        writer.append(&entry, b"x").unwrap();
        let bytes = writer.finish();

        // PAX control header first
        let pax_header: &[u8; 512] = bytes[..512].try_into().unwrap();
        let control = HeaderCodec::decode(pax_header).unwrap();
        assert_eq!(control.entry_type, EntryType::PaxHeader);

        // PAX data carries the full path
        let data_len = control.size as usize;
        let attrs = PaxAttributes::decode(&bytes[512..512 + data_len]);
        assert_eq!(attrs.get("path"), Some(&PaxValue::Text(long)));

        // primary header holds the 100-byte fallback
        let pax_region = 512 + data_len + padding_for(control.size);
        let primary: &[u8; 512] = bytes[pax_region..pax_region + 512].try_into().unwrap();
        let fallback = HeaderCodec::decode(primary).unwrap();
        assert_eq!(fallback.name, "n".repeat(100));
    }

    #[test]
    fn test_deterministic_output() {
        let build = || {
            let mut writer = ArchiveWriter::new();
            let entry = Entry {
                name: "f".to_string(),
                mtime: 1_600_000_000,
                ..Entry::default()
            };
            writer.append(&entry, b"data").unwrap();
            writer.finish()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_finish_into_sink() {
        let mut writer = ArchiveWriter::new();
        writer
            .append(
                &Entry {
                    name: "x".to_string(),
                    ..Entry::default()
                },
                b"1",
            )
            .unwrap();
        let mut sink = Vec::new();
        writer.finish_into(&mut sink).unwrap();
        assert_eq!(sink.len(), 2048);
    }
}
