//! Streaming archive reader.
//!
//! [`ArchiveReader`] consumes byte chunks of any size and alignment and
//! yields entries in archive order. All cross-chunk accumulation lives in one
//! owned state value per reader: the unconsumed residue, the byte count of
//! the region currently being read or skipped, the pending PAX attribute
//! slot, and the consecutive-zero-block counter that detects the
//! end-of-archive sentinel.
//!
//! The reader is synchronous and never blocks; suspension happens at the
//! caller's I/O boundary, between `feed` calls.

use crate::error::{Result, TarError};
use crate::parsing::{
    is_zero_block, padding_for, Entry, EntryType, HeaderCodec, PaxAttributes, BLOCK_SIZE,
};

/// One yielded archive member: metadata, plus content bytes when the reader
/// was constructed in content-collecting mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub entry: Entry,
    /// `Some` in content mode, `None` in metadata-only mode.
    pub content: Option<Vec<u8>>,
}

/// What the in-progress byte region (content plus padding) is for.
enum Region {
    /// Entry content, collected and emitted with the entry.
    Content(Entry),
    /// Entry content, discarded byte by byte (metadata-only mode).
    SkipContent(Entry),
    /// Local PAX data, decoded into the pending attribute slot.
    PaxLocal,
    /// Global PAX data, consumed and discarded.
    PaxGlobal,
}

/// A declared byte region mid-read: `remaining` content bytes, then
/// `padding` bytes to the next block boundary.
struct InProgress {
    region: Region,
    remaining: usize,
    padding: usize,
    buf: Vec<u8>,
}

/// Incremental TAR/USTAR/PAX parser over arbitrarily-chunked input.
///
/// `feed` chunks in order; entries come back as soon as their bytes are
/// complete. Call [`finish`](Self::finish) after the last chunk to surface
/// truncation. A reader that has seen the end-of-archive sentinel consumes
/// nothing further; a reader that returned an error is expected to be
/// discarded.
pub struct ArchiveReader {
    residue: Vec<u8>,
    current: Option<InProgress>,
    pending_pax: Option<PaxAttributes>,
    empty_blocks: u8,
    ended: bool,
    collect_content: bool,
}

impl ArchiveReader {
    /// Reader that collects entry content.
    pub fn new() -> Self {
        Self::with_mode(true)
    }

    /// Reader that yields metadata only, skipping content bytes as they
    /// stream past (a listing never buffers file data).
    pub fn metadata_only() -> Self {
        Self::with_mode(false)
    }

    fn with_mode(collect_content: bool) -> Self {
        Self {
            residue: Vec::new(),
            current: None,
            pending_pax: None,
            empty_blocks: 0,
            ended: false,
            collect_content,
        }
    }

    /// Whether the end-of-archive sentinel has been seen.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Consume one chunk and return the entries it completed, in archive
    /// order. Chunks may have any length, including zero. After the archive
    /// has ended, feeding consumes nothing and yields nothing.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<ArchiveEntry>> {
        if self.ended {
            return Ok(Vec::new());
        }
        self.residue.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut pos = 0;

        while !self.ended {
            if let Some(current) = &mut self.current {
                // content bytes first, then the padding to the block boundary
                let take = current.remaining.min(self.residue.len() - pos);
                if take > 0 {
                    if matches!(current.region, Region::Content(_) | Region::PaxLocal) {
                        current.buf.extend_from_slice(&self.residue[pos..pos + take]);
                    }
                    current.remaining -= take;
                    pos += take;
                }
                let pad = current.padding.min(self.residue.len() - pos);
                current.padding -= pad;
                pos += pad;

                if current.remaining > 0 || current.padding > 0 {
                    break;
                }
                if let Some(done) = self.current.take() {
                    self.complete_region(done, &mut out);
                }
                continue;
            }

            if self.residue.len() - pos < BLOCK_SIZE {
                break;
            }
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&self.residue[pos..pos + BLOCK_SIZE]);
            pos += BLOCK_SIZE;

            if is_zero_block(&block) {
                self.empty_blocks += 1;
                if self.empty_blocks == 2 {
                    self.ended = true;
                }
                continue;
            }
            self.empty_blocks = 0;

            let Some(entry) = HeaderCodec::decode(&block) else {
                continue;
            };
            self.begin_region(entry, &mut out);
        }

        if self.ended {
            // trailing bytes after the sentinel are never examined
            self.residue.clear();
        } else {
            self.residue.drain(..pos);
        }
        Ok(out)
    }

    /// Signal end of input.
    ///
    /// Bytes still owed to a declared region, or a partial header block left
    /// in the residue, are a truncation error. A single trailing zero block
    /// and a missing sentinel with otherwise clean state are both tolerated
    /// end states.
    pub fn finish(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        if let Some(current) = &self.current {
            return Err(TarError::Truncated {
                missing: current.remaining + current.padding,
            });
        }
        if !self.residue.is_empty() {
            return Err(TarError::Truncated {
                missing: BLOCK_SIZE - self.residue.len(),
            });
        }
        self.ended = true;
        Ok(())
    }

    /// Classify a decoded header and set up its byte region.
    fn begin_region(&mut self, entry: Entry, out: &mut Vec<ArchiveEntry>) {
        match entry.entry_type {
            EntryType::PaxHeader => {
                self.start(Region::PaxLocal, entry.size);
            }
            EntryType::PaxGlobal => {
                self.start(Region::PaxGlobal, entry.size);
            }
            _ => {
                // the pending overlay decorates exactly this entry; applied
                // before the content length is decided so a PAX size
                // override governs the content region
                let merged = match self.pending_pax.take() {
                    Some(attrs) => attrs.apply(&entry),
                    None => entry,
                };
                let size = merged.size;
                if size == 0 {
                    out.push(self.emit(merged, Vec::new()));
                } else if self.collect_content {
                    self.start(Region::Content(merged), size);
                } else {
                    self.start(Region::SkipContent(merged), size);
                }
            }
        }
    }

    fn start(&mut self, region: Region, size: u64) {
        // buf capacity grows with delivered bytes, never with the declared
        // size, so a lying header cannot force a huge allocation up front
        self.current = Some(InProgress {
            region,
            remaining: size as usize,
            padding: padding_for(size),
            buf: Vec::new(),
        });
    }

    fn complete_region(&mut self, done: InProgress, out: &mut Vec<ArchiveEntry>) {
        match done.region {
            Region::Content(entry) | Region::SkipContent(entry) => {
                out.push(self.emit(entry, done.buf));
            }
            Region::PaxLocal => {
                // a second PAX header before any entry overwrites the first
                self.pending_pax = Some(PaxAttributes::decode(&done.buf));
            }
            Region::PaxGlobal => {}
        }
    }

    fn emit(&self, entry: Entry, content: Vec<u8>) -> ArchiveEntry {
        ArchiveEntry {
            entry,
            content: self.collect_content.then_some(content),
        }
    }
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new()
    }
}
