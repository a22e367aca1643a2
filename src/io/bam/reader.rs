//! Indexed random-access BAM reader.
//!
//! [`IndexedBamReader`] combines the three lower layers:
//!
//! 1. [`RegionIndex`] turns a region into chunks of virtual offsets
//! 2. [`BgzfReader`] seeks to and inflates the member each offset points into
//! 3. [`RecordDecoder`] decodes records from the inflated payload
//!
//! Records are filtered against the query after decoding, since bins are
//! coarser than the region. A record whose bytes continue into the next
//! member is reassembled in a scratch buffer.
//!
//! # Usage
//!
//! ```no_run
//! use bamseek::IndexedBamReader;
//!
//! # fn main() -> bamseek::Result<()> {
//! let mut bam = IndexedBamReader::open("alignments.bam", None::<&str>)?;
//! println!("{} references", bam.reference_names()?.len());
//!
//! for record in bam.alignments_overlapping("chr1", 10_000, 20_000)? {
//!     println!("{} at {}", record.read_name, record.position);
//! }
//! # Ok(())
//! # }
//! ```

use super::header::BamHeader;
use super::index::RegionIndex;
use super::record::{AlignmentRecord, RecordDecoder};
use crate::error::{BamSeekError, Result};
use crate::io::bgzf::{BgzfReader, BlockStats};
use crate::io::cursor::ByteCursor;
use crate::io::virtual_offset::VirtualOffset;
use log::{debug, trace};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How an [`IndexedBamReader`] finds and treats its index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Explicit index path. When `None`, `<bam>.bai` is tried first, then the
    /// BAM path with its extension replaced by `bai`.
    pub index_path: Option<PathBuf>,
    /// Fail region queries when the index is missing or invalid instead of
    /// returning no alignments.
    pub require_index: bool,
}

impl ReaderOptions {
    /// Use the index at `path`.
    pub fn with_index_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.index_path = Some(path.into());
        self
    }

    /// Make a missing or invalid index an error.
    pub fn require_index(mut self, require: bool) -> Self {
        self.require_index = require;
        self
    }
}

/// Index paths to try for `bam_path`, in order.
pub fn index_path_candidates(bam_path: &Path) -> Vec<PathBuf> {
    let mut appended = bam_path.as_os_str().to_owned();
    appended.push(".bai");
    let mut candidates = vec![PathBuf::from(appended)];
    let replaced = bam_path.with_extension("bai");
    if !candidates.contains(&replaced) && replaced != bam_path {
        candidates.push(replaced);
    }
    candidates
}

#[derive(Debug)]
struct LoadedHeader {
    header: BamHeader,
    first_record: VirtualOffset,
}

enum Decoded {
    Complete {
        record: AlignmentRecord,
        end: usize,
        block_len: usize,
    },
    Partial(Vec<u8>),
}

/// Random-access reader answering region queries over a BAM file.
///
/// The header and the index are read on first use and kept for the lifetime
/// of the reader. One reader serves one query at a time; use
/// [`IndexedBamReader::with_index`] to share a loaded index between readers.
#[derive(Debug)]
pub struct IndexedBamReader {
    bgzf: BgzfReader,
    index_path: PathBuf,
    require_index: bool,
    header: Option<LoadedHeader>,
    index: Option<Arc<RegionIndex>>,
}

impl IndexedBamReader {
    /// Open `path`, using `index_path` or the default index location.
    pub fn open<P, Q>(path: P, index_path: Option<Q>) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: Into<PathBuf>,
    {
        let options = ReaderOptions {
            index_path: index_path.map(Into::into),
            ..ReaderOptions::default()
        };
        Self::open_with_options(path, options)
    }

    /// Open `path` with explicit options.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let bgzf = BgzfReader::open(path)?;
        let index_path = match options.index_path {
            Some(index_path) => index_path,
            None => resolve_index_path(path),
        };
        debug!("Opened {} (index {})", path.display(), index_path.display());
        Ok(Self {
            bgzf,
            index_path,
            require_index: options.require_index,
            header: None,
            index: None,
        })
    }

    /// Open `path` with an index that is already loaded.
    pub fn with_index<P: AsRef<Path>>(path: P, index: Arc<RegionIndex>) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self {
            bgzf: BgzfReader::open(path)?,
            index_path: resolve_index_path(path),
            require_index: false,
            header: None,
            index: Some(index),
        })
    }

    /// Path of the BAM file.
    pub fn path(&self) -> &Path {
        self.bgzf.path()
    }

    /// Path the index is (or would be) loaded from.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Parsed header.
    pub fn header(&mut self) -> Result<&BamHeader> {
        Ok(&self.loaded_header()?.header)
    }

    /// SAM header text.
    pub fn header_text(&mut self) -> Result<&str> {
        Ok(self.header()?.text.as_str())
    }

    /// Reference names in header order.
    pub fn reference_names(&mut self) -> Result<Vec<&str>> {
        Ok(self.header()?.references.names().collect())
    }

    /// The region index, loading it on first use.
    ///
    /// A missing or invalid index becomes an empty index unless the reader
    /// was opened with [`ReaderOptions::require_index`].
    pub fn index(&mut self) -> Result<Arc<RegionIndex>> {
        if let Some(index) = &self.index {
            return Ok(Arc::clone(index));
        }
        let index = if self.require_index {
            RegionIndex::from_path(&self.index_path)?
        } else {
            RegionIndex::load_or_empty(&self.index_path)
        };
        let index = Arc::new(index);
        self.index = Some(Arc::clone(&index));
        Ok(index)
    }

    /// BGZF work counters.
    pub fn block_stats(&self) -> BlockStats {
        self.bgzf.stats()
    }

    /// All alignments on `chr` overlapping the 1-based range `[start, end)`.
    ///
    /// A record matches when `position < end` and
    /// `position + reference_span > start`. Empty ranges and ranges starting
    /// past the end of the reference return nothing.
    pub fn alignments_overlapping(
        &mut self,
        chr: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<AlignmentRecord>> {
        let references = &self.header()?.references;
        let ref_id = references
            .index_of(chr)
            .ok_or_else(|| BamSeekError::UnknownReference(chr.to_string()))?;
        let ref_len = references.get(ref_id).map_or(0, |r| u64::from(r.length));

        if start >= end || start > ref_len {
            return Ok(Vec::new());
        }

        let index = self.index()?;
        let chunks = index.chunks_for_region(ref_id, start.saturating_sub(1), end);
        let end_pos = i64::try_from(end).unwrap_or(i64::MAX);

        let mut results = Vec::new();
        let mut scanned_to = VirtualOffset::default();

        'chunks: for chunk in chunks {
            let mut at = chunk.start.max(scanned_to);
            while at < chunk.end {
                let Some((record, next)) = self.read_record_at(at)? else {
                    break 'chunks;
                };
                at = next;
                scanned_to = next;

                match record.reference_id {
                    Some(id) if id == ref_id => {
                        if record.position >= end_pos {
                            break 'chunks;
                        }
                        if record.overlaps(start, end) {
                            results.push(record);
                        }
                    }
                    Some(id) if id < ref_id => {}
                    _ => break 'chunks,
                }
            }
        }

        debug!(
            "{}:{}-{} returned {} alignment(s)",
            chr,
            start,
            end,
            results.len()
        );
        Ok(results)
    }

    /// Iterate every record after the header, in file order.
    pub fn records(&mut self) -> Result<Records<'_>> {
        let first = self.loaded_header()?.first_record;
        Ok(Records {
            reader: self,
            next: Some(first),
        })
    }

    fn loaded_header(&mut self) -> Result<&LoadedHeader> {
        let loaded = match self.header.take() {
            Some(loaded) => loaded,
            None => self.read_header()?,
        };
        Ok(self.header.insert(loaded))
    }

    fn read_header(&mut self) -> Result<LoadedHeader> {
        if !self.bgzf.read_block_header(0)? {
            return Err(BamSeekError::InvalidHeader(
                "container has no data blocks".into(),
            ));
        }
        let mut buffer = self.bgzf.decompress()?.to_vec();
        let mut blocks = vec![(0u64, buffer.len())];

        loop {
            let mut decoder = RecordDecoder::new(&buffer);
            match decoder.read_reference_table() {
                Ok(Some(header)) => {
                    let first_record = self.locate(&blocks, decoder.position())?;
                    debug!(
                        "Header: {} reference(s), first record at {}",
                        header.references.len(),
                        first_record
                    );
                    return Ok(LoadedHeader {
                        header,
                        first_record,
                    });
                }
                Ok(None) => {
                    debug!("First block has no BAM magic; decoding records from 0:0");
                    return Ok(LoadedHeader {
                        header: BamHeader::default(),
                        first_record: VirtualOffset::default(),
                    });
                }
                Err(e) if e.is_out_of_bounds() => {
                    if !self.bgzf.advance()? {
                        return Err(BamSeekError::InvalidHeader(
                            "header truncated at end of container".into(),
                        ));
                    }
                    let offset = self.bgzf.current_offset().unwrap_or_default();
                    let data = self.bgzf.decompress()?;
                    blocks.push((offset, data.len()));
                    buffer.extend_from_slice(data);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Virtual offset of byte `consumed` in the concatenation of `blocks`,
    /// where the last entry is the member the BGZF reader is positioned at.
    fn locate(&self, blocks: &[(u64, usize)], consumed: usize) -> Result<VirtualOffset> {
        let mut remaining = consumed;
        for &(offset, len) in blocks {
            if remaining < len {
                return in_block_offset(offset, remaining);
            }
            remaining -= len;
        }
        let next = self.bgzf.next_block_offset().unwrap_or_default();
        Ok(VirtualOffset::new(next, 0))
    }

    /// Virtual offset just past `end` bytes into the current member.
    fn offset_after(&self, end: usize, block_len: usize) -> Result<VirtualOffset> {
        if end < block_len {
            let offset = self.bgzf.current_offset().unwrap_or_default();
            return in_block_offset(offset, end);
        }
        let next = self.bgzf.next_block_offset().unwrap_or_default();
        Ok(VirtualOffset::new(next, 0))
    }

    /// Decode the record at `at`, returning it with the virtual offset of the
    /// record that follows. `Ok(None)` at end of container.
    fn read_record_at(
        &mut self,
        mut at: VirtualOffset,
    ) -> Result<Option<(AlignmentRecord, VirtualOffset)>> {
        loop {
            if !self.bgzf.read_block_header(at.compressed_offset())? {
                return Ok(None);
            }
            let len = self.bgzf.decompress()?.len();
            if usize::from(at.uncompressed_offset()) < len {
                break;
            }
            if usize::from(at.uncompressed_offset()) > len {
                return Err(BamSeekError::OutOfBounds {
                    offset: usize::from(at.uncompressed_offset()),
                    needed: 0,
                    available: 0,
                });
            }
            // Offset sits at the end of its member
            at = VirtualOffset::new(self.bgzf.next_block_offset().unwrap_or_default(), 0);
        }

        let start = usize::from(at.uncompressed_offset());
        let decoded = {
            let data = self.bgzf.decompress()?;
            let mut decoder = RecordDecoder::from_cursor(ByteCursor::at(data, start)?);
            match decoder.read_alignment() {
                Ok(record) => Decoded::Complete {
                    record,
                    end: decoder.position(),
                    block_len: data.len(),
                },
                Err(e) if e.is_out_of_bounds() => Decoded::Partial(data[start..].to_vec()),
                Err(e) => return Err(e),
            }
        };

        let mut scratch = match decoded {
            Decoded::Complete {
                record,
                end,
                block_len,
            } => {
                let next = self.offset_after(end, block_len)?;
                trace!("Record {} at {}", record.read_name, at);
                return Ok(Some((record, next)));
            }
            Decoded::Partial(scratch) => scratch,
        };

        loop {
            if !self.bgzf.advance()? {
                return Err(BamSeekError::invalid_record(
                    start,
                    format!("record at {} truncated at end of container", at),
                ));
            }
            let carried = scratch.len();
            let data = self.bgzf.decompress()?;
            let block_len = data.len();
            scratch.extend_from_slice(data);

            let mut decoder = RecordDecoder::new(&scratch);
            match decoder.read_alignment() {
                Ok(record) => {
                    let next = self.offset_after(decoder.position() - carried, block_len)?;
                    trace!("Record {} at {} spans members", record.read_name, at);
                    return Ok(Some((record, next)));
                }
                Err(e) if e.is_out_of_bounds() => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

fn resolve_index_path(bam_path: &Path) -> PathBuf {
    let candidates = index_path_candidates(bam_path);
    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .unwrap_or(&candidates[0])
        .clone()
}

fn in_block_offset(compressed: u64, uncompressed: usize) -> Result<VirtualOffset> {
    let uncompressed = u16::try_from(uncompressed).map_err(|_| {
        BamSeekError::malformed(
            compressed,
            format!("in-block offset {} exceeds 16 bits", uncompressed),
        )
    })?;
    Ok(VirtualOffset::new(compressed, uncompressed))
}

/// Iterator over all records of a BAM file.
///
/// Created by [`IndexedBamReader::records`]. Stops after the first error.
pub struct Records<'r> {
    reader: &'r mut IndexedBamReader,
    next: Option<VirtualOffset>,
}

impl<'r> Records<'r> {
    /// Virtual offset of the next record, `None` once exhausted.
    pub fn position(&self) -> Option<VirtualOffset> {
        self.next
    }
}

impl<'r> Iterator for Records<'r> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let at = self.next.take()?;
        match self.reader.read_record_at(at) {
            Ok(Some((record, next))) => {
                self.next = Some(next);
                Some(Ok(record))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
