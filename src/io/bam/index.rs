//! BAI index loading and region planning.
//!
//! # Format
//!
//! ```text
//! magic        "BAI\1"
//! n_ref        int32
//! per reference:
//!   n_bin      int32
//!   per bin:
//!     bin      uint32
//!     n_chunk  int32
//!     chunks   n_chunk x (beg u64 virtual offset, end u64 virtual offset)
//!   n_intv     int32
//!   ioffset    n_intv x u64 virtual offset (one per 16 kbp tile)
//! n_no_coor    uint64 (optional)
//! ```
//!
//! Bin [`PSEUDO_BIN`] does not describe a region. Its two "chunks" hold the
//! reference's virtual offset range and its mapped/unmapped read counts.
//!
//! # Coordinates
//!
//! Everything in this module uses 0-based half-open intervals.

use crate::error::{BamSeekError, Result};
use crate::io::cursor::ByteCursor;
use crate::io::virtual_offset::VirtualOffset;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::Path;

/// BAI magic bytes.
pub const BAI_MAGIC: &[u8; 4] = b"BAI\x01";

/// Bin id carrying per-reference statistics instead of chunks.
pub const PSEUDO_BIN: BinId = 37450;

/// Largest coordinate the binning scheme addresses (2^29).
pub const MAX_COORDINATE: u64 = 1 << 29;

/// Linear index tile width is `1 << LINEAR_TILE_SHIFT` (16 kbp).
pub const LINEAR_TILE_SHIFT: u32 = 14;

/// (shift, first bin id) for the five levels below the root bin.
const BIN_LEVELS: [(u32, BinId); 5] = [(26, 1), (23, 9), (20, 73), (17, 585), (14, 4681)];

/// Bin identifier in the five-level hierarchical scheme.
pub type BinId = u32;

/// Range of virtual offsets `[start, end)` holding alignments for a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    /// First byte of the range
    pub start: VirtualOffset,
    /// One past the last byte of the range
    pub end: VirtualOffset,
}

impl Chunk {
    /// Create a chunk.
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Self { start, end }
    }
}

/// Contents of the pseudo-bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceStats {
    /// Virtual offset of the reference's first record
    pub start: VirtualOffset,
    /// Virtual offset just past its last record
    pub end: VirtualOffset,
    /// Mapped read count
    pub mapped: u64,
    /// Unmapped read count (placed on this reference)
    pub unmapped: u64,
}

/// Index data for one reference sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinIndex {
    bins: HashMap<BinId, Vec<Chunk>>,
    linear: Vec<VirtualOffset>,
    stats: Option<ReferenceStats>,
}

impl BinIndex {
    /// Build from parts.
    pub fn new(
        bins: HashMap<BinId, Vec<Chunk>>,
        linear: Vec<VirtualOffset>,
        stats: Option<ReferenceStats>,
    ) -> Self {
        Self { bins, linear, stats }
    }

    /// Chunks stored for `bin`.
    pub fn chunks(&self, bin: BinId) -> &[Chunk] {
        self.bins.get(&bin).map_or(&[], Vec::as_slice)
    }

    /// Number of bins with chunks.
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Linear tile array.
    pub fn linear(&self) -> &[VirtualOffset] {
        &self.linear
    }

    /// Pseudo-bin statistics, when present.
    pub fn stats(&self) -> Option<ReferenceStats> {
        self.stats
    }

    /// Smallest virtual offset any alignment overlapping `start` can have.
    ///
    /// Zero tiles hold no alignment start; the nearest earlier non-zero tile
    /// is used instead. Past the end of the array, or with no non-zero tile
    /// at or before `start`, the bound is zero.
    pub fn min_offset(&self, start: u64) -> VirtualOffset {
        let tile = usize::try_from(start >> LINEAR_TILE_SHIFT).unwrap_or(usize::MAX);
        if tile >= self.linear.len() {
            return VirtualOffset::default();
        }
        self.linear[..=tile]
            .iter()
            .rev()
            .find(|offset| !offset.is_null())
            .copied()
            .unwrap_or_default()
    }
}

/// Candidate bins for the 0-based half-open range `[start, end)`.
///
/// `end` is clamped to [`MAX_COORDINATE`]; an empty range is treated as the
/// single position `start`. Bin 0 is always included.
pub fn bins_for_range(start: u64, end: u64) -> Vec<BinId> {
    let start = start.min(MAX_COORDINATE - 1);
    let end = end.min(MAX_COORDINATE).max(start + 1) - 1;

    let mut bins = vec![0];
    for (shift, base) in BIN_LEVELS {
        let first = base + (start >> shift) as BinId;
        let last = base + (end >> shift) as BinId;
        bins.extend(first..=last);
    }
    bins
}

/// Sort chunks by start and merge overlapping or touching ranges.
pub fn merge_chunks(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_unstable();
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(last) if chunk.start <= last.end => last.end = last.end.max(chunk.end),
            _ => merged.push(chunk),
        }
    }
    merged
}

/// In-memory BAI index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionIndex {
    references: Vec<BinIndex>,
    unplaced_unmapped: Option<u64>,
}

impl RegionIndex {
    /// Index with no references; every query returns nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from per-reference data.
    pub fn new(references: Vec<BinIndex>, unplaced_unmapped: Option<u64>) -> Self {
        Self {
            references,
            unplaced_unmapped,
        }
    }

    /// Load an index file, failing with [`BamSeekError::IndexAbsentOrInvalid`]
    /// when it is missing or does not parse.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            BamSeekError::IndexAbsentOrInvalid(format!("{}: {}", path.display(), e))
        })?;
        let index = Self::from_bytes(&data).map_err(|e| match e {
            BamSeekError::IndexAbsentOrInvalid(msg) => {
                BamSeekError::IndexAbsentOrInvalid(format!("{}: {}", path.display(), msg))
            }
            other => BamSeekError::IndexAbsentOrInvalid(format!("{}: {}", path.display(), other)),
        })?;
        debug!(
            "Loaded BAI index {} ({} references)",
            path.display(),
            index.reference_count()
        );
        Ok(index)
    }

    /// Load an index file, falling back to an empty index when it is missing
    /// or invalid.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        Self::from_path(path).unwrap_or_else(|e| {
            warn!("{}; region queries will return no alignments", e);
            Self::empty()
        })
    }

    /// Parse a complete index file held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        match cursor.take(BAI_MAGIC.len()) {
            Ok(magic) if magic == BAI_MAGIC => {}
            _ => return Err(BamSeekError::IndexAbsentOrInvalid("invalid BAI magic".into())),
        }

        let n_ref = read_count(&mut cursor, "reference count")?;
        let mut references = Vec::with_capacity(n_ref.min(1 << 16));
        for _ in 0..n_ref {
            references.push(read_reference(&mut cursor)?);
        }

        let unplaced_unmapped = if cursor.remaining() >= 8 {
            Some(cursor.read_u64()?)
        } else {
            None
        };

        Ok(Self {
            references,
            unplaced_unmapped,
        })
    }

    /// Number of references in the index.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// True when the index holds no references.
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Index data for reference `ref_id`.
    pub fn reference(&self, ref_id: usize) -> Option<&BinIndex> {
        self.references.get(ref_id)
    }

    /// Count of unplaced unmapped reads, when the file records it.
    pub fn unplaced_unmapped(&self) -> Option<u64> {
        self.unplaced_unmapped
    }

    /// Chunks that may hold alignments overlapping `[start, end)` on
    /// `ref_id`: sorted, merged and pruned with the linear index.
    ///
    /// An unknown reference yields no chunks.
    pub fn chunks_for_region(&self, ref_id: usize, start: u64, end: u64) -> Vec<Chunk> {
        let Some(reference) = self.reference(ref_id) else {
            return Vec::new();
        };

        let candidates: Vec<Chunk> = bins_for_range(start, end)
            .into_iter()
            .flat_map(|bin| reference.chunks(bin).iter().copied())
            .collect();

        let min_offset = reference.min_offset(start);
        let mut chunks = candidates;
        chunks.retain(|chunk| chunk.end > min_offset);
        let chunks = merge_chunks(chunks);

        debug!(
            "Region {}:{}-{} planned {} chunk(s), linear bound {}",
            ref_id,
            start,
            end,
            chunks.len(),
            min_offset
        );
        chunks
    }

    /// Sorted, de-duplicated chunk starts for `[start, end)` on `ref_id`.
    pub fn offsets_for_region(&self, ref_id: usize, start: u64, end: u64) -> Vec<VirtualOffset> {
        let mut offsets: Vec<VirtualOffset> = self
            .chunks_for_region(ref_id, start, end)
            .into_iter()
            .map(|chunk| chunk.start)
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }
}

fn read_count(cursor: &mut ByteCursor<'_>, what: &str) -> Result<usize> {
    let value = cursor.read_i32()?;
    usize::try_from(value)
        .map_err(|_| BamSeekError::IndexAbsentOrInvalid(format!("negative {}: {}", what, value)))
}

fn read_chunk(cursor: &mut ByteCursor<'_>) -> Result<Chunk> {
    Ok(Chunk::new(cursor.read_virtual_offset()?, cursor.read_virtual_offset()?))
}

fn read_reference(cursor: &mut ByteCursor<'_>) -> Result<BinIndex> {
    let n_bin = read_count(cursor, "bin count")?;
    let mut bins = HashMap::with_capacity(n_bin.min(1 << 16));
    let mut stats = None;

    for _ in 0..n_bin {
        let bin = cursor.read_u32()?;
        let n_chunk = read_count(cursor, "chunk count")?;

        if bin == PSEUDO_BIN {
            stats = read_stats(cursor, n_chunk)?;
            continue;
        }

        let mut chunks = Vec::with_capacity(n_chunk.min(1 << 16));
        for _ in 0..n_chunk {
            chunks.push(read_chunk(cursor)?);
        }
        bins.entry(bin).or_insert_with(Vec::new).extend(chunks);
    }

    let n_intv = read_count(cursor, "linear index size")?;
    let mut linear = Vec::with_capacity(n_intv.min(1 << 16));
    for _ in 0..n_intv {
        linear.push(cursor.read_virtual_offset()?);
    }

    Ok(BinIndex { bins, linear, stats })
}

fn read_stats(cursor: &mut ByteCursor<'_>, n_chunk: usize) -> Result<Option<ReferenceStats>> {
    if n_chunk != 2 {
        cursor.skip(n_chunk.saturating_mul(16))?;
        return Ok(None);
    }
    let span = read_chunk(cursor)?;
    let mapped = cursor.read_u64()?;
    let unmapped = cursor.read_u64()?;
    Ok(Some(ReferenceStats {
        start: span.start,
        end: span.end,
        mapped,
        unmapped,
    }))
}
