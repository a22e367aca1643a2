//! BAM (Binary Alignment Map) decoding and indexed region queries.
//!
//! - [`header`]: magic, SAM text and reference table from the first block
//! - [`record`]: alignment records and the block-level [`RecordDecoder`]
//! - [`cigar`] / [`sequence`]: packed CIGAR, base and quality fields
//! - [`index`]: BAI loading, hierarchical binning and chunk planning
//! - [`reader`]: [`IndexedBamReader`], tying the above to a BGZF file
//!
//! # Example
//!
//! ```no_run
//! use bamseek::io::bam::{IndexedBamReader, ReaderOptions};
//!
//! # fn main() -> bamseek::Result<()> {
//! let options = ReaderOptions::default()
//!     .with_index_path("alignments.bam.bai")
//!     .require_index(true);
//! let mut bam = IndexedBamReader::open_with_options("alignments.bam", options)?;
//!
//! for record in bam.alignments_overlapping("chr1", 1, 50_000)? {
//!     println!("{}\t{}\t{}", record.read_name, record.position, record.end());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cigar;
pub mod header;
pub mod index;
pub mod reader;
pub mod record;
pub mod sequence;

// Re-export main types for convenience
pub use cigar::{format_cigar, read_cigar, CigarOp};
pub use header::{BamHeader, Reference, ReferenceTable, BAM_MAGIC};
pub use index::{
    bins_for_range, merge_chunks, BinId, BinIndex, Chunk, ReferenceStats, RegionIndex, BAI_MAGIC,
    LINEAR_TILE_SHIFT, MAX_COORDINATE, PSEUDO_BIN,
};
pub use reader::{IndexedBamReader, ReaderOptions, Records};
pub use record::{AlignmentRecord, RecordDecoder};
pub use sequence::{decode_bases, quality_to_ascii};
