//! bamseek: random-access region queries over BGZF-compressed BAM files
//!
//! # Overview
//!
//! bamseek answers "which alignments overlap `chr:start-end`" without
//! inflating the whole file. A BAI index maps the region to chunks of
//! virtual offsets; only the BGZF members those chunks point into are read
//! and decompressed, one at a time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bamseek::IndexedBamReader;
//!
//! # fn main() -> bamseek::Result<()> {
//! // Index defaults to alignments.bam.bai, then alignments.bai
//! let mut bam = IndexedBamReader::open("alignments.bam", None::<&str>)?;
//!
//! for record in bam.alignments_overlapping("chr1", 100_000, 101_000)? {
//!     println!("{} {} {}", record.read_name, record.position, record.sequence);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`io::cursor`]: bounds-checked little-endian reads
//! - [`io::bgzf`]: BGZF member framing and single-block cache
//! - [`io::bam`]: header, records, BAI index and the indexed reader
//! - [`error`]: crate error type
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and never installs a logger.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod io;

pub use error::{BamSeekError, Result};
pub use io::bam::{
    AlignmentRecord, BamHeader, CigarOp, IndexedBamReader, ReaderOptions, RegionIndex,
};
pub use io::{BgzfReader, ByteCursor, VirtualOffset};
