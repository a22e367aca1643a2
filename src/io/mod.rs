//! I/O layers: byte cursor, BGZF members and BAM decoding.

pub mod bam;
pub mod bgzf;
pub mod cursor;
pub mod virtual_offset;

pub use bgzf::{BgzfReader, BlockHeader, BlockStats};
pub use cursor::ByteCursor;
pub use virtual_offset::VirtualOffset;
