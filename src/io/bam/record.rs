//! BAM alignment records and the block-level record decoder.
//!
//! # Binary Format
//!
//! ```text
//! BAM Record (binary, little-endian):
//! - block_size (int32): Total record size in bytes (excluding this field)
//! - refID (int32): Reference sequence ID (-1 for unmapped)
//! - pos (int32): 0-based leftmost position (-1 for unmapped)
//! - l_read_name (uint8): Length of read name (includes null terminator)
//! - mapq (uint8): Mapping quality (255 = unavailable)
//! - bin (uint16): BAI index bin
//! - n_cigar_op (uint16): Number of CIGAR operations
//! - flag (uint16): Bitwise FLAGS
//! - l_seq (int32): Sequence length
//! - next_refID (int32): Reference ID of mate/next read
//! - next_pos (int32): Position of mate/next read
//! - tlen (int32): Template length
//! - read_name (char[l_read_name]): Null-terminated read name
//! - cigar (uint32[n_cigar_op]): CIGAR operations
//! - seq (uint8[(l_seq+1)/2]): 4-bit encoded sequence
//! - qual (char[l_seq]): Phred quality scores
//! - tags: Optional tags (variable length, skipped)
//! ```
//!
//! `block_size` alone frames the record: the decoder always resumes at
//! `record_start + 4 + block_size`, whatever the variable fields consumed.

use super::cigar::{read_cigar, reference_length, CigarOp};
use super::header::{read_header, BamHeader};
use super::sequence::{read_quality, read_sequence};
use crate::error::{BamSeekError, Result};
use crate::io::cursor::ByteCursor;
use log::trace;

/// Bytes between `block_size` and the read name.
pub const RECORD_FIXED_SIZE: usize = 32;

/// Template has multiple segments.
pub const FLAG_PAIRED: u16 = 0x1;
/// Segment is unmapped.
pub const FLAG_UNMAPPED: u16 = 0x4;
/// Sequence is reverse complemented.
pub const FLAG_REVERSE: u16 = 0x10;
/// Mate sequence is reverse complemented.
pub const FLAG_MATE_REVERSE: u16 = 0x20;

const MAPQ_UNAVAILABLE: u8 = 255;

/// One decoded alignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentRecord {
    /// Read name/query name
    pub read_name: String,

    /// Reference sequence ID; `None` when unplaced (refID = -1)
    pub reference_id: Option<usize>,

    /// 1-based leftmost mapping position (0 when unplaced)
    pub position: i64,

    /// Mapping quality; `None` when unavailable (255)
    pub mapq: Option<u8>,

    /// Index bin stored with the record
    pub bin: u16,

    /// Bitwise FLAGS
    pub flags: u16,

    /// Mate/next segment reference ID
    pub mate_reference_id: Option<usize>,

    /// Mate/next segment 1-based position
    pub mate_position: Option<i64>,

    /// Template length (TLEN)
    pub template_length: i32,

    /// CIGAR operations
    pub cigar: Vec<CigarOp>,

    /// Bases over `=ACGTN` (unassigned nibbles decode to `x`)
    pub sequence: String,

    /// Raw Phred scores, empty when absent
    pub quality: Vec<u8>,
}

impl AlignmentRecord {
    /// Check if the read is unmapped.
    pub fn is_unmapped(&self) -> bool {
        self.flags & FLAG_UNMAPPED != 0
    }

    /// Check if the read is paired.
    pub fn is_paired(&self) -> bool {
        self.flags & FLAG_PAIRED != 0
    }

    /// Check if the read is a reverse complement.
    pub fn is_reverse_complement(&self) -> bool {
        self.flags & FLAG_REVERSE != 0
    }

    /// Check if the mate is a reverse complement.
    pub fn is_mate_reverse_complement(&self) -> bool {
        self.flags & FLAG_MATE_REVERSE != 0
    }

    /// Reference bases covered by the alignment.
    ///
    /// A CIGAR with no reference-consuming operation counts as one base, so
    /// every placed record occupies at least its own position.
    pub fn reference_span(&self) -> i64 {
        let span = reference_length(&self.cigar);
        i64::try_from(span).unwrap_or(i64::MAX).max(1)
    }

    /// Exclusive end position (`position + reference_span`).
    pub fn end(&self) -> i64 {
        self.position.saturating_add(self.reference_span())
    }

    /// True when `[position, end)` intersects `[start, end)`.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        let start = i64::try_from(start).unwrap_or(i64::MAX);
        let end = i64::try_from(end).unwrap_or(i64::MAX);
        start < end && self.position < end && self.end() > start
    }
}

fn parse_reference_id(value: i32, offset: usize, field: &str) -> Result<Option<usize>> {
    match value {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as usize)),
        n => Err(BamSeekError::invalid_record(
            offset,
            format!("invalid {} {}", field, n),
        )),
    }
}

/// Decodes a reference table and alignment records from one decompressed
/// buffer.
#[derive(Debug, Clone)]
pub struct RecordDecoder<'a> {
    cursor: ByteCursor<'a>,
}

impl<'a> RecordDecoder<'a> {
    /// Decoder positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::from_cursor(ByteCursor::new(data))
    }

    /// Decoder resuming from an existing cursor.
    pub fn from_cursor(cursor: ByteCursor<'a>) -> Self {
        Self { cursor }
    }

    /// Current offset into the buffer.
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    /// Bytes left in the buffer.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// True while the cursor is strictly before the end of the buffer.
    pub fn has_more(&self) -> bool {
        self.cursor.position() < self.cursor.len()
    }

    /// Read the header and reference table at the start of the first block.
    ///
    /// Returns `Ok(None)` with the cursor rewound to 0 when the buffer does not
    /// start with the BAM magic.
    pub fn read_reference_table(&mut self) -> Result<Option<BamHeader>> {
        read_header(&mut self.cursor)
    }

    /// Decode the record at the cursor.
    ///
    /// When the buffer ends before the record does, fails with
    /// [`BamSeekError::OutOfBounds`] and leaves the cursor at the record start.
    pub fn read_alignment(&mut self) -> Result<AlignmentRecord> {
        let start = self.cursor.position();
        let body = match self.take_record_body(start) {
            Ok(body) => body,
            Err(e) => {
                self.cursor.seek(start)?;
                return Err(e);
            }
        };
        trace!("Decoding record at {} ({} bytes)", start, body.len());
        decode_body(body, start)
    }

    fn take_record_body(&mut self, start: usize) -> Result<&'a [u8]> {
        let block_size = self.cursor.read_i32()?;
        let block_size = usize::try_from(block_size).map_err(|_| {
            BamSeekError::invalid_record(start, format!("negative block size {}", block_size))
        })?;
        if block_size < RECORD_FIXED_SIZE {
            return Err(BamSeekError::invalid_record(
                start,
                format!("block size {} below fixed record size", block_size),
            ));
        }
        self.cursor.take(block_size)
    }
}

/// Decode a record body (everything after `block_size`).
///
/// `offset` locates the record in its enclosing buffer for error reporting.
pub fn decode_body(body: &[u8], offset: usize) -> Result<AlignmentRecord> {
    let mut cursor = ByteCursor::new(body);
    parse_fields(&mut cursor, offset).map_err(|e| {
        if e.is_out_of_bounds() {
            BamSeekError::invalid_record(offset, "variable fields overrun declared block size")
        } else {
            e
        }
    })
}

fn parse_fields(cursor: &mut ByteCursor<'_>, offset: usize) -> Result<AlignmentRecord> {
    let reference_id = parse_reference_id(cursor.read_i32()?, offset, "reference id")?;
    let pos = cursor.read_i32()?;
    let l_read_name = usize::from(cursor.read_u8()?);
    let mapq = cursor.read_u8()?;
    let bin = cursor.read_u16()?;
    let n_cigar_op = usize::from(cursor.read_u16()?);
    let flags = cursor.read_u16()?;
    let l_seq = cursor.read_i32()?;
    let mate_reference_id = parse_reference_id(cursor.read_i32()?, offset, "mate reference id")?;
    let next_pos = cursor.read_i32()?;
    let template_length = cursor.read_i32()?;

    let l_seq = usize::try_from(l_seq).map_err(|_| {
        BamSeekError::invalid_record(offset, format!("negative sequence length {}", l_seq))
    })?;
    if l_read_name == 0 {
        return Err(BamSeekError::invalid_record(offset, "read name length is zero"));
    }

    let read_name = cursor.read_null_terminated_string(l_read_name)?;
    let cigar = read_cigar(cursor, n_cigar_op)?;
    let sequence = read_sequence(cursor, l_seq)?;
    let quality = read_quality(cursor, l_seq)?;

    Ok(AlignmentRecord {
        read_name,
        reference_id,
        position: i64::from(pos) + 1,
        mapq: (mapq != MAPQ_UNAVAILABLE).then_some(mapq),
        bin,
        flags,
        mate_reference_id,
        mate_position: (next_pos >= 0).then(|| i64::from(next_pos) + 1),
        template_length,
        cigar,
        sequence,
        quality,
    })
}
