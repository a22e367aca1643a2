//! CIGAR (Compact Idiosyncratic Gapped Alignment Report) operations.
//!
//! In BAM, each CIGAR operation is a little-endian `u32`:
//! - Low 4 bits: operation code (0-8)
//! - High 28 bits: run length
//!
//! Codes map to `MIDNSHP=X` in that order. Codes 9-15 are unassigned and
//! rejected.

use crate::error::{BamSeekError, Result};
use crate::io::cursor::ByteCursor;
use std::fmt;

/// CIGAR operation with its run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarOp {
    /// Match or mismatch (M)
    Match(u32),
    /// Insertion to reference (I)
    Insertion(u32),
    /// Deletion from reference (D)
    Deletion(u32),
    /// Skipped region from reference (N)
    RefSkip(u32),
    /// Soft clipping (S)
    SoftClip(u32),
    /// Hard clipping (H)
    HardClip(u32),
    /// Padding (P)
    Padding(u32),
    /// Sequence match (=)
    SeqMatch(u32),
    /// Sequence mismatch (X)
    SeqMismatch(u32),
}

impl CigarOp {
    /// Decode one packed BAM CIGAR value.
    ///
    /// Returns `None` for the unassigned operation codes 9-15.
    pub fn from_packed(value: u32) -> Option<Self> {
        let len = value >> 4;
        let op = match value & 0xF {
            0 => CigarOp::Match(len),
            1 => CigarOp::Insertion(len),
            2 => CigarOp::Deletion(len),
            3 => CigarOp::RefSkip(len),
            4 => CigarOp::SoftClip(len),
            5 => CigarOp::HardClip(len),
            6 => CigarOp::Padding(len),
            7 => CigarOp::SeqMatch(len),
            8 => CigarOp::SeqMismatch(len),
            _ => return None,
        };
        Some(op)
    }

    /// Packed BAM representation (`len << 4 | code`).
    pub fn to_packed(self) -> u32 {
        (self.length() << 4) | self.code()
    }

    /// Operation code (0-8).
    pub fn code(&self) -> u32 {
        match self {
            CigarOp::Match(_) => 0,
            CigarOp::Insertion(_) => 1,
            CigarOp::Deletion(_) => 2,
            CigarOp::RefSkip(_) => 3,
            CigarOp::SoftClip(_) => 4,
            CigarOp::HardClip(_) => 5,
            CigarOp::Padding(_) => 6,
            CigarOp::SeqMatch(_) => 7,
            CigarOp::SeqMismatch(_) => 8,
        }
    }

    /// Run length of the operation.
    pub fn length(&self) -> u32 {
        match *self {
            CigarOp::Match(len)
            | CigarOp::Insertion(len)
            | CigarOp::Deletion(len)
            | CigarOp::RefSkip(len)
            | CigarOp::SoftClip(len)
            | CigarOp::HardClip(len)
            | CigarOp::Padding(len)
            | CigarOp::SeqMatch(len)
            | CigarOp::SeqMismatch(len) => len,
        }
    }

    /// SAM character for the operation.
    pub fn as_char(&self) -> char {
        match self {
            CigarOp::Match(_) => 'M',
            CigarOp::Insertion(_) => 'I',
            CigarOp::Deletion(_) => 'D',
            CigarOp::RefSkip(_) => 'N',
            CigarOp::SoftClip(_) => 'S',
            CigarOp::HardClip(_) => 'H',
            CigarOp::Padding(_) => 'P',
            CigarOp::SeqMatch(_) => '=',
            CigarOp::SeqMismatch(_) => 'X',
        }
    }

    /// True for operations that advance along the reference (M, D, N, =, X).
    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Deletion(_)
                | CigarOp::RefSkip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    /// True for operations that consume read bases (M, I, S, =, X).
    pub fn consumes_query(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Insertion(_)
                | CigarOp::SoftClip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.length(), self.as_char())
    }
}

/// Read `n_ops` packed CIGAR operations from `cursor`.
pub fn read_cigar(cursor: &mut ByteCursor<'_>, n_ops: usize) -> Result<Vec<CigarOp>> {
    let mut ops = Vec::with_capacity(n_ops);
    for _ in 0..n_ops {
        let offset = cursor.position();
        let value = cursor.read_u32()?;
        let op = CigarOp::from_packed(value).ok_or_else(|| {
            BamSeekError::invalid_record(offset, format!("invalid CIGAR op code {}", value & 0xF))
        })?;
        ops.push(op);
    }
    Ok(ops)
}

/// Number of reference bases covered by `ops`.
pub fn reference_length(ops: &[CigarOp]) -> u64 {
    ops.iter()
        .filter(|op| op.consumes_reference())
        .map(|op| u64::from(op.length()))
        .sum()
}

/// Render operations as a SAM CIGAR string (`*` when empty).
pub fn format_cigar(ops: &[CigarOp]) -> String {
    if ops.is_empty() {
        return "*".to_string();
    }
    ops.iter().map(CigarOp::to_string).collect()
}
