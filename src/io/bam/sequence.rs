//! 4-bit packed sequence and quality decoding.
//!
//! BAM stores two bases per byte, high nibble first. An odd-length sequence
//! leaves the low nibble of its last byte unused.

use crate::error::Result;
use crate::io::cursor::ByteCursor;

/// Nibble to base lookup. Codes without a base in this alphabet decode to `x`.
pub const SEQ_LOOKUP: [u8; 16] = *b"=ACxGxxxTxxxxxxN";

/// Bytes needed to pack `length` bases.
pub fn packed_len(length: usize) -> usize {
    (length + 1) / 2
}

/// Decode `length` bases from packed nibbles.
///
/// `data` must hold at least `packed_len(length)` bytes; the trailing nibble
/// of an odd-length sequence is ignored.
pub fn decode_bases(data: &[u8], length: usize) -> String {
    let mut bases = String::with_capacity(length);
    for &byte in data.iter().take(packed_len(length)) {
        bases.push(char::from(SEQ_LOOKUP[usize::from(byte >> 4)]));
        bases.push(char::from(SEQ_LOOKUP[usize::from(byte & 0x0F)]));
    }
    bases.truncate(length);
    bases
}

/// Read a packed sequence of `length` bases from `cursor`.
pub fn read_sequence(cursor: &mut ByteCursor<'_>, length: usize) -> Result<String> {
    let data = cursor.take(packed_len(length))?;
    Ok(decode_bases(data, length))
}

/// Read `length` raw Phred quality scores from `cursor`.
///
/// A quality array filled with `0xFF` marks qualities as absent and decodes
/// to an empty vector.
pub fn read_quality(cursor: &mut ByteCursor<'_>, length: usize) -> Result<Vec<u8>> {
    let data = cursor.take(length)?;
    if data.iter().all(|&q| q == 0xFF) {
        return Ok(Vec::new());
    }
    Ok(data.to_vec())
}

/// Render raw Phred scores as printable Phred+33 characters.
pub fn quality_to_ascii(quality: &[u8]) -> String {
    quality
        .iter()
        .map(|&q| char::from(q.saturating_add(33).min(b'~')))
        .collect()
}
