//! Bounds-checked little-endian reads over an in-memory buffer.
//!
//! Every fixed-width read goes through [`ByteCursor::take`], which checks the
//! bounds and advances the position by exactly the number of bytes it hands
//! back. A read can therefore never consume one width and advance by another,
//! and a read past the end of the buffer fails with
//! [`BamSeekError::OutOfBounds`] instead of returning zeros.

use crate::error::{BamSeekError, Result};
use crate::io::virtual_offset::VirtualOffset;

/// Read cursor over a borrowed byte buffer.
///
/// # Example
///
/// ```
/// use bamseek::ByteCursor;
///
/// # fn main() -> bamseek::Result<()> {
/// let data = [0x01, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00];
/// let mut cursor = ByteCursor::new(&data);
/// assert_eq!(cursor.read_u8()?, 1);
/// assert_eq!(cursor.read_u16()?, 2);
/// assert_eq!(cursor.read_u32()?, 3);
/// assert_eq!(cursor.remaining(), 0);
/// assert!(cursor.read_u8().is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a cursor positioned at `pos`.
    ///
    /// `pos` may equal the buffer length (an exhausted cursor) but not exceed it.
    pub fn at(data: &'a [u8], pos: usize) -> Result<Self> {
        let mut cursor = Self::new(data);
        cursor.seek(pos)?;
        Ok(cursor)
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the position and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Move to an absolute position.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(BamSeekError::OutOfBounds {
                offset: self.pos,
                needed: pos - self.pos.min(pos),
                available: self.remaining(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Rewind to the start of the buffer.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Advance by `n` bytes without decoding them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(BamSeekError::OutOfBounds {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Read a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Read a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Read exactly `n` bytes as UTF-8.
    pub fn read_fixed_string(&mut self, n: usize) -> Result<String> {
        let offset = self.pos;
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|source| BamSeekError::InvalidUtf8 { offset, source })
    }

    /// Read `n` bytes whose last byte is NUL and decode the first `n - 1`.
    pub fn read_null_terminated_string(&mut self, n: usize) -> Result<String> {
        let offset = self.pos;
        let bytes = self.take(n)?;
        match bytes.split_last() {
            Some((0, text)) => String::from_utf8(text.to_vec())
                .map_err(|source| BamSeekError::InvalidUtf8 { offset, source }),
            _ => Err(BamSeekError::MissingNulTerminator { offset }),
        }
    }

    /// Read an 8-byte virtual offset.
    pub fn read_virtual_offset(&mut self) -> Result<VirtualOffset> {
        self.read_u64().map(VirtualOffset::from_raw)
    }
}
