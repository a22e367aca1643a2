//! BGZF virtual file offsets.
//!
//! A virtual offset addresses a byte inside a block-compressed stream with two
//! coordinates packed into one `u64`:
//!
//! - Bits 63-16: compressed offset of the BGZF member in the file
//! - Bits 15-0: offset inside that member's decompressed payload
//!
//! Because the compressed part occupies the high bits, ordering the packed
//! integer is the same as ordering lexicographically by
//! (compressed, uncompressed).

use std::fmt;

/// Largest compressed offset representable in a virtual offset (48 bits).
pub const MAX_COMPRESSED_OFFSET: u64 = (1 << 48) - 1;

/// Virtual file offset in BGZF format.
///
/// # Example
///
/// ```
/// use bamseek::VirtualOffset;
///
/// let offset = VirtualOffset::new(1024, 512);
/// assert_eq!(offset.compressed_offset(), 1024);
/// assert_eq!(offset.uncompressed_offset(), 512);
/// assert!(offset < VirtualOffset::new(1025, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Create a virtual offset from its compressed and uncompressed parts.
    ///
    /// Bits of `compressed` above the 48-bit range are discarded.
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        VirtualOffset(((compressed & MAX_COMPRESSED_OFFSET) << 16) | u64::from(uncompressed))
    }

    /// Create from the packed 64-bit representation used on disk.
    pub fn from_raw(value: u64) -> Self {
        VirtualOffset(value)
    }

    /// Packed 64-bit representation.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Byte offset of the BGZF member in the compressed file.
    pub fn compressed_offset(self) -> u64 {
        self.0 >> 16
    }

    /// Byte offset inside the member's decompressed payload.
    pub fn uncompressed_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Linear index entries use zero to mean "no alignment starts here".
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed_offset(), self.uncompressed_offset())
    }
}

impl From<u64> for VirtualOffset {
    fn from(value: u64) -> Self {
        Self::from_raw(value)
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.as_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_offset_parts() {
        let offset = VirtualOffset::new(1024, 512);
        assert_eq!(offset.compressed_offset(), 1024);
        assert_eq!(offset.uncompressed_offset(), 512);
        assert_eq!(offset.as_raw(), (1024 << 16) | 512);
    }

    #[test]
    fn test_virtual_offset_ordering() {
        let off1 = VirtualOffset::new(1000, 100);
        let off2 = VirtualOffset::new(1000, 200);
        let off3 = VirtualOffset::new(2000, 0);

        assert!(off1 < off2);
        assert!(off2 < off3);
        assert!(off1 < off3);
    }

    #[test]
    fn test_virtual_offset_uncompressed_does_not_leak() {
        // A large in-block offset must never outrank a later block
        let late_in_block = VirtualOffset::new(1, u16::MAX);
        let next_block = VirtualOffset::new(2, 0);
        assert!(late_in_block < next_block);
    }

    #[test]
    fn test_virtual_offset_48_bit_mask() {
        let offset = VirtualOffset::new(u64::MAX, 7);
        assert_eq!(offset.compressed_offset(), MAX_COMPRESSED_OFFSET);
        assert_eq!(offset.uncompressed_offset(), 7);
    }

    #[test]
    fn test_null_and_display() {
        assert!(VirtualOffset::default().is_null());
        assert!(!VirtualOffset::new(0, 1).is_null());
        assert_eq!(VirtualOffset::new(100, 50).to_string(), "100:50");
    }
}
