//! BGZF member reader with a single-block decompression cache.
//!
//! A BGZF file is a series of gzip members, each carrying a `BC` extra
//! sub-field that records the member's total size. That size lets the reader
//! frame a member from its header alone, so any member can be read by seeking
//! straight to its compressed offset.
//!
//! # Member layout
//!
//! ```text
//! ID1 ID2 CM FLG MTIME(4) XFL OS XLEN(2)   12-byte fixed prefix
//! extra field (XLEN bytes), containing: 'B' 'C' SLEN=2 BSIZE(2)
//! compressed payload (BSIZE - XLEN - 19 bytes, raw DEFLATE)
//! CRC32(4) ISIZE(4)
//! ```
//!
//! # Caching
//!
//! [`BgzfReader`] keeps at most one decompressed payload. The cache is valid
//! only while its compressed offset matches the member the reader is
//! positioned at; moving to another member and decompressing it replaces the
//! cached payload. A failed inflate leaves the previous cache untouched.
//!
//! File handles are opened and released inside each read, so a reader holds
//! no descriptor between calls.

use crate::error::{BamSeekError, Result};
use crate::io::cursor::ByteCursor;
use crate::io::virtual_offset::VirtualOffset;
use flate2::read::DeflateDecoder;
use log::debug;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Size of the fixed member prefix, up to and including XLEN.
pub const BGZF_HEADER_SIZE: usize = 12;

/// Size of the CRC32 + ISIZE trailer.
pub const BGZF_FOOTER_SIZE: usize = 8;

/// Largest member (and largest decompressed payload) BGZF allows.
pub const BGZF_MAX_BLOCK_SIZE: usize = 65536;

const GZIP_ID1: u8 = 31;
const GZIP_ID2: u8 = 139;
const GZIP_CM_DEFLATE: u8 = 8;
const GZIP_FLG_FEXTRA: u8 = 0x04;
const BC_SI1: u8 = b'B';
const BC_SI2: u8 = b'C';

/// Framing of one BGZF member, as read from its header and trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Compressed file offset of the member (its identity)
    pub offset: u64,
    /// Total on-disk size of the member (BSIZE + 1)
    pub block_size: usize,
    /// Length of the gzip extra field
    pub extra_len: u16,
    /// CRC32 of the decompressed payload (not verified)
    pub crc32: u32,
    /// Declared decompressed size
    pub uncompressed_size: u32,
}

impl BlockHeader {
    /// Compressed offset of the member that follows this one.
    pub fn next_offset(&self) -> u64 {
        self.offset + self.block_size as u64
    }

    /// Length of the raw DEFLATE payload.
    pub fn payload_len(&self) -> usize {
        self.block_size - usize::from(self.extra_len) - (BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE)
    }
}

/// Counters describing how much work a [`BgzfReader`] has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Member headers read from disk
    pub header_reads: u64,
    /// Payloads inflated
    pub inflations: u64,
}

#[derive(Debug)]
struct RawBlock {
    header: BlockHeader,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct DecompressedBlock {
    offset: u64,
    data: Vec<u8>,
}

/// Seekable reader over the members of a BGZF file.
#[derive(Debug)]
pub struct BgzfReader {
    path: PathBuf,
    current: Option<RawBlock>,
    cache: Option<DecompressedBlock>,
    stats: BlockStats,
}

impl BgzfReader {
    /// Create a reader for the file at `path`.
    ///
    /// The file is checked for existence here; it is reopened for every
    /// member read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::metadata(&path)?;
        Ok(Self {
            path,
            current: None,
            cache: None,
            stats: BlockStats::default(),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position the reader at the member starting at `offset`.
    ///
    /// Returns `Ok(false)` at end of container: either file EOF or an empty
    /// terminating member. Does no I/O when the reader is already positioned
    /// at `offset`.
    pub fn read_block_header(&mut self, offset: u64) -> Result<bool> {
        if self.current_offset() == Some(offset) {
            return Ok(true);
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        self.stats.header_reads += 1;

        match read_member(&mut file, offset)? {
            Some(block) => {
                debug!(
                    "BGZF member at {}: {} bytes on disk, {} decompressed",
                    offset, block.header.block_size, block.header.uncompressed_size
                );
                self.current = Some(block);
                Ok(true)
            }
            None => {
                debug!("BGZF end of container at {}", offset);
                self.current = None;
                Ok(false)
            }
        }
    }

    /// Header of the member the reader is positioned at.
    pub fn header(&self) -> Option<&BlockHeader> {
        self.current.as_ref().map(|block| &block.header)
    }

    /// Compressed offset of the member the reader is positioned at.
    pub fn current_offset(&self) -> Option<u64> {
        self.header().map(|header| header.offset)
    }

    /// Compressed offset of the member after the current one.
    pub fn next_block_offset(&self) -> Option<u64> {
        self.header().map(BlockHeader::next_offset)
    }

    /// Move to the member after the current one.
    ///
    /// Returns `Ok(false)` at end of container or when no member is loaded.
    pub fn advance(&mut self) -> Result<bool> {
        match self.next_block_offset() {
            Some(next) => self.read_block_header(next),
            None => Ok(false),
        }
    }

    /// Inflate the current member, or return the cached payload when it is
    /// already decompressed.
    pub fn decompress(&mut self) -> Result<&[u8]> {
        let block = self
            .current
            .as_ref()
            .ok_or_else(|| BamSeekError::malformed(0, "no BGZF member is loaded"))?;
        let offset = block.header.offset;

        let cached = matches!(&self.cache, Some(cache) if cache.offset == offset);
        if !cached {
            let data = inflate(block)?;
            self.stats.inflations += 1;
            debug!("Inflated BGZF member at {} ({} bytes)", offset, data.len());
            self.cache = Some(DecompressedBlock { offset, data });
        }

        Ok(self.cached_data().unwrap_or(&[]))
    }

    /// Decompressed payload of the current member, if it has been inflated.
    pub fn block_data(&self) -> Option<&[u8]> {
        let offset = self.current_offset()?;
        match &self.cache {
            Some(cache) if cache.offset == offset => Some(&cache.data),
            _ => None,
        }
    }

    fn cached_data(&self) -> Option<&[u8]> {
        self.cache.as_ref().map(|cache| cache.data.as_slice())
    }

    /// Load and decompress the member at `offset.compressed_offset()` and
    /// return a cursor positioned at `offset.uncompressed_offset()`.
    ///
    /// Returns `Ok(None)` when `offset` lies at or past the end of container.
    pub fn seek_virtual(&mut self, offset: VirtualOffset) -> Result<Option<ByteCursor<'_>>> {
        if !self.read_block_header(offset.compressed_offset())? {
            return Ok(None);
        }
        let data = self.decompress()?;
        ByteCursor::at(data, usize::from(offset.uncompressed_offset())).map(Some)
    }

    /// Work counters.
    pub fn stats(&self) -> BlockStats {
        self.stats
    }
}

/// Fill `buf` from `reader`, returning the number of bytes read before EOF.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    offset: u64,
    what: &str,
) -> Result<()> {
    let n = read_fully(reader, buf)?;
    if n < buf.len() {
        return Err(BamSeekError::malformed(
            offset,
            format!("truncated {}: expected {} bytes, found {}", what, buf.len(), n),
        ));
    }
    Ok(())
}

/// Locate BSIZE inside the gzip extra field.
fn find_bsize(extra: &[u8]) -> Option<u16> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let slen = usize::from(u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]));
        if extra[pos] == BC_SI1 && extra[pos + 1] == BC_SI2 && slen == 2 {
            let value = extra.get(pos + 4..pos + 6)?;
            return Some(u16::from_le_bytes([value[0], value[1]]));
        }
        pos += 4 + slen;
    }
    None
}

/// Read one member from `reader`, which must be positioned at `offset`.
///
/// Returns `Ok(None)` on a clean EOF or an empty (ISIZE 0) member.
fn read_member<R: Read>(reader: &mut R, offset: u64) -> Result<Option<RawBlock>> {
    let mut prefix = [0u8; BGZF_HEADER_SIZE];
    match read_fully(reader, &mut prefix)? {
        0 => return Ok(None),
        n if n < BGZF_HEADER_SIZE => {
            return Err(BamSeekError::malformed(
                offset,
                format!("truncated member header ({} of {} bytes)", n, BGZF_HEADER_SIZE),
            ))
        }
        _ => {}
    }

    if prefix[0] != GZIP_ID1 || prefix[1] != GZIP_ID2 {
        return Err(BamSeekError::malformed(
            offset,
            format!("invalid gzip magic [{}, {}]", prefix[0], prefix[1]),
        ));
    }
    if prefix[2] != GZIP_CM_DEFLATE {
        return Err(BamSeekError::malformed(
            offset,
            format!("unsupported compression method {}", prefix[2]),
        ));
    }
    if prefix[3] & GZIP_FLG_FEXTRA == 0 {
        return Err(BamSeekError::malformed(offset, "gzip member has no extra field"));
    }

    let extra_len = u16::from_le_bytes([prefix[10], prefix[11]]);
    let mut extra = vec![0u8; usize::from(extra_len)];
    read_exact_or_truncated(reader, &mut extra, offset, "extra field")?;

    let bsize = find_bsize(&extra)
        .ok_or_else(|| BamSeekError::malformed(offset, "BC sub-field not found in extra field"))?;
    let block_size = usize::from(bsize) + 1;

    let payload_len = block_size
        .checked_sub(usize::from(extra_len) + BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE)
        .ok_or_else(|| {
            BamSeekError::malformed(
                offset,
                format!("block size {} too small for extra length {}", block_size, extra_len),
            )
        })?;

    let mut payload = vec![0u8; payload_len];
    read_exact_or_truncated(reader, &mut payload, offset, "compressed payload")?;

    let mut footer = [0u8; BGZF_FOOTER_SIZE];
    read_exact_or_truncated(reader, &mut footer, offset, "member trailer")?;
    let crc32 = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let uncompressed_size = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);

    if uncompressed_size == 0 {
        return Ok(None);
    }
    if uncompressed_size as usize > BGZF_MAX_BLOCK_SIZE {
        return Err(BamSeekError::malformed(
            offset,
            format!("declared size {} exceeds BGZF maximum", uncompressed_size),
        ));
    }

    Ok(Some(RawBlock {
        header: BlockHeader {
            offset,
            block_size,
            extra_len,
            crc32,
            uncompressed_size,
        },
        payload,
    }))
}

fn inflate(block: &RawBlock) -> Result<Vec<u8>> {
    let offset = block.header.offset;
    let expected = block.header.uncompressed_size as usize;
    let mut data = Vec::with_capacity(expected);

    DeflateDecoder::new(block.payload.as_slice())
        .read_to_end(&mut data)
        .map_err(|source| BamSeekError::Decompression { offset, source })?;

    if data.len() != expected {
        return Err(BamSeekError::Decompression {
            offset,
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!("inflated {} bytes, member declares {}", data.len(), expected),
            ),
        });
    }
    Ok(data)
}
