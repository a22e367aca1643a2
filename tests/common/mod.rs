//! Fixture writers shared by the integration tests.
//!
//! BAM and BAI files are synthesised at test time: a BAM byte stream is cut
//! into BGZF members of a fixed payload size (so records can straddle
//! members), and a BAI index is derived from the virtual offsets the records
//! landed at.

#![allow(dead_code)]

use bamseek::VirtualOffset;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Compress `data` into one BGZF member.
pub fn bgzf_member(data: &[u8]) -> Vec<u8> {
    member_with_extra(data, &[])
}

/// Compress `data` into a BGZF member exactly `total` bytes long, padding
/// the extra field with a foreign sub-field.
pub fn bgzf_member_sized(data: &[u8], total: usize) -> Vec<u8> {
    let plain = bgzf_member(data);
    let pad = total
        .checked_sub(plain.len() + 4)
        .expect("member too large for requested size");
    let mut sub = vec![b'P', b'D'];
    sub.extend_from_slice(&(pad as u16).to_le_bytes());
    sub.extend(std::iter::repeat(0).take(pad));
    let member = member_with_extra(data, &sub);
    assert_eq!(member.len(), total);
    member
}

fn member_with_extra(data: &[u8], leading_subfields: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    let payload = encoder.finish().unwrap();

    let xlen = leading_subfields.len() + 6;
    let block_size = 12 + xlen + payload.len() + 8;

    let mut out = vec![31, 139, 8, 4, 0, 0, 0, 0, 0, 255];
    out.extend_from_slice(&(xlen as u16).to_le_bytes());
    out.extend_from_slice(leading_subfields);
    out.extend_from_slice(&[b'B', b'C', 2, 0]);
    out.extend_from_slice(&((block_size - 1) as u16).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out
}

/// The empty member that terminates a BGZF file.
pub fn eof_member() -> Vec<u8> {
    bgzf_member(&[])
}

/// Encode the BAM header block.
pub fn header_bytes(text: &str, refs: &[(&str, u32)]) -> Vec<u8> {
    let mut data = b"BAM\x01".to_vec();
    data.extend_from_slice(&(text.len() as i32).to_le_bytes());
    data.extend_from_slice(text.as_bytes());
    data.extend_from_slice(&(refs.len() as i32).to_le_bytes());
    for (name, len) in refs {
        data.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        data.extend_from_slice(&(*len as i32).to_le_bytes());
    }
    data
}

/// Standard single-bin assignment for the 0-based range `[beg, end)`.
pub fn reg2bin(beg: u64, end: u64) -> u32 {
    let end = end.max(beg + 1) - 1;
    for (shift, base) in [(14, 4681), (17, 585), (20, 73), (23, 9), (26, 1)] {
        if beg >> shift == end >> shift {
            return base + (beg >> shift) as u32;
        }
    }
    0
}

fn base_code(base: u8) -> u8 {
    match base {
        b'=' => 0,
        b'A' => 1,
        b'C' => 2,
        b'G' => 4,
        b'T' => 8,
        _ => 15,
    }
}

/// An alignment to encode.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub ref_id: i32,
    /// 0-based position
    pub pos: i32,
    pub name: String,
    /// (length, op code)
    pub cigar: Vec<(u32, u32)>,
    pub seq: String,
    pub qual: Vec<u8>,
    pub flags: u16,
}

impl TestRecord {
    /// Mapped read with a single `<len>M` CIGAR.
    pub fn mapped(ref_id: i32, pos: i32, name: &str, len: usize) -> Self {
        let seq: String = "ACGT".chars().cycle().take(len).collect();
        Self {
            ref_id,
            pos,
            name: name.to_string(),
            cigar: vec![(len as u32, 0)],
            qual: vec![30; len],
            seq,
            flags: 0,
        }
    }

    /// Unplaced unmapped read.
    pub fn unplaced(name: &str) -> Self {
        Self {
            ref_id: -1,
            pos: -1,
            name: name.to_string(),
            cigar: Vec::new(),
            seq: "ACGT".to_string(),
            qual: vec![0xFF; 4],
            flags: 0x4,
        }
    }

    /// Reference bases covered (at least one).
    pub fn span(&self) -> u64 {
        let span: u64 = self
            .cigar
            .iter()
            .filter(|(_, op)| matches!(op, 0 | 2 | 3 | 7 | 8))
            .map(|(len, _)| u64::from(*len))
            .sum();
        span.max(1)
    }

    /// Encoded record, including its `block_size` prefix.
    pub fn encode(&self) -> Vec<u8> {
        let beg = self.pos.max(0) as u64;
        let bin = if self.ref_id < 0 {
            4680
        } else {
            reg2bin(beg, beg + self.span())
        };

        let mut body = Vec::new();
        body.extend_from_slice(&self.ref_id.to_le_bytes());
        body.extend_from_slice(&self.pos.to_le_bytes());
        body.push(self.name.len() as u8 + 1);
        body.push(60);
        body.extend_from_slice(&(bin as u16).to_le_bytes());
        body.extend_from_slice(&(self.cigar.len() as u16).to_le_bytes());
        body.extend_from_slice(&self.flags.to_le_bytes());
        body.extend_from_slice(&(self.seq.len() as i32).to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(self.name.as_bytes());
        body.push(0);
        for (len, op) in &self.cigar {
            body.extend_from_slice(&((len << 4) | op).to_le_bytes());
        }
        for pair in self.seq.as_bytes().chunks(2) {
            let hi = base_code(pair[0]) << 4;
            let lo = pair.get(1).map_or(0, |&b| base_code(b));
            body.push(hi | lo);
        }
        body.extend_from_slice(&self.qual);

        let mut out = (body.len() as i32).to_le_bytes().to_vec();
        out.extend(body);
        out
    }
}

/// Where a record landed in a written BAM file.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

/// A BAM file written to disk.
pub struct BamFixture {
    pub path: PathBuf,
    pub block_offsets: Vec<u64>,
    pub placements: Vec<Placement>,
    pub records: Vec<TestRecord>,
}

/// Write `header` followed by `records`, cutting the byte stream into
/// members of at most `payload_size` bytes.
pub fn write_bam(
    path: &Path,
    header: &[u8],
    records: &[TestRecord],
    payload_size: usize,
) -> BamFixture {
    let mut stream = header.to_vec();
    let mut ranges = Vec::new();
    for record in records {
        let start = stream.len();
        stream.extend(record.encode());
        ranges.push((start, stream.len()));
    }

    let payloads: Vec<&[u8]> = stream.chunks(payload_size).collect();
    let mut file = Vec::new();
    let mut block_offsets = Vec::new();
    for payload in &payloads {
        block_offsets.push(file.len() as u64);
        file.extend(bgzf_member(payload));
    }
    file.extend(eof_member());
    std::fs::write(path, &file).unwrap();

    let last_len = payloads.last().map_or(0, |p| p.len());
    let to_vo = |pos: usize| {
        let block = pos / payload_size;
        if block < block_offsets.len() {
            VirtualOffset::new(block_offsets[block], (pos % payload_size) as u16)
        } else {
            VirtualOffset::new(block_offsets[block_offsets.len() - 1], last_len as u16)
        }
    };
    let placements = ranges
        .iter()
        .map(|&(start, end)| Placement {
            start: to_vo(start),
            end: to_vo(end),
        })
        .collect();

    BamFixture {
        path: path.to_path_buf(),
        block_offsets,
        placements,
        records: records.to_vec(),
    }
}

/// Hand-assembled BAI content.
#[derive(Debug, Default, Clone)]
pub struct BaiReference {
    pub bins: BTreeMap<u32, Vec<(VirtualOffset, VirtualOffset)>>,
    pub linear: Vec<VirtualOffset>,
    pub stats: Option<(VirtualOffset, VirtualOffset, u64, u64)>,
}

/// Encode a BAI file.
pub fn bai_bytes(references: &[BaiReference], unplaced: Option<u64>) -> Vec<u8> {
    let mut out = b"BAI\x01".to_vec();
    out.extend_from_slice(&(references.len() as i32).to_le_bytes());
    for reference in references {
        let n_bin = reference.bins.len() + usize::from(reference.stats.is_some());
        out.extend_from_slice(&(n_bin as i32).to_le_bytes());
        for (bin, chunks) in &reference.bins {
            out.extend_from_slice(&bin.to_le_bytes());
            out.extend_from_slice(&(chunks.len() as i32).to_le_bytes());
            for (start, end) in chunks {
                out.extend_from_slice(&start.as_raw().to_le_bytes());
                out.extend_from_slice(&end.as_raw().to_le_bytes());
            }
        }
        if let Some((start, end, mapped, unmapped)) = reference.stats {
            out.extend_from_slice(&37450u32.to_le_bytes());
            out.extend_from_slice(&2i32.to_le_bytes());
            out.extend_from_slice(&start.as_raw().to_le_bytes());
            out.extend_from_slice(&end.as_raw().to_le_bytes());
            out.extend_from_slice(&mapped.to_le_bytes());
            out.extend_from_slice(&unmapped.to_le_bytes());
        }
        out.extend_from_slice(&(reference.linear.len() as i32).to_le_bytes());
        for offset in &reference.linear {
            out.extend_from_slice(&offset.as_raw().to_le_bytes());
        }
    }
    if let Some(n) = unplaced {
        out.extend_from_slice(&n.to_le_bytes());
    }
    out
}

/// Build a BAI index the way an indexer would, from record placements.
pub fn index_for(fixture: &BamFixture, n_ref: usize) -> Vec<BaiReference> {
    let mut references = vec![BaiReference::default(); n_ref];
    for (record, placement) in fixture.records.iter().zip(&fixture.placements) {
        let Ok(ref_id) = usize::try_from(record.ref_id) else {
            continue;
        };
        let beg = record.pos as u64;
        let end = beg + record.span();
        let reference = &mut references[ref_id];

        let chunks = reference.bins.entry(reg2bin(beg, end)).or_default();
        match chunks.last_mut() {
            Some(last) if last.1 == placement.start => last.1 = placement.end,
            _ => chunks.push((placement.start, placement.end)),
        }

        let first_tile = (beg >> 14) as usize;
        let last_tile = ((end - 1) >> 14) as usize;
        if reference.linear.len() <= last_tile {
            reference.linear.resize(last_tile + 1, VirtualOffset::default());
        }
        for tile in first_tile..=last_tile {
            if reference.linear[tile].is_null() {
                reference.linear[tile] = placement.start;
            }
        }

        let (start, stop, mapped, unmapped) = reference.stats.get_or_insert((
            placement.start,
            placement.end,
            0,
            0,
        ));
        *stop = (*stop).max(placement.end);
        *start = (*start).min(placement.start);
        if record.flags & 0x4 != 0 {
            *unmapped += 1;
        } else {
            *mapped += 1;
        }
    }
    references
}

/// Write `<bam>.bai` for `fixture`.
pub fn write_index(fixture: &BamFixture, n_ref: usize) -> PathBuf {
    let unplaced = fixture.records.iter().filter(|r| r.ref_id < 0).count() as u64;
    let bytes = bai_bytes(&index_for(fixture, n_ref), Some(unplaced));
    let mut path = fixture.path.clone().into_os_string();
    path.push(".bai");
    let path = PathBuf::from(path);
    std::fs::write(&path, bytes).unwrap();
    path
}
