//! BAM header and reference table.
//!
//! The header sits at the start of the first decompressed block:
//!
//! ```text
//! - 4 bytes: Magic ("BAM\1")
//! - 4 bytes: SAM header text length (l_text, int32)
//! - l_text bytes: SAM header text
//! - 4 bytes: Number of reference sequences (n_ref, int32)
//! - For each reference:
//!   - 4 bytes: Reference name length (l_name, int32, includes null terminator)
//!   - l_name bytes: Reference name (null-terminated)
//!   - 4 bytes: Reference length (int32)
//! ```

use crate::error::{BamSeekError, Result};
use crate::io::cursor::ByteCursor;
use std::collections::HashMap;

/// BAM magic bytes.
pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// Reference sequence information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference sequence name (e.g., "chr1", "chrM")
    pub name: String,
    /// Reference sequence length in bases
    pub length: u32,
}

impl Reference {
    /// Create a new reference.
    pub fn new(name: impl Into<String>, length: u32) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Reference sequences in header order, with a name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    references: Vec<Reference>,
    by_name: HashMap<String, usize>,
}

impl ReferenceTable {
    /// Build a table, rejecting duplicate names.
    pub fn new(references: Vec<Reference>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(references.len());
        for (id, reference) in references.iter().enumerate() {
            if by_name.insert(reference.name.clone(), id).is_some() {
                return Err(BamSeekError::InvalidHeader(format!(
                    "duplicate reference name '{}'",
                    reference.name
                )));
            }
        }
        Ok(Self {
            references,
            by_name,
        })
    }

    /// Index of the reference named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Reference at `id`.
    pub fn get(&self, id: usize) -> Option<&Reference> {
        self.references.get(id)
    }

    /// Name of the reference at `id`.
    pub fn name(&self, id: usize) -> Option<&str> {
        self.get(id).map(|r| r.name.as_str())
    }

    /// Names in header order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|r| r.name.as_str())
    }

    /// All references in header order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Number of reference sequences.
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// True when the header lists no references.
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// BAM file header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BamHeader {
    /// SAM header text (includes @HD, @SQ, @RG, @PG lines)
    pub text: String,
    /// Reference sequences (chromosomes/contigs)
    pub references: ReferenceTable,
}

fn read_length(cursor: &mut ByteCursor<'_>, what: &str) -> Result<usize> {
    let value = cursor.read_i32()?;
    usize::try_from(value)
        .map_err(|_| BamSeekError::InvalidHeader(format!("negative {}: {}", what, value)))
}

/// Parse the header at the cursor position.
///
/// Returns `Ok(None)` and rewinds the cursor to 0 when the buffer does not
/// start with [`BAM_MAGIC`]. Running out of bytes surfaces as
/// [`BamSeekError::OutOfBounds`] so callers can retry with more data.
pub fn read_header(cursor: &mut ByteCursor<'_>) -> Result<Option<BamHeader>> {
    match cursor.take(BAM_MAGIC.len()) {
        Ok(magic) if magic == BAM_MAGIC => {}
        _ => {
            cursor.reset();
            return Ok(None);
        }
    }

    let l_text = read_length(cursor, "header text length")?;
    let text = cursor
        .read_fixed_string(l_text)?
        .trim_end_matches('\0')
        .to_string();

    let n_ref = read_length(cursor, "reference count")?;
    let mut references = Vec::with_capacity(n_ref.min(1 << 16));
    for _ in 0..n_ref {
        let l_name = read_length(cursor, "reference name length")?;
        let name = cursor.read_null_terminated_string(l_name)?;
        let length = cursor.read_i32()?;
        let length = u32::try_from(length).map_err(|_| {
            BamSeekError::InvalidHeader(format!(
                "negative length {} for reference '{}'",
                length, name
            ))
        })?;
        references.push(Reference { name, length });
    }

    Ok(Some(BamHeader {
        text,
        references: ReferenceTable::new(references)?,
    }))
}
