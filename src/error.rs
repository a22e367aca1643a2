//! Error types for bamseek

use thiserror::Error;

/// Result type alias for bamseek operations
pub type Result<T> = std::result::Result<T, BamSeekError>;

/// Error types that can occur while reading BAM containers and indexes
#[derive(Debug, Error)]
pub enum BamSeekError {
    /// I/O error from the underlying storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cursor read would run past the end of its buffer
    #[error("Read of {needed} bytes at offset {offset} exceeds buffer ({available} bytes available)")]
    OutOfBounds {
        /// Cursor position when the read was attempted
        offset: usize,
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// A BGZF member could not be framed
    #[error("Malformed BGZF member at offset {offset}: {message}")]
    MalformedContainer {
        /// Compressed offset of the member
        offset: u64,
        /// What was wrong with it
        message: String,
    },

    /// A member payload could not be inflated
    #[error("Failed to decompress BGZF member at offset {offset}: {source}")]
    Decompression {
        /// Compressed offset of the member
        offset: u64,
        /// Underlying inflate error
        #[source]
        source: std::io::Error,
    },

    /// The BAM header or reference table is inconsistent
    #[error("Invalid BAM header: {0}")]
    InvalidHeader(String),

    /// An alignment record violates the BAM record layout
    #[error("Invalid alignment record at offset {offset}: {message}")]
    InvalidRecord {
        /// Offset of the record inside its buffer
        offset: usize,
        /// What was wrong with it
        message: String,
    },

    /// A null-terminated string field does not end in NUL
    #[error("Missing NUL terminator in string at offset {offset}")]
    MissingNulTerminator {
        /// Offset of the string inside its buffer
        offset: usize,
    },

    /// A string field is not valid UTF-8
    #[error("Invalid UTF-8 in string at offset {offset}: {source}")]
    InvalidUtf8 {
        /// Offset of the string inside its buffer
        offset: usize,
        /// Underlying decode error
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// The BAI index is missing or does not parse
    #[error("BAI index absent or invalid: {0}")]
    IndexAbsentOrInvalid(String),

    /// A query named a reference sequence the header does not list
    #[error("Unknown reference sequence: {0}")]
    UnknownReference(String),
}

impl BamSeekError {
    pub(crate) fn malformed(offset: u64, message: impl Into<String>) -> Self {
        Self::MalformedContainer {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_record(offset: usize, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            offset,
            message: message.into(),
        }
    }

    /// True for cursor overruns, which callers use to detect data that
    /// continues in the next block.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. })
    }
}
