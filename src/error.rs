use std::io;

use thiserror::Error;

use crate::option::AccessMode;

/// Error returned by the inverted index.
#[derive(Debug, Error)]
pub enum GixError {
    /// A mutating operation was attempted on an index that is not writable.
    #[error("index opened in {mode} mode is not writable")]
    WriteProtection { mode: AccessMode },
    /// Logical item index outside of `[0, total)`.
    #[error("item index {index} out of bounds, item-set holds {total} items")]
    IndexBounds { index: usize, total: usize },
    /// The main file was written against another blob heap.
    #[error("main file references blob store {expected}, found {found}")]
    StoreMismatch { expected: ulid::Ulid, found: ulid::Ulid },
    /// The main file does not carry the expected magic or checksum.
    #[error("corrupted main file: {0}")]
    Corrupted(&'static str),
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Error returned by blob stores.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob io error: {0}")]
    Io(#[from] io::Error),
    #[error("blob at {0} failed checksum validation")]
    Checksum(u64),
    #[error("no live blob at {0}")]
    NotFound(u64),
    #[error("corrupted blob heap: {0}")]
    Corrupted(&'static str),
    #[error("blob store opened read-only")]
    ReadOnly,
    #[error("blob of {0} bytes exceeds the record size limit")]
    TooLarge(usize),
}

/// Error returned by the binary codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("codec io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid utf-8 in encoded string")]
    InvalidUtf8,
    #[error("invalid tag byte {0}")]
    InvalidTag(u8),
}
