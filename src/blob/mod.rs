//! Pointer addressed byte blobs backing item-sets and child segments.

mod file;
mod mem;

use std::{
    fmt::{Display, Formatter},
    io::{Read, Write},
};

pub use file::FileBlobStore;
pub use mem::MemBlobStore;

use crate::{
    error::{BlobError, CodecError},
    serdes::{Decode, Encode},
};

/// Opaque handle of one stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobPtr(pub(crate) u64);

impl BlobPtr {
    pub fn offset(&self) -> u64 {
        self.0
    }
}

impl Display for BlobPtr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl Encode for BlobPtr {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        self.0.encode(writer)
    }

    fn size(&self) -> usize {
        self.0.size()
    }
}

impl Decode for BlobPtr {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(BlobPtr(u64::decode(reader)?))
    }
}

/// Storage of byte blobs addressed by [`BlobPtr`].
pub trait BlobStore {
    /// Stores a new blob.
    fn put(&mut self, bytes: &[u8]) -> Result<BlobPtr, BlobError>;

    /// Overwrites the blob at `ptr`. The store may relocate it, the returned
    /// pointer replaces `ptr`.
    fn put_at(&mut self, ptr: BlobPtr, bytes: &[u8]) -> Result<BlobPtr, BlobError>;

    fn get(&mut self, ptr: BlobPtr) -> Result<Vec<u8>, BlobError>;

    fn delete(&mut self, ptr: BlobPtr) -> Result<(), BlobError>;

    /// Number of live blobs.
    fn live_count(&self) -> usize;

    /// Makes written blobs durable.
    fn sync(&mut self) -> Result<(), BlobError>;
}
