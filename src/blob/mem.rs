use std::collections::BTreeMap;

use super::{BlobPtr, BlobStore};
use crate::error::BlobError;

/// Blob store kept entirely in memory.
///
/// Overwrites never relocate. Used for temporary shards and tests.
#[derive(Debug, Default)]
pub struct MemBlobStore {
    blobs: BTreeMap<u64, Vec<u8>>,
    next: u64,
}

impl MemBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemBlobStore {
    fn put(&mut self, bytes: &[u8]) -> Result<BlobPtr, BlobError> {
        let ptr = BlobPtr(self.next);
        self.next += 1;
        self.blobs.insert(ptr.0, bytes.to_vec());
        Ok(ptr)
    }

    fn put_at(&mut self, ptr: BlobPtr, bytes: &[u8]) -> Result<BlobPtr, BlobError> {
        match self.blobs.get_mut(&ptr.0) {
            Some(blob) => {
                blob.clear();
                blob.extend_from_slice(bytes);
                Ok(ptr)
            }
            None => Err(BlobError::NotFound(ptr.0)),
        }
    }

    fn get(&mut self, ptr: BlobPtr) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .get(&ptr.0)
            .cloned()
            .ok_or(BlobError::NotFound(ptr.0))
    }

    fn delete(&mut self, ptr: BlobPtr) -> Result<(), BlobError> {
        self.blobs
            .remove(&ptr.0)
            .map(|_| ())
            .ok_or(BlobError::NotFound(ptr.0))
    }

    fn live_count(&self) -> usize {
        self.blobs.len()
    }

    fn sync(&mut self) -> Result<(), BlobError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let mut store = MemBlobStore::new();
        let a = store.put(b"alpha").unwrap();
        let b = store.put(b"beta").unwrap();
        assert_ne!(a, b);

        assert_eq!(store.put_at(a, b"alpha-2").unwrap(), a);
        assert_eq!(store.get(a).unwrap(), b"alpha-2");

        store.delete(b).unwrap();
        assert!(matches!(store.get(b), Err(BlobError::NotFound(_))));
        assert_eq!(store.live_count(), 1);
    }
}
