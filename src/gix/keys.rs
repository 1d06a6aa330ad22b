use std::{
    collections::HashMap,
    fs::{self, File},
    hash::Hash,
    io::{Cursor, Write},
    path::Path,
};

use ulid::Ulid;

use crate::{
    blob::BlobPtr,
    error::GixError,
    serdes::{Decode, Encode},
};

const MAGIC: &[u8; 4] = b"GIX1";
const HEADER_LEN: usize = 4 + 16;

/// Key to item-set pointer table, iterated in insertion order.
#[derive(Debug)]
pub(crate) struct KeyTable<K> {
    entries: Vec<(K, BlobPtr)>,
    positions: HashMap<K, usize>,
}

impl<K> KeyTable<K>
where
    K: Hash + Eq + Clone,
{
    pub(crate) fn new() -> Self {
        KeyTable {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<BlobPtr> {
        self.positions.get(key).map(|&pos| self.entries[pos].1)
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    /// Inserts `key` or repoints it at `ptr`.
    pub(crate) fn set(&mut self, key: &K, ptr: BlobPtr) {
        match self.positions.get(key) {
            Some(&pos) => self.entries[pos].1 = ptr,
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key.clone(), ptr));
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn key_at(&self, pos: usize) -> &K {
        &self.entries[pos].0
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, BlobPtr)> {
        self.entries.iter().map(|(key, ptr)| (key, *ptr))
    }

    pub(crate) fn sort(&mut self)
    where
        K: Ord,
    {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (pos, (key, _)) in self.entries.iter().enumerate() {
            self.positions.insert(key.clone(), pos);
        }
    }

    /// Approximate heap bytes of the table.
    pub(crate) fn mem_used(&self) -> usize {
        self.entries.capacity() * std::mem::size_of::<(K, BlobPtr)>()
            + self.positions.capacity() * std::mem::size_of::<(K, usize)>()
    }
}

impl<K> KeyTable<K>
where
    K: Hash + Eq + Clone + Encode + Decode,
{
    /// Writes the table to `path` through a temporary file.
    ///
    /// Layout: magic, store id, entry count, `(key, ptr)` pairs, crc32 of
    /// everything before it.
    pub(crate) fn save(&self, path: &Path, store_id: Ulid) -> Result<(), GixError> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 12 + self.entries.len() * 16);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&store_id.to_bytes());
        (self.entries.len() as u64).encode(&mut buf)?;
        for (key, ptr) in &self.entries {
            key.encode(&mut buf)?;
            ptr.encode(&mut buf)?;
        }
        crc32fast::hash(&buf).encode(&mut buf)?;

        let tmp = path.with_extension("gix.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reads a table written by [`KeyTable::save`] together with the id of
    /// the blob store it belongs to.
    pub(crate) fn load(path: &Path) -> Result<(Self, Ulid), GixError> {
        let buf = fs::read(path)?;
        if buf.len() < HEADER_LEN + 8 + 4 {
            return Err(GixError::Corrupted("main file truncated"));
        }
        let (body, tail) = buf.split_at(buf.len() - 4);
        let crc = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        if crc32fast::hash(body) != crc {
            return Err(GixError::Corrupted("main file checksum mismatch"));
        }
        if &body[..4] != MAGIC {
            return Err(GixError::Corrupted("missing main file magic"));
        }
        let mut id = [0u8; 16];
        id.copy_from_slice(&body[4..HEADER_LEN]);

        let mut reader = Cursor::new(&body[HEADER_LEN..]);
        let count = u64::decode(&mut reader)?;
        let mut table = KeyTable::new();
        for _ in 0..count {
            let key = K::decode(&mut reader)?;
            let ptr = BlobPtr::decode(&mut reader)?;
            table.set(&key, ptr);
        }
        Ok((table, Ulid::from_bytes(id)))
    }
}
