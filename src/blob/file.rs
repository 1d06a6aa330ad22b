use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crc32fast::Hasher;
use ulid::Ulid;

use super::{BlobPtr, BlobStore};
use crate::{
    error::BlobError,
    observability::{log_debug, log_warn},
    option::AccessMode,
};

const MAGIC: &[u8; 4] = b"GIXB";
const FILE_HEADER_LEN: u64 = 4 + 16;
const RECORD_HEADER_LEN: u64 = 13;
const STATE_FREE: u8 = 0;
const STATE_LIVE: u8 = 1;
const MIN_CAPACITY: u32 = 32;
const MAX_BLOB_LEN: usize = 1 << 31;

#[derive(Debug, Clone, Copy)]
struct RecordHeader {
    state: u8,
    capacity: u32,
    len: u32,
    crc32: u32,
}

impl RecordHeader {
    fn to_bytes(self) -> [u8; RECORD_HEADER_LEN as usize] {
        let mut buf = [0u8; RECORD_HEADER_LEN as usize];
        buf[0] = self.state;
        buf[1..5].copy_from_slice(&self.capacity.to_le_bytes());
        buf[5..9].copy_from_slice(&self.len.to_le_bytes());
        buf[9..13].copy_from_slice(&self.crc32.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; RECORD_HEADER_LEN as usize]) -> Self {
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        RecordHeader {
            state: buf[0],
            capacity: word(1),
            len: word(5),
            crc32: word(9),
        }
    }

    fn is_sane(&self) -> bool {
        self.state <= STATE_LIVE && self.len <= self.capacity
    }
}

fn capacity_for(len: u32) -> u32 {
    len.next_power_of_two().max(MIN_CAPACITY)
}

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Blob heap in a single file.
///
/// File format:
/// - magic `GIXB` followed by the 16 byte store id
/// - records of `[state u8][capacity u32][len u32][crc32 u32]` followed by
///   `capacity` payload bytes
///
/// Record capacity is the payload length rounded up to a power of two, so a
/// blob that grows within its capacity is overwritten in place. Freed records
/// are reused first fit. The free list is rebuilt by scanning on open.
#[derive(Debug)]
pub struct FileBlobStore {
    path: PathBuf,
    file: File,
    store_id: Ulid,
    end: u64,
    free: Vec<(u64, u32)>,
    live: usize,
    writable: bool,
}

impl FileBlobStore {
    /// Opens the heap at `path`. `Create` truncates any existing file,
    /// `Restore` validates every record and drops torn or corrupt ones.
    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self, BlobError> {
        let path = path.as_ref().to_path_buf();
        if mode == AccessMode::Create {
            return Self::create(path);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(mode != AccessMode::ReadOnly)
            .open(&path)?;
        let mut store = FileBlobStore {
            path,
            file,
            store_id: Ulid::nil(),
            end: FILE_HEADER_LEN,
            free: Vec::new(),
            live: 0,
            writable: mode.is_writable(),
        };
        store.store_id = store.read_file_header()?;
        store.scan(mode == AccessMode::Restore)?;

        Ok(store)
    }

    fn create(path: PathBuf) -> Result<Self, BlobError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let store_id = Ulid::new();
        file.write_all(MAGIC)?;
        file.write_all(&store_id.to_bytes())?;

        Ok(FileBlobStore {
            path,
            file,
            store_id,
            end: FILE_HEADER_LEN,
            free: Vec::new(),
            live: 0,
            writable: true,
        })
    }

    /// Identity written at creation, used to pair the heap with its main file.
    pub fn store_id(&self) -> Ulid {
        self.store_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file_header(&mut self) -> Result<Ulid, BlobError> {
        let mut buf = [0u8; FILE_HEADER_LEN as usize];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        if &buf[..4] != MAGIC {
            return Err(BlobError::Corrupted("missing blob heap magic"));
        }
        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[4..]);

        Ok(Ulid::from_bytes(id))
    }

    fn scan(&mut self, repair: bool) -> Result<(), BlobError> {
        let file_len = self.file.metadata()?.len();
        let mut pos = FILE_HEADER_LEN;

        while pos < file_len {
            let header = if file_len - pos >= RECORD_HEADER_LEN {
                Some(self.read_header(pos)?)
            } else {
                None
            };
            let header = match header {
                Some(header)
                    if header.is_sane()
                        && pos + RECORD_HEADER_LEN + header.capacity as u64 <= file_len =>
                {
                    header
                }
                _ if repair => {
                    log_warn!(
                        component = "blob",
                        event = "blob_tail_truncated",
                        path = %self.path.display(),
                        offset = pos,
                        dropped_bytes = file_len - pos,
                    );
                    self.file.set_len(pos)?;
                    break;
                }
                _ => return Err(BlobError::Corrupted("torn record in blob heap")),
            };

            let mut state = header.state;
            if repair && state == STATE_LIVE {
                let payload = self.read_payload(pos, header.len)?;
                if checksum(&payload) != header.crc32 {
                    log_warn!(
                        component = "blob",
                        event = "blob_record_dropped",
                        path = %self.path.display(),
                        offset = pos,
                    );
                    self.write_state(pos, STATE_FREE)?;
                    state = STATE_FREE;
                }
            }
            if state == STATE_LIVE {
                self.live += 1;
            } else {
                self.free.push((pos, header.capacity));
            }
            pos += RECORD_HEADER_LEN + header.capacity as u64;
        }
        self.end = pos;

        log_debug!(
            component = "blob",
            event = "blob_heap_scanned",
            path = %self.path.display(),
            live = self.live,
            free = self.free.len(),
        );
        Ok(())
    }

    fn read_header(&mut self, offset: u64) -> Result<RecordHeader, BlobError> {
        let mut buf = [0u8; RECORD_HEADER_LEN as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;

        Ok(RecordHeader::from_bytes(&buf))
    }

    fn read_live_header(&mut self, ptr: BlobPtr) -> Result<RecordHeader, BlobError> {
        if ptr.0 < FILE_HEADER_LEN || ptr.0 + RECORD_HEADER_LEN > self.end {
            return Err(BlobError::NotFound(ptr.0));
        }
        let header = self.read_header(ptr.0)?;
        if header.state != STATE_LIVE || !header.is_sane() {
            return Err(BlobError::NotFound(ptr.0));
        }
        Ok(header)
    }

    fn read_payload(&mut self, offset: u64, len: u32) -> Result<Vec<u8>, BlobError> {
        let mut payload = vec![0u8; len as usize];
        self.file
            .seek(SeekFrom::Start(offset + RECORD_HEADER_LEN))?;
        self.file.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn write_state(&mut self, offset: u64, state: u8) -> Result<(), BlobError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[state])?;
        Ok(())
    }

    fn write_record(
        &mut self,
        offset: u64,
        capacity: u32,
        bytes: &[u8],
        pad: bool,
    ) -> Result<(), BlobError> {
        let header = RecordHeader {
            state: STATE_LIVE,
            capacity,
            len: bytes.len() as u32,
            crc32: checksum(bytes),
        };
        let total = if pad {
            RECORD_HEADER_LEN as usize + capacity as usize
        } else {
            RECORD_HEADER_LEN as usize + bytes.len()
        };
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(bytes);
        buf.resize(total, 0);

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    fn check_len(&self, bytes: &[u8]) -> Result<u32, BlobError> {
        if !self.writable {
            return Err(BlobError::ReadOnly);
        }
        if bytes.len() > MAX_BLOB_LEN {
            return Err(BlobError::TooLarge(bytes.len()));
        }
        Ok(bytes.len() as u32)
    }
}

impl BlobStore for FileBlobStore {
    fn put(&mut self, bytes: &[u8]) -> Result<BlobPtr, BlobError> {
        let len = self.check_len(bytes)?;

        if let Some(slot) = self.free.iter().position(|&(_, capacity)| capacity >= len) {
            let (offset, capacity) = self.free.swap_remove(slot);
            self.write_record(offset, capacity, bytes, false)?;
            self.live += 1;
            return Ok(BlobPtr(offset));
        }

        let capacity = capacity_for(len);
        let offset = self.end;
        self.write_record(offset, capacity, bytes, true)?;
        self.end += RECORD_HEADER_LEN + capacity as u64;
        self.live += 1;

        Ok(BlobPtr(offset))
    }

    fn put_at(&mut self, ptr: BlobPtr, bytes: &[u8]) -> Result<BlobPtr, BlobError> {
        let len = self.check_len(bytes)?;
        let header = self.read_live_header(ptr)?;

        if len <= header.capacity {
            self.write_record(ptr.0, header.capacity, bytes, false)?;
            return Ok(ptr);
        }
        self.delete(ptr)?;
        self.put(bytes)
    }

    fn get(&mut self, ptr: BlobPtr) -> Result<Vec<u8>, BlobError> {
        let header = self.read_live_header(ptr)?;
        let payload = self.read_payload(ptr.0, header.len)?;
        if checksum(&payload) != header.crc32 {
            return Err(BlobError::Checksum(ptr.0));
        }
        Ok(payload)
    }

    fn delete(&mut self, ptr: BlobPtr) -> Result<(), BlobError> {
        if !self.writable {
            return Err(BlobError::ReadOnly);
        }
        let header = self.read_live_header(ptr)?;
        self.write_state(ptr.0, STATE_FREE)?;
        self.free.push((ptr.0, header.capacity));
        self.live -= 1;
        Ok(())
    }

    fn live_count(&self) -> usize {
        self.live
    }

    fn sync(&mut self) -> Result<(), BlobError> {
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }
}
