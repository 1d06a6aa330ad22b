//! The inverted index: a key table mapping each key to the blob of its
//! item-set, a blob store, and a memory bounded cache of resident item-sets.

mod keys;

use std::{
    cell::RefCell,
    fs::File,
    hash::Hash,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use keys::KeyTable;
use ulid::Ulid;

use crate::{
    blob::{BlobPtr, BlobStore, FileBlobStore, MemBlobStore},
    cache::ItemSetCache,
    error::GixError,
    item_set::{ItemSet, ItemSetHandle, Storage},
    merger::{DefaultMerger, Merger},
    observability::{log_debug, log_error, log_info},
    option::{AccessMode, GixOption},
    serdes::{Decode, Encode},
};

/// Key type of an index.
pub trait IndexKey: Hash + Eq + Clone + Encode + Decode {}

impl<K> IndexKey for K where K: Hash + Eq + Clone + Encode + Decode {}

/// Item type stored in postings.
pub trait IndexItem: Clone + Encode + Decode {}

impl<T> IndexItem for T where T: Clone + Encode + Decode {}

/// Display names of keys, used by [`Gix::save_txt`].
///
/// Any `Fn(&K) -> String` is a namer; `|_: &K| String::new()` writes
/// anonymous lines.
pub trait KeyNamer<K> {
    fn key_name(&self, _key: &K) -> String {
        String::new()
    }
}

impl<K, F> KeyNamer<K> for F
where
    F: Fn(&K) -> String,
{
    fn key_name(&self, key: &K) -> String {
        self(key)
    }
}

fn storage<'a, M>(
    blobs: &'a mut dyn BlobStore,
    merger: &'a M,
    option: &GixOption,
) -> Storage<'a, M> {
    Storage::new(blobs, merger, option.mode)
        .split_trigger(option.split_trigger)
        .split_retention(option.split_retention)
}

/// Stores `item_set` at `ptr`, repointing its key when the blob relocated.
fn write_back<K, T, M>(
    blobs: &mut dyn BlobStore,
    merger: &M,
    option: &GixOption,
    keys: &mut KeyTable<K>,
    ptr: BlobPtr,
    item_set: &ItemSetHandle<K, T>,
) -> Result<BlobPtr, GixError>
where
    K: IndexKey,
    T: IndexItem,
    M: Merger<K, T>,
{
    let mut storage = storage(blobs, merger, option);
    let mut item_set = item_set.borrow_mut();
    match item_set.write_back(ptr, &mut storage)? {
        Some(new_ptr) => {
            if new_ptr != ptr {
                keys.set(item_set.key(), new_ptr);
            }
            Ok(new_ptr)
        }
        None => Ok(ptr),
    }
}

/// General inverted index from keys `K` to postings of items `T`.
///
/// Item-sets are loaded from the blob store on first use and kept in an LRU
/// cache bounded by [`GixOption::cache_capacity`]. Evicted item-sets are
/// written back when the index is writable.
///
/// Handles returned by [`Gix::get_item_set`] must not stay borrowed across
/// calls into the index.
pub struct Gix<K, T, M = DefaultMerger<K, T>>
where
    K: IndexKey,
    T: IndexItem,
    M: Merger<K, T>,
{
    option: GixOption,
    keys: KeyTable<K>,
    merger: M,
    cache: ItemSetCache<BlobPtr, ItemSetHandle<K, T>>,
    blobs: Box<dyn BlobStore>,
    store_id: Ulid,
    persistent: bool,
    /// Net resident growth since the last cache refresh.
    new_cache_size_inc: i64,
    cache_full: bool,
    closed: bool,
}

impl<K, T> Gix<K, T, DefaultMerger<K, T>>
where
    K: IndexKey,
    T: IndexItem + Ord,
{
    /// Opens the index files described by `option` ordered by `T: Ord`.
    pub fn open(option: GixOption) -> Result<Self, GixError> {
        Self::open_with_merger(option, DefaultMerger::new())
    }

    /// Index without files over an in-memory blob store.
    pub fn in_memory(option: GixOption) -> Self {
        Self::in_memory_with_merger(option, DefaultMerger::new())
    }
}

impl<K, T, M> Gix<K, T, M>
where
    K: IndexKey,
    T: IndexItem,
    M: Merger<K, T>,
{
    /// Opens the index files described by `option` using `merger`.
    ///
    /// `Create` starts empty and overwrites existing files. The other modes
    /// load the main file and check that it belongs to the blob heap next
    /// to it.
    pub fn open_with_merger(option: GixOption, merger: M) -> Result<Self, GixError> {
        let blobs = FileBlobStore::open(option.blob_path(), option.mode)?;
        let keys = match option.mode {
            AccessMode::Create => KeyTable::new(),
            AccessMode::Update | AccessMode::ReadOnly | AccessMode::Restore => {
                let (keys, store_id) = KeyTable::load(&option.main_path())?;
                if store_id != blobs.store_id() {
                    return Err(GixError::StoreMismatch {
                        expected: store_id,
                        found: blobs.store_id(),
                    });
                }
                keys
            }
        };

        log_info!(
            component = "gix",
            event = "gix_opened",
            name = %option.name,
            mode = %option.mode,
            keys = keys.len(),
            blobs = blobs.live_count(),
        );
        Ok(Gix {
            cache: ItemSetCache::new(option.cache_capacity),
            store_id: blobs.store_id(),
            blobs: Box::new(blobs),
            keys,
            merger,
            option,
            persistent: true,
            new_cache_size_inc: 0,
            cache_full: false,
            closed: false,
        })
    }

    /// Index without files over an in-memory blob store. It is always
    /// writable; the access mode of `option` is ignored.
    pub fn in_memory_with_merger(option: GixOption, merger: M) -> Self {
        let option = option.mode(AccessMode::Create);
        Gix {
            cache: ItemSetCache::new(option.cache_capacity),
            store_id: Ulid::new(),
            blobs: Box::new(MemBlobStore::new()),
            keys: KeyTable::new(),
            merger,
            option,
            persistent: false,
            new_cache_size_inc: 0,
            cache_full: false,
            closed: false,
        }
    }

    fn ensure_writable(&self) -> Result<(), GixError> {
        if self.option.mode.is_writable() {
            Ok(())
        } else {
            Err(GixError::WriteProtection {
                mode: self.option.mode,
            })
        }
    }

    /// Pointer of the item-set of `key`, creating an empty one if the key
    /// is new.
    fn add_key_id(&mut self, key: &K) -> Result<BlobPtr, GixError> {
        if let Some(ptr) = self.keys.get(key) {
            return Ok(ptr);
        }
        self.ensure_writable()?;

        let mut item_set = ItemSet::<K, T>::new(key.clone());
        let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
        let bytes = item_set.save(&mut storage)?;
        let ptr = storage.put_blob(&bytes)?;

        self.keys.set(key, ptr);
        self.new_cache_size_inc += item_set.mem_used() as i64;
        self.cache.put(ptr, Rc::new(RefCell::new(item_set)));
        Ok(ptr)
    }

    pub fn is_key(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Keys in insertion order, or sorted after [`Gix::sort_keys`].
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.keys.iter().map(|(key, _)| key)
    }

    /// Reorders the key table by key.
    pub fn sort_keys(&mut self)
    where
        K: Ord,
    {
        self.keys.sort();
    }

    /// Resident item-set of `key`, or `None` for an unknown key.
    pub fn get_item_set(&mut self, key: &K) -> Result<Option<ItemSetHandle<K, T>>, GixError> {
        match self.keys.get(key) {
            Some(ptr) => self.get_item_set_at(ptr).map(Some),
            None => Ok(None),
        }
    }

    /// Resident item-set stored at `ptr`, loading it on a cache miss. The
    /// item-set becomes the most recently used cache entry.
    pub fn get_item_set_at(&mut self, ptr: BlobPtr) -> Result<ItemSetHandle<K, T>, GixError> {
        let item_set = match self.cache.get(&ptr) {
            Some(item_set) => item_set,
            None => {
                let bytes = self.blobs.get(ptr)?;
                let item_set = ItemSet::<K, T>::load(&bytes)?;
                self.new_cache_size_inc += item_set.mem_used() as i64;
                Rc::new(RefCell::new(item_set))
            }
        };
        self.cache.put(ptr, item_set.clone());
        Ok(item_set)
    }

    /// Writes the resident item-set at `ptr` to the blob store and returns
    /// its possibly relocated pointer.
    pub fn store_item_set(&mut self, ptr: BlobPtr) -> Result<BlobPtr, GixError> {
        self.ensure_writable()?;
        let Some(item_set) = self.cache.get(&ptr) else {
            return Ok(ptr);
        };
        let new_ptr = write_back(
            self.blobs.as_mut(),
            &self.merger,
            &self.option,
            &mut self.keys,
            ptr,
            &item_set,
        )?;
        if new_ptr != ptr {
            self.cache.rekey(&ptr, new_ptr);
        }
        Ok(new_ptr)
    }

    pub fn add_item(&mut self, key: &K, item: T) -> Result<(), GixError> {
        self.add_item_v(key, [item])
    }

    pub fn add_item_v<I>(&mut self, key: &K, items: I) -> Result<(), GixError>
    where
        I: IntoIterator<Item = T>,
    {
        self.ensure_writable()?;
        let ptr = self.add_key_id(key)?;
        let item_set = self.get_item_set_at(ptr)?;

        let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
        item_set.borrow_mut().add_item_v(items, &mut storage)?;
        self.new_cache_size_inc += storage.mem_delta();

        self.refresh_mem_used()
    }

    /// Removes `item` from the postings of `key`. Unknown keys are a no-op.
    pub fn del_item(&mut self, key: &K, item: &T) -> Result<(), GixError> {
        self.ensure_writable()?;
        let Some(item_set) = self.get_item_set(key)? else {
            return Ok(());
        };

        let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
        item_set.borrow_mut().del_item(item, &mut storage)?;
        self.new_cache_size_inc += storage.mem_delta();

        self.refresh_mem_used()
    }

    /// Empties the postings of `key`. The key stays in the index.
    pub fn clr(&mut self, key: &K) -> Result<(), GixError> {
        self.ensure_writable()?;
        let Some(item_set) = self.get_item_set(key)? else {
            return Ok(());
        };

        let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
        item_set.borrow_mut().clr(&mut storage)?;
        self.new_cache_size_inc += storage.mem_delta();

        self.refresh_mem_used()
    }

    /// Global merge of the postings of `key`.
    pub fn def(&mut self, key: &K) -> Result<(), GixError> {
        let Some(item_set) = self.get_item_set(key)? else {
            return Ok(());
        };

        let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
        item_set.borrow_mut().def(&mut storage)?;
        self.new_cache_size_inc += storage.mem_delta();

        self.refresh_mem_used()
    }

    /// Postings of `key` in stored order, empty for an unknown key.
    pub fn get_item_v(&mut self, key: &K) -> Result<Vec<T>, GixError> {
        let Some(item_set) = self.get_item_set(key)? else {
            return Ok(Vec::new());
        };

        let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
        let items = item_set.borrow().get_item_v(&mut storage)?;
        self.refresh_mem_used()?;
        Ok(items)
    }

    /// Item at position `index` of the postings of `key`.
    pub fn get_item(&mut self, key: &K, index: usize) -> Result<T, GixError> {
        let Some(item_set) = self.get_item_set(key)? else {
            return Err(GixError::IndexBounds { index, total: 0 });
        };

        let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
        let item = item_set.borrow().get_item(index, &mut storage)?;
        self.refresh_mem_used()?;
        Ok(item)
    }

    /// Number of items stored for `key`, duplicates not yet merged included.
    pub fn item_count(&mut self, key: &K) -> Result<usize, GixError> {
        Ok(self
            .get_item_set(key)?
            .map_or(0, |item_set| item_set.borrow().item_count()))
    }

    /// Globally merged postings of `key`, `None` for an unknown key.
    pub(crate) fn postings(&mut self, key: &K) -> Result<Option<Vec<T>>, GixError> {
        let Some(item_set) = self.get_item_set(key)? else {
            return Ok(None);
        };

        let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
        let items = {
            let mut item_set = item_set.borrow_mut();
            item_set.def(&mut storage)?;
            item_set.get_item_v(&mut storage)?
        };
        self.new_cache_size_inc += storage.mem_delta();
        self.refresh_mem_used()?;
        Ok(Some(items))
    }

    pub fn merger(&self) -> &M {
        &self.merger
    }

    /// Adds the postings of every key of `other` to this index.
    pub fn merge_index<M2>(&mut self, other: &mut Gix<K, T, M2>) -> Result<(), GixError>
    where
        M2: Merger<K, T>,
    {
        self.ensure_writable()?;
        let total = other.key_count();

        for pos in 0..total {
            let key = other.keys.key_at(pos).clone();
            let Some(theirs) = other.get_item_set(&key)? else {
                continue;
            };
            let ptr = self.add_key_id(&key)?;
            let mine = self.get_item_set_at(ptr)?;

            let mut other_storage = storage(other.blobs.as_mut(), &other.merger, &other.option);
            let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
            {
                let mut mine = mine.borrow_mut();
                mine.append_item_set(&theirs.borrow(), &mut other_storage, &mut storage)?;
                mine.def(&mut storage)?;
            }
            self.new_cache_size_inc += storage.mem_delta();

            other.refresh_mem_used()?;
            self.refresh_mem_used()?;

            if (pos + 1) % 1000 == 0 {
                log_debug!(
                    component = "gix",
                    event = "merge_index_progress",
                    merged = pos + 1,
                    total,
                );
            }
        }

        log_info!(
            component = "gix",
            event = "merge_index_done",
            name = %self.option.name,
            keys = total,
        );
        Ok(())
    }

    /// Evicts least recently used item-sets once the cache grew by more
    /// than the refresh threshold since the last refresh.
    ///
    /// Resident item-sets are merged locally first so that their sizes
    /// reflect deduplicated buffers. Evicted item-sets are written back when
    /// the index is writable.
    pub fn refresh_mem_used(&mut self) -> Result<(), GixError> {
        if self.new_cache_size_inc <= self.option.refresh_threshold() {
            return Ok(());
        }
        let growth = self.new_cache_size_inc;
        {
            let mut storage = storage(self.blobs.as_mut(), &self.merger, &self.option);
            for (_, item_set) in self.cache.iter() {
                item_set.borrow_mut().def_local(&mut storage);
            }
        }

        let resident = self.cache.len();
        let blobs = self.blobs.as_mut();
        let merger = &self.merger;
        let option = &self.option;
        let keys = &mut self.keys;
        self.cache_full = self.cache.refresh_mem_used(|ptr, item_set| {
            write_back(&mut *blobs, merger, option, keys, *ptr, item_set)
        })?;
        self.new_cache_size_inc = 0;

        log_info!(
            component = "gix",
            event = "cache_cleanup",
            growth,
            evicted = resident - self.cache.len(),
            resident = self.cache.len(),
            mem_used = self.cache.mem_used(),
            cache_full = self.cache_full,
        );
        Ok(())
    }

    /// Writes every resident item-set back and empties the cache. On a
    /// writable file index the key table is persisted too.
    pub fn flush(&mut self) -> Result<(), GixError> {
        let blobs = self.blobs.as_mut();
        let merger = &self.merger;
        let option = &self.option;
        let keys = &mut self.keys;
        self.cache.flush_and_clear(|ptr, item_set| {
            write_back(&mut *blobs, merger, option, keys, *ptr, item_set)
        })?;
        self.new_cache_size_inc = 0;
        self.cache_full = false;

        if self.option.mode.is_writable() {
            self.blobs.sync()?;
            if self.persistent {
                self.keys.save(&self.option.main_path(), self.store_id)?;
            }
        }
        Ok(())
    }

    /// Writes one `name\titem_count\tmem_used` line per key.
    pub fn save_txt<N>(&mut self, path: impl AsRef<Path>, namer: &N) -> Result<(), GixError>
    where
        N: KeyNamer<K>,
    {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        for pos in 0..self.keys.len() {
            let key = self.keys.key_at(pos).clone();
            let item_set = self.get_item_set(&key)?;
            if let Some(item_set) = item_set {
                let item_set = item_set.borrow();
                writeln!(
                    writer,
                    "{}\t{}\t{}",
                    namer.key_name(&key),
                    item_set.item_count(),
                    item_set.mem_used()
                )?;
            }
            self.refresh_mem_used()?;
        }
        writer.flush()?;

        log_info!(
            component = "gix",
            event = "save_txt_done",
            path = %path.display(),
            keys = self.keys.len(),
        );
        Ok(())
    }

    /// Approximate bytes held by the key table and the cache.
    pub fn mem_used(&self) -> usize {
        self.keys.mem_used() + self.cache.mem_used()
    }

    pub fn cache_mem_used(&self) -> usize {
        self.cache.mem_used()
    }

    pub fn max_cache_mem(&self) -> usize {
        self.cache.max_mem_used()
    }

    /// Resident growth not yet seen by a cache refresh.
    pub fn pending_growth(&self) -> i64 {
        self.new_cache_size_inc
    }

    /// Whether the last cache refresh had to evict.
    pub fn is_cache_full(&self) -> bool {
        self.cache_full
    }

    pub fn is_read_only(&self) -> bool {
        !self.option.mode.is_writable()
    }

    pub fn mode(&self) -> AccessMode {
        self.option.mode
    }

    /// Main file path, `None` for an in-memory index.
    pub fn path(&self) -> Option<PathBuf> {
        self.persistent.then(|| self.option.main_path())
    }

    /// Flushes a writable index and persists its key table.
    pub fn close(mut self) -> Result<(), GixError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), GixError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.option.mode.is_writable() {
            self.flush()?;
        }

        log_info!(
            component = "gix",
            event = "gix_closed",
            name = %self.option.name,
            keys = self.keys.len(),
        );
        Ok(())
    }
}

impl<K, T, M> Drop for Gix<K, T, M>
where
    K: IndexKey,
    T: IndexItem,
    M: Merger<K, T>,
{
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log_error!(
                component = "gix",
                event = "close_failed",
                name = %self.option.name,
                error = %err,
            );
        }
    }
}
