//! Postings container of a single key.
//!
//! An item-set keeps recent items in a working buffer and pushes full
//! buffers into child segments stored as separate blobs. Child contents are
//! loaded lazily and kept until the item-set is dropped. Once `merged` holds,
//! the children in order followed by the buffer form one sorted, duplicate
//! free sequence under the index's [`Merger`].

use std::{
    cell::RefCell,
    io::{Cursor, Read, Write},
    mem::size_of,
    rc::Rc,
};

use crate::{
    blob::{BlobPtr, BlobStore},
    cache::MemSized,
    error::{CodecError, GixError},
    merger::Merger,
    observability::log_debug,
    option::AccessMode,
    serdes::{encode_to_vec, Decode, Encode},
    trigger::SplitTrigger,
};

/// Shared handle of a resident item-set.
pub type ItemSetHandle<K, T> = Rc<RefCell<ItemSet<K, T>>>;

/// Storage context of item-set operations.
///
/// Gives an item-set access to the blob store holding its child segments,
/// the merger and split policy of its index, and collects the net memory
/// change of every mutation for cache accounting.
pub struct Storage<'a, M> {
    blobs: &'a mut dyn BlobStore,
    merger: &'a M,
    mode: AccessMode,
    trigger: SplitTrigger,
    retention: f64,
    mem_delta: i64,
}

impl<'a, M> Storage<'a, M> {
    pub fn new(blobs: &'a mut dyn BlobStore, merger: &'a M, mode: AccessMode) -> Self {
        Storage {
            blobs,
            merger,
            mode,
            trigger: SplitTrigger::default(),
            retention: 0.9,
            mem_delta: 0,
        }
    }

    pub fn split_trigger(self, trigger: SplitTrigger) -> Self {
        Storage { trigger, ..self }
    }

    pub fn split_retention(self, retention: f64) -> Self {
        Storage { retention, ..self }
    }

    /// Net bytes item-sets grew by through this context.
    pub fn mem_delta(&self) -> i64 {
        self.mem_delta
    }

    pub fn merger(&self) -> &'a M {
        self.merger
    }

    pub fn is_writable(&self) -> bool {
        self.mode.is_writable()
    }

    fn report(&mut self, before: usize, after: usize) {
        self.mem_delta += after as i64 - before as i64;
    }

    fn ensure_writable(&self) -> Result<(), GixError> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(GixError::WriteProtection { mode: self.mode })
        }
    }

    fn load_child<T: Decode>(&mut self, ptr: BlobPtr) -> Result<Vec<T>, GixError> {
        let bytes = self.blobs.get(ptr)?;
        Ok(Vec::<T>::decode(&mut Cursor::new(bytes))?)
    }

    fn enlist_child<T: Encode>(&mut self, items: &[T]) -> Result<BlobPtr, GixError> {
        self.ensure_writable()?;
        let bytes = encode_to_vec(items)?;
        Ok(self.blobs.put(&bytes)?)
    }

    fn store_child<T: Encode>(&mut self, ptr: BlobPtr, items: &[T]) -> Result<BlobPtr, GixError> {
        self.ensure_writable()?;
        let bytes = encode_to_vec(items)?;
        Ok(self.blobs.put_at(ptr, &bytes)?)
    }

    fn delete_child(&mut self, ptr: BlobPtr) -> Result<(), GixError> {
        self.ensure_writable()?;
        Ok(self.blobs.delete(ptr)?)
    }

    pub(crate) fn put_blob(&mut self, bytes: &[u8]) -> Result<BlobPtr, GixError> {
        self.ensure_writable()?;
        Ok(self.blobs.put(bytes)?)
    }

    pub(crate) fn put_blob_at(&mut self, ptr: BlobPtr, bytes: &[u8]) -> Result<BlobPtr, GixError> {
        self.ensure_writable()?;
        Ok(self.blobs.put_at(ptr, bytes)?)
    }
}

/// Descriptor of one child segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildInfo<T> {
    min: T,
    max: T,
    len: usize,
    ptr: BlobPtr,
    merged: bool,
}

impl<T> ChildInfo<T> {
    pub fn min(&self) -> &T {
        &self.min
    }

    pub fn max(&self) -> &T {
        &self.max
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ptr(&self) -> BlobPtr {
        self.ptr
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }
}

impl<T: Encode> Encode for ChildInfo<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        self.min.encode(writer)?;
        self.max.encode(writer)?;
        (self.len as u64).encode(writer)?;
        self.ptr.encode(writer)?;
        self.merged.encode(writer)
    }

    fn size(&self) -> usize {
        self.min.size() + self.max.size() + size_of::<u64>() + self.ptr.size() + 1
    }
}

impl<T: Decode> Decode for ChildInfo<T> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(ChildInfo {
            min: T::decode(reader)?,
            max: T::decode(reader)?,
            len: u64::decode(reader)? as usize,
            ptr: BlobPtr::decode(reader)?,
            merged: bool::decode(reader)?,
        })
    }
}

/// In-memory contents of a child segment.
#[derive(Debug)]
struct ChildData<T> {
    items: Option<Vec<T>>,
    /// Contents differ from the stored blob.
    dirty: bool,
}

impl<T> ChildData<T> {
    fn unloaded() -> Self {
        ChildData {
            items: None,
            dirty: false,
        }
    }
}

#[derive(Debug)]
pub struct ItemSet<K, T> {
    key: K,
    items: Vec<T>,
    buffer_bytes: usize,
    children: Vec<ChildInfo<T>>,
    children_data: RefCell<Vec<ChildData<T>>>,
    merged: bool,
    total: usize,
}

impl<K, T> ItemSet<K, T>
where
    T: Clone + Encode + Decode,
{
    pub fn new(key: K) -> Self {
        ItemSet {
            key,
            items: Vec::new(),
            buffer_bytes: 0,
            children: Vec::new(),
            children_data: RefCell::new(Vec::new()),
            merged: true,
            total: 0,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Items in the buffer and all children.
    pub fn item_count(&self) -> usize {
        self.total
    }

    pub fn buffer_len(&self) -> usize {
        self.items.len()
    }

    pub fn children(&self) -> &[ChildInfo<T>] {
        &self.children
    }

    pub fn children_len(&self) -> usize {
        self.children.len()
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    /// Bytes held by the working buffer and the child descriptors.
    /// Loaded child contents are not included.
    pub fn mem_used(&self) -> usize {
        size_of::<Self>()
            + self.buffer_bytes
            + self.children.iter().map(|child| child.size()).sum::<usize>()
    }

    fn recalc(&mut self) {
        self.buffer_bytes = self.items.iter().map(|item| item.size()).sum();
        self.total = self.items.len() + self.children.iter().map(|child| child.len).sum::<usize>();
    }

    fn is_loaded(&self, child: usize) -> bool {
        matches!(
            &self.children_data.borrow()[child].items,
            Some(items) if items.len() == self.children[child].len
        )
    }

    fn load_child<M>(&self, child: usize, storage: &mut Storage<'_, M>) -> Result<(), GixError> {
        if !self.is_loaded(child) {
            let items = storage.load_child(self.children[child].ptr)?;
            let mut data = self.children_data.borrow_mut();
            data[child].items = Some(items);
            data[child].dirty = false;
        }
        Ok(())
    }

    fn load_children<M>(&self, storage: &mut Storage<'_, M>) -> Result<(), GixError> {
        for child in 0..self.children.len() {
            self.load_child(child, storage)?;
        }
        Ok(())
    }

    /// Appends one item, pushing the working buffer into a new child segment
    /// first when it is full.
    pub fn add_item<M>(&mut self, item: T, storage: &mut Storage<'_, M>) -> Result<(), GixError>
    where
        M: Merger<K, T>,
    {
        let old_size = self.mem_used();
        let merger = storage.merger;

        if !self.items.is_empty() && storage.trigger.is_full(self.items.len(), self.buffer_bytes) {
            let mut store = true;
            if !self.merged {
                let old_len = self.items.len();
                merger.merge(&mut self.items);
                let mut new_len = self.items.len();

                let after_children = match self.children.last() {
                    Some(last) => merger.less_than(&last.max, &self.items[0]),
                    None => true,
                };
                if after_children {
                    self.merged = true;
                } else {
                    self.def_inner(storage)?;
                    new_len = self.items.len();
                }
                store = new_len as f64 / old_len as f64 > storage.retention;
            }
            if store && !self.items.is_empty() {
                self.push_child(storage)?;
            }
            self.recalc();
        }

        if self.merged {
            self.merged = match (self.items.last(), self.children.last()) {
                (None, None) => true,
                (None, Some(last)) => merger.less_than(&last.max, &item),
                (Some(prev), _) => merger.less_than(prev, &item),
            };
        }
        self.buffer_bytes += item.size();
        self.items.push(item);
        self.total += 1;

        storage.report(old_size, self.mem_used());
        Ok(())
    }

    pub fn add_item_v<M, I>(&mut self, items: I, storage: &mut Storage<'_, M>) -> Result<(), GixError>
    where
        M: Merger<K, T>,
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.add_item(item, storage)?;
        }
        Ok(())
    }

    /// Adds every item of `other`, whose child segments live in
    /// `other_storage`.
    pub fn append_item_set<M, M2>(
        &mut self,
        other: &ItemSet<K, T>,
        other_storage: &mut Storage<'_, M2>,
        storage: &mut Storage<'_, M>,
    ) -> Result<(), GixError>
    where
        M: Merger<K, T>,
    {
        let items = other.get_item_v(other_storage)?;
        self.add_item_v(items, storage)
    }

    /// All items, children in order followed by the working buffer.
    ///
    /// Loads every child segment. The result is sorted only when the
    /// item-set is merged.
    pub fn get_item_v<M>(&self, storage: &mut Storage<'_, M>) -> Result<Vec<T>, GixError> {
        self.load_children(storage)?;

        let mut out = Vec::with_capacity(self.total);
        let data = self.children_data.borrow();
        for child in data.iter() {
            if let Some(items) = &child.items {
                out.extend_from_slice(items);
            }
        }
        out.extend_from_slice(&self.items);
        Ok(out)
    }

    /// Item at position `index` of the children-then-buffer sequence.
    /// Loads only the child segment holding it.
    pub fn get_item<M>(&self, index: usize, storage: &mut Storage<'_, M>) -> Result<T, GixError> {
        if index >= self.total {
            return Err(GixError::IndexBounds {
                index,
                total: self.total,
            });
        }
        let mut offset = index;
        for (child, info) in self.children.iter().enumerate() {
            if offset < info.len {
                self.load_child(child, storage)?;
                let data = self.children_data.borrow();
                if let Some(items) = &data[child].items {
                    return Ok(items[offset].clone());
                }
                unreachable!("child segment {child} loaded without contents");
            }
            offset -= info.len;
        }
        Ok(self.items[offset].clone())
    }

    /// Removes `item` after a global merge. Children left empty are deleted.
    pub fn del_item<M>(&mut self, item: &T, storage: &mut Storage<'_, M>) -> Result<(), GixError>
    where
        M: Merger<K, T>,
    {
        let old_size = self.mem_used();
        let merger = storage.merger;
        self.def_inner(storage)?;

        let is_same = |other: &T| !merger.less_than(other, item) && !merger.less_than(item, other);
        self.items.retain(|other| !is_same(other));

        let mut emptied = Vec::new();
        for child in 0..self.children.len() {
            let info = &self.children[child];
            if merger.less_than(item, &info.min) || merger.less_than(&info.max, item) {
                continue;
            }
            self.load_child(child, storage)?;
            let data = &mut self.children_data.get_mut()[child];
            let Some(items) = data.items.as_mut() else {
                continue;
            };
            let before = items.len();
            items.retain(|other| !is_same(other));
            if items.len() == before {
                continue;
            }
            data.dirty = true;
            let info = &mut self.children[child];
            info.len = items.len();
            match (items.first(), items.last()) {
                (Some(min), Some(max)) => {
                    info.min = min.clone();
                    info.max = max.clone();
                }
                _ => emptied.push(child),
            }
        }
        for child in emptied.into_iter().rev() {
            storage.delete_child(self.children[child].ptr)?;
            self.children.remove(child);
            self.children_data.get_mut().remove(child);
        }

        self.recalc();
        storage.report(old_size, self.mem_used());
        Ok(())
    }

    /// Removes all items and deletes every child segment from storage.
    pub fn clr<M>(&mut self, storage: &mut Storage<'_, M>) -> Result<(), GixError> {
        let old_size = self.mem_used();
        for child in &self.children {
            storage.delete_child(child.ptr)?;
        }
        self.children.clear();
        self.children_data.get_mut().clear();
        self.items.clear();
        self.merged = true;
        self.recalc();

        storage.report(old_size, self.mem_used());
        Ok(())
    }

    /// Global merge of the working buffer with the children it overlaps.
    pub fn def<M>(&mut self, storage: &mut Storage<'_, M>) -> Result<(), GixError>
    where
        M: Merger<K, T>,
    {
        let old_size = self.mem_used();
        self.def_inner(storage)?;
        storage.report(old_size, self.mem_used());
        Ok(())
    }

    fn def_inner<M>(&mut self, storage: &mut Storage<'_, M>) -> Result<(), GixError>
    where
        M: Merger<K, T>,
    {
        if self.merged {
            return Ok(());
        }
        let merger = storage.merger;
        merger.merge(&mut self.items);

        if !self.children.is_empty() && !self.items.is_empty() {
            let buffer_min = &self.items[0];
            let mut first = self.children.len();
            while first > 0 && !merger.less_than(&self.children[first - 1].max, buffer_min) {
                first -= 1;
            }

            let mut rest = Vec::new();
            for child in first..self.children.len() {
                self.load_child(child, storage)?;
                if let Some(items) = self.children_data.get_mut()[child].items.take() {
                    rest.extend(items);
                }
            }
            rest.append(&mut self.items);
            merger.merge(&mut rest);

            // refill children with their previous lengths, the tail goes to the buffer
            let mut child = first;
            while child < self.children.len() && rest.len() > self.children[child].len {
                let tail = rest.split_off(self.children[child].len);
                let info = &mut self.children[child];
                info.min = rest[0].clone();
                info.max = rest[rest.len() - 1].clone();
                info.merged = true;
                let data = &mut self.children_data.get_mut()[child];
                data.items = Some(std::mem::replace(&mut rest, tail));
                data.dirty = true;
                child += 1;
            }
            self.items = rest;

            let dropped = self.children.len() - child;
            for info in self.children.drain(child..) {
                storage.delete_child(info.ptr)?;
            }
            self.children_data.get_mut().truncate(child);
            debug_assert!(self.children.iter().all(|info| info.len > 0));

            log_debug!(
                component = "item_set",
                event = "item_set_global_merge",
                first_child = first,
                children = self.children.len(),
                dropped,
            );
        }
        self.recalc();
        self.merged = true;
        Ok(())
    }

    /// Merges only the working buffer. The item-set becomes merged when the
    /// buffer now sorts after every child.
    pub fn def_local<M>(&mut self, storage: &mut Storage<'_, M>)
    where
        M: Merger<K, T>,
    {
        if self.merged {
            return;
        }
        let old_size = self.mem_used();
        let merger = storage.merger;
        merger.merge(&mut self.items);

        match (self.children.last(), self.items.first()) {
            (Some(last), Some(first)) => {
                if merger.less_than(&last.max, first) {
                    self.merged = true;
                }
            }
            _ => self.merged = true,
        }
        self.recalc();
        storage.report(old_size, self.mem_used());
    }

    fn push_child<M>(&mut self, storage: &mut Storage<'_, M>) -> Result<(), GixError> {
        let ptr = storage.enlist_child(&self.items)?;
        let items = std::mem::take(&mut self.items);
        self.children.push(ChildInfo {
            min: items[0].clone(),
            max: items[items.len() - 1].clone(),
            len: items.len(),
            ptr,
            merged: self.merged,
        });
        self.children_data.get_mut().push(ChildData::unloaded());
        self.buffer_bytes = 0;

        log_debug!(
            component = "item_set",
            event = "item_set_split",
            children = self.children.len(),
            child_len = items.len(),
        );
        Ok(())
    }
}

impl<K, T> ItemSet<K, T>
where
    K: Encode + Decode,
    T: Clone + Encode + Decode,
{
    /// Serializes the item-set after a global merge. Modified child
    /// segments are written to their blobs first.
    pub fn save<M>(&mut self, storage: &mut Storage<'_, M>) -> Result<Vec<u8>, GixError>
    where
        M: Merger<K, T>,
    {
        self.def(storage)?;

        for (info, data) in self
            .children
            .iter_mut()
            .zip(self.children_data.get_mut().iter_mut())
        {
            if let (true, Some(items)) = (data.dirty, &data.items) {
                info.ptr = storage.store_child(info.ptr, items)?;
                data.dirty = false;
            }
        }

        let mut bytes = Vec::with_capacity(
            self.key.size() + self.items.size() + self.children.size(),
        );
        self.key.encode(&mut bytes)?;
        self.items.encode(&mut bytes)?;
        self.children.encode(&mut bytes)?;
        Ok(bytes)
    }

    /// Deserializes an item-set written by [`ItemSet::save`]. Child
    /// contents stay unloaded.
    pub fn load(bytes: &[u8]) -> Result<Self, GixError> {
        let mut reader = Cursor::new(bytes);
        let key = K::decode(&mut reader)?;
        let items = Vec::<T>::decode(&mut reader)?;
        let children = Vec::<ChildInfo<T>>::decode(&mut reader)?;

        let mut item_set = ItemSet {
            key,
            items,
            buffer_bytes: 0,
            children_data: RefCell::new(children.iter().map(|_| ChildData::unloaded()).collect()),
            children,
            merged: true,
            total: 0,
        };
        item_set.recalc();
        Ok(item_set)
    }

    /// Eviction hook: stores the item-set at `ptr` when the storage is
    /// writable and returns its possibly relocated pointer. Read-only storage
    /// skips the write-back.
    pub fn write_back<M>(
        &mut self,
        ptr: BlobPtr,
        storage: &mut Storage<'_, M>,
    ) -> Result<Option<BlobPtr>, GixError>
    where
        M: Merger<K, T>,
    {
        if !storage.is_writable() {
            return Ok(None);
        }
        let bytes = self.save(storage)?;
        Ok(Some(storage.put_blob_at(ptr, &bytes)?))
    }
}

impl<K, T> MemSized for ItemSetHandle<K, T>
where
    T: Clone + Encode + Decode,
{
    fn mem_used(&self) -> usize {
        self.borrow().mem_used()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{blob::MemBlobStore, merger::DefaultMerger};

    type IntMerger = DefaultMerger<String, u32>;
    type IntSet = ItemSet<String, u32>;

    fn storage<'a>(
        blobs: &'a mut MemBlobStore,
        merger: &'a IntMerger,
        split: usize,
    ) -> Storage<'a, IntMerger> {
        Storage::new(blobs, merger, AccessMode::Create).split_trigger(SplitTrigger::Length(split))
    }

    fn assert_invariants(set: &IntSet) {
        let children: usize = set.children.iter().map(|child| child.len).sum();
        assert_eq!(set.total, set.items.len() + children);
        for (info, data) in set.children.iter().zip(set.children_data.borrow().iter()) {
            if let Some(items) = &data.items {
                assert_eq!(items.len(), info.len);
            }
        }
    }

    #[test]
    fn test_overflow_split() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 4);

        let mut set = IntSet::new("term".to_string());
        set.add_item_v([1, 2, 3, 4, 5], &mut storage).unwrap();

        assert_eq!(set.children_len(), 1);
        assert!(set.children()[0].len() >= 4);
        assert_eq!(set.buffer_len(), 5 - set.children()[0].len());
        assert!(set.is_merged());
        assert_eq!(set.get_item_v(&mut storage).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_invariants(&set);
    }

    #[test]
    fn test_out_of_order_append_clears_merged() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 100);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v([1, 5], &mut storage).unwrap();
        assert!(set.is_merged());
        set.add_item(5, &mut storage).unwrap();
        assert!(!set.is_merged(), "duplicate append is not strictly increasing");

        set.def(&mut storage).unwrap();
        assert!(set.is_merged());
        assert_eq!(set.get_item_v(&mut storage).unwrap(), vec![1, 5]);
        assert_eq!(set.item_count(), 2);
    }

    #[test]
    fn test_low_retention_keeps_buffer() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 4);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v([3, 3, 3, 1], &mut storage).unwrap();
        set.add_item(2, &mut storage).unwrap();

        // merging shrank the buffer to half its length, so nothing was split
        assert_eq!(set.children_len(), 0);
        assert_eq!(set.items, vec![1, 3, 2]);
        assert!(!set.is_merged());
        assert_eq!(blobs_len(&mut storage), 0);
    }

    fn blobs_len(storage: &mut Storage<'_, IntMerger>) -> usize {
        storage.blobs.live_count()
    }

    #[test]
    fn test_def_merges_into_overlapping_children() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 3);

        let mut set = IntSet::new("t".to_string());
        // two children [10,20,30] [40,50,60], buffer [70]
        set.add_item_v([10, 20, 30, 40, 50, 60, 70], &mut storage).unwrap();
        assert_eq!(set.children_len(), 2);

        set.add_item(15, &mut storage).unwrap();
        set.add_item(45, &mut storage).unwrap();
        assert!(!set.is_merged());
        set.def(&mut storage).unwrap();

        assert!(set.is_merged());
        assert_eq!(
            set.get_item_v(&mut storage).unwrap(),
            vec![10, 15, 20, 30, 40, 45, 50, 60, 70]
        );
        // segment granularity is kept, the tail lands in the buffer
        assert_eq!(set.children[0].len, 3);
        assert_eq!(set.children[1].len, 3);
        assert_eq!(set.items, vec![50, 60, 70]);
        assert_eq!(set.children[1].min, 30);
        assert_eq!(set.children[1].max, 45);
        assert_invariants(&set);
    }

    #[test]
    fn test_def_drops_absorbed_children() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 3);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v([1, 2, 3, 4, 5, 6], &mut storage).unwrap();
        // the full buffer [4, 5, 6] is pushed before 1 lands in it
        set.add_item_v([1, 2], &mut storage).unwrap();
        assert_eq!(set.children_len(), 2);
        assert_eq!(blobs_len(&mut storage), 2);

        // only duplicates were added, the last child no longer fits and
        // its items move to the buffer
        set.def(&mut storage).unwrap();
        assert_eq!(set.get_item_v(&mut storage).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(set.children_len(), 1);
        assert_eq!(set.items, vec![4, 5, 6]);
        assert_eq!(blobs_len(&mut storage), 1);

        set.clr(&mut storage).unwrap();
        assert_eq!(set.item_count(), 0);
        assert_eq!(blobs_len(&mut storage), 0);
    }

    #[test]
    fn test_get_item_spans_children_then_buffer() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 2);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v([1, 2, 3, 4, 5], &mut storage).unwrap();

        let all: Vec<u32> = (0..set.item_count())
            .map(|index| set.get_item(index, &mut storage).unwrap())
            .collect();
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
        assert!(matches!(
            set.get_item(5, &mut storage),
            Err(GixError::IndexBounds { index: 5, total: 5 })
        ));
    }

    #[test]
    fn test_get_item_loads_single_child() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 2);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v([1, 2, 3, 4, 5], &mut storage).unwrap();
        assert_eq!(set.get_item(2, &mut storage).unwrap(), 3);

        assert!(!set.is_loaded(0));
        assert!(set.is_loaded(1));
    }

    #[test]
    fn test_del_item() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 2);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v([1, 2, 3, 4, 5, 3], &mut storage).unwrap();
        set.del_item(&3, &mut storage).unwrap();
        assert_eq!(set.get_item_v(&mut storage).unwrap(), vec![1, 2, 4, 5]);
        assert_invariants(&set);

        set.del_item(&1, &mut storage).unwrap();
        set.del_item(&2, &mut storage).unwrap();
        assert_eq!(set.get_item_v(&mut storage).unwrap(), vec![4, 5]);
        assert_eq!(set.item_count(), 2);
        assert!(set.children.iter().all(|child| child.len > 0));

        // absent items are a no-op
        set.del_item(&42, &mut storage).unwrap();
        assert_eq!(set.item_count(), 2);
        assert_invariants(&set);
    }

    #[test]
    fn test_del_item_in_child_survives_save() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 3);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v(1..=9, &mut storage).unwrap();
        assert!(set.children_len() > 0);
        set.del_item(&2, &mut storage).unwrap();

        let bytes = set.save(&mut storage).unwrap();
        let loaded = IntSet::load(&bytes).unwrap();
        assert_eq!(
            loaded.get_item_v(&mut storage).unwrap(),
            vec![1, 3, 4, 5, 6, 7, 8, 9]
        );
        assert_invariants(&loaded);
    }

    #[test]
    fn test_def_local() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 3);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v([1, 2, 3, 9, 8], &mut storage).unwrap();
        assert!(!set.is_merged());
        set.def_local(&mut storage);
        assert!(set.is_merged());
        assert_eq!(set.items, vec![8, 9]);

        set.add_item(2, &mut storage).unwrap();
        set.def_local(&mut storage);
        assert!(!set.is_merged(), "buffer overlaps the last child");
        set.def(&mut storage).unwrap();
        assert_eq!(set.get_item_v(&mut storage).unwrap(), vec![1, 2, 3, 8, 9]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 3);

        let mut set = IntSet::new("t".to_string());
        set.add_item_v([5, 1, 9, 3, 7, 2, 8], &mut storage).unwrap();
        let bytes = set.save(&mut storage).unwrap();
        let expected = set.get_item_v(&mut storage).unwrap();

        let loaded = IntSet::load(&bytes).unwrap();
        assert_eq!(loaded.key(), "t");
        assert!(loaded.is_merged());
        assert_eq!(loaded.item_count(), set.item_count());
        assert_eq!(loaded.children(), set.children());
        assert_eq!(loaded.get_item_v(&mut storage).unwrap(), expected);
        assert_eq!(expected, vec![1, 2, 3, 5, 7, 8, 9]);
    }

    #[test]
    fn test_write_back_skipped_when_read_only() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let ptr = blobs.put(b"old").unwrap();

        let mut set = IntSet::new("t".to_string());
        let mut read_only = Storage::new(&mut blobs, &merger, AccessMode::ReadOnly);
        assert!(set.write_back(ptr, &mut read_only).unwrap().is_none());
        assert!(matches!(
            set.add_item_v([1, 2], &mut read_only.split_trigger(SplitTrigger::Length(1))),
            Err(GixError::WriteProtection { .. })
        ));
        assert_eq!(blobs.get(ptr).unwrap(), b"old");
    }

    #[test]
    fn test_mem_delta_reported() {
        let mut blobs = MemBlobStore::new();
        let merger = IntMerger::new();
        let mut storage = storage(&mut blobs, &merger, 1000);

        let mut set = IntSet::new("t".to_string());
        let base = set.mem_used() as i64;
        set.add_item_v([1, 2, 3], &mut storage).unwrap();

        assert_eq!(storage.mem_delta(), 12);
        assert_eq!(set.mem_used() as i64, base + 12);
        set.clr(&mut storage).unwrap();
        assert_eq!(storage.mem_delta(), 0);
    }

    #[test]
    fn test_random_adds_match_btreeset() {
        let merger = IntMerger::new();
        let mut rng = fastrand::Rng::with_seed(42);

        for round in 0..40 {
            let mut blobs = MemBlobStore::new();
            let split = rng.usize(2..9);
            let mut storage = storage(&mut blobs, &merger, split);
            let mut set = IntSet::new(format!("k{round}"));
            let mut expected = BTreeSet::new();

            for _ in 0..rng.usize(0..300) {
                let item = if rng.bool() {
                    expected.last().map_or(0, |last| last + rng.u32(1..4))
                } else {
                    rng.u32(0..500)
                };
                expected.insert(item);
                set.add_item(item, &mut storage).unwrap();
                if rng.u8(..) < 8 {
                    set.def(&mut storage).unwrap();
                    assert!(set.is_merged());
                }
                if rng.u8(..) < 4 {
                    let victim = rng.u32(0..500);
                    expected.remove(&victim);
                    set.del_item(&victim, &mut storage).unwrap();
                }
                assert_invariants(&set);
            }

            set.def(&mut storage).unwrap();
            assert_invariants(&set);
            assert_eq!(set.item_count(), expected.len());
            assert_eq!(
                set.get_item_v(&mut storage).unwrap(),
                expected.iter().copied().collect::<Vec<_>>()
            );
            for pair in set.children.windows(2) {
                assert!(pair[0].max < pair[1].min);
            }
        }
    }
}
