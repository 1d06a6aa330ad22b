//! Memory weighted LRU of resident item-sets.
//!
//! Values are shared handles whose size changes after insertion, so the
//! resident size is recomputed on every [`ItemSetCache::refresh_mem_used`]
//! rather than tracked per put.

use std::hash::Hash;

use lru::LruCache;

use crate::observability::log_debug;

/// Heap footprint of a cached value.
pub trait MemSized {
    fn mem_used(&self) -> usize;
}

pub struct ItemSetCache<K, V>
where
    K: Hash + Eq,
{
    entries: LruCache<K, V>,
    capacity: usize,
}

impl<K, V> ItemSetCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + MemSized,
{
    /// Cache evicting down to `capacity` resident bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity,
        }
    }

    /// Returns a handle and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Inserts or promotes `key` to most recently used.
    pub fn put(&mut self, key: K, value: V) {
        self.entries.put(key, value);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Drops `key` without invoking any write-back.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key)
    }

    /// Moves the entry under `old` to `new`, keeping it most recently used.
    pub fn rekey(&mut self, old: &K, new: K) {
        if let Some(value) = self.entries.pop(old) {
            self.entries.put(new, value);
        }
    }

    /// Resident entries from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently held by resident values.
    pub fn mem_used(&self) -> usize {
        self.entries.iter().map(|(_, value)| value.mem_used()).sum()
    }

    pub fn max_mem_used(&self) -> usize {
        self.capacity
    }

    /// Evicts least recently used entries until the resident size fits the
    /// capacity. `on_evict` runs before each removal; if it fails the entry
    /// stays resident and the error is returned. Returns whether anything was
    /// evicted.
    pub fn refresh_mem_used<F, E>(&mut self, mut on_evict: F) -> Result<bool, E>
    where
        F: FnMut(&K, &V) -> Result<K, E>,
    {
        let mut used = self.mem_used();
        let mut evicted = 0usize;

        while used > self.capacity {
            let Some((key, value)) = self.entries.peek_lru() else {
                break;
            };
            let size = value.mem_used();
            on_evict(key, value)?;
            self.entries.pop_lru();
            used = used.saturating_sub(size);
            evicted += 1;
        }
        if evicted > 0 {
            log_debug!(
                component = "cache",
                event = "cache_evicted",
                evicted,
                resident = self.entries.len(),
                mem_used = used,
            );
        }
        Ok(evicted > 0)
    }

    /// Writes every entry back through `write_back`, keeping it resident.
    /// A returned key different from the current one re-keys the entry.
    pub fn flush<F, E>(&mut self, mut write_back: F) -> Result<(), E>
    where
        F: FnMut(&K, &V) -> Result<K, E>,
    {
        let keys: Vec<K> = self.entries.iter().rev().map(|(key, _)| key.clone()).collect();
        for key in keys {
            let Some(value) = self.entries.peek(&key).cloned() else {
                continue;
            };
            let new_key = write_back(&key, &value)?;
            if new_key != key {
                self.rekey(&key, new_key);
            }
        }
        Ok(())
    }

    /// Writes every entry back through `write_back` and empties the cache.
    pub fn flush_and_clear<F, E>(&mut self, mut write_back: F) -> Result<(), E>
    where
        F: FnMut(&K, &V) -> Result<K, E>,
    {
        while let Some((key, value)) = self.entries.peek_lru() {
            write_back(key, value)?;
            self.entries.pop_lru();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    #[derive(Clone)]
    struct Weighted(Rc<Cell<usize>>);

    impl MemSized for Weighted {
        fn mem_used(&self) -> usize {
            self.0.get()
        }
    }

    fn sized(bytes: usize) -> Weighted {
        Weighted(Rc::new(Cell::new(bytes)))
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = ItemSetCache::new(100);
        cache.put(1u64, sized(40));
        cache.put(2u64, sized(40));
        cache.put(3u64, sized(40));
        // 1 becomes most recently used
        assert!(cache.get(&1).is_some());

        let mut evicted = Vec::new();
        let full = cache
            .refresh_mem_used(|key, _| {
                evicted.push(*key);
                Ok::<_, ()>(*key)
            })
            .unwrap();

        assert!(full);
        assert_eq!(evicted, vec![2]);
        assert!(cache.contains(&1));
        assert!(cache.contains(&3));
        assert_eq!(cache.mem_used(), 80);
    }

    #[test]
    fn test_growth_after_put_is_accounted() {
        let mut cache = ItemSetCache::new(100);
        let value = sized(10);
        cache.put(1u64, value.clone());
        cache.put(2u64, sized(10));
        assert!(!cache.refresh_mem_used(|k, _| Ok::<_, ()>(*k)).unwrap());

        value.0.set(150);
        assert_eq!(cache.mem_used(), 160);
        assert!(cache.refresh_mem_used(|k, _| Ok::<_, ()>(*k)).unwrap());
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
    }

    #[test]
    fn test_failed_eviction_keeps_entry() {
        let mut cache = ItemSetCache::new(0);
        cache.put(1u64, sized(10));

        let result = cache.refresh_mem_used(|_, _| Err::<u64, _>("disk full"));
        assert_eq!(result, Err("disk full"));
        assert!(cache.contains(&1));
    }

    #[test]
    fn test_flush_rekeys_and_clear_empties() {
        let mut cache = ItemSetCache::new(1000);
        cache.put(1u64, sized(1));
        cache.put(2u64, sized(1));

        cache
            .flush(|key, _| Ok::<_, ()>(if *key == 1 { 10 } else { *key }))
            .unwrap();
        assert!(cache.contains(&10));
        assert!(!cache.contains(&1));
        assert_eq!(cache.len(), 2);

        let mut written = Vec::new();
        cache
            .flush_and_clear(|key, _| {
                written.push(*key);
                Ok::<_, ()>(*key)
            })
            .unwrap();
        written.sort();
        assert_eq!(written, vec![2, 10]);
        assert!(cache.is_empty());
    }
}
