//! Set algebra over postings.
//!
//! A [`Merger`] fixes the total order of items and how a sequence of items
//! collapses into a sorted, duplicate free posting list. Every algebra
//! operation assumes its inputs are already merged.

use std::{cmp::Ordering, marker::PhantomData};

/// Pluggable ordering and set algebra over the items of one index.
///
/// Only [`Merger::less_than`] is required; the remaining operations are
/// derived from it and can be overridden, e.g. to collapse duplicates by
/// summing a payload instead of dropping them.
pub trait Merger<K, T: Clone> {
    /// Total order used for merging and for split decisions.
    fn less_than(&self, a: &T, b: &T) -> bool;

    /// Sorts and deduplicates `items` in place.
    fn merge(&self, items: &mut Vec<T>) {
        items.sort_by(|a, b| self.compare(a, b));
        items.dedup_by(|b, a| self.compare(a, b) == Ordering::Equal);
    }

    /// `main = main ∪ join`
    fn union(&self, main: &mut Vec<T>, join: &[T]) {
        if join.is_empty() {
            return;
        }
        let mut out = Vec::with_capacity(main.len() + join.len());
        let mut left = main.drain(..).peekable();
        let mut right = join.iter().peekable();
        loop {
            match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => match self.compare(l, r) {
                    Ordering::Less => out.extend(left.next()),
                    Ordering::Greater => out.extend(right.next().cloned()),
                    Ordering::Equal => {
                        out.extend(left.next());
                        right.next();
                    }
                },
                (Some(_), None) => out.extend(left.by_ref()),
                (None, Some(_)) => out.extend(right.by_ref().cloned()),
                (None, None) => break,
            }
        }
        drop(left);
        *main = out;
    }

    /// `main = main ∩ join`
    fn intersect(&self, main: &mut Vec<T>, join: &[T]) {
        let mut join_pos = 0;
        main.retain(|item| {
            while join_pos < join.len() && self.less_than(&join[join_pos], item) {
                join_pos += 1;
            }
            join_pos < join.len() && self.compare(&join[join_pos], item) == Ordering::Equal
        });
    }

    /// Items of `main` that are not in `join`.
    fn difference(&self, main: &[T], join: &[T]) -> Vec<T> {
        let mut out = Vec::with_capacity(main.len());
        let mut join_pos = 0;
        for item in main {
            while join_pos < join.len() && self.less_than(&join[join_pos], item) {
                join_pos += 1;
            }
            if join_pos >= join.len() || self.compare(&join[join_pos], item) != Ordering::Equal {
                out.push(item.clone());
            }
        }
        out
    }

    /// Hook invoked on the full postings of `key` before they are returned
    /// by a query.
    fn normalize(&self, _key: &K, _items: &mut Vec<T>) {}

    fn compare(&self, a: &T, b: &T) -> Ordering {
        if self.less_than(a, b) {
            Ordering::Less
        } else if self.less_than(b, a) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

/// Merger over the natural order of the item type.
pub struct DefaultMerger<K, T> {
    _p: PhantomData<fn(&K, &T)>,
}

impl<K, T> DefaultMerger<K, T> {
    pub fn new() -> Self {
        Self { _p: PhantomData }
    }
}

impl<K, T> Default for DefaultMerger<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Clone for DefaultMerger<K, T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K, T> std::fmt::Debug for DefaultMerger<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DefaultMerger")
    }
}

impl<K, T> Merger<K, T> for DefaultMerger<K, T>
where
    T: Ord + Clone,
{
    fn less_than(&self, a: &T, b: &T) -> bool {
        a < b
    }

    fn merge(&self, items: &mut Vec<T>) {
        items.sort_unstable();
        items.dedup();
    }

    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type IntMerger = DefaultMerger<u32, u32>;

    /// Postings of `(doc, freq)` ordered by doc only; duplicates sum their
    /// frequencies.
    struct FreqMerger;

    impl Merger<String, (u64, u32)> for FreqMerger {
        fn less_than(&self, a: &(u64, u32), b: &(u64, u32)) -> bool {
            a.0 < b.0
        }

        fn merge(&self, items: &mut Vec<(u64, u32)>) {
            items.sort_by_key(|item| item.0);
            let mut out: Vec<(u64, u32)> = Vec::with_capacity(items.len());
            for (doc, freq) in items.drain(..) {
                match out.last_mut() {
                    Some(last) if last.0 == doc => last.1 += freq,
                    _ => out.push((doc, freq)),
                }
            }
            *items = out;
        }
    }

    #[test]
    fn test_merge_sorts_and_dedups() {
        let merger = IntMerger::new();
        let mut items = vec![5, 1, 3, 1, 5, 2];
        merger.merge(&mut items);

        assert_eq!(items, vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_merge_idempotent() {
        let merger = IntMerger::new();
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..50 {
            let mut items: Vec<u32> = (0..rng.usize(0..200)).map(|_| rng.u32(0..100)).collect();
            merger.merge(&mut items);
            let once = items.clone();
            merger.merge(&mut items);

            assert_eq!(items, once);
        }
    }

    #[test]
    fn test_set_algebra() {
        let merger = IntMerger::new();

        let mut main = vec![1, 2, 3];
        merger.union(&mut main, &[2, 3, 4]);
        assert_eq!(main, vec![1, 2, 3, 4]);

        let mut main = vec![1, 2, 3];
        merger.intersect(&mut main, &[2, 3, 4]);
        assert_eq!(main, vec![2, 3]);

        assert_eq!(merger.difference(&[1, 2, 3], &[2, 3, 4]), vec![1]);
        assert_eq!(merger.difference(&[1, 2, 3], &[]), vec![1, 2, 3]);

        let mut main = Vec::new();
        merger.intersect(&mut main, &[1]);
        assert!(main.is_empty());
    }

    #[test]
    fn test_provided_algebra_against_btreeset() {
        use std::collections::BTreeSet;

        let merger = FreqMerger;
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..30 {
            let mut a: Vec<(u64, u32)> = (0..rng.usize(0..50)).map(|_| (rng.u64(0..40), 1)).collect();
            let mut b: Vec<(u64, u32)> = (0..rng.usize(0..50)).map(|_| (rng.u64(0..40), 1)).collect();
            merger.merge(&mut a);
            merger.merge(&mut b);
            let set_a: BTreeSet<u64> = a.iter().map(|item| item.0).collect();
            let set_b: BTreeSet<u64> = b.iter().map(|item| item.0).collect();

            let mut union = a.clone();
            merger.union(&mut union, &b);
            let docs: Vec<u64> = union.iter().map(|item| item.0).collect();
            assert_eq!(docs, set_a.union(&set_b).copied().collect::<Vec<_>>());

            let mut inter = a.clone();
            merger.intersect(&mut inter, &b);
            let docs: Vec<u64> = inter.iter().map(|item| item.0).collect();
            assert_eq!(docs, set_a.intersection(&set_b).copied().collect::<Vec<_>>());

            let docs: Vec<u64> = merger.difference(&a, &b).iter().map(|item| item.0).collect();
            assert_eq!(docs, set_a.difference(&set_b).copied().collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_custom_merge_collapses() {
        let mut items = vec![(3, 1), (1, 2), (3, 4)];
        FreqMerger.merge(&mut items);

        assert_eq!(items, vec![(1, 2), (3, 5)]);
    }
}
