//! K-way merge over sorted per-source streams. The corpus reader feeds it one
//! iterator per activity file; ties break on source order so the merged stream
//! is stable for equal timestamps.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct HeapEntry<T, K: Ord> {
    key: K,
    src: usize,
    item: T,
}

impl<T, K: Ord> PartialEq for HeapEntry<T, K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.src == other.src
    }
}

impl<T, K: Ord> Eq for HeapEntry<T, K> {}

impl<T, K: Ord> PartialOrd for HeapEntry<T, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, K: Ord> Ord for HeapEntry<T, K> {
    // Reversed so the BinaryHeap pops the smallest key first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.src.cmp(&self.src))
    }
}

pub struct KwayMerge<I, K, F>
where
    I: Iterator,
    K: Ord,
    F: Fn(&I::Item) -> K,
{
    sources: Vec<I>,
    key: F,
    heap: BinaryHeap<HeapEntry<I::Item, K>>,
}

impl<I, K, F> KwayMerge<I, K, F>
where
    I: Iterator,
    K: Ord,
    F: Fn(&I::Item) -> K,
{
    pub fn new(sources: Vec<I>, key: F) -> KwayMerge<I, K, F> {
        let mut merge = KwayMerge {
            sources,
            key,
            heap: BinaryHeap::new(),
        };
        for src in 0..merge.sources.len() {
            merge.refill(src);
        }
        merge
    }

    fn refill(&mut self, src: usize) {
        if let Some(item) = self.sources[src].next() {
            let key = (self.key)(&item);
            self.heap.push(HeapEntry { key, src, item });
        }
    }
}

impl<I, K, F> Iterator for KwayMerge<I, K, F>
where
    I: Iterator,
    K: Ord,
    F: Fn(&I::Item) -> K,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        let entry = self.heap.pop()?;
        self.refill(entry.src);
        Some(entry.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_sorted_streams() {
        let a = vec![1, 4, 7];
        let b = vec![2, 3, 9];
        let c = vec![5, 6, 8];
        let merged: Vec<i32> = KwayMerge::new(
            vec![a.into_iter(), b.into_iter(), c.into_iter()],
            |x: &i32| *x,
        )
        .collect();
        assert_eq!(merged, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn equal_keys_keep_source_order() {
        let a = vec![(1, "a0"), (2, "a1")];
        let b = vec![(1, "b0"), (2, "b1")];
        let merged: Vec<(i32, &str)> = KwayMerge::new(
            vec![a.into_iter(), b.into_iter()],
            |x: &(i32, &str)| x.0,
        )
        .collect();
        assert_eq!(
            merged,
            vec![(1, "a0"), (1, "b0"), (2, "a1"), (2, "b1")]
        );
    }

    #[test]
    fn empty_sources_are_fine() {
        let a: Vec<i32> = vec![];
        let b = vec![3];
        let merged: Vec<i32> =
            KwayMerge::new(vec![a.into_iter(), b.into_iter()], |x: &i32| *x).collect();
        assert_eq!(merged, vec![3]);
    }
}
