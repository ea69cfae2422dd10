//! Poem pool: every item fetched this session plus the set handed out to slots.
//!
//! All "used ids" bookkeeping lives here. Callers never derive it from slot
//! contents; they go through `add_batch`, `take` and `release`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;
use verse_proto::{Item, ItemId};

/// What `add_batch` did with each incoming item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddReport {
    pub added: usize,
    /// Dropped because the id was already pooled.
    pub duplicate_ids: usize,
    /// Dropped because the same title/author was already pooled.
    pub duplicate_content: usize,
}

#[derive(Debug, Default)]
pub struct PoemPool {
    /// Append-only.
    items: Vec<Arc<Item>>,
    index: HashMap<ItemId, usize>,
    fingerprints: HashSet<String>,
    consumed: HashSet<ItemId>,
    /// Indices of unconsumed items, oldest first. Each unconsumed item
    /// appears exactly once.
    available: VecDeque<usize>,
}

impl PoemPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_batch(&mut self, batch: impl IntoIterator<Item = Item>) -> AddReport {
        let mut report = AddReport::default();
        for item in batch {
            if self.index.contains_key(&item.id) {
                debug!("[pool] dropping {}: id already pooled", item.id);
                report.duplicate_ids += 1;
                continue;
            }
            let fingerprint = item.fingerprint();
            if !self.fingerprints.insert(fingerprint) {
                debug!("[pool] dropping {}: \"{}\" already pooled", item.id, item.title);
                report.duplicate_content += 1;
                continue;
            }
            let idx = self.items.len();
            self.index.insert(item.id, idx);
            self.items.push(Arc::new(item));
            self.available.push_back(idx);
            report.added += 1;
        }
        report
    }

    /// Hand out the oldest unconsumed item and mark it consumed.
    pub fn take(&mut self) -> Option<Arc<Item>> {
        while let Some(idx) = self.available.pop_front() {
            let item = &self.items[idx];
            if self.consumed.insert(item.id) {
                return Some(Arc::clone(item));
            }
        }
        None
    }

    /// Return a consumed item to circulation. Returns false if `id` was not
    /// consumed (or is not in the pool).
    pub fn release(&mut self, id: &ItemId) -> bool {
        if !self.consumed.remove(id) {
            return false;
        }
        if let Some(&idx) = self.index.get(id) {
            self.available.push_back(idx);
        }
        true
    }

    pub fn unconsumed_count(&self) -> usize {
        self.items.len().saturating_sub(self.consumed.len())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    pub fn is_consumed(&self, id: &ItemId) -> bool {
        self.consumed.contains(id)
    }

    pub fn consumed_count(&self) -> usize {
        self.consumed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poem(id: ItemId, title: &str) -> Item {
        Item::new(id, title, "Anon", "line")
    }

    fn local_batch(range: std::ops::Range<u64>) -> Vec<Item> {
        range
            .map(|i| poem(ItemId::Local(i), &format!("Poem {}", i)))
            .collect()
    }

    #[test]
    fn test_add_batch_drops_duplicate_ids_and_content() {
        let mut pool = PoemPool::new();
        assert_eq!(pool.add_batch(local_batch(0..3)).added, 3);

        let report = pool.add_batch(vec![
            poem(ItemId::Local(1), "Something else"),
            poem(ItemId::Remote(1), "poem 2"),
            poem(ItemId::Remote(2), "Fresh"),
        ]);
        assert_eq!(
            report,
            AddReport {
                added: 1,
                duplicate_ids: 1,
                duplicate_content: 1
            }
        );
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn test_same_title_and_author_with_different_opening_both_kept() {
        let mut pool = PoemPool::new();
        let sonnet = |id, body: &str| Item::new(id, "Sonnet", "Elizabeth Barrett Browning", body);
        let report = pool.add_batch(vec![
            sonnet(ItemId::Remote(1), "How do I love thee? Let me count the ways."),
            sonnet(ItemId::Remote(2), "I thought once how Theocritus had sung"),
            sonnet(ItemId::Local(9), "how do I love thee?  Let me count the ways.\nagain"),
        ]);
        assert_eq!(report.added, 2);
        assert_eq!(report.duplicate_content, 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_take_never_repeats_until_release() {
        let mut pool = PoemPool::new();
        pool.add_batch(local_batch(0..3));

        let mut seen = HashSet::new();
        while let Some(item) = pool.take() {
            assert!(seen.insert(item.id), "{} handed out twice", item.id);
        }
        assert_eq!(seen.len(), 3);
        assert!(pool.take().is_none());
        assert_eq!(pool.unconsumed_count(), 0);

        assert!(pool.release(&ItemId::Local(1)));
        assert_eq!(pool.unconsumed_count(), 1);
        assert_eq!(pool.take().map(|i| i.id), Some(ItemId::Local(1)));
    }

    #[test]
    fn test_release_is_noop_for_unconsumed_or_unknown() {
        let mut pool = PoemPool::new();
        pool.add_batch(local_batch(0..2));
        assert!(!pool.release(&ItemId::Local(0)));
        assert!(!pool.release(&ItemId::Remote(99)));

        // A double release must not queue the item twice.
        let first = pool.take().unwrap();
        assert!(pool.release(&first.id));
        assert!(!pool.release(&first.id));
        let a = pool.take().unwrap();
        let b = pool.take().unwrap();
        assert_ne!(a.id, b.id);
        assert!(pool.take().is_none());
    }

    #[test]
    fn test_unconsumed_count_tracks_pool_minus_consumed() {
        let mut pool = PoemPool::new();
        pool.add_batch(local_batch(0..5));
        for expected in (0..5).rev() {
            pool.take();
            assert_eq!(pool.unconsumed_count(), expected);
            assert_eq!(
                pool.unconsumed_count(),
                pool.len() - pool.consumed_count()
            );
        }
        assert_eq!(pool.unconsumed_count(), 0);
    }
}
