//! Bounded, approximately-LRU cache of decoded [`Page`]s keyed by
//! identifier.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::page::Page;

struct CacheEntry {
    page: Page,
    last_access_ts: u64,
    access_count: u64,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// A capacity-bounded `PageIdentifier -> Page` table that evicts the
/// least-recently-touched entry (by one-second-resolution timestamp, ties
/// broken by smallest identifier) when a new identifier arrives at
/// capacity.
///
/// Carries no pin count and no dirty bit: eviction never writes back, by
/// design (see crate-level docs). A caller that needs durability must call
/// [`crate::Pager::write`] before a page it cares about might be evicted.
pub struct PageCache {
    entries: HashMap<u32, CacheEntry>,
    max_size: usize,
}

impl PageCache {
    /// Creates an empty cache bounded to `max_size` resident pages.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// Read-only peek that does not disturb recency ordering, used by
    /// tests and diagnostics.
    pub fn peek(&self, id: u32) -> Option<&Page> {
        self.entries.get(&id).map(|entry| &entry.page)
    }

    /// Mutable peek that does not disturb recency ordering, used by the
    /// pager to serialize a resident page without counting a flush as a
    /// cache hit.
    pub fn peek_mut(&mut self, id: u32) -> Option<&mut Page> {
        self.entries.get_mut(&id).map(|entry| &mut entry.page)
    }

    pub fn access_count(&self, id: u32) -> Option<u64> {
        self.entries.get(&id).map(|entry| entry.access_count)
    }

    /// Looks up `id`, refreshing its recency on a hit.
    pub fn get(&mut self, id: u32) -> Option<&mut Page> {
        self.get_at(id, now())
    }

    /// Same as [`Self::get`] with an explicit timestamp, for deterministic
    /// testing of eviction ordering.
    pub fn get_at(&mut self, id: u32, ts: u64) -> Option<&mut Page> {
        let entry = self.entries.get_mut(&id)?;
        entry.last_access_ts = ts;
        entry.access_count += 1;
        Some(&mut entry.page)
    }

    /// Inserts `page`, evicting the least-recently-touched entry first if
    /// the cache is at capacity. Re-inserting an identifier already
    /// resident replaces it in place without triggering eviction.
    pub fn put(&mut self, page: Page) {
        self.put_at(page, now());
    }

    /// Same as [`Self::put`] with an explicit timestamp.
    pub fn put_at(&mut self, page: Page, ts: u64) {
        let id = page.page_id();
        if !self.entries.contains_key(&id) && self.entries.len() >= self.max_size {
            self.evict_one();
        }
        self.entries.insert(
            id,
            CacheEntry {
                page,
                last_access_ts: ts,
                access_count: 0,
            },
        );
    }

    /// Removes and returns the entry for `id`, if present, without
    /// consulting the eviction policy.
    pub fn remove(&mut self, id: u32) -> Option<Page> {
        self.entries.remove(&id).map(|entry| entry.page)
    }

    /// Drops every held page.
    pub fn teardown(&mut self) {
        self.entries.clear();
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .map(|(&id, entry)| (entry.last_access_ts, id))
            .min()
            .map(|(_, id)| id);
        if let Some(id) = victim {
            log::debug!("page cache evicting page {id}");
            self.entries.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageKind;

    fn page(id: u32) -> Page {
        Page::new(PageKind::Data, id)
    }

    #[test]
    fn hit_refreshes_recency_and_bumps_access_count() {
        let mut cache = PageCache::new(2);
        cache.put_at(page(1), 10);
        assert_eq!(cache.access_count(1), Some(0));
        cache.get_at(1, 20);
        assert_eq!(cache.access_count(1), Some(1));
    }

    #[test]
    fn miss_returns_none() {
        let mut cache = PageCache::new(2);
        assert!(cache.get(99).is_none());
    }

    #[test]
    fn eviction_order_matches_scenario() {
        let mut cache = PageCache::new(2);
        cache.put_at(page(10), 100);
        cache.put_at(page(20), 101);
        cache.put_at(page(30), 102);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(10));
        assert!(cache.contains(20));
        assert!(cache.contains(30));
    }

    #[test]
    fn ties_broken_by_smallest_identifier() {
        let mut cache = PageCache::new(2);
        cache.put_at(page(5), 100);
        cache.put_at(page(3), 100);
        // both at ts=100; inserting a third should evict id 3 (smaller of the tie).
        cache.put_at(page(7), 101);
        assert!(!cache.contains(3));
        assert!(cache.contains(5));
        assert!(cache.contains(7));
    }

    #[test]
    fn reinserting_existing_identifier_replaces_without_evicting() {
        let mut cache = PageCache::new(1);
        cache.put_at(page(1), 100);
        cache.put_at(page(1), 200);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(1));
    }

    #[test]
    fn teardown_drops_everything() {
        let mut cache = PageCache::new(2);
        cache.put_at(page(1), 1);
        cache.put_at(page(2), 2);
        cache.teardown();
        assert!(cache.is_empty());
    }
}
