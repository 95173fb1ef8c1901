//! Fixed-capacity location cache: file name → owning Node slot (spec §3,
//! §4.3). Backed by `moka`'s synchronous cache, with a capacity cap
//! standing in for a strict LRU — a cache miss just re-walks the trie, so
//! approximate eviction is not load-bearing.

use moka::sync::Cache;

/// Default capacity from spec §3 ("Capacity ≈ 16").
pub const DEFAULT_CAPACITY: u64 = 16;

pub struct LocationCache {
    cache: Cache<String, usize>,
}

impl LocationCache {
    pub fn new(capacity: u64) -> Self {
        Self { cache: Cache::builder().max_capacity(capacity).build() }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.cache.get(name)
    }

    pub fn insert(&self, name: &str, node_index: usize) {
        self.cache.insert(name.to_string(), node_index);
    }

    pub fn invalidate(&self, name: &str) {
        self.cache.invalidate(name);
    }

    /// Drops every entry pointing at `node_index` (Node purge, spec §4.7).
    pub fn invalidate_node(&self, node_index: usize) {
        self.cache.invalidate_entries_if(move |_, &v| v == node_index).ok();
        self.cache.run_pending_tasks();
    }
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trips() {
        let cache = LocationCache::new(4);
        cache.insert("a.txt", 3);
        assert_eq!(cache.get("a.txt"), Some(3));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = LocationCache::new(4);
        cache.insert("a.txt", 3);
        cache.invalidate("a.txt");
        assert_eq!(cache.get("a.txt"), None);
    }

    #[test]
    fn invalidate_node_clears_all_its_entries() {
        let cache = LocationCache::new(4);
        cache.insert("a.txt", 1);
        cache.insert("b.txt", 2);
        cache.insert("c.txt", 1);
        cache.invalidate_node(1);
        assert_eq!(cache.get("a.txt"), None);
        assert_eq!(cache.get("b.txt"), Some(2));
        assert_eq!(cache.get("c.txt"), None);
    }
}
