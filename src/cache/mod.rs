//! Structural caches: render passes, pipeline layouts, descriptor-set
//! layouts, and per-frame descriptor sets (spec §4.3).
//!
//! Each cache is a content-addressed map from an owned structural key to the
//! handle of the canonical GPU object that key produced. Keys own every
//! sub-array they hash or compare over (spec §9: "a key must own its backing
//! storage so subsequent lookups with transient inputs remain valid"), unlike
//! the teacher's `gl::cache::ResourceCache`
//! (`examples/ennis-autograph-ng/src/renderer/backend/gl/cache.rs`), which
//! linear-scans a small `Vec` of live resources for a structural match. That
//! scan is fine for the handful of live OpenGL program/FBO combinations the
//! teacher juggles; content-addressed Vulkan caches need a real hash table,
//! so we key on `fxhash::FxHashMap` instead (the teacher already depends on
//! `fxhash` at the workspace level, just not for this purpose).

pub(crate) mod descriptor_set;
pub(crate) mod descriptor_set_layout;
pub(crate) mod pipeline_layout;
pub(crate) mod renderpass;

use fxhash::FxHashMap;

/// A generic `Add`/`Find`/`EraseByValue`/`Size`/`Clear` cache map, per
/// spec §4.3. `K` is an owned structural key (`Eq + Hash`); `V` is the
/// handle or value the key resolves to.
pub(crate) struct CacheMap<K, V> {
    entries: FxHashMap<K, V>,
}

impl<K, V> CacheMap<K, V>
where
    K: Eq + std::hash::Hash,
    V: Copy + Eq,
{
    pub(crate) fn new() -> CacheMap<K, V> {
        CacheMap {
            entries: FxHashMap::default(),
        }
    }

    /// Looks up `key`, returning the cached value on a hit.
    pub(crate) fn find(&self, key: &K) -> Option<V> {
        self.entries.get(key).copied()
    }

    /// Inserts `key -> value`. Overwrites silently if `key` was already
    /// present; callers only call this after a `find` miss (spec §8.1).
    pub(crate) fn add(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Removes every entry mapping to `value`. Spec §8.2 expects exactly one
    /// match in practice (cache keys are injective per value within a
    /// cache's lifetime), but this removes all matches defensively.
    pub(crate) fn erase_by_value(&mut self, value: V) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| *v != value);
        before - self.entries.len()
    }

    pub(crate) fn size(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_find_on_equal_keys() {
        let mut cache: CacheMap<(u32, u32), u32> = CacheMap::new();
        cache.add((1, 2), 100);
        assert_eq!(cache.find(&(1, 2)), Some(100));
        assert_eq!(cache.find(&(1, 2)), cache.find(&(1, 2)));
    }

    #[test]
    fn miss_returns_none() {
        let cache: CacheMap<(u32, u32), u32> = CacheMap::new();
        assert_eq!(cache.find(&(9, 9)), None);
    }

    #[test]
    fn erase_by_value_removes_exactly_one_and_shrinks_size() {
        let mut cache: CacheMap<(u32, u32), u32> = CacheMap::new();
        cache.add((1, 1), 10);
        cache.add((2, 2), 20);
        assert_eq!(cache.size(), 2);
        let removed = cache.erase_by_value(10);
        assert_eq!(removed, 1);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.find(&(1, 1)), None);
        assert_eq!(cache.find(&(2, 2)), Some(20));
    }

    #[test]
    fn clear_empties_the_cache() {
        let mut cache: CacheMap<(u32, u32), u32> = CacheMap::new();
        cache.add((1, 1), 10);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }
}
