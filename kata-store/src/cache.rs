//! Concurrent in-memory entity cache.
//!
//! One cache instance fronts one repository's remote store. Reads never
//! touch the network; writes go through the owning repository, which
//! updates the cache synchronously after each successful remote call so a
//! caller always observes its own writes.

use crate::StoredEntity;
use kata_core::EntityId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Map from entity id to entity, plus a secondary index by natural key.
///
/// Multiple readers proceed concurrently; writers take exclusive access
/// only for the duration of a single map mutation, never across a remote
/// call. The cache is additive: entries absent from a query result are not
/// evicted, and absence in the cache proves nothing about the store.
pub struct EntityCache<T: StoredEntity> {
    entries: RwLock<HashMap<EntityId, T>>,
    by_natural_key: RwLock<HashMap<String, EntityId>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: StoredEntity> EntityCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            by_natural_key: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Non-blocking read by id. Never talks to the remote store.
    pub fn get(&self, id: EntityId) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&id) {
            Some(entity) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entity.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Read through the natural-key index.
    pub fn get_by_natural_key(&self, key: &str) -> Option<T> {
        let id = {
            let index = self
                .by_natural_key
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            index.get(key).copied()
        };
        match id {
            Some(id) => self.get(id),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Upsert; updates both the primary map and the secondary index.
    /// Idempotent: re-putting an equal entity is a no-op in effect.
    pub fn put(&self, entity: &T) {
        let id = entity.entity_id();
        let new_key = entity.natural_key();

        let old_key = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let previous = entries.insert(id, entity.clone());
            previous.and_then(|p| p.natural_key())
        };

        if old_key != new_key {
            let mut index = self
                .by_natural_key
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(old_key) = old_key {
                // Drop the stale index entry only if it still points at us.
                if index.get(&old_key) == Some(&id) {
                    index.remove(&old_key);
                }
            }
            if let Some(new_key) = new_key {
                index.insert(new_key, id);
            }
        } else if let Some(new_key) = new_key {
            let mut index = self
                .by_natural_key
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            index.insert(new_key, id);
        }
        trace!(kind = ?T::kind(), %id, "cache: entity upserted");
    }

    /// Remove from both indexes. Returns the removed entity, if cached.
    pub fn remove(&self, id: EntityId) -> Option<T> {
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.remove(&id)
        };
        if let Some(key) = removed.as_ref().and_then(|e| e.natural_key()) {
            let mut index = self
                .by_natural_key
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if index.get(&key) == Some(&id) {
                index.remove(&key);
            }
        }
        if removed.is_some() {
            trace!(kind = ?T::kind(), %id, "cache: entity removed");
        }
        removed
    }

    /// Linear scan over cached entities. Best-effort existence checks
    /// only; never a substitute for the authoritative remote check.
    pub fn find_by(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|e| predicate(e)).cloned().collect()
    }

    /// Drop all entries and index state. Counters are retained.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.by_natural_key
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
        }
    }
}

impl<T: StoredEntity> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kata_core::{Program, ProgramCategory};
    use std::sync::Arc;

    fn program(name: &str) -> Program {
        Program::new(name, ProgramCategory::Striking)
    }

    #[test]
    fn test_put_get_remove() {
        let cache = EntityCache::<Program>::new();
        let p = program("Karate");
        cache.put(&p);

        assert_eq!(cache.get(p.program_id).unwrap(), p);
        assert_eq!(cache.get_by_natural_key("Karate").unwrap(), p);

        cache.remove(p.program_id);
        assert!(cache.get(p.program_id).is_none());
        assert!(cache.get_by_natural_key("Karate").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_rename_moves_natural_key_index() {
        let cache = EntityCache::<Program>::new();
        let mut p = program("Karate");
        cache.put(&p);

        p.name = "Shotokan".to_string();
        cache.put(&p);

        assert!(cache.get_by_natural_key("Karate").is_none());
        assert_eq!(cache.get_by_natural_key("Shotokan").unwrap(), p);
    }

    #[test]
    fn test_find_by_scans_cached_entities() {
        let cache = EntityCache::<Program>::new();
        cache.put(&program("Karate"));
        cache.put(&program("Judo"));
        let mut inactive = program("Kendo");
        inactive.active = false;
        cache.put(&inactive);

        let active = cache.find_by(|p| p.active);
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = EntityCache::<Program>::new();
        let p = program("Karate");
        cache.put(&p);

        cache.get(p.program_id);
        cache.get(kata_core::new_entity_id());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(EntityCache::<Program>::new());
        let seed: Vec<Program> = (0..16).map(|i| program(&format!("p-{i}"))).collect();
        for p in &seed {
            cache.put(p);
        }

        let mut handles = Vec::new();
        for chunk in seed.chunks(4) {
            let cache = Arc::clone(&cache);
            let chunk: Vec<Program> = chunk.to_vec();
            handles.push(std::thread::spawn(move || {
                for p in &chunk {
                    cache.put(p);
                    assert!(cache.get(p.program_id).is_some());
                    cache.find_by(|c| c.active);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
