use crate::{
    images::PreviewImage,
    library::{ItemKey, ModItem},
};
use std::collections::{HashMap, HashSet};

/// Snapshot of one fully loaded collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSnapshot {
    pub items: Vec<ModItem>,
    pub images: HashMap<ItemKey, PreviewImage>,
    pub names: HashMap<ItemKey, String>,
    pub links: HashMap<ItemKey, String>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: CollectionSnapshot,
    touched: u64,
}

/// Capacity-bounded map of collection snapshots with least-recently-used eviction.
///
/// Recency is a logical clock bumped on every `put` and `get`, so two entries
/// never share a stamp.
#[derive(Debug)]
pub struct ResultCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    clock: u64,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Returns the snapshot and marks it as most recently used.
    pub fn get(&mut self, key: &str) -> Option<&CollectionSnapshot> {
        let stamp = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.touched = stamp;
        Some(&entry.snapshot)
    }

    pub fn put(&mut self, key: &str, snapshot: CollectionSnapshot) {
        let touched = self.tick();
        self.entries
            .insert(key.to_string(), CacheEntry { snapshot, touched });
        while self.entries.len() > self.capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            tracing::debug!("evicting cached collection {oldest}");
            self.entries.remove(&oldest);
        }
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops entries whose collection no longer exists.
    pub fn retain_keys(&mut self, valid: &HashSet<String>) {
        self.entries.retain(|key, _| valid.contains(key));
    }
}
