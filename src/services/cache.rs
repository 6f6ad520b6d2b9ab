use crate::services::logger::Logger;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
}

/// Keyed cache seam for compiled and resolved mappings.
pub trait KeyedCache<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: &str, value: V);
    fn invalidate(&self, key: &str) -> bool;
    /// Drops every key equal to `prefix` or starting with `prefix:`.
    fn invalidate_prefix(&self, prefix: &str) -> usize;
    fn stats(&self) -> CacheStats;
}

pub struct MemoryCache<V> {
    name: String,
    logger: Logger,
    entries: DashMap<String, V>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

impl<V: Clone + Send + Sync> MemoryCache<V> {
    pub fn new(name: &str, logger: Logger) -> Self {
        Self {
            name: name.to_string(),
            logger: logger.child(name),
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }
}

impl<V: Clone + Send + Sync> KeyedCache<V> for MemoryCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: &str, value: V) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key.to_string(), value);
    }

    fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let scoped = format!("{}:", prefix);
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key != prefix && !key.starts_with(&scoped));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.invalidations
                .fetch_add(removed as u64, Ordering::Relaxed);
            self.logger.debug(
                "Cache entries invalidated",
                Some(&serde_json::json!({ "prefix": prefix, "removed": removed })),
            );
        }
        removed
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name.clone(),
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Cache that never stores anything; every lookup recomputes.
#[derive(Debug, Clone, Default)]
pub struct NoopCache;

impl<V> KeyedCache<V> for NoopCache {
    fn get(&self, _key: &str) -> Option<V> {
        None
    }

    fn set(&self, _key: &str, _value: V) {}

    fn invalidate(&self, _key: &str) -> bool {
        false
    }

    fn invalidate_prefix(&self, _prefix: &str) -> usize {
        0
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            name: "noop".to_string(),
            ..CacheStats::default()
        }
    }
}
