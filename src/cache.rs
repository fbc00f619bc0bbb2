//! In-memory embedding cache
//!
//! Keyed by exact text content. Entries are never evicted or overwritten;
//! the cache lives as long as its owner and can be shared between
//! optimizers through an `Arc`.

use crate::types::EmbeddingVector;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Append-only map from text to its embedding
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, EmbeddingVector>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a text, counting the hit or miss
    pub fn get(&self, text: &str) -> Option<EmbeddingVector> {
        let found = self.read().get(text).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Whether a text is cached, without touching the counters
    pub fn contains(&self, text: &str) -> bool {
        self.read().contains_key(text)
    }

    /// Store an embedding. The first vector stored for a text wins.
    pub fn insert(&self, text: String, vector: EmbeddingVector) {
        self.write().entry(text).or_insert(vector);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop all entries and reset counters
    pub fn clear(&self) {
        self.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    // Poisoning is ignored: no write leaves the map half-updated.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, EmbeddingVector>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, EmbeddingVector>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}
