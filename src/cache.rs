//! Caching layer for frequently accessed chain data
//!
//! Provides LRU caching for:
//! - Recent headers, bodies and full blocks
//! - Blocks deferred because their timestamp is ahead of local time
//! - Recently rejected ("bad") blocks, kept for diagnostics
use crate::blockchain::{Block, BlockHeader, Body, Sha256Hash};
use lru::LruCache;
use parking_lot::RwLock;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub const BODY_CACHE_LIMIT: usize = 256;
pub const BLOCK_CACHE_LIMIT: usize = 256;
pub const HEADER_CACHE_LIMIT: usize = 512;
pub const MAX_FUTURE_BLOCKS: usize = 256;
pub const BAD_BLOCK_LIMIT: usize = 10;

/// Generic, thread-safe LRU cache wrapper using RwLock.
///
/// Reads go through `peek` under a read lock, so lookups never reorder the
/// cache and eviction follows insertion order.
pub struct ThreadSafeCache<K, V> {
    cache: Arc<RwLock<LruCache<K, V>>>,
}

impl<K, V> ThreadSafeCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new LRU cache with specified capacity. A zero capacity is
    /// treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity_nz = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity_nz))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cache.read().cap().get()
    }

    pub fn get<Q: ?Sized>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq,
    {
        self.cache.read().peek(key).cloned()
    }

    pub fn contains<Q: ?Sized>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq,
    {
        self.cache.read().contains(key)
    }

    pub fn put(&self, key: K, value: V) {
        self.cache.write().put(key, value);
    }

    pub fn remove<Q: ?Sized>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq,
    {
        self.cache.write().pop(key)
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Snapshot of all cached values, most recently inserted first.
    pub fn values(&self) -> Vec<V> {
        self.cache.read().iter().map(|(_, v)| v.clone()).collect()
    }
}

impl<K, V> Clone for ThreadSafeCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

pub type HeaderCache = ThreadSafeCache<Sha256Hash, BlockHeader>;
pub type BodyCache = ThreadSafeCache<Sha256Hash, Body>;
pub type BlockCache = ThreadSafeCache<Sha256Hash, Block>;

/// Entry counts for each chain cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub headers: usize,
    pub bodies: usize,
    pub blocks: usize,
    pub future: usize,
    pub bad: usize,
}

/// Combined cache for all chain data
pub struct ChainCaches {
    pub headers: HeaderCache,
    pub bodies: BodyCache,
    pub blocks: BlockCache,
    pub future: BlockCache,
    pub bad: BlockCache,
}

impl ChainCaches {
    pub fn new(
        header_capacity: usize,
        body_capacity: usize,
        block_capacity: usize,
        future_capacity: usize,
        bad_capacity: usize,
    ) -> Self {
        Self {
            headers: HeaderCache::new(header_capacity),
            bodies: BodyCache::new(body_capacity),
            blocks: BlockCache::new(block_capacity),
            future: BlockCache::new(future_capacity),
            bad: BlockCache::new(bad_capacity),
        }
    }

    /// Empty every cache. Used when the chain is rewound.
    pub fn purge(&self) {
        self.headers.clear();
        self.bodies.clear();
        self.blocks.clear();
        self.future.clear();
        self.bad.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            headers: self.headers.len(),
            bodies: self.bodies.len(),
            blocks: self.blocks.len(),
            future: self.future.len(),
            bad: self.bad.len(),
        }
    }
}

impl Default for ChainCaches {
    fn default() -> Self {
        Self::new(
            HEADER_CACHE_LIMIT,
            BODY_CACHE_LIMIT,
            BLOCK_CACHE_LIMIT,
            MAX_FUTURE_BLOCKS,
            BAD_BLOCK_LIMIT,
        )
    }
}
