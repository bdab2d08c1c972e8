//! Bounded LRU cache of decompressed clusters.
//!
//! Decompressing a cluster is the expensive step of every blob read, and
//! access patterns are strongly clustered (one article's resources tend to
//! share a cluster), so a small LRU over decompressed cluster bytes
//! absorbs most of the cost. This is the only mutable state in
//! [`ZimReader`](super::ZimReader).

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

/// Default cache capacity, in clusters.
pub const DEFAULT_CACHE_CAPACITY: usize = 50;
/// Capacity used when the reader is opened in low-memory mode.
pub const LOW_MEMORY_CACHE_CAPACITY: usize = 10;

/// Thread-safe LRU mapping `cluster number -> decompressed bytes`.
///
/// Entries are shared as `Arc` so a hit hands bytes to the caller without
/// copying the whole cluster while eviction stays O(1).
#[derive(Debug)]
pub struct ClusterCache {
    inner: Mutex<LruCache<u32, Arc<Vec<u8>>>>,
}

impl ClusterCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached bytes for `cluster`, promoting it to
    /// most-recently-used.
    pub fn get(&self, cluster: u32) -> Option<Arc<Vec<u8>>> {
        let mut cache = self.inner.lock().ok()?;
        cache.get(&cluster).cloned()
    }

    /// Inserts decompressed cluster bytes, evicting the least-recently-used
    /// entry when at capacity. Returns the shared handle for immediate use.
    pub fn insert(&self, cluster: u32, data: Vec<u8>) -> Arc<Vec<u8>> {
        let data = Arc::new(data);
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(cluster, Arc::clone(&data));
        }
        data
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    #[cfg(test)]
    fn keys_mru_first(&self) -> Vec<u32> {
        self.inner.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}
