//! Lookup caching for resolved XPath expressions.
//!
//! The cache is scoped to one engine instance and keyed on all inputs that
//! affect a lookup: the expression string and the tree's root identity. Each
//! entry also records the tree revision it was computed at; a mutation bumps
//! the revision, so stale entries are never served even before they age out.
//!
//! Dynamic expressions — those still carrying a `{base_path}`-style
//! placeholder — bypass the cache entirely.

use lru::LruCache;
use parking_lot::RwLock;
use std::hash::Hasher;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use uuid::Uuid;
use xxhash_rust::xxh64::Xxh64;

use crate::xml::tree::NodePath;

/// Configuration for the lookup cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Entry time-to-live.
    pub ttl: Duration,
    /// Whether the cache is enabled at all.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 4_096,
            ttl: Duration::from_secs(300),
            enabled: true,
        }
    }
}

/// Cache key: xxh64 over the expression and the tree identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LookupKey(u64);

impl LookupKey {
    fn compute(xpath: &str, root_id: Uuid) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.write(xpath.as_bytes());
        hasher.write(root_id.as_bytes());
        Self(hasher.finish())
    }
}

#[derive(Debug, Clone)]
struct CachedLookup {
    paths: Vec<NodePath>,
    root_id: Uuid,
    revision: u64,
    inserted: Instant,
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from cache.
    pub hits: u64,
    /// Lookups that had to walk the tree.
    pub misses: u64,
    /// Current entry count.
    pub entries: usize,
}

/// LRU + TTL cache for XPath lookup results.
///
/// Thread-safe behind a [`RwLock`], though the engine itself is
/// single-threaded per tree.
pub struct LookupCache {
    inner: RwLock<LruCache<LookupKey, CachedLookup>>,
    config: CacheConfig,
    hits: RwLock<u64>,
    misses: RwLock<u64>,
}

impl LookupCache {
    /// Create a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1))
            .unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
            config,
            hits: RwLock::new(0),
            misses: RwLock::new(0),
        }
    }

    /// Whether an expression is cacheable (no unexpanded placeholder).
    pub fn is_cacheable(xpath: &str) -> bool {
        !xpath.contains('{')
    }

    /// Fetch a cached lookup, if fresh for the given tree state.
    pub fn get(&self, xpath: &str, root_id: Uuid, revision: u64) -> Option<Vec<NodePath>> {
        if !self.config.enabled || !Self::is_cacheable(xpath) {
            return None;
        }
        let key = LookupKey::compute(xpath, root_id);
        let mut cache = self.inner.write();
        let hit = match cache.get(&key) {
            Some(entry)
                if entry.root_id == root_id
                    && entry.revision == revision
                    && entry.inserted.elapsed() < self.config.ttl =>
            {
                Some(entry.paths.clone())
            }
            Some(_) => {
                cache.pop(&key);
                None
            }
            None => None,
        };
        drop(cache);
        if hit.is_some() {
            *self.hits.write() += 1;
        } else {
            *self.misses.write() += 1;
        }
        hit
    }

    /// Store a lookup result.
    pub fn put(&self, xpath: &str, root_id: Uuid, revision: u64, paths: Vec<NodePath>) {
        if !self.config.enabled || !Self::is_cacheable(xpath) {
            return;
        }
        let key = LookupKey::compute(xpath, root_id);
        self.inner.write().put(
            key,
            CachedLookup {
                paths,
                root_id,
                revision,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop every entry computed against the given tree.
    pub fn invalidate_root(&self, root_id: Uuid) {
        let mut cache = self.inner.write();
        let stale: Vec<LookupKey> = cache
            .iter()
            .filter(|(_, v)| v.root_id == root_id)
            .map(|(k, _)| *k)
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Counters snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: *self.hits.read(),
            misses: *self.misses.read(),
            entries: self.inner.read().len(),
        }
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::tree::NodePath;

    fn path() -> Vec<NodePath> {
        vec![NodePath::root().child(0)]
    }

    #[test]
    fn test_hit_after_put() {
        let cache = LookupCache::default();
        let id = Uuid::new_v4();
        cache.put("/config/shared", id, 0, path());
        assert_eq!(cache.get("/config/shared", id, 0), Some(path()));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_revision_mismatch_misses() {
        let cache = LookupCache::default();
        let id = Uuid::new_v4();
        cache.put("/config/shared", id, 0, path());
        assert_eq!(cache.get("/config/shared", id, 1), None);
        // The stale entry is evicted, not kept around.
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_root_identity_separation() {
        let cache = LookupCache::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put("/config/shared", a, 0, path());
        assert_eq!(cache.get("/config/shared", b, 0), None);
        assert_eq!(cache.get("/config/shared", a, 0), Some(path()));
    }

    #[test]
    fn test_dynamic_xpath_bypasses() {
        let cache = LookupCache::default();
        let id = Uuid::new_v4();
        cache.put("{base_path}/address", id, 0, path());
        assert_eq!(cache.get("{base_path}/address", id, 0), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_invalidate_root() {
        let cache = LookupCache::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put("/config/shared", a, 0, path());
        cache.put("/config/shared", b, 0, path());
        cache.invalidate_root(a);
        assert_eq!(cache.get("/config/shared", a, 0), None);
        assert_eq!(cache.get("/config/shared", b, 0), Some(path()));
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = LookupCache::new(CacheConfig {
            ttl: Duration::from_secs(0),
            ..CacheConfig::default()
        });
        let id = Uuid::new_v4();
        cache.put("/config/shared", id, 0, path());
        assert_eq!(cache.get("/config/shared", id, 0), None);
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = LookupCache::new(CacheConfig {
            max_entries: 2,
            ..CacheConfig::default()
        });
        let id = Uuid::new_v4();
        cache.put("/a", id, 0, path());
        cache.put("/b", id, 0, path());
        cache.put("/c", id, 0, path());
        assert_eq!(cache.stats().entries, 2);
    }
}
