//! LRU caching decorator for facet interface sources.
//!
//! Deployed facet code is immutable, so an interface fetched once for an
//! address stays valid. Misses (unknown addresses) are not cached: the facet
//! may be deployed later.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::RwLock;

use super::FacetInterfaceSource;
use crate::types::{Facet, FacetAddress};

/// Configuration for the interface cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of facets kept.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            enabled: true,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups forwarded to the inner source.
    pub misses: u64,
}

/// Interface source wrapper with an LRU cache in front.
pub struct CachedInterfaceSource<S> {
    inner: S,
    cache: Option<RwLock<LruCache<FacetAddress, Facet>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: FacetInterfaceSource> CachedInterfaceSource<S> {
    /// Wrap `inner` with the default cache configuration.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    /// Wrap `inner` with a custom cache configuration.
    pub fn with_config(inner: S, config: CacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            let size = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
            RwLock::new(LruCache::new(size))
        });
        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The wrapped source.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Cache statistics; `None` if caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
            }
        })
    }

    /// Drop every cached interface.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

#[async_trait]
impl<S: FacetInterfaceSource> FacetInterfaceSource for CachedInterfaceSource<S> {
    type Error = S::Error;

    async fn facet(&self, address: &FacetAddress) -> Result<Option<Facet>, Self::Error> {
        if let Some(cache) = &self.cache {
            // `get` marks the entry most recently used, so it needs the
            // write lock.
            let cached = cache.write().get(address).cloned();
            if let Some(facet) = cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(facet));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let fetched = self.inner.facet(address).await?;

        if let (Some(cache), Some(facet)) = (&self.cache, &fetched) {
            cache.write().put(*address, facet.clone());
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InMemoryInterfaceSource;

    #[tokio::test]
    async fn test_hits_after_first_fetch() {
        let facet = Facet::new(FacetAddress::repeat_byte(0xaa), ["getOwner()"]).unwrap();
        let source =
            CachedInterfaceSource::new(InMemoryInterfaceSource::new().with_facet(facet.clone()));

        assert_eq!(source.facet(&facet.address).await.unwrap(), Some(facet.clone()));
        assert_eq!(source.facet(&facet.address).await.unwrap(), Some(facet));

        let stats = source.cache_stats().unwrap();
        assert_eq!(stats.len, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_hit_refreshes_recency() {
        let facets: Vec<Facet> = [(0xaa, "a()"), (0xbb, "b()"), (0xcc, "c()")]
            .into_iter()
            .map(|(byte, sig)| Facet::new(FacetAddress::repeat_byte(byte), [sig]).unwrap())
            .collect();
        let inner = facets
            .iter()
            .cloned()
            .fold(InMemoryInterfaceSource::new(), |source, facet| source.with_facet(facet));
        let config = CacheConfig {
            max_entries: 2,
            enabled: true,
        };
        let source = CachedInterfaceSource::with_config(inner, config);
        let (a, b, c) = (facets[0].address, facets[1].address, facets[2].address);

        source.facet(&a).await.unwrap();
        source.facet(&b).await.unwrap();
        // Touch `a` so `b` becomes the least recently used entry.
        source.facet(&a).await.unwrap();
        source.facet(&c).await.unwrap();

        let stats = source.cache_stats().unwrap();
        assert_eq!((stats.hits, stats.misses), (1, 3));

        source.facet(&a).await.unwrap();
        assert_eq!(source.cache_stats().unwrap().hits, 2);

        source.facet(&b).await.unwrap();
        let stats = source.cache_stats().unwrap();
        assert_eq!((stats.hits, stats.misses), (2, 4));
        assert_eq!(stats.len, 2);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let source = CachedInterfaceSource::new(InMemoryInterfaceSource::new());
        let unknown = FacetAddress::repeat_byte(0xee);

        assert_eq!(source.facet(&unknown).await.unwrap(), None);
        assert_eq!(source.facet(&unknown).await.unwrap(), None);
        assert_eq!(source.cache_stats().unwrap().len, 0);
        assert_eq!(source.cache_stats().unwrap().misses, 2);
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let config = CacheConfig {
            max_entries: 8,
            enabled: false,
        };
        let source = CachedInterfaceSource::with_config(InMemoryInterfaceSource::new(), config);
        assert!(source.cache_stats().is_none());
    }
}
