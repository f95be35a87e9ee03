//! Read-through cache of transformed renditions.
//!
//! Decoding, resizing and blurring a full-size photo takes far longer than
//! reading a small JPEG back from disk. [`CachedStore`] persists every
//! rendition it computes into a second [`ImageStore`] and serves later
//! requests for the same rendition from there.
//!
//! # Design
//!
//! `CachedStore` is a decorator: it wraps a *source* store and a *cache*
//! store and is itself an `ImageStore`. Everything except
//! [`image_with_transform`](ImageStore::image_with_transform) and
//! [`transformed_jpeg`](ImageStore::transformed_jpeg) is delegated to the
//! source store, so callers cannot tell whether caching is enabled.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed by request**: the key is the SHA-256 of
//! a canonical description of the rendition, followed by the output
//! extension:
//!
//! ```text
//! n:beach.jpg_w:400_h:300_b:0.000000_g:false_m:fit.jpeg
//!   → 3f1c…9a.jpeg
//! ```
//!
//! Blur is printed with fixed precision so the string is byte-stable.
//! Every field participates, so changing any one of them yields a new key.
//!
//! A hit requires only that the cache store lists the key. The cache store
//! never lists a key whose file is still being written, so a hit always
//! decodes.
//!
//! ## Output
//!
//! Renditions are always JPEG. On a miss the source store produces the
//! encoded rendition ([`transformed_jpeg`](ImageStore::transformed_jpeg)) and
//! exactly those bytes are persisted and returned, so the first and every
//! later response for a rendition are identical. A native-size JPEG request
//! with no filters is therefore cached and served as the untouched source
//! file.
//!
//! ## Concurrency
//!
//! Concurrent misses for the same cache key are collapsed: the first caller
//! computes, the others wait on a per-key slot and then find the entry in the
//! cache. Misses for different keys never wait on each other.
//!
//! ## Failures
//!
//! Source errors propagate unchanged. A failed cache write is logged and
//! counted, and the freshly computed rendition is still returned.

use crate::imaging::{Codec, Quality, TransformParams};
use crate::store::{ImageStore, StoreError, StoreResult};
use image::DynamicImage;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Encoding of every cached rendition.
pub const CACHE_CODEC: Codec = Codec::Jpeg;

/// The string hashed into a cache key.
pub fn canonical_key(source_key: &str, params: &TransformParams, ext: &str) -> String {
    format!(
        "n:{}_w:{}_h:{}_b:{:.6}_g:{}_m:{}{}",
        source_key,
        params.width,
        params.height,
        params.blur,
        params.grayscale,
        params.resize_mode,
        ext
    )
}

/// Cache-store key for a rendition of `source_key`.
pub fn cache_key(source_key: &str, params: &TransformParams) -> String {
    let ext = CACHE_CODEC.extension();
    let digest = Sha256::digest(canonical_key(source_key, params, ext).as_bytes());
    format!("{:x}{}", digest, ext)
}

/// Cache performance since the store was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub write_failures: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )?;
        } else {
            write!(f, "{} rendered", self.misses)?;
        }
        if self.write_failures > 0 {
            write!(f, ", {} not cached", self.write_failures)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    write_failures: AtomicU64,
}

/// A source store whose renditions are persisted into a cache store.
pub struct CachedStore<S, C> {
    source: S,
    cache: C,
    /// One slot per cache key currently being computed.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    counters: Counters,
}

impl<S: ImageStore, C: ImageStore> CachedStore<S, C> {
    pub fn new(source: S, cache: C) -> Self {
        Self {
            source,
            cache,
            inflight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Drop every cached rendition, leaving the source untouched.
    pub fn clear_cache(&self) -> StoreResult<()> {
        self.cache.clear()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Encoded JPEG bytes of a rendition, from the cache or freshly computed.
    fn rendition(&self, key: &str, params: &TransformParams) -> StoreResult<Vec<u8>> {
        let cache_key = cache_key(key, params);
        if let Some(bytes) = self.lookup(key, &cache_key)? {
            return Ok(bytes);
        }

        let slot = self.claim(&cache_key);
        let result = {
            let _computing = lock(&slot);
            match self.lookup(key, &cache_key) {
                Ok(Some(bytes)) => Ok(bytes),
                Ok(None) => self.compute(key, &cache_key, params),
                Err(e) => Err(e),
            }
        };
        self.release(&cache_key, slot);
        result
    }

    fn lookup(&self, key: &str, cache_key: &str) -> StoreResult<Option<Vec<u8>>> {
        if !self.cache.contains(cache_key) {
            return Ok(None);
        }
        match self.cache.get_bytes(cache_key) {
            Ok(bytes) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, cache_key, "Cache hit");
                Ok(Some(bytes))
            }
            // Cleared between the check and the read
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn compute(
        &self,
        key: &str,
        cache_key: &str,
        params: &TransformParams,
    ) -> StoreResult<Vec<u8>> {
        let bytes = self.source.transformed_jpeg(key, params)?;
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, cache_key, "Cache miss");

        if let Err(e) = self.cache.add_bytes(cache_key, CACHE_CODEC.mime(), &bytes) {
            self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(key, cache_key, error = %e, "Failed to cache rendition");
        }
        Ok(bytes)
    }

    fn claim(&self, cache_key: &str) -> Arc<Mutex<()>> {
        lock(&self.inflight)
            .entry(cache_key.to_string())
            .or_default()
            .clone()
    }

    fn release(&self, cache_key: &str, slot: Arc<Mutex<()>>) {
        let mut inflight = lock(&self.inflight);
        // Only the map and this caller still hold the slot
        if Arc::strong_count(&slot) == 2 {
            inflight.remove(cache_key);
        }
    }
}

impl<S: ImageStore, C: ImageStore> ImageStore for CachedStore<S, C> {
    fn keys(&self) -> Vec<String> {
        self.source.keys()
    }

    fn contains(&self, key: &str) -> bool {
        self.source.contains(key)
    }

    fn choose_key(&self, rng: &mut dyn RngCore) -> Option<String> {
        self.source.choose_key(rng)
    }

    fn get(&self, key: &str) -> StoreResult<DynamicImage> {
        self.source.get(key)
    }

    fn get_bytes(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.source.get_bytes(key)
    }

    fn add(&self, key: &str, mime: &str, image: &DynamicImage) -> StoreResult<()> {
        self.source.add(key, mime, image)
    }

    fn add_bytes(&self, key: &str, mime: &str, bytes: &[u8]) -> StoreResult<()> {
        self.source.add_bytes(key, mime, bytes)
    }

    fn count(&self) -> usize {
        self.source.count()
    }

    fn clear(&self) -> StoreResult<()> {
        self.cache.clear()?;
        self.source.clear()
    }

    fn image_with_transform(
        &self,
        key: &str,
        params: &TransformParams,
    ) -> StoreResult<DynamicImage> {
        let bytes = self.rendition(key, params)?;
        CACHE_CODEC
            .decode(&bytes)
            .map_err(|source| StoreError::Decode {
                key: cache_key(key, params),
                source,
            })
    }

    fn encoding_quality(&self) -> Quality {
        self.source.encoding_quality()
    }

    fn transformed_jpeg(&self, key: &str, params: &TransformParams) -> StoreResult<Vec<u8>> {
        self.rendition(key, params)
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.stats())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
