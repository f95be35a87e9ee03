//! Image storage.
//!
//! Every store implements [`ImageStore`]. There are two implementations:
//!
//! - [`DiskStore`]: images as files under a root directory. The key of an
//!   image is its path relative to the root, with `/` separators.
//! - [`CachedStore`](crate::cache::CachedStore): a decorator over two
//!   stores (source and cache) that persists transformed renditions.
//!
//! ## Key set
//!
//! A store keeps the set of keys it knows about in memory. The set is built
//! once by scanning the backing directory, grows with every successful
//! [`add`](ImageStore::add), and only shrinks through
//! [`clear`](ImageStore::clear). A listed key always has a decodable entry
//! behind it: `add` and `add_bytes` persist first and index second.

pub mod disk;

use crate::cache::CacheStats;
use crate::imaging::{Codec, Quality, TransformError, TransformParams, mime_type};
use image::DynamicImage;
use rand::RngCore;
use rand::seq::IteratorRandom;
use std::path::PathBuf;
use thiserror::Error;

pub use disk::DiskStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("Invalid image key: {0}")]
    InvalidKey(String),
    #[error("Image directory does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("Failed to decode {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to encode {key}: {reason}")]
    Encode { key: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Storage of images by key.
///
/// Implementations are shared between request threads and must synchronize
/// their own state.
pub trait ImageStore: Send + Sync {
    /// All currently known keys. Callers must not rely on the order.
    fn keys(&self) -> Vec<String>;

    fn contains(&self, key: &str) -> bool;

    /// One key chosen uniformly at random, `None` when the store is empty.
    fn choose_key(&self, rng: &mut dyn RngCore) -> Option<String> {
        self.keys().into_iter().choose(rng)
    }

    /// Decode the image stored under `key`.
    fn get(&self, key: &str) -> StoreResult<DynamicImage>;

    /// The encoded bytes stored under `key`, exactly as persisted.
    fn get_bytes(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Encode `image` as `mime` and persist it under `key`, replacing any
    /// existing entry. The key becomes visible only once the write succeeded.
    fn add(&self, key: &str, mime: &str, image: &DynamicImage) -> StoreResult<()>;

    /// Persist already-encoded `bytes` under `key` exactly as given. The
    /// bytes must be in the `mime` format; same visibility rule as `add`.
    fn add_bytes(&self, key: &str, mime: &str, bytes: &[u8]) -> StoreResult<()>;

    /// MIME type derived from the key's extension. No I/O.
    fn mime_type(&self, key: &str) -> Option<&'static str> {
        mime_type(key)
    }

    fn count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Delete every entry and empty the key set.
    fn clear(&self) -> StoreResult<()>;

    /// The rendition of `key` described by `params`.
    fn image_with_transform(&self, key: &str, params: &TransformParams)
    -> StoreResult<DynamicImage>;

    /// Quality used when this store encodes JPEG output.
    fn encoding_quality(&self) -> Quality {
        Quality::default()
    }

    /// The rendition of `key` described by `params`, encoded as JPEG.
    fn transformed_jpeg(&self, key: &str, params: &TransformParams) -> StoreResult<Vec<u8>> {
        let image = self.image_with_transform(key, params)?;
        Codec::Jpeg
            .encode(&image, self.encoding_quality())
            .map_err(|e| StoreError::Encode {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Hit/miss counters, for stores that cache renditions.
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}
