//! Filesystem-backed image store.
//!
//! ## Layout
//!
//! ```text
//! photos/                  # store root
//! ├── beach.jpg            # key "beach.jpg"
//! ├── 2024/
//! │   └── harbour.PNG      # key "2024/harbour.PNG"
//! └── notes.txt            # not an image, never listed
//! ```
//!
//! The directory listing is the index: the key set is rebuilt from a
//! recursive walk every time a store is opened. Only `.jpg`, `.jpeg` and
//! `.png` files (any case) are picked up; everything else is skipped.
//! Symbolic links are not followed, so every key names a file that really
//! lives under the root and that [`clear`](ImageStore::clear) can delete.
//!
//! ## Writes
//!
//! [`add`](ImageStore::add) encodes into a hidden `.partial` temp file next to
//! the destination and renames it into place, then inserts the key.
//! [`add_bytes`](ImageStore::add_bytes) does the same with bytes that are
//! already encoded. Readers therefore never see a listed key without a
//! complete file behind it, and interrupted writes never show up in a later
//! scan.
//!
//! ## Clearing
//!
//! [`clear`](ImageStore::clear) deletes the file of every listed key. A key
//! leaves the set only once its file is gone, so after a failed `clear` the
//! set still names exactly the entries that remain.
//!
//! ## Locking
//!
//! The key set sits behind its own `RwLock`. A second, store-wide `gate`
//! lock is held shared by reads and writes and exclusively by
//! [`clear`](ImageStore::clear), so clearing never interleaves with an
//! in-flight `add` or `get`. Lock order is always gate → key set.

use super::{ImageStore, StoreError, StoreResult};
use crate::imaging::{
    Codec, ImageTransformer, Quality, TransformParams, is_supported_image,
    resolve_target_dimensions,
};
use image::DynamicImage;
use rand::RngCore;
use rand::seq::IteratorRandom;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Images stored as files under a root directory.
pub struct DiskStore {
    root: PathBuf,
    transformer: Arc<dyn ImageTransformer>,
    quality: Quality,
    keys: RwLock<BTreeSet<String>>,
    gate: RwLock<()>,
}

impl DiskStore {
    /// Open a store over an existing directory and index its images.
    pub fn open(
        root: impl Into<PathBuf>,
        transformer: Arc<dyn ImageTransformer>,
    ) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            error!(directory = %root.display(), "Image directory does not exist");
            return Err(StoreError::MissingRoot(root));
        }

        let keys = scan_keys(&root)?;
        info!(directory = %root.display(), count = keys.len(), "Loaded images");

        Ok(Self {
            root,
            transformer,
            quality: Quality::default(),
            keys: RwLock::new(keys),
            gate: RwLock::new(()),
        })
    }

    /// Set the JPEG quality used by [`add`](ImageStore::add).
    pub fn with_quality(self, quality: Quality) -> Self {
        Self { quality, ..self }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Read and decode an entry, keeping the encoded bytes around.
    fn load(&self, key: &str) -> StoreResult<(Vec<u8>, DynamicImage)> {
        let bytes = self.get_bytes(key)?;
        let codec = Codec::from_key(key).ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        let image = codec.decode(&bytes).map_err(|source| StoreError::Decode {
            key: key.to_string(),
            source,
        })?;
        Ok((bytes, image))
    }

    /// Delete the file of every listed key, recording each removed key.
    /// Stops at the first failure. Files already gone count as removed.
    fn remove_entries(&self, removed: &mut Vec<String>) -> StoreResult<()> {
        let keys: Vec<String> = read(&self.keys).iter().cloned().collect();
        for key in keys {
            match fs::remove_file(self.root.join(&key)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            removed.push(key);
        }
        Ok(())
    }

    /// Write `bytes` into place and index the key. Callers hold no locks.
    fn persist(&self, key: &str, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let _gate = read(&self.gate);
        write_atomic(path, bytes)?;
        write(&self.keys).insert(key.to_string());
        debug!(key, bytes = bytes.len(), "Stored image");
        Ok(())
    }
}

/// Codec for an entry about to be written as `mime` under `key`.
fn codec_for_write(key: &str, mime: &str) -> StoreResult<Codec> {
    let codec = Codec::from_mime(mime).ok_or_else(|| StoreError::Encode {
        key: key.to_string(),
        reason: format!("unsupported image format: {mime}"),
    })?;
    if Codec::from_key(key) != Some(codec) {
        return Err(StoreError::Encode {
            key: key.to_string(),
            reason: format!("key extension does not match {mime}"),
        });
    }
    Ok(codec)
}

/// Transform is a no-op: same size as the source, nothing else requested.
fn is_passthrough(image: &DynamicImage, params: &TransformParams) -> bool {
    let source = (image.width(), image.height());
    params.is_color_preserving()
        && resolve_target_dimensions(source, (params.width, params.height)) == source
}

impl ImageStore for DiskStore {
    fn keys(&self) -> Vec<String> {
        let _gate = read(&self.gate);
        read(&self.keys).iter().cloned().collect()
    }

    fn contains(&self, key: &str) -> bool {
        read(&self.keys).contains(key)
    }

    fn choose_key(&self, rng: &mut dyn RngCore) -> Option<String> {
        let _gate = read(&self.gate);
        read(&self.keys).iter().choose(rng).cloned()
    }

    fn get(&self, key: &str) -> StoreResult<DynamicImage> {
        self.load(key).map(|(_, image)| image)
    }

    fn get_bytes(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.path_for(key)?;
        let _gate = read(&self.gate);
        if !self.contains(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Io(e),
        })
    }

    fn add(&self, key: &str, mime: &str, image: &DynamicImage) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let codec = codec_for_write(key, mime)?;
        let bytes = codec
            .encode(image, self.quality)
            .map_err(|e| StoreError::Encode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        self.persist(key, &path, &bytes)
    }

    fn add_bytes(&self, key: &str, mime: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let codec = codec_for_write(key, mime)?;
        if !codec.sniff(bytes) {
            return Err(StoreError::Encode {
                key: key.to_string(),
                reason: format!("bytes are not {mime}"),
            });
        }
        self.persist(key, &path, bytes)
    }

    fn count(&self) -> usize {
        read(&self.keys).len()
    }

    fn clear(&self) -> StoreResult<()> {
        let _gate = write(&self.gate);
        let mut removed = Vec::new();
        let result = self.remove_entries(&mut removed);

        let mut keys = write(&self.keys);
        match result {
            Ok(()) => {
                keys.clear();
                info!(directory = %self.root.display(), removed = removed.len(), "Cleared images");
                Ok(())
            }
            Err(e) => {
                for key in &removed {
                    keys.remove(key);
                }
                error!(
                    directory = %self.root.display(),
                    removed = removed.len(),
                    error = %e,
                    "Failed to clear images"
                );
                Err(e)
            }
        }
    }

    fn image_with_transform(
        &self,
        key: &str,
        params: &TransformParams,
    ) -> StoreResult<DynamicImage> {
        let (_, image) = self.load(key)?;
        if is_passthrough(&image, params) {
            debug!(key, "Requested size matches source, skipping transform");
            return Ok(image);
        }
        Ok(self.transformer.transform(&image, params)?)
    }

    fn encoding_quality(&self) -> Quality {
        self.quality
    }

    /// Pass-through JPEG sources are returned byte-for-byte.
    fn transformed_jpeg(&self, key: &str, params: &TransformParams) -> StoreResult<Vec<u8>> {
        let (bytes, image) = self.load(key)?;
        let output = if is_passthrough(&image, params) {
            if Codec::from_key(key) == Some(Codec::Jpeg) {
                return Ok(bytes);
            }
            image
        } else {
            self.transformer.transform(&image, params)?
        };
        Codec::Jpeg
            .encode(&output, self.quality)
            .map_err(|e| StoreError::Encode {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Reject keys that are empty, absolute, or step outside the root.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Recursively collect the keys of all supported images under `root`.
fn scan_keys(root: &Path) -> StoreResult<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(key) = relative_key(root, entry.path())
            && is_supported_image(&key)
        {
            keys.insert(key);
        }
    }
    Ok(keys)
}

/// Path relative to `root`, joined with `/`. `None` for non-UTF-8 names.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Write through a sibling temp file and rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".picserve-")
        .suffix(".partial")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
