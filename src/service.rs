//! The request-facing operation: pick an image, render it, return JPEG bytes.
//!
//! [`ImageService`] owns the store stack (disk store, optionally wrapped in a
//! [`CachedStore`]) and a picker. It is synchronous and CPU-bound; the HTTP
//! layer calls it from blocking tasks.

use crate::cache::{CacheStats, CachedStore};
use crate::config::ServiceConfig;
use crate::imaging::{
    ImageTransformer, Limits, ParamsError, Quality, ResizeMode, RustTransformer, TransformError,
    TransformParams,
};
use crate::picker::{ImagePicker, PickError, RandomPicker};
use crate::store::{DiskStore, ImageStore, StoreError};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("No images available")]
    NoImagesAvailable,
    #[error("Invalid parameters: {0}")]
    InvalidParams(#[from] ParamsError),
    #[error("Failed to transform image: {0}")]
    Transform(#[source] StoreError),
    #[error("Failed to read image: {0}")]
    Io(#[source] StoreError),
}

impl ServeError {
    /// Whether the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServeError::InvalidParams(_))
    }
}

impl From<PickError> for ServeError {
    fn from(e: PickError) -> Self {
        match e {
            PickError::Empty => ServeError::NoImagesAvailable,
        }
    }
}

impl From<StoreError> for ServeError {
    fn from(e: StoreError) -> Self {
        match e {
            // Out of range only once the source size is known
            StoreError::Transform(TransformError::Params(params)) => {
                ServeError::InvalidParams(params)
            }
            StoreError::Decode { .. } | StoreError::Encode { .. } | StoreError::Transform(_) => {
                ServeError::Transform(e)
            }
            _ => ServeError::Io(e),
        }
    }
}

/// Snapshot for the `/stats` endpoint and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub images: usize,
    /// `None` when caching is disabled.
    pub cache: Option<CacheStats>,
}

/// Result of pre-rendering one rendition.
#[derive(Debug)]
pub struct WarmOutcome {
    pub key: String,
    pub params: TransformParams,
    pub result: Result<usize, ServeError>,
}

pub struct ImageService {
    store: Arc<dyn ImageStore>,
    picker: Arc<dyn ImagePicker>,
    limits: Limits,
}

impl ImageService {
    pub fn new(store: Arc<dyn ImageStore>, picker: Arc<dyn ImagePicker>, limits: Limits) -> Self {
        Self {
            store,
            picker,
            limits,
        }
    }

    /// Build the store stack described by `config`.
    ///
    /// Directories must already be prepared (see
    /// [`ServiceConfig::prepare_directories`]).
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StoreError> {
        let limits = config.rendering.limits();
        let transformer: Arc<dyn ImageTransformer> =
            Arc::new(RustTransformer::new().with_max_dimension(limits.max_dimension));
        let quality = Quality::new(config.rendering.jpeg_quality);
        let source =
            DiskStore::open(&config.image_dir, transformer.clone())?.with_quality(quality);

        let store: Arc<dyn ImageStore> = if config.cache_enabled() {
            let cache = DiskStore::open(&config.cache_dir, transformer)?.with_quality(quality);
            info!(directory = %config.cache_dir.display(), "Caching renditions");
            Arc::new(CachedStore::new(source, cache))
        } else {
            Arc::new(source)
        };

        let picker = Arc::new(RandomPicker::new(store.clone()));
        Ok(Self::new(store, picker, limits))
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// A randomly chosen image rendered as JPEG.
    ///
    /// Parameters are validated before the picker or any store is touched.
    pub fn serve_random(&self, params: &TransformParams) -> Result<Vec<u8>, ServeError> {
        params.validate(&self.limits)?;
        let key = self.picker.pick()?;
        debug!(key, ?params, "Serving image");
        Ok(self.store.transformed_jpeg(&key, params)?)
    }

    /// A specific image rendered as JPEG.
    pub fn serve(&self, key: &str, params: &TransformParams) -> Result<Vec<u8>, ServeError> {
        params.validate(&self.limits)?;
        Ok(self.store.transformed_jpeg(key, params)?)
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            images: self.store.count(),
            cache: self.store.cache_stats(),
        }
    }

    /// Render every source image at every size, in parallel.
    ///
    /// Each size is `(width, height)` with the usual zero-means-derived rule.
    /// Outcomes are returned in key order, sizes in the order given.
    pub fn warm(&self, sizes: &[(u32, u32)], mode: ResizeMode) -> Vec<WarmOutcome> {
        let mut keys = self.store.keys();
        keys.sort();

        let jobs: Vec<(String, TransformParams)> = keys
            .iter()
            .flat_map(|key| {
                sizes.iter().map(move |&(width, height)| {
                    (
                        key.clone(),
                        TransformParams::new(width, height).with_resize_mode(mode),
                    )
                })
            })
            .collect();

        jobs.into_par_iter()
            .map(|(key, params)| {
                let result = self.serve(&key, &params).map(|bytes| bytes.len());
                WarmOutcome {
                    key,
                    params,
                    result,
                }
            })
            .collect()
    }
}
