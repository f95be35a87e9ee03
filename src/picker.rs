//! Choosing which source image to serve.
//!
//! [`RandomPicker`] asks its store for a random key on every call, so images
//! added after startup become eligible immediately and nothing goes stale.
//! The store chooses under its own read lock; no key list is copied.

use crate::store::ImageStore;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PickError {
    #[error("No images available")]
    Empty,
}

pub trait ImagePicker: Send + Sync {
    /// Key of the image to serve next.
    fn pick(&self) -> Result<String, PickError>;
}

/// Uniformly random choice over the store's current keys.
pub struct RandomPicker {
    store: Arc<dyn ImageStore>,
}

impl RandomPicker {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self { store }
    }
}

impl ImagePicker for RandomPicker {
    fn pick(&self) -> Result<String, PickError> {
        self.store
            .choose_key(&mut rand::thread_rng())
            .ok_or(PickError::Empty)
    }
}
