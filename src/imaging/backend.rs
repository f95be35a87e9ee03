//! Image transformer trait and shared types.
//!
//! The [`ImageTransformer`] trait is the seam between the store/cache layer
//! and the pixel work. Stores hold an `Arc<dyn ImageTransformer>` and never
//! touch resampling or filtering themselves.
//!
//! The production implementation is
//! [`RustTransformer`](super::rust_backend::RustTransformer), built on the
//! `image` crate.

use super::params::{ParamsError, TransformParams};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    /// The params are well-formed but out of range for this source.
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error("Transform failed: {0}")]
    Failed(String),
}

/// Trait for transform backends.
///
/// Implementations are pure: the same image and params always produce the
/// same output. Stage order is resize → grayscale → blur.
pub trait ImageTransformer: Send + Sync {
    fn transform(
        &self,
        image: &DynamicImage,
        params: &TransformParams,
    ) -> Result<DynamicImage, TransformError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::RustTransformer;
    use std::sync::Mutex;

    /// Transformer that records every call and delegates the pixel work to
    /// [`RustTransformer`]. Uses Mutex (not RefCell) so it is Sync and can be
    /// shared across threads.
    #[derive(Default)]
    pub struct MockTransformer {
        pub calls: Mutex<Vec<RecordedTransform>>,
        pub fail: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedTransform {
        pub source: (u32, u32),
        pub params: TransformParams,
    }

    impl MockTransformer {
        pub fn new() -> Self {
            Self::default()
        }

        /// A transformer whose every call fails.
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn get_calls(&self) -> Vec<RecordedTransform> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ImageTransformer for MockTransformer {
        fn transform(
            &self,
            image: &DynamicImage,
            params: &TransformParams,
        ) -> Result<DynamicImage, TransformError> {
            self.calls.lock().unwrap().push(RecordedTransform {
                source: (image.width(), image.height()),
                params: *params,
            });
            if self.fail {
                return Err(TransformError::Failed("mock failure".into()));
            }
            RustTransformer::new().transform(image, params)
        }
    }

    #[test]
    fn mock_records_transform() {
        let transformer = MockTransformer::new();
        let image = DynamicImage::new_rgb8(40, 20);

        let out = transformer
            .transform(&image, &TransformParams::new(20, 10))
            .unwrap();
        assert_eq!((out.width(), out.height()), (20, 10));

        let calls = transformer.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source, (40, 20));
        assert_eq!(calls[0].params.width, 20);
    }

    #[test]
    fn failing_mock_reports_error() {
        let transformer = MockTransformer::failing();
        let image = DynamicImage::new_rgb8(4, 4);

        let result = transformer.transform(&image, &TransformParams::new(2, 2));
        assert!(matches!(result, Err(TransformError::Failed(_))));
        assert_eq!(transformer.call_count(), 1);
    }
}
