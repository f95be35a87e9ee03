//! Image processing in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode / encode** | `image` JPEG and PNG codecs |
//! | **Resize** | Catmull-Rom `resize_exact`, centered crop for `fill` |
//! | **Grayscale** | `DynamicImage::grayscale` |
//! | **Blur** | `DynamicImage::blur` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a requested rendition
//! - **Backend**: [`ImageTransformer`] trait + [`RustTransformer`]
//! - **Codec**: in-memory encoding and decoding of stored entries

pub mod backend;
mod calculations;
pub mod codec;
pub mod params;
pub mod rust_backend;

pub use backend::{ImageTransformer, TransformError};
pub use calculations::resolve_target_dimensions;
pub use codec::{Codec, MIME_JPEG, MIME_PNG, is_supported_image, mime_type};
pub use params::{
    BLUR_CEILING, Limits, ParamsError, Quality, ResizeMode, TransformParams, parse_size,
};
pub use rust_backend::{RustTransformer, Stage, plan_stages};
