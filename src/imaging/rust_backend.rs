//! Pure Rust transform backend built on the `image` crate.
//!
//! ## Stage mapping
//!
//! | Stage | Crate / function |
//! |---|---|
//! | Resize `none` | `DynamicImage::resize_exact` |
//! | Resize `fit` | `DynamicImage::resize_exact` to the fitted size (never upscales) |
//! | Resize `fill` | centered `crop_imm` to the box's aspect ratio, then `resize_exact` |
//! | Grayscale | `DynamicImage::grayscale` (luminance-preserving) |
//! | Blur | `DynamicImage::blur` (Gaussian, sigma = blur, at most [`BLUR_CEILING`]) |
//!
//! All resampling uses the Catmull-Rom filter.
//!
//! The pipeline is planned up front by [`plan_stages`] so the order, the
//! skipped stages and the size limit can be tested without decoding anything.
//! No stage ever allocates an image wider or taller than the larger of the
//! source and the planned output, and the planned output is bounded by the
//! transformer's `max_dimension`.

use super::backend::{ImageTransformer, TransformError};
use super::calculations::{
    calculate_fill_crop, calculate_fit_dimensions, center_crop_origin,
    resolve_target_dimensions,
};
use super::params::{BLUR_CEILING, Limits, ParamsError, ResizeMode, TransformParams};
use image::DynamicImage;
use image::imageops::FilterType;

/// One step of the transform pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    /// Scale to exactly this size.
    Resize { width: u32, height: u32 },
    /// Center-crop to this size's aspect ratio, then scale to it.
    Fill { width: u32, height: u32 },
    Grayscale,
    Blur(f32),
}

impl Stage {
    /// Size of the image a resizing stage produces.
    fn output_size(self) -> Option<(u32, u32)> {
        match self {
            Stage::Resize { width, height } | Stage::Fill { width, height } => {
                Some((width, height))
            }
            Stage::Grayscale | Stage::Blur(_) => None,
        }
    }
}

/// Plan the stages for a source of the given size.
///
/// Order is always resize → grayscale → blur. The resize stage is omitted
/// when it would not change the size. A resize whose output would exceed
/// `max_dimension` on either edge is rejected; this catches edges derived
/// from an extreme source aspect ratio, which request validation cannot see.
pub fn plan_stages(
    source: (u32, u32),
    params: &TransformParams,
    max_dimension: u32,
) -> Result<Vec<Stage>, ParamsError> {
    let mut stages = Vec::with_capacity(3);
    let target = resolve_target_dimensions(source, (params.width, params.height));

    let resize = match params.resize_mode {
        ResizeMode::None if target != source => Some(Stage::Resize {
            width: target.0,
            height: target.1,
        }),
        ResizeMode::Fill if target != source => Some(Stage::Fill {
            width: target.0,
            height: target.1,
        }),
        ResizeMode::Fit => {
            let (width, height) = calculate_fit_dimensions(source, target);
            ((width, height) != source).then_some(Stage::Resize { width, height })
        }
        _ => None,
    };
    if let Some(stage) = resize {
        if let Some((width, height)) = stage.output_size()
            && (width > max_dimension || height > max_dimension)
        {
            return Err(ParamsError::OutputTooLarge {
                width,
                height,
                max: max_dimension,
            });
        }
        stages.push(stage);
    }

    if params.grayscale {
        stages.push(Stage::Grayscale);
    }
    if params.blur > 0.0 {
        stages.push(Stage::Blur(params.blur.min(BLUR_CEILING) as f32));
    }
    Ok(stages)
}

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the stage-to-function mapping.
pub struct RustTransformer {
    filter: FilterType,
    max_dimension: u32,
}

impl RustTransformer {
    pub fn new() -> Self {
        Self {
            filter: FilterType::CatmullRom,
            max_dimension: Limits::default().max_dimension,
        }
    }

    /// Largest output width or height this transformer will produce.
    pub fn with_max_dimension(self, max_dimension: u32) -> Self {
        Self {
            max_dimension,
            ..self
        }
    }

    fn apply(&self, image: DynamicImage, stage: Stage) -> DynamicImage {
        match stage {
            Stage::Resize { width, height } => image.resize_exact(width, height, self.filter),
            Stage::Fill { width, height } => {
                let source = (image.width(), image.height());
                let window = calculate_fill_crop(source, (width, height));
                let (x, y) = center_crop_origin(source, window);
                let cropped = image.crop_imm(x, y, window.0, window.1);
                if window == (width, height) {
                    cropped
                } else {
                    cropped.resize_exact(width, height, self.filter)
                }
            }
            Stage::Grayscale => image.grayscale(),
            Stage::Blur(sigma) => image.blur(sigma),
        }
    }
}

impl Default for RustTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTransformer for RustTransformer {
    fn transform(
        &self,
        image: &DynamicImage,
        params: &TransformParams,
    ) -> Result<DynamicImage, TransformError> {
        let source = (image.width(), image.height());
        if source.0 == 0 || source.1 == 0 {
            return Err(TransformError::Failed("source image is empty".into()));
        }

        let stages = plan_stages(source, params, self.max_dimension)?;
        tracing::trace!(?source, ?stages, "transforming image");

        Ok(stages
            .into_iter()
            .fold(image.clone(), |img, stage| self.apply(img, stage)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn checkerboard(size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        }))
    }

    fn dims(img: &DynamicImage) -> (u32, u32) {
        (img.width(), img.height())
    }

    // =========================================================================
    // plan_stages
    // =========================================================================

    #[test]
    fn plan_orders_resize_grayscale_blur() {
        let params = TransformParams::new(50, 50)
            .with_resize_mode(ResizeMode::None)
            .with_grayscale(true)
            .with_blur(2.0);
        assert_eq!(
            plan_stages((100, 100), &params, 5000).unwrap(),
            vec![
                Stage::Resize {
                    width: 50,
                    height: 50
                },
                Stage::Grayscale,
                Stage::Blur(2.0),
            ]
        );
    }

    #[test]
    fn plan_skips_resize_at_native_size() {
        let params = TransformParams::new(100, 100).with_resize_mode(ResizeMode::Fill);
        assert!(plan_stages((100, 100), &params, 5000).unwrap().is_empty());
    }

    #[test]
    fn plan_fit_skips_upscale() {
        let params = TransformParams::new(500, 500).with_grayscale(true);
        assert_eq!(
            plan_stages((100, 80), &params, 5000).unwrap(),
            vec![Stage::Grayscale]
        );
    }

    #[test]
    fn plan_fill_uses_exact_box() {
        let params = TransformParams::new(100, 100).with_resize_mode(ResizeMode::Fill);
        assert_eq!(
            plan_stages((200, 100), &params, 5000).unwrap(),
            vec![Stage::Fill {
                width: 100,
                height: 100
            }]
        );
    }

    #[test]
    fn plan_rejects_derived_edge_above_limit() {
        // 5000 wide on a 10x4000 strip derives a height of 2,000,000
        let params = TransformParams::new(5000, 0).with_resize_mode(ResizeMode::None);
        assert_eq!(
            plan_stages((10, 4000), &params, 5000),
            Err(ParamsError::OutputTooLarge {
                width: 5000,
                height: 2_000_000,
                max: 5000
            })
        );
    }

    #[test]
    fn plan_fill_with_derived_edge_is_bounded_too() {
        let params = TransformParams::new(0, 5000).with_resize_mode(ResizeMode::Fill);
        assert!(matches!(
            plan_stages((4000, 100), &params, 5000),
            Err(ParamsError::OutputTooLarge { .. })
        ));
    }

    #[test]
    fn plan_fit_with_derived_edge_never_upscales() {
        // The derived box is huge but fit keeps the source size
        let params = TransformParams::new(5000, 0).with_grayscale(true);
        assert_eq!(
            plan_stages((10, 4000), &params, 5000).unwrap(),
            vec![Stage::Grayscale]
        );
    }

    #[test]
    fn plan_caps_blur_sigma() {
        let params = TransformParams::new(8, 8).with_blur(1e30);
        assert_eq!(
            plan_stages((8, 8), &params, 5000).unwrap(),
            vec![Stage::Blur(BLUR_CEILING as f32)]
        );
    }

    // =========================================================================
    // Resize modes on a 200x100 source
    // =========================================================================

    #[test]
    fn fill_yields_exact_box() {
        let out = RustTransformer::new()
            .transform(
                &gradient(200, 100),
                &TransformParams::new(100, 100).with_resize_mode(ResizeMode::Fill),
            )
            .unwrap();
        assert_eq!(dims(&out), (100, 100));
    }

    #[test]
    fn fit_preserves_aspect_within_box() {
        let out = RustTransformer::new()
            .transform(
                &gradient(200, 100),
                &TransformParams::new(100, 100).with_resize_mode(ResizeMode::Fit),
            )
            .unwrap();
        assert_eq!(dims(&out), (100, 50));
    }

    #[test]
    fn none_stretches_to_box() {
        let out = RustTransformer::new()
            .transform(
                &gradient(200, 100),
                &TransformParams::new(100, 100).with_resize_mode(ResizeMode::None),
            )
            .unwrap();
        assert_eq!(dims(&out), (100, 100));
    }

    #[test]
    fn zero_height_derived_from_aspect_ratio() {
        let out = RustTransformer::new()
            .transform(
                &gradient(200, 100),
                &TransformParams::new(80, 0).with_resize_mode(ResizeMode::None),
            )
            .unwrap();
        assert_eq!(dims(&out), (80, 40));
    }

    #[test]
    fn fill_crops_from_center() {
        // Left third red, middle third green, right third blue
        let src = DynamicImage::ImageRgb8(RgbImage::from_fn(300, 100, |x, _| match x / 100 {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        }));
        let out = RustTransformer::new()
            .transform(
                &src,
                &TransformParams::new(100, 100).with_resize_mode(ResizeMode::Fill),
            )
            .unwrap();
        let center = out.get_pixel(50, 50);
        assert!(center[1] > 200 && center[0] < 50 && center[2] < 50);
    }

    // =========================================================================
    // Grayscale and blur
    // =========================================================================

    #[test]
    fn grayscale_output_has_equal_channels() {
        let out = RustTransformer::new()
            .transform(
                &gradient(64, 64),
                &TransformParams::new(64, 64).with_grayscale(true),
            )
            .unwrap()
            .to_rgb8();
        assert!(out.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    }

    #[test]
    fn blur_smooths_checkerboard() {
        let src = checkerboard(32);
        let out = RustTransformer::new()
            .transform(&src, &TransformParams::new(32, 32).with_blur(2.0))
            .unwrap()
            .to_rgb8();
        let p = out.get_pixel(16, 16);
        // Neighbouring red and blue pixels get mixed
        assert!(p[0] > 0 && p[2] > 0);
    }

    #[test]
    fn grayscale_runs_before_blur() {
        let src = gradient(40, 40);
        let params = TransformParams::new(40, 40)
            .with_grayscale(true)
            .with_blur(1.5);
        let out = RustTransformer::new().transform(&src, &params).unwrap();
        let expected = src.grayscale().blur(1.5);
        assert_eq!(out.to_rgb8(), expected.to_rgb8());
    }

    #[test]
    fn identity_params_return_equal_pixels() {
        let src = gradient(30, 20);
        let out = RustTransformer::new()
            .transform(&src, &TransformParams::new(30, 20))
            .unwrap();
        assert_eq!(out.to_rgb8(), src.to_rgb8());
    }

    #[test]
    fn fill_extreme_aspect_stays_small() {
        let out = RustTransformer::new()
            .transform(
                &gradient(4000, 100),
                &TransformParams::new(1, 5000).with_resize_mode(ResizeMode::Fill),
            )
            .unwrap();
        assert_eq!(dims(&out), (1, 5000));
    }

    #[test]
    fn oversized_output_is_a_params_error() {
        let result = RustTransformer::new().with_max_dimension(100).transform(
            &gradient(10, 40),
            &TransformParams::new(100, 0).with_resize_mode(ResizeMode::None),
        );
        assert!(matches!(
            result,
            Err(TransformError::Params(ParamsError::OutputTooLarge { .. }))
        ));
    }

    #[test]
    fn empty_source_is_an_error() {
        let result = RustTransformer::new()
            .transform(&DynamicImage::new_rgb8(0, 0), &TransformParams::new(1, 1));
        assert!(result.is_err());
    }
}
