//! Parameter types for image transforms.
//!
//! These structs describe *what* rendition to produce, not *how* to produce
//! it. They are the interface between the request layer (which parses them),
//! the [`cache`](crate::cache) (which hashes them into cache keys), and the
//! [`backend`](super::backend) (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`ResizeMode`]: `none` (stretch), `fill` (crop to exact size), `fit` (bound without cropping).
//! - [`TransformParams`]: width, height, blur, grayscale and resize mode of one rendition.
//! - [`Limits`]: the largest dimensions and blur a request may ask for.
//! - [`Quality`]: lossy encoding quality (1–100, default 75). Clamped on construction.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("Invalid resize mode '{0}'. Must be none, fill, or fit")]
    ResizeMode(String),
    #[error("Blur must be a finite, non-negative number (got {0})")]
    Blur(f64),
    #[error("Blur {value} exceeds the maximum of {max}")]
    BlurTooLarge { value: f64, max: f64 },
    #[error("Requested {dimension} {value} exceeds the maximum of {max}")]
    TooLarge {
        dimension: &'static str,
        value: u32,
        max: u32,
    },
    #[error("Rendition of {width}x{height} exceeds the maximum dimension of {max}")]
    OutputTooLarge { width: u32, height: u32, max: u32 },
    #[error("Invalid size '{0}'. Expected WIDTH or WIDTHxHEIGHT")]
    Size(String),
}

/// How the source is fitted to the requested box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Scale to exactly the requested size, ignoring aspect ratio.
    None,
    /// Scale to cover the requested size, then center-crop.
    Fill,
    /// Scale to fit inside the requested size, preserving aspect ratio.
    #[default]
    Fit,
}

impl ResizeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResizeMode::None => "none",
            ResizeMode::Fill => "fill",
            ResizeMode::Fit => "fit",
        }
    }
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResizeMode {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ResizeMode::None),
            "fill" => Ok(ResizeMode::Fill),
            "fit" => Ok(ResizeMode::Fit),
            other => Err(ParamsError::ResizeMode(other.to_string())),
        }
    }
}

/// A requested rendition of a source image.
///
/// A zero `width` or `height` is derived from the source aspect ratio when
/// the transform runs; both zero keeps the source size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransformParams {
    pub width: u32,
    pub height: u32,
    /// Gaussian blur sigma. `0.0` disables the blur stage.
    pub blur: f64,
    pub grayscale: bool,
    pub resize_mode: ResizeMode,
}

impl TransformParams {
    /// Params with the request defaults: no blur, color, `fit`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            blur: 0.0,
            grayscale: false,
            resize_mode: ResizeMode::default(),
        }
    }

    pub fn with_blur(self, blur: f64) -> Self {
        Self { blur, ..self }
    }

    pub fn with_grayscale(self, grayscale: bool) -> Self {
        Self { grayscale, ..self }
    }

    pub fn with_resize_mode(self, resize_mode: ResizeMode) -> Self {
        Self {
            resize_mode,
            ..self
        }
    }

    /// Check value ranges. Runs before any I/O.
    ///
    /// Dimensions derived from the source aspect ratio are checked later,
    /// once the source size is known (see
    /// [`plan_stages`](super::rust_backend::plan_stages)).
    pub fn validate(&self, limits: &Limits) -> Result<(), ParamsError> {
        if !self.blur.is_finite() || self.blur < 0.0 {
            return Err(ParamsError::Blur(self.blur));
        }
        if self.blur > limits.max_blur {
            return Err(ParamsError::BlurTooLarge {
                value: self.blur,
                max: limits.max_blur,
            });
        }
        for (dimension, value) in [("width", self.width), ("height", self.height)] {
            if value > limits.max_dimension {
                return Err(ParamsError::TooLarge {
                    dimension,
                    value,
                    max: limits.max_dimension,
                });
            }
        }
        Ok(())
    }

    /// True when only the resize stage would run.
    pub fn is_color_preserving(&self) -> bool {
        !self.grayscale && self.blur == 0.0
    }
}

/// Hard ceiling on the blur sigma handed to the backend. The Gaussian
/// kernel grows linearly with sigma.
pub const BLUR_CEILING: f64 = 1000.0;

/// Upper bounds on what a single request may ask for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Largest requested, derived or intermediate width or height.
    pub max_dimension: u32,
    /// Largest accepted blur sigma. At most [`BLUR_CEILING`].
    pub max_blur: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dimension: 5000,
            max_blur: 100.0,
        }
    }
}

/// Parse a `WIDTH` or `WIDTHxHEIGHT` size, as used by the `warm` command.
pub fn parse_size(s: &str) -> Result<(u32, u32), ParamsError> {
    let invalid = || ParamsError::Size(s.to_string());
    match s.trim().split_once(['x', 'X']) {
        Some((w, h)) => Ok((
            w.parse().map_err(|_| invalid())?,
            h.parse().map_err(|_| invalid())?,
        )),
        None => Ok((s.trim().parse().map_err(|_| invalid())?, 0)),
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_75() {
        assert_eq!(Quality::default().value(), 75);
    }

    #[test]
    fn resize_mode_parses_known_values() {
        assert_eq!("none".parse::<ResizeMode>(), Ok(ResizeMode::None));
        assert_eq!("fill".parse::<ResizeMode>(), Ok(ResizeMode::Fill));
        assert_eq!("fit".parse::<ResizeMode>(), Ok(ResizeMode::Fit));
    }

    #[test]
    fn resize_mode_rejects_unknown_values() {
        assert_eq!(
            "stretch".parse::<ResizeMode>(),
            Err(ParamsError::ResizeMode("stretch".into()))
        );
        // Case matters, same as the query string contract
        assert!("FIT".parse::<ResizeMode>().is_err());
    }

    #[test]
    fn resize_mode_default_is_fit() {
        assert_eq!(ResizeMode::default(), ResizeMode::Fit);
        assert_eq!(TransformParams::new(10, 0).resize_mode, ResizeMode::Fit);
    }

    #[test]
    fn validate_rejects_negative_blur() {
        let params = TransformParams::new(100, 100).with_blur(-1.0);
        assert_eq!(
            params.validate(&Limits::default()),
            Err(ParamsError::Blur(-1.0))
        );
    }

    #[test]
    fn validate_rejects_nan_blur() {
        let params = TransformParams::new(100, 100).with_blur(f64::NAN);
        assert!(matches!(
            params.validate(&Limits::default()),
            Err(ParamsError::Blur(_))
        ));
    }

    #[test]
    fn validate_rejects_blur_above_limit() {
        let limits = Limits::default();
        assert!(TransformParams::new(8, 8).with_blur(100.0).validate(&limits).is_ok());
        for blur in [100.5, 1e6, 1e30] {
            assert_eq!(
                TransformParams::new(8, 8).with_blur(blur).validate(&limits),
                Err(ParamsError::BlurTooLarge {
                    value: blur,
                    max: 100.0
                })
            );
        }
    }

    #[test]
    fn validate_rejects_oversized_dimensions() {
        let params = TransformParams::new(100, 6000);
        assert_eq!(
            params.validate(&Limits::default()),
            Err(ParamsError::TooLarge {
                dimension: "height",
                value: 6000,
                max: 5000
            })
        );
    }

    #[test]
    fn validate_accepts_zero_dimensions() {
        assert!(TransformParams::new(0, 0).validate(&Limits::default()).is_ok());
    }

    #[test]
    fn color_preserving_only_without_blur_and_grayscale() {
        let base = TransformParams::new(10, 10);
        assert!(base.is_color_preserving());
        assert!(!base.with_grayscale(true).is_color_preserving());
        assert!(!base.with_blur(0.5).is_color_preserving());
    }

    #[test]
    fn parse_size_width_only() {
        assert_eq!(parse_size("400"), Ok((400, 0)));
    }

    #[test]
    fn parse_size_width_and_height() {
        assert_eq!(parse_size("400x300"), Ok((400, 300)));
        assert_eq!(parse_size("640X480"), Ok((640, 480)));
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("wide").is_err());
        assert!(parse_size("400x").is_err());
        assert!(parse_size("-5").is_err());
    }
}
