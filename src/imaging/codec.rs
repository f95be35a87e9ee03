//! Encoding and decoding of stored images.
//!
//! Only raster formats with pure-Rust codecs compiled in are supported:
//!
//! | Extension | MIME type | Codec |
//! |---|---|---|
//! | `.jpg`, `.jpeg` | `image/jpeg` | `image::codecs::jpeg` |
//! | `.png` | `image/png` | `image::codecs::png` |
//!
//! Extension matching is case-insensitive.

use super::params::Quality;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageFormat, ImageResult};
use std::path::Path;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";

/// A supported on-disk image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Jpeg,
    Png,
}

const EXTENSIONS: &[(&str, Codec)] = &[
    ("jpg", Codec::Jpeg),
    ("jpeg", Codec::Jpeg),
    ("png", Codec::Png),
];

impl Codec {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            MIME_JPEG => Some(Codec::Jpeg),
            MIME_PNG => Some(Codec::Png),
            _ => None,
        }
    }

    /// Codec for a key or path, from its extension.
    pub fn from_key(key: &str) -> Option<Self> {
        let ext = Path::new(key).extension()?.to_str()?;
        EXTENSIONS
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(ext))
            .map(|(_, codec)| *codec)
    }

    pub fn mime(self) -> &'static str {
        match self {
            Codec::Jpeg => MIME_JPEG,
            Codec::Png => MIME_PNG,
        }
    }

    /// File extension (with leading dot) used when naming new entries.
    pub fn extension(self) -> &'static str {
        match self {
            Codec::Jpeg => ".jpeg",
            Codec::Png => ".png",
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            Codec::Jpeg => ImageFormat::Jpeg,
            Codec::Png => ImageFormat::Png,
        }
    }

    /// Whether `bytes` start with this codec's signature.
    pub fn sniff(self, bytes: &[u8]) -> bool {
        image::guess_format(bytes).is_ok_and(|format| format == self.format())
    }

    pub fn decode(self, bytes: &[u8]) -> ImageResult<DynamicImage> {
        image::load_from_memory_with_format(bytes, self.format())
    }

    /// Encode into memory. JPEG has no alpha or 16-bit support, so other
    /// color types are flattened to RGB8 first.
    pub fn encode(self, image: &DynamicImage, quality: Quality) -> ImageResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Codec::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
                match image {
                    DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => {
                        image.write_with_encoder(encoder)?
                    }
                    other => DynamicImage::ImageRgb8(other.to_rgb8()).write_with_encoder(encoder)?,
                }
            }
            Codec::Png => image.write_with_encoder(PngEncoder::new(&mut buf))?,
        }
        Ok(buf)
    }
}

/// MIME type for a key, from its extension. `None` when unsupported.
pub fn mime_type(key: &str) -> Option<&'static str> {
    Codec::from_key(key).map(Codec::mime)
}

/// Whether a file name carries one of the supported image extensions.
pub fn is_supported_image(name: &str) -> bool {
    Codec::from_key(name).is_some()
}
