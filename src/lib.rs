//! # picserve
//!
//! An image service that answers every request with a random photo from a
//! library, resized, optionally blurred and grayscaled, and encoded as JPEG.
//! Renditions are computed on demand and can be persisted in a
//! content-addressed cache so each one is rendered only once.
//!
//! # Architecture: Stores All the Way Down
//!
//! ```text
//!            GET /400/300?blur=2
//!                    │
//!              ImageService ── RandomPicker ── picks a key from ──┐
//!                    │                                             │
//!              CachedStore  (optional)                             │
//!               │         │                                        │
//!         cache DiskStore  source DiskStore ◄──────────────────────┘
//!                               │
//!                         RustTransformer
//! ```
//!
//! Every store implements one trait, [`store::ImageStore`]. The cache is a
//! decorator over two stores, so the service does not know or care whether
//! caching is enabled.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`store`] | `ImageStore` trait and the filesystem-backed `DiskStore` |
//! | [`cache`] | `CachedStore` read-through decorator, cache keys, hit/miss counters |
//! | [`imaging`] | Transform parameters, dimension math, JPEG/PNG codecs, the pixel pipeline |
//! | [`picker`] | Random choice over the live key set |
//! | [`service`] | Request-level operations: validate, pick, render, warm |
//! | [`server`] | axum routes, error-to-status mapping, TLS, graceful shutdown |
//! | [`config`] | Layered TOML config: stock defaults, file, command-line flags |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Directory Listing Is the Index
//!
//! Neither store keeps a manifest. The key set is rebuilt from a recursive
//! directory walk on startup and maintained in memory afterwards. A cache
//! directory can be deleted, copied, or pre-seeded by hand without anything
//! getting out of sync.
//!
//! ## Content-Addressed Renditions
//!
//! A cached rendition is named by the SHA-256 of its request: source key,
//! dimensions, blur, grayscale and resize mode. Identical requests map to the
//! same file; any difference maps to a different one. Nothing is ever
//! invalidated, only cleared.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling (Catmull-Rom), blur and encoding all go through the
//! `image` crate. No system libraries, so the binary runs anywhere.
//!
//! ## Native-Size Pass-Through
//!
//! A request for the source's own dimensions with no blur or grayscale skips
//! the pixel pipeline. JPEG sources are then served byte-for-byte.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod output;
pub mod picker;
pub mod server;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
