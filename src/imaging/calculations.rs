//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//! Dimensions are `(width, height)` tuples; sources are never zero-sized
//! (decoders reject empty images).

/// Resolve the requested box against the source size.
///
/// A zero dimension is derived from the other one using the source aspect
/// ratio; both zero means "keep the source size". Derived dimensions are at
/// least 1px.
///
/// # Examples
/// ```
/// # use picserve::imaging::resolve_target_dimensions;
/// assert_eq!(resolve_target_dimensions((200, 100), (50, 0)), (50, 25));
/// assert_eq!(resolve_target_dimensions((200, 100), (0, 50)), (100, 50));
/// assert_eq!(resolve_target_dimensions((200, 100), (0, 0)), (200, 100));
/// ```
pub fn resolve_target_dimensions(source: (u32, u32), requested: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    match requested {
        (0, 0) => source,
        (w, 0) => (w, scale_edge(src_h, w, src_w)),
        (0, h) => (scale_edge(src_w, h, src_h), h),
        box_dims => box_dims,
    }
}

/// `edge * num / den`, rounded, never below 1.
fn scale_edge(edge: u32, num: u32, den: u32) -> u32 {
    ((edge as f64 * num as f64 / den as f64).round() as u32).max(1)
}

/// Calculate the source window to keep when filling a target area.
///
/// Returns the largest window with the target's aspect ratio that fits inside
/// the source. Cropping to it and then scaling to the target gives the same
/// framing as scaling to cover and cropping, without ever allocating an image
/// larger than either the source or the target.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Crop window (one edge matches the source)
pub fn calculate_fill_crop(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: keep the full height, trim the sides
        (scale_edge(src_h, tgt_w, tgt_h).min(src_w), src_h)
    } else {
        // Source is taller: keep the full width, trim top and bottom
        (src_w, scale_edge(src_w, tgt_h, tgt_w).min(src_h))
    }
}

/// Top-left corner of a `crop`-sized window centered inside `outer`.
pub fn center_crop_origin(outer: (u32, u32), crop: (u32, u32)) -> (u32, u32) {
    (
        outer.0.saturating_sub(crop.0) / 2,
        outer.1.saturating_sub(crop.1) / 2,
    )
}

/// Calculate dimensions that fit inside `bounds` while keeping the aspect ratio.
///
/// Sources that already fit are returned unchanged: fitting never upscales.
/// The limiting edge matches its bound exactly; the other is rounded and at
/// least 1px.
pub fn calculate_fit_dimensions(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    let width_ratio = max_w as f64 / src_w as f64;
    let height_ratio = max_h as f64 / src_h as f64;

    if width_ratio <= height_ratio {
        (max_w, scale_edge(src_h, max_w, src_w).min(max_h))
    } else {
        (scale_edge(src_w, max_h, src_h).min(max_w), max_h)
    }
}
