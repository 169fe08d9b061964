//! Pure calculation functions for image dimensions and scale factors.
//!
//! All functions here are pure and testable without any I/O or images.

/// Smallest scale the progressive downscale will go to.
pub const MIN_SCALE: f64 = 0.05;

/// Geometric shrink applied after each failed downscale probe.
pub const SHRINK_FACTOR: f64 = 0.7;

/// Encoded size grows sub-linearly with pixel count; the initial downscale
/// takes this root of the size ratio.
pub const SIZE_EXPONENT: f64 = 0.3;

/// Fraction of each edge kept by the last-resort reduction.
pub const LAST_RESORT_FRACTION: f64 = 0.2;

/// The last-resort reduction never goes below this many pixels per edge.
pub const LAST_RESORT_MIN_EDGE: u32 = 10;

/// Scale dimensions by `factor`, truncating, never below 1×1.
///
/// # Examples
/// ```
/// # use imgfit::imaging::scale_dimensions;
/// assert_eq!(scale_dimensions((1000, 800), 0.5), (500, 400));
/// assert_eq!(scale_dimensions((3, 3), 0.1), (1, 1));
/// ```
pub fn scale_dimensions(dims: (u32, u32), factor: f64) -> (u32, u32) {
    let (w, h) = dims;
    let scale = |edge: u32| ((edge as f64 * factor) as u32).max(1);
    (scale(w), scale(h))
}

/// First scale for the progressive downscale.
///
/// `reference` is the smallest size seen so far at full resolution. The
/// result is clamped to `[MIN_SCALE, 1.0]`.
pub fn initial_downscale(target: u64, reference: u64) -> f64 {
    if reference == 0 {
        return 1.0;
    }
    let ratio = target as f64 / reference as f64;
    ratio.powf(SIZE_EXPONENT).clamp(MIN_SCALE, 1.0)
}

/// Next scale after a probe that was still too large.
pub fn next_downscale(scale: f64) -> f64 {
    (scale * SHRINK_FACTOR).max(MIN_SCALE)
}

/// Dimensions for the last-resort reduction: a fifth of each edge, at
/// least [`LAST_RESORT_MIN_EDGE`] pixels.
pub fn last_resort_dimensions(dims: (u32, u32)) -> (u32, u32) {
    let (w, h) = dims;
    let shrink = |edge: u32| {
        ((edge as f64 * LAST_RESORT_FRACTION) as u32).max(LAST_RESORT_MIN_EDGE)
    };
    (shrink(w), shrink(h))
}
