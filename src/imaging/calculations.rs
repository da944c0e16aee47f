//! Pure calculation functions for image transforms.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the output size of a resize by `scale`.
///
/// Each edge is rounded to the nearest pixel and never drops below 1.
/// Returns `None` when the scale is not a positive finite number, an edge
/// does not fit in `u32`, or the result has more than `max_pixels` pixels.
///
/// # Examples
/// ```
/// # use imgrelay::imaging::calculations::scaled_dimensions;
/// assert_eq!(scaled_dimensions((100, 100), 0.5, 1_000_000), Some((50, 50)));
/// assert_eq!(scaled_dimensions((3, 3), 0.1, 1_000_000), Some((1, 1)));
/// assert_eq!(scaled_dimensions((10, 10), -1.0, 1_000_000), None);
/// assert_eq!(scaled_dimensions((100, 100), 1e6, 1_000_000), None);
/// ```
pub fn scaled_dimensions(source: (u32, u32), scale: f64, max_pixels: u64) -> Option<(u32, u32)> {
    if !scale.is_finite() || scale <= 0.0 {
        return None;
    }
    let edge = |v: u32| {
        let scaled = (v as f64 * scale).round();
        if scaled > u32::MAX as f64 {
            None
        } else {
            Some((scaled as u32).max(1))
        }
    };
    let (width, height) = (edge(source.0)?, edge(source.1)?);
    if u64::from(width) * u64::from(height) > max_pixels {
        return None;
    }
    Some((width, height))
}

/// Build the 256-entry lookup table for a power-law tone curve.
///
/// `out = 255 * (in / 255) ^ exponent`, saturated to `0..=255`.
pub fn gamma_lut(exponent: f64) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let v = (i as f64 / 255.0).powf(exponent) * 255.0;
        *slot = saturate(v);
    }
    lut
}

/// Round and clamp a channel value into `0..=255`. NaN maps to 0.
#[inline]
pub fn saturate(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

/// Affine map from a destination pixel back to its source position for a
/// counter-clockwise rotation about the image centre.
///
/// The canvas keeps its size; callers sample the returned coordinate and
/// treat anything outside the source as background.
#[derive(Debug, Clone, Copy)]
pub struct RotationMap {
    cos: f64,
    sin: f64,
    cx: f64,
    cy: f64,
}

impl RotationMap {
    pub fn new(width: u32, height: u32, degrees: f64) -> Self {
        let radians = degrees.to_radians();
        Self {
            cos: radians.cos(),
            sin: radians.sin(),
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// Source coordinate that lands on destination pixel `(x, y)`.
    #[inline]
    pub fn source_of(&self, x: u32, y: u32) -> (f64, f64) {
        let dx = x as f64 - self.cx;
        let dy = y as f64 - self.cy;
        (
            self.cos * dx - self.sin * dy + self.cx,
            self.sin * dx + self.cos * dy + self.cy,
        )
    }
}
