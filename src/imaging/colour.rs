//! Per-pixel colour-space conversions on packed 8-bit RGB buffers.
//!
//! Results are written back into the same three channels, using the common
//! 8-bit conventions:
//!
//! | Space | Channel 0 | Channel 1 | Channel 2 |
//! |---|---|---|---|
//! | HSV | hue / 2 (0–179) | saturation | value |
//! | HSL | hue / 2 (0–179) | lightness | saturation |
//! | YCC | luma (BT.601) | Cr + 128 | Cb + 128 |
//!
//! Conversions are data-parallel over pixels via rayon.

use super::calculations::saturate;
use rayon::prelude::*;

/// Apply `convert` to every RGB triple of `buf` in place.
pub fn convert_in_place<F>(buf: &mut [u8], convert: F)
where
    F: Fn([u8; 3]) -> [u8; 3] + Sync,
{
    buf.par_chunks_exact_mut(3).for_each(|px| {
        let out = convert([px[0], px[1], px[2]]);
        px.copy_from_slice(&out);
    });
}

/// Hue in degrees (0–360), plus max and min channel, all on 0–1 scale.
fn hue_max_min(rgb: [u8; 3]) -> (f64, f64, f64) {
    let r = rgb[0] as f64 / 255.0;
    let g = rgb[1] as f64 / 255.0;
    let b = rgb[2] as f64 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        60.0 * (b - r) / delta + 120.0
    } else {
        60.0 * (r - g) / delta + 240.0
    };
    let hue = if hue < 0.0 { hue + 360.0 } else { hue };
    (hue, max, min)
}

pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let (hue, max, min) = hue_max_min(rgb);
    let s = if max == 0.0 { 0.0 } else { (max - min) / max };
    [saturate(hue / 2.0).min(179), saturate(s * 255.0), saturate(max * 255.0)]
}

pub fn rgb_to_hsl(rgb: [u8; 3]) -> [u8; 3] {
    let (hue, max, min) = hue_max_min(rgb);
    let l = (max + min) / 2.0;
    let delta = max - min;
    let s = if delta == 0.0 {
        0.0
    } else if l < 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };
    [saturate(hue / 2.0).min(179), saturate(l * 255.0), saturate(s * 255.0)]
}

pub fn rgb_to_ycc(rgb: [u8; 3]) -> [u8; 3] {
    let r = rgb[0] as f64;
    let g = rgb[1] as f64;
    let b = rgb[2] as f64;
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cr = (r - y) * 0.713 + 128.0;
    let cb = (b - y) * 0.564 + 128.0;
    [saturate(y), saturate(cr), saturate(cb)]
}
