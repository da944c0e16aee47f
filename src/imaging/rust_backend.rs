//! Pure Rust image processing backend built on the `image` crate.
//!
//! Every payload is decoded to 8-bit RGB (alpha is dropped), transformed,
//! and re-encoded with the configured [`EncodeParams`].
//!
//! ## Operation mapping
//!
//! | Operation | Implementation |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP) | `image::load_from_memory` |
//! | resize | `DynamicImage::resize_exact` with `Triangle` (bilinear) filter |
//! | rotate | inverse-mapped bilinear sampling, canvas size kept, black fill |
//! | flip | `DynamicImage::flipv` / `fliph` |
//! | brightness / contrast / gamma | per-channel maps over the raw buffer (rayon) |
//! | colour | `to_luma8` for grey, [`colour`](super::colour) conversions otherwise |
//! | smooth | `blur` (Gaussian), `filter3x3` (box mean, sharpen) |
//! | Encode | `JpegEncoder::new_with_quality` or PNG |

use super::backend::{BackendError, ImageBackend};
use super::calculations::{RotationMap, gamma_lut, saturate, scaled_dimensions};
use super::colour;
use super::params::{
    ColourSpace, DEFAULT_MAX_PIXELS, EncodeParams, FlipAxis, OutputFormat, SmoothKernel, Transform,
};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use rayon::prelude::*;
use std::io::Cursor;

/// Sigma for the `gauss` kernel; roughly a 5x5 Gaussian.
const GAUSS_SIGMA: f32 = 1.1;

const BOX_KERNEL: [f32; 9] = [1.0 / 9.0; 9];
const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the operation mapping.
#[derive(Debug, Clone, Copy)]
pub struct RustBackend {
    encode: EncodeParams,
    max_pixels: u64,
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::with_encoding(EncodeParams::default())
    }
}

impl RustBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(encode: EncodeParams) -> Self {
        Self {
            encode,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    /// Refuse transforms whose output would exceed `max_pixels` pixels.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }
}

/// Decode an image from memory, normalised to 8-bit RGB.
fn decode(input: &[u8]) -> Result<RgbImage, BackendError> {
    if input.is_empty() {
        return Err(BackendError::Decode("empty payload".into()));
    }
    let img = image::load_from_memory(input).map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(img.to_rgb8())
}

fn encode(img: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
    let mut buf = Cursor::new(Vec::new());
    match params.format {
        OutputFormat::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut buf,
                params.quality.value() as u8,
            );
            img.write_with_encoder(encoder)
                .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {e}")))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut buf, ImageFormat::Png)
                .map_err(|e| BackendError::Encode(format!("PNG encode failed: {e}")))?;
        }
    }
    Ok(buf.into_inner())
}

/// Map every channel byte through `f`, in parallel.
fn map_channels<F>(mut img: RgbImage, f: F) -> RgbImage
where
    F: Fn(u8) -> u8 + Sync,
{
    let buf: &mut [u8] = &mut img;
    buf.par_iter_mut().for_each(|v| *v = f(*v));
    img
}

/// Resize by `scale`. The target size is checked before any buffer exists.
fn resize(img: RgbImage, scale: f64, max_pixels: u64) -> Result<DynamicImage, BackendError> {
    let (width, height) =
        scaled_dimensions(img.dimensions(), scale, max_pixels).ok_or_else(|| {
            BackendError::ProcessingFailed(format!(
                "resize factor {scale} gives no usable size for {}x{} within {max_pixels} pixels",
                img.width(),
                img.height()
            ))
        })?;
    Ok(DynamicImage::ImageRgb8(img).resize_exact(width, height, FilterType::Triangle))
}

/// Rotate about the centre, keeping the canvas size. Uncovered pixels are black.
fn rotate(img: &RgbImage, degrees: f64) -> RgbImage {
    let (width, height) = img.dimensions();
    let map = RotationMap::new(width, height, degrees);
    let mut out = RgbImage::new(width, height);
    let row_len = width as usize * 3;
    if row_len == 0 {
        return out;
    }

    let buf: &mut [u8] = &mut out;
    buf.par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let (sx, sy) = map.source_of(x, y as u32);
                let px = sample_bilinear(img, sx, sy);
                let i = x as usize * 3;
                row[i..i + 3].copy_from_slice(&px);
            }
        });
    out
}

/// Bilinear sample at a fractional position; outside the image reads as black.
fn sample_bilinear(img: &RgbImage, x: f64, y: f64) -> [u8; 3] {
    let (width, height) = img.dimensions();
    if x < -1.0 || y < -1.0 || x >= width as f64 || y >= height as f64 {
        return [0, 0, 0];
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |px: f64, py: f64| -> [f64; 3] {
        if px < 0.0 || py < 0.0 || px >= width as f64 || py >= height as f64 {
            return [0.0; 3];
        }
        let p = img.get_pixel(px as u32, py as u32).0;
        [p[0] as f64, p[1] as f64, p[2] as f64]
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1.0, y0);
    let bl = fetch(x0, y0 + 1.0);
    let br = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bottom = bl[c] * (1.0 - fx) + br[c] * fx;
        out[c] = saturate(top * (1.0 - fy) + bottom * fy);
    }
    out
}

fn flip(img: RgbImage, axis: FlipAxis) -> DynamicImage {
    let img = DynamicImage::ImageRgb8(img);
    match axis {
        FlipAxis::Vertical => img.flipv(),
        FlipAxis::Horizontal => img.fliph(),
        FlipAxis::Both => img.flipv().fliph(),
    }
}

fn convert_colour(mut img: RgbImage, space: ColourSpace) -> DynamicImage {
    match space {
        ColourSpace::Rgb => DynamicImage::ImageRgb8(img),
        ColourSpace::Grey => DynamicImage::ImageLuma8(DynamicImage::ImageRgb8(img).to_luma8()),
        ColourSpace::Hsv => {
            colour::convert_in_place(&mut img, colour::rgb_to_hsv);
            DynamicImage::ImageRgb8(img)
        }
        ColourSpace::Hsl => {
            colour::convert_in_place(&mut img, colour::rgb_to_hsl);
            DynamicImage::ImageRgb8(img)
        }
        ColourSpace::Ycc => {
            colour::convert_in_place(&mut img, colour::rgb_to_ycc);
            DynamicImage::ImageRgb8(img)
        }
    }
}

fn smooth(img: RgbImage, kernel: SmoothKernel) -> DynamicImage {
    let img = DynamicImage::ImageRgb8(img);
    match kernel {
        SmoothKernel::Gauss => img.blur(GAUSS_SIGMA),
        SmoothKernel::Box => img.filter3x3(&BOX_KERNEL),
        SmoothKernel::Sharp => img.filter3x3(&SHARPEN_KERNEL),
    }
}

/// Apply a transform to a decoded image.
fn transform_image(
    img: RgbImage,
    transform: &Transform,
    max_pixels: u64,
) -> Result<DynamicImage, BackendError> {
    let out = match *transform {
        Transform::Resize { scale } => resize(img, scale, max_pixels)?,
        Transform::Rotate { degrees } => DynamicImage::ImageRgb8(rotate(&img, degrees)),
        Transform::Flip(axis) => flip(img, axis),
        Transform::Brightness { gain } => {
            DynamicImage::ImageRgb8(map_channels(img, |v| saturate(v as f64 * gain)))
        }
        Transform::Contrast { offset } => {
            DynamicImage::ImageRgb8(map_channels(img, |v| saturate(v as f64 + offset)))
        }
        Transform::Gamma { exponent } => {
            let lut = gamma_lut(exponent);
            DynamicImage::ImageRgb8(map_channels(img, |v| lut[v as usize]))
        }
        Transform::Colour(space) => convert_colour(img, space),
        Transform::Smooth(kernel) => smooth(img, kernel),
    };
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn apply(&self, transform: &Transform, input: &[u8]) -> Result<Vec<u8>, BackendError> {
        let img = decode(input)?;
        let out = transform_image(img, transform, self.max_pixels)?;
        encode(&out, &self.encode)
    }
}
