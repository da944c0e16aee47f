//! Parameter types for image transformations.
//!
//! These types describe *what* to do to an image, not *how*. A [`Transform`]
//! is produced by the [`registry`](crate::registry) from a validated
//! instruction and handed to an [`ImageBackend`](super::ImageBackend), which
//! does the pixel work. Keeping the description separate from the backend
//! lets the session and server be tested against a mock backend.
//!
//! ## Types
//!
//! - [`Transform`]: one concrete, parameter-bound transformation (closed set).
//! - [`FlipAxis`], [`ColourSpace`], [`SmoothKernel`]: categorical parameters.
//! - [`Quality`]: lossy encoding quality (1-100, default 90). Clamped on construction.
//! - [`OutputFormat`] / [`EncodeParams`]: how the result is re-encoded for the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

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
        Self(90)
    }
}

/// Encoding used for the response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => f.write_str("jpeg"),
            OutputFormat::Png => f.write_str("png"),
        }
    }
}

/// Largest output a transform may produce, in pixels (about 150 MB of RGB).
pub const DEFAULT_MAX_PIXELS: u64 = 50_000_000;

/// How a transformed image is encoded before it goes back on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Quality,
}

/// Which axis (or axes) to mirror the image across.
///
/// Codes follow the instruction grammar: `0` mirrors top-to-bottom, `1`
/// mirrors left-to-right, anything larger mirrors both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    Vertical,
    Horizontal,
    Both,
}

impl FlipAxis {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => FlipAxis::Vertical,
            1 => FlipAxis::Horizontal,
            _ => FlipAxis::Both,
        }
    }
}

/// Target colour space for the `colour` operation.
///
/// Non-RGB spaces are stored channel-packed in an 8-bit RGB buffer, the
/// same way most imaging libraries expose them (hue halved to fit 0–179).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourSpace {
    Rgb,
    Hsv,
    Grey,
    Ycc,
    Hsl,
}

impl ColourSpace {
    pub const NAMES: &'static [&'static str] = &["rgb", "hsv", "grey", "ycc", "hsl"];
}

impl FromStr for ColourSpace {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rgb" => Ok(ColourSpace::Rgb),
            "hsv" => Ok(ColourSpace::Hsv),
            "grey" => Ok(ColourSpace::Grey),
            "ycc" => Ok(ColourSpace::Ycc),
            "hsl" => Ok(ColourSpace::Hsl),
            _ => Err(()),
        }
    }
}

/// Kernel family for the `smooth` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothKernel {
    Gauss,
    Box,
    Sharp,
}

impl SmoothKernel {
    pub const NAMES: &'static [&'static str] = &["gauss", "box", "sharp"];
}

impl FromStr for SmoothKernel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauss" => Ok(SmoothKernel::Gauss),
            "box" => Ok(SmoothKernel::Box),
            "sharp" => Ok(SmoothKernel::Sharp),
            _ => Err(()),
        }
    }
}

/// A concrete transformation with its parameter already parsed and bound.
///
/// This is the closed set of things the server knows how to do. Every
/// variant is handled by every backend; there is no "empty" transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// Multiply width and height by `scale`.
    Resize { scale: f64 },
    /// Rotate counter-clockwise by `degrees` about the image centre.
    Rotate { degrees: f64 },
    Flip(FlipAxis),
    /// Multiply every channel by `gain`, saturating.
    Brightness { gain: f64 },
    /// Add `offset` to every channel, saturating.
    Contrast { offset: f64 },
    /// Power-law tone curve with the given exponent.
    Gamma { exponent: f64 },
    Colour(ColourSpace),
    Smooth(SmoothKernel),
}

impl Transform {
    /// The operation name this transform answers to on the wire.
    pub fn operation(&self) -> &'static str {
        match self {
            Transform::Resize { .. } => "resize",
            Transform::Rotate { .. } => "rotate",
            Transform::Flip(_) => "flip",
            Transform::Brightness { .. } => "brightness",
            Transform::Contrast { .. } => "contrast",
            Transform::Gamma { .. } => "gamma",
            Transform::Colour(_) => "colour",
            Transform::Smooth(_) => "smooth",
        }
    }
}
