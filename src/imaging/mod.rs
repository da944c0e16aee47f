//! Image transformation: pure Rust, on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` → RGB8 |
//! | **Geometry** | `resize_exact` (pixel budget), `flipv`/`fliph`, custom bilinear rotate |
//! | **Tone** | per-channel gain, offset and gamma LUT (rayon) |
//! | **Colour** | `to_luma8`, custom HSV / HSL / YCrCb |
//! | **Smooth** | `blur`, `filter3x3` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and tone math (unit testable)
//! - **Parameters**: [`Transform`] and the categorical parameter types
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`TransformHandle`], the per-session binding of a transform to a backend

pub mod backend;
pub mod calculations;
mod colour;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use operations::TransformHandle;
pub use params::{
    ColourSpace, DEFAULT_MAX_PIXELS, EncodeParams, FlipAxis, OutputFormat, Quality, SmoothKernel,
    Transform,
};
pub use rust_backend::RustBackend;
