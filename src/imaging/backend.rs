//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between the serving runtime and the
//! pixel work: it takes an encoded image and a [`Transform`] and returns the
//! encoded result. The session never looks inside the bytes.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` from this module.

use super::params::Transform;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Payload is not a supported image: {0}")]
    Decode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Trait for image processing backends.
///
/// Backends are shared by every worker thread, so they must be `Send + Sync`
/// and must not keep per-request state.
pub trait ImageBackend: Send + Sync {
    /// Decode `input`, apply `transform`, and re-encode the result.
    fn apply(&self, transform: &Transform, input: &[u8]) -> Result<Vec<u8>, BackendError>;
}

impl<B: ImageBackend + ?Sized> ImageBackend for std::sync::Arc<B> {
    fn apply(&self, transform: &Transform, input: &[u8]) -> Result<Vec<u8>, BackendError> {
        (**self).apply(transform, input)
    }
}
