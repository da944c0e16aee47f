//! The transformation handle a session holds between validation and output.

use super::backend::{BackendError, ImageBackend};
use super::params::Transform;

/// A validated, parameter-bound transformation tied to the backend that will
/// run it.
///
/// Handles are built per session from a [`Transform`] the registry produced,
/// and expose one capability: [`apply`](Self::apply). They borrow the backend,
/// so they cannot outlive the session that created them.
pub struct TransformHandle<'a> {
    transform: Transform,
    backend: &'a dyn ImageBackend,
}

impl<'a> TransformHandle<'a> {
    pub fn new(transform: Transform, backend: &'a dyn ImageBackend) -> Self {
        Self { transform, backend }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Transform an encoded image into an encoded result.
    pub fn apply(&self, input: &[u8]) -> Result<Vec<u8>, BackendError> {
        self.backend.apply(&self.transform, input)
    }
}

impl std::fmt::Debug for TransformHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformHandle")
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}
