// ABOUTME: Image operations trait for container runtimes.
// ABOUTME: Pull, inspect and remove container images.

use super::sealed::Sealed;
use super::shared_types::{ImageDetails, RegistryAuth};
use crate::types::ImageId;
use async_trait::async_trait;

/// Image operations: pull, inspect, remove.
#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// Pull an image from a registry, draining the progress stream to the end.
    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError>;

    /// Inspect an image by reference or id.
    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails, ImageError>;

    /// Remove an image by id.
    async fn remove_image(&self, id: &ImageId, force: bool) -> Result<(), ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("authentication failed for registry: {0}")]
    AuthenticationFailed(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("image in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
