// ABOUTME: Decides whether a container's image is stale and which image is latest.
// ABOUTME: Tries the registry HEAD digest shortcut before falling back to pull + local inspect.

mod challenge;
mod credentials;
mod registry;

pub use challenge::Challenge;
pub use credentials::{
    CredentialError, CredentialSource, DOCKER_CONFIG_ENV, DockerCredentials, REPO_PASS_ENV,
    REPO_USER_ENV,
};
pub use registry::{DEFAULT_REGISTRY_TIMEOUT, DigestLookup, RegistryClient, RegistryError};

use crate::container::Container;
use crate::runtime::{ImageDetails, ImageError, ImageOps};
use crate::types::{ImageId, ImageRef, ParseImageRefError};
use std::sync::Arc;
use thiserror::Error;

/// Log level policy for failed HEAD shortcuts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum WarnStrategy {
    Always,
    /// Warn only for registries that rate-limit pulls (Docker Hub, GHCR).
    #[default]
    Auto,
    Never,
}

impl WarnStrategy {
    pub fn should_warn(self, image: &ImageRef) -> bool {
        match self {
            WarnStrategy::Always => true,
            WarnStrategy::Never => false,
            WarnStrategy::Auto => image.is_docker_hub() || image.registry_host() == "ghcr.io",
        }
    }
}

/// Outcome of resolving one container's image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub stale: bool,
    pub latest: ImageId,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("container uses a pinned image, and cannot be updated")]
    PinnedImage,

    #[error("invalid image reference {reference}: {source}")]
    InvalidReference {
        reference: String,
        source: ParseImageRefError,
    },

    #[error("failed to resolve registry credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("failed to pull {reference}: {source}")]
    Pull { reference: String, source: ImageError },

    #[error("failed to inspect {reference}: {source}")]
    Inspect { reference: String, source: ImageError },
}

impl ResolveError {
    /// Credential failures skip the container instead of reporting it as scanned.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, ResolveError::Credentials(_))
    }
}

/// True when the registry digest names the local image, either by id or by
/// one of its repo digests.
pub fn digest_matches(image: &ImageDetails, remote: &str) -> bool {
    if image.id.as_str() == remote {
        return true;
    }
    image
        .repo_digests
        .iter()
        .filter_map(|d| d.split_once('@').map(|(_, digest)| digest))
        .any(|local| local == remote)
}

pub struct ImageResolver {
    credentials: Arc<dyn CredentialSource>,
    digests: Option<Arc<dyn DigestLookup>>,
    warn_on_head_failure: WarnStrategy,
}

impl ImageResolver {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        digests: Option<Arc<dyn DigestLookup>>,
        warn_on_head_failure: WarnStrategy,
    ) -> Self {
        Self {
            credentials,
            digests,
            warn_on_head_failure,
        }
    }

    /// Resolves the latest image for `container`. With `pull` unset only the
    /// locally present image is consulted.
    pub async fn resolve<R>(
        &self,
        runtime: &R,
        container: &Container,
        pull: bool,
    ) -> Result<Resolution, ResolveError>
    where
        R: ImageOps + ?Sized,
    {
        let image_name = container.image_name();

        if pull {
            if self.is_up_to_date(runtime, container, &image_name).await? {
                return Ok(Resolution {
                    stale: false,
                    latest: container.image_id().clone(),
                });
            }
        } else {
            tracing::debug!(container = %container.name(), "Skipping image pull");
        }

        let latest = runtime
            .inspect_image(&image_name)
            .await
            .map_err(|source| ResolveError::Inspect {
                reference: image_name.clone(),
                source,
            })?;

        if latest.id == *container.image_id() {
            tracing::debug!(container = %container.name(), image = %image_name, "No new images found");
            Ok(Resolution {
                stale: false,
                latest: latest.id,
            })
        } else {
            tracing::info!(
                container = %container.name(),
                image = %image_name,
                new_image = %latest.id.short_id(),
                "Found new image"
            );
            Ok(Resolution {
                stale: true,
                latest: latest.id,
            })
        }
    }

    /// Pulls the image unless the registry digest shows the local copy is current.
    /// Returns `true` when the pull was skipped for that reason.
    async fn is_up_to_date<R>(
        &self,
        runtime: &R,
        container: &Container,
        image_name: &str,
    ) -> Result<bool, ResolveError>
    where
        R: ImageOps + ?Sized,
    {
        if image_name.starts_with("sha256:") {
            return Err(ResolveError::PinnedImage);
        }
        let reference =
            ImageRef::parse(image_name).map_err(|source| ResolveError::InvalidReference {
                reference: image_name.to_string(),
                source,
            })?;

        let auth = self.credentials.lookup(&reference).await?;

        if let (Some(digests), Some(current)) = (&self.digests, container.image_info()) {
            match digests.latest_digest(&reference, auth.as_ref()).await {
                Ok(remote) if digest_matches(current, &remote) => {
                    tracing::debug!(container = %container.name(), digest = %remote, "No pull needed, skipping image");
                    return Ok(true);
                }
                Ok(remote) => {
                    tracing::debug!(container = %container.name(), digest = %remote, "Digests did not match, doing a pull");
                }
                Err(e) if self.warn_on_head_failure.should_warn(&reference) => {
                    tracing::warn!(container = %container.name(), image = %image_name, "Could not do a head request, falling back to regular pull: {}", e);
                }
                Err(e) => {
                    tracing::debug!(container = %container.name(), image = %image_name, "Could not do a head request, falling back to regular pull: {}", e);
                }
            }
        }

        tracing::debug!(image = %image_name, "Pulling image");
        runtime
            .pull_image(image_name, auth.as_ref())
            .await
            .map_err(|source| ResolveError::Pull {
                reference: image_name.to_string(),
                source,
            })?;
        Ok(false)
    }
}
