// ABOUTME: Engine adapter: the update engine's only way to touch containers.
// ABOUTME: Wraps any Runtime with list/get/stop/start/rename/pull/remove-image/exec semantics.

mod exec;

pub use exec::ExecOutcome;

use crate::container::{ConfigError, Container, is_container_network, is_host_network};
use crate::filters::Filter;
use crate::resolver::{ImageResolver, Resolution, ResolveError};
use crate::runtime::{
    ContainerError, ContainerFilters, ExecError, ImageError, NetworkError, RemoveOptions, Runtime,
};
use crate::types::{ContainerId, ImageId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Interval between state polls while waiting for a container to stop or disappear.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("container {0} could not be removed")]
    NotRemoved(String),
}

/// Behaviour switches for the adapter, fixed for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub pull_images: bool,
    pub remove_volumes: bool,
    pub include_stopped: bool,
    pub revive_stopped: bool,
    pub include_restarting: bool,
}

impl EngineOptions {
    /// Engine-side status filter: running, plus created/exited and restarting on request.
    pub fn status_filter(&self) -> ContainerFilters {
        let mut statuses = vec!["running".to_string()];
        if self.include_stopped {
            statuses.push("created".to_string());
            statuses.push("exited".to_string());
        }
        if self.include_restarting {
            statuses.push("restarting".to_string());
        }
        ContainerFilters { statuses }
    }
}

enum Wait {
    Stopped,
    Gone,
    TimedOut,
}

pub struct Engine<R> {
    runtime: Arc<R>,
    resolver: ImageResolver,
    options: EngineOptions,
}

impl<R: Runtime> Engine<R> {
    pub fn new(runtime: Arc<R>, resolver: ImageResolver, options: EngineOptions) -> Self {
        Self {
            runtime,
            resolver,
            options,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Lists containers matching the status filter, inspects each and keeps
    /// those the predicate accepts.
    pub async fn list(&self, filter: &Filter) -> Result<Vec<Container>, EngineError> {
        let summaries = self
            .runtime
            .list_containers(&self.options.status_filter())
            .await?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let container = self.get(&summary.id).await?;
            if filter.accepts(&container) {
                containers.push(container);
            }
        }
        Ok(containers)
    }

    /// Inspects one container. Missing image info is tolerated.
    pub async fn get(&self, id: &ContainerId) -> Result<Container, EngineError> {
        let mut details = self.runtime.inspect_container(id.as_str()).await?;

        if is_container_network(&details.host_config) {
            let provider = details
                .host_config
                .network_mode
                .as_deref()
                .and_then(|mode| mode.strip_prefix("container:"))
                .unwrap_or_default()
                .to_string();
            match self.runtime.inspect_container(&provider).await {
                Ok(parent) => {
                    details.host_config.network_mode = Some(format!("container:{}", parent.name));
                }
                Err(e) => {
                    tracing::warn!(container = %details.name, provider = %provider, "Unable to resolve network container: {}", e);
                }
            }
        }

        let image = match self.runtime.inspect_image(details.image.as_str()).await {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(container = %details.name, "Failed to retrieve container image info: {}", e);
                None
            }
        };

        Ok(Container::new(details, image))
    }

    /// Signals the container, waits for it to stop, then removes it.
    ///
    /// An elapsed wait is not an error; the container is force-removed anyway.
    pub async fn stop(&self, container: &Container, timeout: Duration) -> Result<(), EngineError> {
        let id = container.id();
        let signal = container.stop_signal();

        if container.is_running() {
            tracing::info!(container = %container.name(), signal = %signal, "Stopping container");
            self.runtime.kill_container(id, signal).await?;
        }

        if let Wait::TimedOut = self.wait_for_stop(id, timeout).await {
            tracing::debug!(container = %container.name(), "Container did not stop in time, removing it anyway");
        }

        let auto_remove = container.details().host_config.auto_remove.unwrap_or(false);
        if auto_remove {
            tracing::debug!(container = %container.name(), "AutoRemove container, skipping remove call");
        } else {
            tracing::debug!(container = %container.name(), "Removing container");
            let opts = RemoveOptions {
                force: true,
                volumes: self.options.remove_volumes,
            };
            match self.runtime.remove_container(id, opts).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        match self.wait_for_removal(id, timeout).await {
            Wait::Gone => Ok(()),
            _ => Err(EngineError::NotRemoved(container.name().to_string())),
        }
    }

    async fn wait_for_stop(&self, id: &ContainerId, timeout: Duration) -> Wait {
        let deadline = Instant::now() + timeout;
        loop {
            match self.runtime.inspect_container(id.as_str()).await {
                Err(_) => return Wait::Gone,
                Ok(details) if !details.state.running => return Wait::Stopped,
                Ok(_) => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Wait::TimedOut;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn wait_for_removal(&self, id: &ContainerId, timeout: Duration) -> Wait {
        let deadline = Instant::now() + timeout;
        loop {
            if self.runtime.inspect_container(id.as_str()).await.is_err() {
                return Wait::Gone;
            }
            let now = Instant::now();
            if now >= deadline {
                return Wait::TimedOut;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Recreates the container under its original name and returns the new id.
    ///
    /// Create accepts a single endpoint, so every original endpoint is
    /// reconnected afterwards unless the container uses host networking.
    pub async fn start(&self, container: &Container) -> Result<ContainerId, EngineError> {
        let request = container.create_request()?;
        let all_networks = container.network_config();

        tracing::info!(container = %container.name(), image = %request.config.image, "Creating container");
        let new_id = self.runtime.create_container(&request).await?;

        if !is_host_network(&request.host_config) {
            for network in request.networks.keys() {
                self.runtime
                    .disconnect_from_network(&new_id, network, true)
                    .await?;
            }
            for (network, endpoint) in &all_networks {
                self.runtime
                    .connect_to_network(&new_id, network, endpoint)
                    .await?;
            }
        }

        if !container.is_running() && !self.options.revive_stopped {
            return Ok(new_id);
        }

        tracing::debug!(container = %container.name(), id = %new_id.short_id(), "Starting container");
        self.runtime.start_container(&new_id).await?;
        Ok(new_id)
    }

    pub async fn rename(&self, container: &Container, new_name: &str) -> Result<(), EngineError> {
        tracing::debug!(container = %container.name(), new_name = %new_name, "Renaming container");
        self.runtime
            .rename_container(container.id(), new_name)
            .await
            .map_err(Into::into)
    }

    pub async fn remove_image(&self, id: &ImageId) -> Result<(), EngineError> {
        tracing::info!(image = %id.short_id(), "Removing image");
        self.runtime.remove_image(id, true).await.map_err(Into::into)
    }

    /// Resolves whether the container's image is stale. Pulling honours the
    /// global switch and the container's no-pull label.
    pub async fn is_stale(
        &self,
        container: &Container,
        label_precedence: bool,
    ) -> Result<Resolution, ResolveError> {
        let pull = !container.no_pull(!self.options.pull_images, label_precedence);
        self.resolver
            .resolve(self.runtime.as_ref(), container, pull)
            .await
    }
}
