// ABOUTME: Container operations trait for container runtimes.
// ABOUTME: List, inspect, kill, remove, create, start and rename containers.

use super::sealed::Sealed;
use super::shared_types::{ContainerDetails, CreateContainerRequest};
use crate::types::ContainerId;
use async_trait::async_trait;

/// Container lifecycle operations.
#[async_trait]
pub trait ContainerOps: Sealed + Send + Sync {
    /// List containers whose status is one of `filters.statuses`.
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;

    /// Inspect a container by id or name.
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, ContainerError>;

    /// Send a signal to the container's main process.
    async fn kill_container(&self, id: &ContainerId, signal: &str) -> Result<(), ContainerError>;

    /// Remove a container.
    async fn remove_container(
        &self,
        id: &ContainerId,
        opts: RemoveOptions,
    ) -> Result<(), ContainerError>;

    /// Create a container. Only one network endpoint is honoured by the engine.
    async fn create_container(
        &self,
        request: &CreateContainerRequest,
    ) -> Result<ContainerId, ContainerError>;

    /// Start a created container.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Rename a container.
    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError>;
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Engine-side status filter (`running`, `created`, `exited`, `restarting`).
    pub statuses: Vec<String>,
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub force: bool,
    /// Remove anonymous volumes along with the container.
    pub volumes: bool,
}

/// Summary information about a container.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: String,
}

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("container already running: {0}")]
    AlreadyRunning(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}
