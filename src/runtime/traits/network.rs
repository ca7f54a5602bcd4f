// ABOUTME: Network operations trait for container runtimes.
// ABOUTME: Connect and disconnect containers with full endpoint settings.

use super::sealed::Sealed;
use crate::types::ContainerId;
use async_trait::async_trait;
use bollard::models::EndpointSettings;

/// Network operations: connect, disconnect.
#[async_trait]
pub trait NetworkOps: Sealed + Send + Sync {
    /// Connect a container to a network with the given endpoint settings.
    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &str,
        endpoint: &EndpointSettings,
    ) -> Result<(), NetworkError>;

    /// Disconnect a container from a network.
    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &str,
        force: bool,
    ) -> Result<(), NetworkError>;
}

/// Errors from network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network not found: {0}")]
    NotFound(String),

    #[error("container not connected to network: {0}")]
    NotConnected(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
