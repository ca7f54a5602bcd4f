// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: ContainerDetails, ContainerConfig, ImageDetails, CreateContainerRequest, RegistryAuth.

use crate::types::{ContainerId, ImageId};
use std::collections::BTreeMap;

pub use bollard::models::{EndpointSettings, HealthConfig, HostConfig, PortBinding};

/// Container configuration as reported by inspect or submitted to create.
///
/// Inspect merges image defaults into this; `container::create_config` strips
/// them back out before it is resubmitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerConfig {
    pub hostname: String,
    pub domainname: String,
    pub user: String,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub open_stdin: bool,
    pub stdin_once: bool,
    /// `KEY=value` entries.
    pub env: Vec<String>,
    pub cmd: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub image: String,
    pub working_dir: String,
    pub labels: BTreeMap<String, String>,
    /// Volume mount points.
    pub volumes: Vec<String>,
    /// `port/proto` keys.
    pub exposed_ports: Vec<String>,
    pub healthcheck: Option<HealthConfig>,
    pub stop_signal: Option<String>,
    pub stop_timeout: Option<i64>,
}

/// Execution state of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub running: bool,
    pub restarting: bool,
    /// Engine status string (`running`, `exited`, `created`, ...).
    pub status: String,
}

/// Detailed inspect result for a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerDetails {
    pub id: ContainerId,
    /// Name as reported by the engine, leading `/` included.
    pub name: String,
    /// RFC 3339 creation timestamp.
    pub created: String,
    /// Identity of the image the container was created from.
    pub image: ImageId,
    pub state: ContainerState,
    pub config: ContainerConfig,
    pub host_config: HostConfig,
    /// Endpoint settings keyed by network name.
    pub networks: BTreeMap<String, EndpointSettings>,
}

/// Image defaults that container inspect merges into `ContainerConfig`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageConfig {
    pub user: String,
    pub env: Vec<String>,
    pub cmd: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub working_dir: String,
    pub labels: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    pub exposed_ports: Vec<String>,
    pub healthcheck: Option<HealthConfig>,
}

/// Detailed inspect result for an image.
#[derive(Debug, Clone, Default)]
pub struct ImageDetails {
    pub id: ImageId,
    /// `name@sha256:...` entries.
    pub repo_digests: Vec<String>,
    pub config: ImageConfig,
}

/// Everything the engine needs to create a container.
#[derive(Debug, Clone, Default)]
pub struct CreateContainerRequest {
    pub name: String,
    pub config: ContainerConfig,
    pub host_config: HostConfig,
    /// At most one endpoint; the engine ignores the rest.
    pub networks: BTreeMap<String, EndpointSettings>,
}

/// Registry authentication credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    /// Registry server (e.g., "ghcr.io").
    pub server: Option<String>,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// Exec instance information.
#[derive(Debug, Clone)]
pub struct ExecInfo {
    pub id: String,
    pub running: bool,
    /// Exit code (if finished).
    pub exit_code: Option<i64>,
}
