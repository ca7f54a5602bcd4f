// ABOUTME: Bollard-based container runtime implementation.
// ABOUTME: Talks to the local engine REST API over a unix socket or plain TCP.

use crate::runtime::connect::ConnectOptions;
use crate::runtime::error::{ConnectionSnafu, RuntimeError, TlsHostSnafu, UnreachableSnafu};
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ContainerConfig, ContainerDetails, ContainerError, ContainerFilters, ContainerOps,
    ContainerState, ContainerSummary, CreateContainerRequest, ExecError, ExecInfo, ExecOps,
    ImageConfig, ImageDetails, ImageError, ImageOps, NetworkError, NetworkOps, RegistryAuth,
    RemoveOptions,
};
use crate::types::{ContainerId, ImageId};
use async_trait::async_trait;
use bollard::{ClientVersion, Docker};
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, EndpointSettings, NetworkingConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, RemoveContainerOptions, RemoveImageOptions, RenameContainerOptions,
};
use futures::StreamExt;
use snafu::{OptionExt, ResultExt};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

/// Engine address used when `DOCKER_HOST` is unset.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_image_pull_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 401 || *status_code == 403 =>
        {
            ImageError::AuthenticationFailed(image_name.to_string())
        }
        _ => ImageError::PullFailed(format!("{}: {}", image_name, e)),
    }
}

fn map_image_not_found_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ImageError::NotFound(image_name.to_string())
        }
        _ => ImageError::Runtime(format!("failed to inspect {}: {}", image_name, e)),
    }
}

fn map_image_remove_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ImageError::NotFound(image_name.to_string())
        }
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 409 =>
        {
            ImageError::InUse(image_name.to_string())
        }
        _ => ImageError::Runtime(format!("failed to remove {}: {}", image_name, e)),
    }
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::ImageNotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::AlreadyExists(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::AlreadyRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_kill_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::NotRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_rename_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::AlreadyExists(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_network_error(e: bollard::errors::Error) -> NetworkError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => NetworkError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 403 => NetworkError::NotConnected(message.clone()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_exec_create_error(e: bollard::errors::Error) -> ExecError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ExecError::ContainerNotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ExecError::ContainerNotRunning(message.clone()),
        _ => ExecError::Runtime(e.to_string()),
    }
}

fn map_exec_not_found_error(e: bollard::errors::Error) -> ExecError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ExecError::ExecNotFound(message.clone()),
        _ => ExecError::Runtime(e.to_string()),
    }
}

// =============================================================================
// Model conversion
// =============================================================================

fn to_btree(map: Option<HashMap<String, String>>) -> BTreeMap<String, String> {
    map.unwrap_or_default().into_iter().collect()
}

fn container_config_from_model(config: bollard::models::ContainerConfig) -> ContainerConfig {
    ContainerConfig {
        hostname: config.hostname.unwrap_or_default(),
        domainname: config.domainname.unwrap_or_default(),
        user: config.user.unwrap_or_default(),
        attach_stdin: config.attach_stdin.unwrap_or(false),
        attach_stdout: config.attach_stdout.unwrap_or(false),
        attach_stderr: config.attach_stderr.unwrap_or(false),
        tty: config.tty.unwrap_or(false),
        open_stdin: config.open_stdin.unwrap_or(false),
        stdin_once: config.stdin_once.unwrap_or(false),
        env: config.env.unwrap_or_default(),
        cmd: config.cmd,
        entrypoint: config.entrypoint,
        image: config.image.unwrap_or_default(),
        working_dir: config.working_dir.unwrap_or_default(),
        labels: to_btree(config.labels),
        volumes: config.volumes.unwrap_or_default(),
        exposed_ports: config.exposed_ports.unwrap_or_default(),
        healthcheck: config.healthcheck,
        stop_signal: config.stop_signal,
        stop_timeout: config.stop_timeout,
    }
}

fn image_config_from_model(config: bollard::models::ImageConfig) -> ImageConfig {
    ImageConfig {
        user: config.user.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        cmd: config.cmd,
        entrypoint: config.entrypoint,
        working_dir: config.working_dir.unwrap_or_default(),
        labels: to_btree(config.labels),
        volumes: config.volumes.unwrap_or_default(),
        exposed_ports: config.exposed_ports.unwrap_or_default(),
        healthcheck: config.healthcheck,
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn create_body(request: &CreateContainerRequest) -> ContainerCreateBody {
    let config = &request.config;
    let endpoints: HashMap<String, EndpointSettings> = request
        .networks
        .iter()
        .map(|(name, endpoint)| (name.clone(), endpoint.clone()))
        .collect();

    ContainerCreateBody {
        hostname: non_empty(&config.hostname),
        domainname: non_empty(&config.domainname),
        user: non_empty(&config.user),
        attach_stdin: Some(config.attach_stdin),
        attach_stdout: Some(config.attach_stdout),
        attach_stderr: Some(config.attach_stderr),
        tty: Some(config.tty),
        open_stdin: Some(config.open_stdin),
        stdin_once: Some(config.stdin_once),
        env: Some(config.env.clone()),
        cmd: config.cmd.clone(),
        entrypoint: config.entrypoint.clone(),
        image: Some(config.image.clone()),
        working_dir: non_empty(&config.working_dir),
        labels: Some(config.labels.clone().into_iter().collect()),
        volumes: if config.volumes.is_empty() {
            None
        } else {
            Some(config.volumes.clone())
        },
        exposed_ports: if config.exposed_ports.is_empty() {
            None
        } else {
            Some(config.exposed_ports.clone())
        },
        healthcheck: config.healthcheck.clone(),
        stop_signal: config.stop_signal.clone(),
        stop_timeout: config.stop_timeout,
        host_config: Some(request.host_config.clone()),
        networking_config: Some(NetworkingConfig {
            endpoints_config: Some(endpoints),
        }),
        ..Default::default()
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container runtime implementation using bollard.
pub struct BollardRuntime {
    client: Docker,
}

impl BollardRuntime {
    /// Create a new BollardRuntime from a Docker client.
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Connect to the engine at `options.host` (`unix://`, `tcp://`, `http://`,
    /// or `https://` with TLS files).
    pub fn connect(options: &ConnectOptions) -> Result<Self, RuntimeError> {
        let secs = options.timeout.as_secs().max(1);
        let pinned = options.api_version.map(|v| ClientVersion {
            major_version: v.major,
            minor_version: v.minor,
        });
        let version = pinned.as_ref().unwrap_or(bollard::API_DEFAULT_VERSION);
        let host = options.host.as_str();

        let client = if let Some(tls) = &options.tls {
            let addr = host
                .strip_prefix("tcp://")
                .or_else(|| host.strip_prefix("https://"))
                .context(TlsHostSnafu { host })?;
            debug!(addr, ca = %tls.ca.display(), "Connecting to engine with TLS");
            Docker::connect_with_ssl(addr, &tls.key, &tls.cert, &tls.ca, secs, version)
                .context(ConnectionSnafu)?
        } else if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_unix(path, secs, version).context(ConnectionSnafu)?
        } else if let Some(addr) = host.strip_prefix("tcp://") {
            Docker::connect_with_http(&format!("http://{}", addr), secs, version)
                .context(ConnectionSnafu)?
        } else if host.starts_with("http://") {
            Docker::connect_with_http(host, secs, version).context(ConnectionSnafu)?
        } else {
            return Err(RuntimeError::UnsupportedHost {
                host: host.to_string(),
            });
        };
        Ok(Self::new(client))
    }

    /// Verify the engine answers before the first session.
    pub async fn ping(&self, host: &str) -> Result<(), RuntimeError> {
        self.client
            .ping()
            .await
            .context(UnreachableSnafu { host })?;
        Ok(())
    }
}

// Implement Sealed trait to allow runtime trait implementations
impl Sealed for BollardRuntime {}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        let opts = CreateImageOptions {
            from_image: Some(reference.to_string()),
            ..Default::default()
        };

        let credentials = auth.map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server.clone(),
            ..Default::default()
        });

        // The engine aborts the pull if the progress stream is dropped early.
        let mut stream = self.client.create_image(Some(opts), None, credentials);
        while let Some(result) = stream.next().await {
            result.map_err(|e| map_image_pull_error(e, reference))?;
        }

        Ok(())
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails, ImageError> {
        let image = self
            .client
            .inspect_image(reference)
            .await
            .map_err(|e| map_image_not_found_error(e, reference))?;

        Ok(ImageDetails {
            id: ImageId::new(image.id.unwrap_or_default()),
            repo_digests: image.repo_digests.unwrap_or_default(),
            config: image
                .config
                .map(image_config_from_model)
                .unwrap_or_default(),
        })
    }

    async fn remove_image(&self, id: &ImageId, force: bool) -> Result<(), ImageError> {
        let opts = RemoveImageOptions {
            force,
            ..Default::default()
        };

        let items = self
            .client
            .remove_image(id.as_str(), Some(opts), None)
            .await
            .map_err(|e| map_image_remove_error(e, id.as_str()))?;

        for item in items {
            debug!(
                deleted = item.deleted.as_deref().unwrap_or_default(),
                untagged = item.untagged.as_deref().unwrap_or_default(),
                "image removal"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();
        if !filters.statuses.is_empty() {
            filter_map.insert("status".to_string(), filters.statuses.clone());
        }

        let opts = ListContainersOptions {
            all: true,
            filters: Some(filter_map),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                ContainerSummary {
                    id: ContainerId::new(c.id.unwrap_or_default()),
                    name,
                    image: c.image.unwrap_or_default(),
                    state: c
                        .state
                        .map(|s| format!("{:?}", s).to_lowercase())
                        .unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, ContainerError> {
        let details = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let state = details
            .state
            .map(|s| ContainerState {
                running: s.running.unwrap_or(false),
                restarting: s.restarting.unwrap_or(false),
                status: s
                    .status
                    .map(|st| format!("{:?}", st).to_lowercase())
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        let networks = details
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default()
            .into_iter()
            .collect();

        Ok(ContainerDetails {
            id: ContainerId::new(details.id.unwrap_or_default()),
            name: details.name.unwrap_or_default(),
            created: details
                .created
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
            image: ImageId::new(details.image.unwrap_or_default()),
            state,
            config: details
                .config
                .map(container_config_from_model)
                .unwrap_or_default(),
            host_config: details.host_config.unwrap_or_default(),
            networks,
        })
    }

    async fn kill_container(&self, id: &ContainerId, signal: &str) -> Result<(), ContainerError> {
        let opts = KillContainerOptions {
            signal: signal.to_string(),
        };

        self.client
            .kill_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_kill_error)
    }

    async fn remove_container(
        &self,
        id: &ContainerId,
        opts: RemoveOptions,
    ) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force: opts.force,
            v: opts.volumes,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }

    async fn create_container(
        &self,
        request: &CreateContainerRequest,
    ) -> Result<ContainerId, ContainerError> {
        let opts = CreateContainerOptions {
            name: Some(request.name.trim_start_matches('/').to_string()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), create_body(request))
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(map_container_start_error)
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        self.client
            .rename_container(
                id.as_str(),
                RenameContainerOptions {
                    name: new_name.to_string(),
                },
            )
            .await
            .map_err(map_container_rename_error)
    }
}

#[async_trait]
impl NetworkOps for BollardRuntime {
    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &str,
        endpoint: &EndpointSettings,
    ) -> Result<(), NetworkError> {
        let config = bollard::models::NetworkConnectRequest {
            container: container.to_string(),
            endpoint_config: Some(endpoint.clone()),
        };

        self.client
            .connect_network(network, config)
            .await
            .map_err(map_network_error)
    }

    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &str,
        force: bool,
    ) -> Result<(), NetworkError> {
        let config = bollard::models::NetworkDisconnectRequest {
            container: container.to_string(),
            force: Some(force),
        };

        self.client
            .disconnect_network(network, config)
            .await
            .map_err(map_network_error)
    }
}

#[async_trait]
impl ExecOps for BollardRuntime {
    async fn exec_create(
        &self,
        container: &ContainerId,
        cmd: &[String],
    ) -> Result<String, ExecError> {
        let opts = bollard::models::ExecConfig {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            ..Default::default()
        };

        let response = self
            .client
            .create_exec(container.as_str(), opts)
            .await
            .map_err(map_exec_create_error)?;

        Ok(response.id)
    }

    async fn exec_start(&self, exec_id: &str) -> Result<String, ExecError> {
        let opts = StartExecOptions {
            detach: false,
            tty: true,
            ..Default::default()
        };

        let result = self
            .client
            .start_exec(exec_id, Some(opts))
            .await
            .map_err(map_exec_not_found_error)?;

        let mut output = Vec::new();
        if let StartExecResults::Attached { output: mut stream, .. } = result {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(log) => output.extend_from_slice(&log.into_bytes()),
                    Err(e) => return Err(ExecError::Failed(e.to_string())),
                }
            }
        }

        Ok(String::from_utf8_lossy(&output).trim().to_string())
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInfo, ExecError> {
        let details = self
            .client
            .inspect_exec(exec_id)
            .await
            .map_err(map_exec_not_found_error)?;

        Ok(ExecInfo {
            id: exec_id.to_string(),
            running: details.running.unwrap_or(false),
            exit_code: details.exit_code,
        })
    }
}
