// ABOUTME: In-memory container engine implementing every runtime capability.
// ABOUTME: Records an ordered call log so tests can assert on engine side effects.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ContainerDetails, ContainerError, ContainerFilters, ContainerOps, ContainerSummary,
    CreateContainerRequest, EndpointSettings, ExecError, ExecInfo, ExecOps, ImageDetails,
    ImageError, ImageOps, NetworkError, NetworkOps, RegistryAuth, RemoveOptions,
};
use crate::types::{ContainerId, ImageId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// One engine call, named by the container it targeted at the time of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Inspect(String),
    Kill(String, String),
    Remove(String),
    Create(String, String),
    Start(String),
    Rename(String, String),
    Pull(String),
    InspectImage(String),
    RemoveImage(String),
    Connect(String, String),
    Disconnect(String, String),
    ExecCreate(String, String),
    ExecStart(String),
    ExecInspect(String),
}

#[derive(Debug, Clone)]
struct ExecScript {
    exit_code: Option<i64>,
    output: String,
    hangs: bool,
}

#[derive(Debug)]
struct PendingExec {
    command: String,
}

#[derive(Default)]
struct MockState {
    /// Insertion-ordered containers.
    containers: Vec<ContainerDetails>,
    /// Images keyed by reference and by id.
    images: HashMap<String, ImageDetails>,
    /// Image a pull of the reference makes available.
    pull_results: HashMap<String, ImageDetails>,
    scripts: HashMap<String, ExecScript>,
    execs: HashMap<String, PendingExec>,
    failures: HashSet<(MockOp, String)>,
    /// Containers that keep running when signalled.
    ignores_signals: HashSet<String>,
    fail_list: bool,
    calls: Vec<Call>,
    pulls_with_auth: Vec<Option<RegistryAuth>>,
    next_id: u64,
}

/// Engine operations that can be made to fail for a given target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Kill,
    Remove,
    Create,
    Start,
    Rename,
    Pull,
    RemoveImage,
}

/// In-memory engine. Containers and images are seeded by tests; calls mutate state
/// the way the real engine would and are appended to the call log.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

fn bare(name: &str) -> &str {
    name.trim_start_matches('/')
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a container.
    pub fn add_container(&self, details: ContainerDetails) {
        self.state.lock().containers.push(details);
    }

    /// Seed an image, reachable by `reference` and by its id.
    pub fn add_image(&self, reference: &str, details: ImageDetails) {
        let mut state = self.state.lock();
        state
            .images
            .insert(details.id.as_str().to_string(), details.clone());
        state.images.insert(reference.to_string(), details);
    }

    /// Make a pull of `reference` replace the local image with `details`.
    pub fn on_pull(&self, reference: &str, details: ImageDetails) {
        self.state
            .lock()
            .pull_results
            .insert(reference.to_string(), details);
    }

    /// Script the exit code and output of a lifecycle command.
    pub fn on_exec(&self, command: &str, exit_code: i64, output: &str) {
        self.state.lock().scripts.insert(
            command.to_string(),
            ExecScript {
                exit_code: Some(exit_code),
                output: output.to_string(),
                hangs: false,
            },
        );
    }

    /// Make a lifecycle command finish without the engine knowing its exit code.
    pub fn on_exec_without_exit_code(&self, command: &str) {
        self.state.lock().scripts.insert(
            command.to_string(),
            ExecScript {
                exit_code: None,
                output: String::new(),
                hangs: false,
            },
        );
    }

    /// Make a lifecycle command run forever.
    pub fn hang_exec(&self, command: &str) {
        self.state.lock().scripts.insert(
            command.to_string(),
            ExecScript {
                exit_code: None,
                output: String::new(),
                hangs: true,
            },
        );
    }

    /// Make `op` fail when it targets `target` (a container name without `/`, an image
    /// reference or an image id).
    pub fn fail(&self, op: MockOp, target: &str) {
        self.state.lock().failures.insert((op, target.to_string()));
    }

    /// Make the named container keep running after its stop signal, so only
    /// the forced remove gets rid of it.
    pub fn ignore_stop_signal(&self, name: &str) {
        self.state
            .lock()
            .ignores_signals
            .insert(bare(name).to_string());
    }

    pub fn fail_list(&self) {
        self.state.lock().fail_list = true;
    }

    /// Ordered log of every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Calls excluding read-only inspections and listings.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                !matches!(
                    c,
                    Call::List | Call::Inspect(_) | Call::InspectImage(_) | Call::ExecInspect(_)
                )
            })
            .collect()
    }

    /// Credentials passed to each pull, in order.
    pub fn pull_credentials(&self) -> Vec<Option<RegistryAuth>> {
        self.state.lock().pulls_with_auth.clone()
    }

    /// Image stored under a reference or id.
    pub fn image(&self, key: &str) -> Option<ImageDetails> {
        self.state.lock().images.get(key).cloned()
    }

    /// Current engine-side containers.
    pub fn containers(&self) -> Vec<ContainerDetails> {
        self.state.lock().containers.clone()
    }

    /// Look up a live container by name (with or without the leading `/`).
    pub fn container_named(&self, name: &str) -> Option<ContainerDetails> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| bare(&c.name) == bare(name))
            .cloned()
    }
}

impl MockState {
    fn record(&mut self, call: Call) {
        self.calls.push(call);
    }

    fn fails(&self, op: MockOp, target: &str) -> bool {
        self.failures.contains(&(op, target.to_string()))
    }

    fn position(&self, id_or_name: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|c| c.id.as_str() == id_or_name || bare(&c.name) == bare(id_or_name))
    }

    fn name_of(&self, id: &ContainerId) -> String {
        self.position(id.as_str())
            .map(|i| bare(&self.containers[i].name).to_string())
            .unwrap_or_else(|| id.short_id().to_string())
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:0>64x}", 0xc0ffee_0000_u64 + self.next_id)
    }
}

impl Sealed for MockRuntime {}

#[async_trait]
impl ContainerOps for MockRuntime {
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut state = self.state.lock();
        state.record(Call::List);
        if state.fail_list {
            return Err(ContainerError::Runtime(
                "Cannot connect to the engine".to_string(),
            ));
        }
        Ok(state
            .containers
            .iter()
            .filter(|c| filters.statuses.is_empty() || filters.statuses.contains(&c.state.status))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.config.image.clone(),
                state: c.state.status.clone(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, ContainerError> {
        let mut state = self.state.lock();
        state.record(Call::Inspect(id.to_string()));
        match state.position(id) {
            Some(i) => Ok(state.containers[i].clone()),
            None => Err(ContainerError::NotFound(id.to_string())),
        }
    }

    async fn kill_container(&self, id: &ContainerId, signal: &str) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let name = state.name_of(id);
        state.record(Call::Kill(name.clone(), signal.to_string()));
        if state.fails(MockOp::Kill, &name) {
            return Err(ContainerError::Runtime(format!("cannot kill {}", name)));
        }
        let i = state
            .position(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if state.ignores_signals.contains(&name) {
            return Ok(());
        }
        if state.containers[i].host_config.auto_remove.unwrap_or(false) {
            state.containers.remove(i);
        } else {
            let container = &mut state.containers[i];
            container.state.running = false;
            container.state.restarting = false;
            container.state.status = "exited".to_string();
        }
        Ok(())
    }

    async fn remove_container(
        &self,
        id: &ContainerId,
        _opts: RemoveOptions,
    ) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let name = state.name_of(id);
        state.record(Call::Remove(name.clone()));
        if state.fails(MockOp::Remove, &name) {
            return Err(ContainerError::Runtime(format!("cannot remove {}", name)));
        }
        let i = state
            .position(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        state.containers.remove(i);
        Ok(())
    }

    async fn create_container(
        &self,
        request: &CreateContainerRequest,
    ) -> Result<ContainerId, ContainerError> {
        let mut state = self.state.lock();
        let name = bare(&request.name).to_string();
        state.record(Call::Create(name.clone(), request.config.image.clone()));
        if state.fails(MockOp::Create, &name) {
            return Err(ContainerError::Runtime(format!("cannot create {}", name)));
        }
        if state.position(&name).is_some() {
            return Err(ContainerError::AlreadyExists(name));
        }
        let image = state
            .images
            .get(&request.config.image)
            .map(|image| image.id.clone())
            .ok_or_else(|| ContainerError::ImageNotFound(request.config.image.clone()))?;
        let id = ContainerId::new(state.fresh_id());
        state.containers.push(ContainerDetails {
            id: id.clone(),
            name: format!("/{}", name),
            created: chrono::Utc::now().to_rfc3339(),
            image,
            state: crate::runtime::traits::ContainerState {
                running: false,
                restarting: false,
                status: "created".to_string(),
            },
            config: request.config.clone(),
            host_config: request.host_config.clone(),
            networks: request.networks.clone(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let name = state.name_of(id);
        state.record(Call::Start(name.clone()));
        if state.fails(MockOp::Start, &name) {
            return Err(ContainerError::Runtime(format!("cannot start {}", name)));
        }
        let i = state
            .position(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        let container = &mut state.containers[i];
        container.state.running = true;
        container.state.status = "running".to_string();
        Ok(())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let name = state.name_of(id);
        state.record(Call::Rename(name.clone(), new_name.to_string()));
        if state.fails(MockOp::Rename, &name) {
            return Err(ContainerError::Runtime(format!("cannot rename {}", name)));
        }
        let i = state
            .position(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        state.containers[i].name = format!("/{}", bare(new_name));
        Ok(())
    }
}

#[async_trait]
impl ImageOps for MockRuntime {
    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        let mut state = self.state.lock();
        state.record(Call::Pull(reference.to_string()));
        state.pulls_with_auth.push(auth.cloned());
        if state.fails(MockOp::Pull, reference) {
            return Err(ImageError::PullFailed(format!(
                "{}: manifest unknown",
                reference
            )));
        }
        if let Some(details) = state.pull_results.get(reference).cloned() {
            state
                .images
                .insert(details.id.as_str().to_string(), details.clone());
            state.images.insert(reference.to_string(), details);
        }
        Ok(())
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageDetails, ImageError> {
        let mut state = self.state.lock();
        state.record(Call::InspectImage(reference.to_string()));
        state
            .images
            .get(reference)
            .cloned()
            .ok_or_else(|| ImageError::NotFound(reference.to_string()))
    }

    async fn remove_image(&self, id: &ImageId, _force: bool) -> Result<(), ImageError> {
        let mut state = self.state.lock();
        state.record(Call::RemoveImage(id.to_string()));
        if state.fails(MockOp::RemoveImage, id.as_str()) {
            return Err(ImageError::InUse(id.to_string()));
        }
        state.images.retain(|_, image| image.id != *id);
        Ok(())
    }
}

#[async_trait]
impl NetworkOps for MockRuntime {
    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &str,
        endpoint: &EndpointSettings,
    ) -> Result<(), NetworkError> {
        let mut state = self.state.lock();
        let name = state.name_of(container);
        state.record(Call::Connect(name, network.to_string()));
        let i = state
            .position(container.as_str())
            .ok_or_else(|| NetworkError::Runtime(format!("no such container {}", container)))?;
        state.containers[i]
            .networks
            .insert(network.to_string(), endpoint.clone());
        Ok(())
    }

    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &str,
        _force: bool,
    ) -> Result<(), NetworkError> {
        let mut state = self.state.lock();
        let name = state.name_of(container);
        state.record(Call::Disconnect(name, network.to_string()));
        let i = state
            .position(container.as_str())
            .ok_or_else(|| NetworkError::Runtime(format!("no such container {}", container)))?;
        state.containers[i]
            .networks
            .remove(network)
            .map(|_| ())
            .ok_or_else(|| NetworkError::NotConnected(network.to_string()))
    }
}

#[async_trait]
impl ExecOps for MockRuntime {
    async fn exec_create(
        &self,
        container: &ContainerId,
        cmd: &[String],
    ) -> Result<String, ExecError> {
        let mut state = self.state.lock();
        let name = state.name_of(container);
        // Commands arrive wrapped as `sh -c <command>`.
        let command = cmd.last().cloned().unwrap_or_default();
        state.record(Call::ExecCreate(name, command.clone()));
        if state.position(container.as_str()).is_none() {
            return Err(ExecError::ContainerNotFound(container.to_string()));
        }
        state.next_id += 1;
        let exec_id = format!("exec-{}", state.next_id);
        state
            .execs
            .insert(exec_id.clone(), PendingExec { command });
        Ok(exec_id)
    }

    async fn exec_start(&self, exec_id: &str) -> Result<String, ExecError> {
        let mut state = self.state.lock();
        state.record(Call::ExecStart(exec_id.to_string()));
        let exec = state
            .execs
            .get(exec_id)
            .ok_or_else(|| ExecError::ExecNotFound(exec_id.to_string()))?;
        Ok(state
            .scripts
            .get(&exec.command)
            .map(|s| s.output.clone())
            .unwrap_or_default())
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInfo, ExecError> {
        let mut state = self.state.lock();
        state.record(Call::ExecInspect(exec_id.to_string()));
        let exec = state
            .execs
            .get(exec_id)
            .ok_or_else(|| ExecError::ExecNotFound(exec_id.to_string()))?;
        let script = state.scripts.get(&exec.command).cloned();
        Ok(match script {
            Some(script) if script.hangs => ExecInfo {
                id: exec_id.to_string(),
                running: true,
                exit_code: None,
            },
            Some(script) => ExecInfo {
                id: exec_id.to_string(),
                running: false,
                exit_code: script.exit_code,
            },
            None => ExecInfo {
                id: exec_id.to_string(),
                running: false,
                exit_code: Some(0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::traits::ContainerState;

    fn running(name: &str, id: &str) -> ContainerDetails {
        ContainerDetails {
            id: ContainerId::new(id),
            name: format!("/{}", name),
            state: ContainerState {
                running: true,
                restarting: false,
                status: "running".to_string(),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn kill_stops_and_remove_deletes() {
        let mock = MockRuntime::new();
        mock.add_container(running("web", "aaaaaaaaaaaaaaaa"));
        let id = ContainerId::new("aaaaaaaaaaaaaaaa");

        mock.kill_container(&id, "SIGTERM").await.unwrap();
        let details = mock.inspect_container("web").await.unwrap();
        assert!(!details.state.running);

        mock.remove_container(&id, RemoveOptions::default())
            .await
            .unwrap();
        assert!(mock.inspect_container("web").await.unwrap_err().is_not_found());
        assert_eq!(
            mock.mutations(),
            vec![
                Call::Kill("web".to_string(), "SIGTERM".to_string()),
                Call::Remove("web".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn create_rejects_duplicate_names() {
        let mock = MockRuntime::new();
        mock.add_container(running("web", "aaaaaaaaaaaaaaaa"));
        mock.add_image(
            "nginx:latest",
            ImageDetails {
                id: ImageId::new("sha256:1111"),
                ..Default::default()
            },
        );
        let mut request = CreateContainerRequest {
            name: "/web".to_string(),
            ..Default::default()
        };
        request.config.image = "nginx:latest".to_string();

        let err = mock.create_container(&request).await.unwrap_err();
        assert!(matches!(err, ContainerError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn status_filter_applies_to_listing() {
        let mock = MockRuntime::new();
        mock.add_container(running("web", "aaaaaaaaaaaaaaaa"));
        let mut stopped = running("db", "bbbbbbbbbbbbbbbb");
        stopped.state.running = false;
        stopped.state.status = "exited".to_string();
        mock.add_container(stopped);

        let filters = ContainerFilters {
            statuses: vec!["running".to_string()],
        };
        let listed = mock.list_containers(&filters).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "/web");
    }
}
