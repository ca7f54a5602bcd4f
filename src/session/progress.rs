// ABOUTME: Per-container status records accumulated while a session runs.
// ABOUTME: Progress is keyed by container id and frozen into a Report at the end.

use crate::container::Container;
use crate::types::{ContainerId, ImageId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum State {
    #[default]
    Unknown,
    Skipped,
    Scanned,
    Updated,
    Failed,
    Fresh,
    Stale,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Unknown => "Unknown",
            State::Skipped => "Skipped",
            State::Scanned => "Scanned",
            State::Updated => "Updated",
            State::Failed => "Failed",
            State::Fresh => "Fresh",
            State::Stale => "Stale",
        };
        f.write_str(name)
    }
}

/// What happened to one container during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub id: ContainerId,
    pub name: String,
    pub old_image: ImageId,
    pub new_image: ImageId,
    pub image_name: String,
    pub error: Option<String>,
    pub state: State,
}

impl ContainerStatus {
    fn from_container(container: &Container, new_image: ImageId, state: State) -> Self {
        Self {
            id: container.id().clone(),
            name: container.name().trim_start_matches('/').to_string(),
            old_image: container.image_id().clone(),
            new_image,
            image_name: container.image_name(),
            error: None,
            state,
        }
    }
}

/// Mutable per-session status map.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    statuses: BTreeMap<ContainerId, ContainerStatus>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a container that could not be considered at all.
    pub fn add_skipped(&mut self, container: &Container, error: impl fmt::Display) {
        let mut status =
            ContainerStatus::from_container(container, container.image_id().clone(), State::Skipped);
        status.error = Some(error.to_string());
        self.add(status);
    }

    /// Records a scanned container and the latest image found for it.
    pub fn add_scanned(&mut self, container: &Container, new_image: ImageId) {
        self.add(ContainerStatus::from_container(
            container,
            new_image,
            State::Scanned,
        ));
    }

    /// Records a scanned container whose resolution failed. It stays fresh.
    pub fn add_scan_error(&mut self, container: &Container, error: impl fmt::Display) {
        let mut status = ContainerStatus::from_container(
            container,
            container.image_id().clone(),
            State::Scanned,
        );
        status.error = Some(error.to_string());
        self.add(status);
    }

    pub fn add(&mut self, status: ContainerStatus) {
        self.statuses.insert(status.id.clone(), status);
    }

    pub fn mark_for_update(&mut self, id: &ContainerId) {
        if let Some(status) = self.statuses.get_mut(id) {
            status.state = State::Updated;
        }
    }

    /// Moves a container out of the scanned set, keeping the reason.
    pub fn mark_skipped(&mut self, id: &ContainerId, reason: impl fmt::Display) {
        if let Some(status) = self.statuses.get_mut(id) {
            status.state = State::Skipped;
            status.error = Some(reason.to_string());
        }
    }

    pub fn update_failed(&mut self, id: &ContainerId, error: impl fmt::Display) {
        if let Some(status) = self.statuses.get_mut(id) {
            status.state = State::Failed;
            status.error = Some(error.to_string());
        }
    }

    pub fn get(&self, id: &ContainerId) -> Option<&ContainerStatus> {
        self.statuses.get(id)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Statuses ordered by container id.
    pub fn iter(&self) -> impl Iterator<Item = &ContainerStatus> {
        self.statuses.values()
    }
}
