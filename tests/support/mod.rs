// ABOUTME: Test support utilities.
// ABOUTME: Container and image fixtures on the in-memory engine, plus fake registry and notifier.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use watchtower::container::labels;
use watchtower::engine::{Engine, EngineOptions};
use watchtower::notify::Notifier;
use watchtower::resolver::{
    CredentialError, CredentialSource, DigestLookup, ImageResolver, RegistryError, WarnStrategy,
};
use watchtower::runtime::{
    ContainerConfig, ContainerDetails, ContainerState, ImageDetails, MockRuntime, RegistryAuth,
};
use watchtower::session::Report;
use watchtower::types::{ContainerId, ImageId, ImageRef};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("watchtower=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A 64-character container id built from a short tag.
pub fn container_id(tag: &str) -> String {
    format!("{:a<64}", tag)
}

/// A `sha256:` image id built from a short tag.
pub fn image_id(tag: &str) -> ImageId {
    ImageId::new(format!("sha256:{:0<64}", tag))
}

pub fn image(tag: &str, repo_digest: Option<&str>) -> ImageDetails {
    ImageDetails {
        id: image_id(tag),
        repo_digests: repo_digest.map(|d| vec![d.to_string()]).unwrap_or_default(),
        ..Default::default()
    }
}

/// Builder for seeded containers. Containers run by default.
pub struct ContainerFixture {
    details: ContainerDetails,
}

impl ContainerFixture {
    pub fn new(name: &str, reference: &str, image: &ImageId) -> Self {
        Self {
            details: ContainerDetails {
                id: ContainerId::new(container_id(name)),
                name: format!("/{}", name),
                created: "2024-01-01T00:00:00Z".to_string(),
                image: image.clone(),
                state: ContainerState {
                    running: true,
                    restarting: false,
                    status: "running".to_string(),
                },
                config: ContainerConfig {
                    image: reference.to_string(),
                    labels: BTreeMap::new(),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.details
            .config
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn depends_on(self, names: &str) -> Self {
        self.label(labels::DEPENDS_ON, names)
    }

    pub fn watchtower(self) -> Self {
        self.label(labels::WATCHTOWER, "true")
    }

    pub fn lifecycle(self, phase: &str, command: &str) -> Self {
        self.label(&labels::lifecycle_command(phase), command)
    }

    pub fn created(mut self, created: &str) -> Self {
        self.details.created = created.to_string();
        self
    }

    pub fn id(&self) -> ContainerId {
        self.details.id.clone()
    }

    pub fn seed(self, mock: &MockRuntime) -> ContainerId {
        let id = self.details.id.clone();
        mock.add_container(self.details);
        id
    }
}

/// Seeds a running container on `reference` whose image a pull replaces,
/// so the container resolves as stale.
pub fn seed_stale(mock: &MockRuntime, fixture: ContainerFixture, reference: &str, old: &str, new: &str) -> ContainerId {
    mock.add_image(reference, image(old, None));
    mock.on_pull(reference, image(new, None));
    fixture.seed(mock)
}

/// Seeds a running container whose image a pull leaves in place.
pub fn seed_fresh(mock: &MockRuntime, fixture: ContainerFixture, reference: &str, current: &str) -> ContainerId {
    mock.add_image(reference, image(current, None));
    fixture.seed(mock)
}

pub struct Anonymous;

#[async_trait]
impl CredentialSource for Anonymous {
    async fn lookup(&self, _: &ImageRef) -> Result<Option<RegistryAuth>, CredentialError> {
        Ok(None)
    }
}

/// Registry that answers every HEAD request with the same digest, or a 404.
pub struct StaticDigests {
    digest: Option<String>,
    requests: Mutex<Vec<String>>,
}

impl StaticDigests {
    pub fn serving(digest: &str) -> Arc<Self> {
        Arc::new(Self {
            digest: Some(digest.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            digest: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DigestLookup for StaticDigests {
    async fn latest_digest(
        &self,
        image: &ImageRef,
        _auth: Option<&RegistryAuth>,
    ) -> Result<String, RegistryError> {
        self.requests.lock().push(image.to_string());
        self.digest.clone().ok_or(RegistryError::Status(404))
    }
}

pub fn engine(mock: Arc<MockRuntime>) -> Engine<MockRuntime> {
    engine_with(mock, None, EngineOptions {
        pull_images: true,
        ..Default::default()
    })
}

pub fn engine_with(
    mock: Arc<MockRuntime>,
    digests: Option<Arc<dyn DigestLookup>>,
    options: EngineOptions,
) -> Engine<MockRuntime> {
    let resolver = ImageResolver::new(Arc::new(Anonymous), digests, WarnStrategy::Never);
    Engine::new(mock, resolver, options)
}

/// Notifier that keeps every flushed report.
#[derive(Default)]
pub struct RecordingNotifier {
    batches: Mutex<usize>,
    reports: Mutex<Vec<Arc<Report>>>,
}

impl RecordingNotifier {
    pub fn batches(&self) -> usize {
        *self.batches.lock()
    }

    pub fn reports(&self) -> Vec<Arc<Report>> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn start_batch(&self) {
        *self.batches.lock() += 1;
    }

    async fn flush_batch(&self, report: Arc<Report>) {
        self.reports.lock().push(report);
    }
}

/// Names of the containers in a report bucket, without the leading `/`.
pub fn names(bucket: &[watchtower::session::ContainerStatus]) -> Vec<String> {
    bucket.iter().map(|s| s.name.clone()).collect()
}
