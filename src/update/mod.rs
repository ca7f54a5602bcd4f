// ABOUTME: The update engine: scan, sort, stop and recreate containers whose images moved on.
// ABOUTME: Listing failures and dependency cycles abort a session; per-container errors never do.

mod reap;
mod restart;

pub use reap::{INSTANCE_STOP_TIMEOUT, check_for_sanity, reap_excess_instances};

use crate::container::Container;
use crate::diagnostics::Diagnostics;
use crate::engine::{Engine, EngineError};
use crate::filters::Filter;
use crate::lifecycle::{self, Phase};
use crate::runtime::Runtime;
use crate::session::{Progress, Report, Session, Trigger};
use crate::sorter::{self, SortError};
use crate::types::ContainerId;
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use std::time::Duration;

/// Grace period given to a container between its stop signal and forced removal.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Knobs for a single update session.
#[derive(Debug, Clone)]
pub struct UpdateParams {
    pub filter: Filter,
    /// Remove the old images of replaced containers.
    pub cleanup: bool,
    /// Stop stale containers without creating replacements.
    pub no_restart: bool,
    /// Stop timeout per container.
    pub timeout: Duration,
    pub monitor_only: bool,
    pub lifecycle_hooks: bool,
    pub rolling_restart: bool,
    /// Per-container labels override the global switches.
    pub label_precedence: bool,
}

impl Default for UpdateParams {
    fn default() -> Self {
        Self {
            filter: Filter::no_filter(),
            cleanup: false,
            no_restart: false,
            timeout: DEFAULT_STOP_TIMEOUT,
            monitor_only: false,
            lifecycle_hooks: false,
            rolling_restart: false,
            label_precedence: false,
        }
    }
}

/// Errors that end a session or block startup.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum UpdateError {
    #[snafu(display("failed to list containers: {source}"))]
    List { source: EngineError },

    #[snafu(display("failed to sort containers for updating: {source}"))]
    Sort { source: SortError },

    #[snafu(display(
        "{stop_errors} errors while stopping containers, {cleanup_errors} errors while cleaning up images"
    ))]
    Reap {
        stop_errors: usize,
        cleanup_errors: usize,
    },

    #[snafu(display(
        "{container} is depending on at least one other container. This is not compatible with rolling restarts"
    ))]
    RollingRestartDependencies { container: String },

    #[snafu(display("update session ended abnormally: {source}"))]
    Aborted { source: tokio::task::JoinError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateErrorKind {
    /// The engine could not list containers.
    EngineUnreachable,
    /// Container links form a cycle.
    CircularReference,
    /// Superseded watchtower instances could not all be stopped or cleaned.
    ExcessInstances,
    /// Startup settings conflict with the containers being watched.
    InvalidConfiguration,
    /// The session task panicked or was cancelled.
    Aborted,
}

impl UpdateError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> UpdateErrorKind {
        match self {
            UpdateError::List { .. } => UpdateErrorKind::EngineUnreachable,
            UpdateError::Sort { .. } => UpdateErrorKind::CircularReference,
            UpdateError::Reap { .. } => UpdateErrorKind::ExcessInstances,
            UpdateError::RollingRestartDependencies { .. } => {
                UpdateErrorKind::InvalidConfiguration
            }
            UpdateError::Aborted { .. } => UpdateErrorKind::Aborted,
        }
    }
}

/// A scanned container and why it is going to be restarted, if at all.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub container: Container,
    /// Stale and allowed to update.
    pub marked: bool,
    /// Depends on a container that restarts.
    pub linked: bool,
}

impl Candidate {
    fn new(container: Container, marked: bool) -> Self {
        Self {
            container,
            marked,
            linked: false,
        }
    }

    pub fn to_restart(&self) -> bool {
        self.marked || self.linked
    }
}

/// Runs one update session and returns its report.
///
/// Pre-check and post-check commands run around the session when lifecycle
/// hooks are enabled.
pub async fn update<R: Runtime>(
    engine: &Engine<R>,
    params: &UpdateParams,
    trigger: Trigger,
) -> Result<Report, UpdateError> {
    tracing::debug!(trigger = %trigger, "Starting new update session");
    let mut session = Session::new(trigger);
    let mut diagnostics = Diagnostics::default();

    if params.lifecycle_hooks {
        lifecycle::run_checks(engine, Phase::PreCheck, &params.filter).await;
    }

    run(engine, params, &mut session.progress, &mut diagnostics).await?;

    if params.lifecycle_hooks {
        lifecycle::run_checks(engine, Phase::PostCheck, &params.filter).await;
    }

    let report = session.report();
    tracing::info!(
        scanned = report.scanned.len(),
        updated = report.updated.len(),
        failed = report.failed.len(),
        warnings = diagnostics.warnings().len(),
        "Session done"
    );
    Ok(report)
}

async fn run<R: Runtime>(
    engine: &Engine<R>,
    params: &UpdateParams,
    progress: &mut Progress,
    diagnostics: &mut Diagnostics,
) -> Result<(), UpdateError> {
    let containers = engine.list(&params.filter).await.context(ListSnafu)?;
    let marks = scan(engine, params, &containers, progress).await;

    let sorted = sorter::sort_by_dependencies(containers).context(SortSnafu)?;
    let mut candidates: Vec<Candidate> = sorted
        .into_iter()
        .map(|c| {
            let marked = marks.get(c.id()).copied().unwrap_or(false);
            Candidate::new(c, marked)
        })
        .collect();

    mark_implicit_restarts(&mut candidates);

    let to_update: Vec<&Candidate> = candidates.iter().filter(|c| c.to_restart()).collect();
    for candidate in &to_update {
        progress.mark_for_update(candidate.container.id());
    }

    let replaced = if params.rolling_restart {
        restart::rolling(engine, params, &to_update, progress).await
    } else {
        restart::batched(engine, params, &to_update, progress).await
    };

    if params.cleanup {
        restart::cleanup_images(engine, &candidates, &replaced, diagnostics).await;
    }
    Ok(())
}

/// Resolves every container and records it as scanned or skipped. Returns
/// whether each container should be updated.
async fn scan<R: Runtime>(
    engine: &Engine<R>,
    params: &UpdateParams,
    containers: &[Container],
    progress: &mut Progress,
) -> HashMap<ContainerId, bool> {
    let mut marks = HashMap::with_capacity(containers.len());

    for container in containers {
        let resolution = match engine.is_stale(container, params.label_precedence).await {
            Ok(resolution) => resolution,
            Err(e) if e.is_credential_error() => {
                tracing::info!(container = %container.name(), "Unable to update container: {}. Proceeding to next.", e);
                progress.add_skipped(container, &e);
                marks.insert(container.id().clone(), false);
                continue;
            }
            Err(e) => {
                tracing::warn!(container = %container.name(), "Unable to check for updates: {}", e);
                progress.add_scan_error(container, &e);
                marks.insert(container.id().clone(), false);
                continue;
            }
        };

        let monitor_only = container.monitor_only(params.monitor_only, params.label_precedence);
        let should_update = resolution.stale && !monitor_only;

        if should_update {
            if let Err(e) = container.verify_configuration() {
                tracing::info!(container = %container.name(), "Unable to update container: {}. Proceeding to next.", e);
                tracing::trace!(container = %container.name(), details = ?container.details(), image = ?container.image_info(), "Cannot obtain enough information to recreate container");
                progress.add_skipped(container, &e);
                marks.insert(container.id().clone(), false);
                continue;
            }
        } else if resolution.stale {
            tracing::info!(container = %container.name(), "Found new image for monitor-only container, not updating");
        }

        progress.add_scanned(container, resolution.latest);
        marks.insert(container.id().clone(), should_update);
    }

    marks
}

/// Marks every container that links to a restarting container.
///
/// The slice must be in dependency order, which makes a single pass reach the
/// fixpoint.
pub(crate) fn mark_implicit_restarts(candidates: &mut [Candidate]) {
    for i in 0..candidates.len() {
        if candidates[i].to_restart() {
            continue;
        }

        let restarting = candidates[i].container.links().into_iter().find(|link| {
            candidates
                .iter()
                .any(|c| c.container.name() == link.as_str() && c.to_restart())
        });

        if let Some(link) = restarting {
            tracing::debug!(restarting = %link, linked = %candidates[i].container.name(), "Container is linked to restarting");
            candidates[i].linked = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::labels;
    use crate::runtime::{ContainerConfig, ContainerDetails};

    fn candidate(name: &str, depends_on: &[&str], marked: bool) -> Candidate {
        let mut config = ContainerConfig::default();
        if !depends_on.is_empty() {
            config
                .labels
                .insert(labels::DEPENDS_ON.to_string(), depends_on.join(","));
        }
        let container = Container::new(
            ContainerDetails {
                id: ContainerId::new(format!("{}-id", name)),
                name: format!("/{}", name),
                config,
                ..Default::default()
            },
            None,
        );
        Candidate::new(container, marked)
    }

    fn restarting(candidates: &[Candidate]) -> Vec<&str> {
        candidates
            .iter()
            .filter(|c| c.to_restart())
            .map(|c| c.container.name())
            .collect()
    }

    #[test]
    fn implicit_restart_follows_the_chain() {
        let mut candidates = vec![
            candidate("1", &[], false),
            candidate("2", &["1"], false),
            candidate("3", &["2"], false),
            candidate("4", &["3"], true),
            candidate("5", &["4"], false),
            candidate("6", &["5"], false),
        ];
        mark_implicit_restarts(&mut candidates);
        assert_eq!(restarting(&candidates), vec!["/4", "/5", "/6"]);
        assert!(candidates[4].linked && !candidates[4].marked);
    }

    #[test]
    fn implicit_restart_is_a_fixpoint() {
        let mut candidates = vec![
            candidate("db", &[], true),
            candidate("api", &["db"], false),
            candidate("web", &["api"], false),
            candidate("other", &[], false),
        ];
        mark_implicit_restarts(&mut candidates);
        let first = restarting(&candidates)
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        mark_implicit_restarts(&mut candidates);
        assert_eq!(restarting(&candidates), first);
        assert_eq!(first, vec!["/db", "/api", "/web"]);
    }

    #[test]
    fn error_kinds() {
        let err = UpdateError::Sort {
            source: SortError::CircularReference("/a".to_string()),
        };
        assert_eq!(err.kind(), UpdateErrorKind::CircularReference);
        assert_eq!(
            err.to_string(),
            "failed to sort containers for updating: circular reference to /a"
        );

        let err = UpdateError::Reap {
            stop_errors: 1,
            cleanup_errors: 0,
        };
        assert_eq!(err.kind(), UpdateErrorKind::ExcessInstances);
    }
}
