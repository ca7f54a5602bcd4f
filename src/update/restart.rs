// ABOUTME: Stop and recreate phases of a session, batched or rolling, plus old image cleanup.
// ABOUTME: Outcomes are written straight into the session progress.

use super::{Candidate, UpdateParams};
use crate::diagnostics::{Diagnostics, Warning};
use crate::engine::{Engine, ExecOutcome};
use crate::lifecycle::{self, Phase};
use crate::runtime::Runtime;
use crate::session::Progress;
use crate::types::{ContainerId, ImageId};
use crate::util::random_name;
use std::collections::{BTreeSet, HashSet};

/// Why a container was not stopped.
enum Halt {
    /// Pre-update asked to skip or failed; the container keeps running.
    Skipped(String),
    Failed(String),
}

impl Halt {
    fn record(self, progress: &mut Progress, id: &ContainerId) {
        match self {
            Halt::Skipped(reason) => progress.mark_skipped(id, reason),
            Halt::Failed(error) => progress.update_failed(id, error),
        }
    }
}

/// Stops in reverse dependency order, then recreates in dependency order.
/// Returns the containers that were replaced.
pub(super) async fn batched<'a, R: Runtime>(
    engine: &Engine<R>,
    params: &UpdateParams,
    candidates: &[&'a Candidate],
    progress: &mut Progress,
) -> Vec<&'a Candidate> {
    let mut stopped: HashSet<&ContainerId> = HashSet::with_capacity(candidates.len());
    for candidate in candidates.iter().rev() {
        let id = candidate.container.id();
        match stop(engine, params, candidate).await {
            Ok(()) => {
                stopped.insert(id);
            }
            Err(halt) => halt.record(progress, id),
        }
    }

    let mut replaced = Vec::with_capacity(stopped.len());
    for candidate in candidates {
        let id = candidate.container.id();
        if !stopped.contains(id) {
            continue;
        }
        match start(engine, params, candidate).await {
            Ok(()) => replaced.push(*candidate),
            Err(e) => progress.update_failed(id, e),
        }
    }
    replaced
}

/// Replaces containers one at a time in dependency order.
pub(super) async fn rolling<'a, R: Runtime>(
    engine: &Engine<R>,
    params: &UpdateParams,
    candidates: &[&'a Candidate],
    progress: &mut Progress,
) -> Vec<&'a Candidate> {
    let mut replaced = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let id = candidate.container.id();
        if let Err(halt) = stop(engine, params, candidate).await {
            halt.record(progress, id);
            continue;
        }
        match start(engine, params, candidate).await {
            Ok(()) => replaced.push(*candidate),
            Err(e) => progress.update_failed(id, e),
        }
    }
    replaced
}

async fn stop<R: Runtime>(
    engine: &Engine<R>,
    params: &UpdateParams,
    candidate: &Candidate,
) -> Result<(), Halt> {
    let container = &candidate.container;

    // The running instance is renamed instead and reaped by its successor.
    if container.is_watchtower() {
        tracing::debug!(container = %container.name(), "This is the watchtower container");
        return Ok(());
    }

    if candidate.linked && !candidate.marked {
        container
            .verify_configuration()
            .map_err(|e| Halt::Failed(e.to_string()))?;
    }

    if params.lifecycle_hooks {
        match lifecycle::run_phase(engine, Phase::PreUpdate, container).await {
            Ok(None) | Ok(Some(ExecOutcome::Success)) => {}
            Ok(Some(outcome)) => {
                if outcome.skip_update() {
                    tracing::debug!(container = %container.name(), "{}", outcome);
                } else {
                    tracing::error!(container = %container.name(), "{} command failed: {}", Phase::PreUpdate, outcome);
                }
                tracing::info!(container = %container.name(), "Skipping container as the pre-update command did not succeed");
                return Err(Halt::Skipped(outcome.to_string()));
            }
            Err(e) => {
                tracing::error!(container = %container.name(), "{} command failed: {}", Phase::PreUpdate, e);
                return Err(Halt::Skipped(e.to_string()));
            }
        }
    }

    engine
        .stop(container, params.timeout)
        .await
        .map_err(|e| {
            tracing::error!(container = %container.name(), "Failed to stop container: {}", e);
            Halt::Failed(e.to_string())
        })
}

async fn start<R: Runtime>(
    engine: &Engine<R>,
    params: &UpdateParams,
    candidate: &Candidate,
) -> Result<(), String> {
    let container = &candidate.container;

    // The new instance needs the name while the old one is still running.
    if container.is_watchtower() {
        let temporary = random_name(&mut rand::thread_rng());
        engine.rename(container, &temporary).await.map_err(|e| {
            tracing::error!(container = %container.name(), "Failed to rename watchtower container: {}", e);
            e.to_string()
        })?;
    }

    if params.no_restart {
        return Ok(());
    }

    let new_id = engine.start(container).await.map_err(|e| {
        tracing::error!(container = %container.name(), "Failed to recreate container: {}", e);
        e.to_string()
    })?;

    if params.lifecycle_hooks {
        lifecycle::run_post_update(engine, &new_id).await;
    }
    Ok(())
}

/// Removes each distinct old image of replaced stale containers, once.
/// Images still used by a container that was not replaced are kept.
pub(super) async fn cleanup_images<R: Runtime>(
    engine: &Engine<R>,
    all: &[Candidate],
    replaced: &[&Candidate],
    diagnostics: &mut Diagnostics,
) {
    let replaced_ids: HashSet<&ContainerId> =
        replaced.iter().map(|c| c.container.id()).collect();
    let in_use: HashSet<&ImageId> = all
        .iter()
        .filter(|c| !replaced_ids.contains(c.container.id()))
        .map(|c| c.container.image_id())
        .collect();

    let images: BTreeSet<&ImageId> = replaced
        .iter()
        .filter(|c| c.marked)
        .map(|c| c.container.image_id())
        .filter(|image| !image.is_empty() && !in_use.contains(image))
        .collect();

    for image in images {
        if let Err(e) = engine.remove_image(image).await {
            diagnostics.warn(Warning::image_cleanup(format!(
                "Failed to remove image {}: {}",
                image.short_id(),
                e
            )));
        }
    }
}
