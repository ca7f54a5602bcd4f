// ABOUTME: Lifecycle hook runner: executes label-declared commands inside containers.
// ABOUTME: Covers the pre-check, pre-update, post-update and post-check phases.

use crate::container::Container;
use crate::engine::{Engine, EngineError, ExecOutcome};
use crate::filters::Filter;
use crate::runtime::Runtime;
use crate::types::ContainerId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreCheck,
    PreUpdate,
    PostUpdate,
    PostCheck,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PreCheck => "pre-check",
            Phase::PreUpdate => "pre-update",
            Phase::PostUpdate => "post-update",
            Phase::PostCheck => "post-check",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the container's command for `phase`.
///
/// Returns `Ok(None)` when nothing ran: no command is configured, or the
/// container is not running or is restarting.
pub async fn run_phase<R: Runtime>(
    engine: &Engine<R>,
    phase: Phase,
    container: &Container,
) -> Result<Option<ExecOutcome>, EngineError> {
    let Some(command) = container.lifecycle_command(phase) else {
        tracing::debug!(container = %container.name(), "No {} command supplied, skipping", phase);
        return Ok(None);
    };

    if !container.is_running() || container.is_restarting() {
        tracing::debug!(container = %container.name(), "Container is not running, skipping {} command", phase);
        return Ok(None);
    }

    tracing::debug!(container = %container.name(), "Executing {} command", phase);
    let timeout = container.lifecycle_timeout(phase);
    engine.exec(container.id(), command, timeout).await.map(Some)
}

/// Runs the pre-check or post-check phase for every container the filter
/// accepts. Failures are logged and never stop the session.
pub async fn run_checks<R: Runtime>(engine: &Engine<R>, phase: Phase, filter: &Filter) {
    let containers = match engine.list(filter).await {
        Ok(containers) => containers,
        Err(e) => {
            tracing::warn!("Skipping {} commands, failed to list containers: {}", phase, e);
            return;
        }
    };

    for container in &containers {
        log_outcome(phase, container.name(), run_phase(engine, phase, container).await);
    }
}

/// Runs post-update against the freshly created container.
pub async fn run_post_update<R: Runtime>(engine: &Engine<R>, new_id: &ContainerId) {
    match engine.get(new_id).await {
        Ok(container) => {
            let outcome = run_phase(engine, Phase::PostUpdate, &container).await;
            log_outcome(Phase::PostUpdate, container.name(), outcome);
        }
        Err(e) => {
            tracing::error!(container = %new_id.short_id(), "Cannot run {} command: {}", Phase::PostUpdate, e);
        }
    }
}

fn log_outcome(phase: Phase, name: &str, outcome: Result<Option<ExecOutcome>, EngineError>) {
    match outcome {
        Ok(Some(outcome)) if outcome.is_error() => {
            tracing::error!(container = %name, "{} command failed: {}", phase, outcome);
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(container = %name, "{} command failed: {}", phase, e);
        }
    }
}
