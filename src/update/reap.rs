// ABOUTME: Startup checks: reaping superseded watchtower instances and rejecting unsafe settings.
// ABOUTME: Both run once, before the first session of the process.

use super::{ListSnafu, UpdateError};
use crate::diagnostics::{Diagnostics, Warning, WarningKind};
use crate::engine::Engine;
use crate::filters::Filter;
use crate::runtime::Runtime;
use crate::sorter;
use snafu::ResultExt;
use std::time::Duration;

/// Grace given to an older watchtower instance to finish its own session.
pub const INSTANCE_STOP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Stops every watchtower instance in `scope` except the most recently created.
/// With `cleanup`, their images are removed too.
pub async fn reap_excess_instances<R: Runtime>(
    engine: &Engine<R>,
    cleanup: bool,
    scope: &str,
) -> Result<(), UpdateError> {
    let filter = Filter::watchtower().by_scope(scope);
    let mut instances = engine.list(&filter).await.context(ListSnafu)?;

    if instances.len() <= 1 {
        tracing::debug!("There are no additional watchtower containers");
        return Ok(());
    }

    tracing::info!(count = instances.len(), "Found multiple running watchtower instances. Cleaning up.");
    sorter::sort_by_created(&mut instances);

    let mut diagnostics = Diagnostics::default();
    if let Some((_newest, excess)) = instances.split_last() {
        for instance in excess {
            if let Err(e) = engine.stop(instance, INSTANCE_STOP_TIMEOUT).await {
                diagnostics.warn(Warning::instance_stop(format!(
                    "Failed to stop watchtower instance {}: {}",
                    instance.name(),
                    e
                )));
                continue;
            }

            if cleanup {
                if let Err(e) = engine.remove_image(instance.image_id()).await {
                    diagnostics.warn(Warning::image_cleanup(format!(
                        "Failed to remove image {}: {}",
                        instance.image_id().short_id(),
                        e
                    )));
                }
            }
        }
    }

    let stop_errors = diagnostics.count(WarningKind::InstanceStop);
    let cleanup_errors = diagnostics.count(WarningKind::ImageCleanup);
    if stop_errors == 0 && cleanup_errors == 0 {
        return Ok(());
    }
    Err(UpdateError::Reap {
        stop_errors,
        cleanup_errors,
    })
}

/// Rolling restarts replace containers one by one, so dependency links
/// between watched containers cannot be honoured.
pub async fn check_for_sanity<R: Runtime>(
    engine: &Engine<R>,
    filter: &Filter,
    rolling_restart: bool,
) -> Result<(), UpdateError> {
    if !rolling_restart {
        return Ok(());
    }

    let containers = engine.list(filter).await.context(ListSnafu)?;
    match containers.iter().find(|c| !c.links().is_empty()) {
        Some(container) => Err(UpdateError::RollingRestartDependencies {
            container: container.name().to_string(),
        }),
        None => Ok(()),
    }
}
