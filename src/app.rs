// ABOUTME: Application context shared by the scheduler and the HTTP API.
// ABOUTME: Owns the update lock, the last report, metrics and the notifier.

use crate::engine::Engine;
use crate::metrics::Metrics;
use crate::notify::Notifier;
use crate::runtime::Runtime;
use crate::session::{Report, Trigger};
use crate::update::{self, AbortedSnafu, UpdateError, UpdateParams};
use parking_lot::RwLock;
use snafu::ResultExt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

/// Per-run adjustments on top of the configured parameters.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only containers whose image reference starts with one of these.
    pub images: Vec<String>,
    /// Detect only, regardless of configuration.
    pub monitor_only: bool,
}

pub struct App<R> {
    engine: Engine<R>,
    params: UpdateParams,
    lock: Arc<Mutex<()>>,
    last_report: RwLock<Option<Arc<Report>>>,
    metrics: Metrics,
    notifier: Arc<dyn Notifier>,
    flushes: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl<R: Runtime + 'static> App<R> {
    pub fn new(engine: Engine<R>, params: UpdateParams, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            engine,
            params,
            lock: Arc::new(Mutex::new(())),
            last_report: RwLock::new(None),
            metrics: Metrics::new(),
            notifier,
            flushes: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Engine<R> {
        &self.engine
    }

    pub fn params(&self) -> &UpdateParams {
        &self.params
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Report of the most recent successful session.
    pub fn last_report(&self) -> Option<Arc<Report>> {
        self.last_report.read().clone()
    }

    /// Whether a session currently holds the update lock.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Checks startup preconditions and stops superseded watchtower instances.
    pub async fn prepare(&self, scope: &str) -> Result<(), UpdateError> {
        update::check_for_sanity(&self.engine, &self.params.filter, self.params.rolling_restart)
            .await?;
        update::reap_excess_instances(&self.engine, self.params.cleanup, scope).await
    }

    /// Runs a session unless another one is in progress, in which case
    /// `None` comes back immediately.
    pub async fn try_run(
        self: &Arc<Self>,
        trigger: Trigger,
        options: RunOptions,
    ) -> Option<Result<Arc<Report>, UpdateError>> {
        let guard = Arc::clone(&self.lock).try_lock_owned().ok()?;
        Some(self.spawn_session(guard, trigger, options).await)
    }

    /// Runs a session, waiting for any session in progress to finish first.
    /// Waiters are served in arrival order.
    pub async fn run_queued(
        self: &Arc<Self>,
        trigger: Trigger,
        options: RunOptions,
    ) -> Result<Arc<Report>, UpdateError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        self.spawn_session(guard, trigger, options).await
    }

    /// Scheduler tick. A tick that finds another session running is counted
    /// as skipped. Returns whether a session ran.
    pub async fn run_scheduled(self: &Arc<Self>) -> bool {
        match self.try_run(Trigger::Scheduler, RunOptions::default()).await {
            Some(_) => true,
            None => {
                self.metrics.register_skipped();
                tracing::info!("Skipped another update already running.");
                false
            }
        }
    }

    /// Waits until no session is running and every notification went out.
    /// Used to drain on shutdown.
    pub async fn wait_idle(&self) {
        drop(self.lock.lock().await);
        let pending: Vec<_> = std::mem::take(&mut *self.flushes.lock());
        for flush in pending {
            if let Err(e) = flush.await {
                tracing::warn!("Notification task failed: {}", e);
            }
        }
    }

    /// Runs the session on its own task, which owns the lock until the report
    /// is published. Dropping the caller's future does not cancel the session.
    async fn spawn_session(
        self: &Arc<Self>,
        guard: OwnedMutexGuard<()>,
        trigger: Trigger,
        options: RunOptions,
    ) -> Result<Arc<Report>, UpdateError> {
        let app = Arc::clone(self);
        let session = tokio::spawn(async move {
            let result = app.run_locked(trigger, options).await;
            drop(guard);
            result
        });
        session.await.context(AbortedSnafu)?
    }

    async fn run_locked(
        &self,
        trigger: Trigger,
        options: RunOptions,
    ) -> Result<Arc<Report>, UpdateError> {
        let mut params = self.params.clone();
        params.filter = params.filter.by_image(options.images);
        params.monitor_only |= options.monitor_only;

        self.notifier.start_batch();
        let report = match update::update(&self.engine, &params, trigger).await {
            Ok(report) => Arc::new(report),
            Err(e) => {
                tracing::error!(kind = ?e.kind(), "Update session failed: {}", e);
                return Err(e);
            }
        };

        self.metrics.register_report(&report);
        *self.last_report.write() = Some(Arc::clone(&report));

        let notifier = Arc::clone(&self.notifier);
        let flushed = Arc::clone(&report);
        let flush = tokio::spawn(async move {
            notifier.flush_batch(flushed).await;
        });
        let mut flushes = self.flushes.lock();
        flushes.retain(|f| !f.is_finished());
        flushes.push(flush);
        drop(flushes);

        Ok(report)
    }
}
