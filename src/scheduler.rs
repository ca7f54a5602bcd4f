// ABOUTME: Update schedule parsing (cron expressions and `@every <duration>`) and the firing loop.
// ABOUTME: The loop stops on cancellation; ticks never overlap.

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid interval {0:?}: {1}")]
    InvalidInterval(String, humantime::DurationError),

    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("invalid cron expression {expression:?}: {source}")]
    InvalidCron {
        expression: String,
        source: cron::error::Error,
    },
}

/// When sessions fire.
#[derive(Debug, Clone)]
pub enum Schedule {
    Every(Duration),
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    pub fn every(interval: Duration) -> Result<Self, ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        Ok(Schedule::Every(interval))
    }

    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                now.checked_add_signed(step)
            }
            Schedule::Cron(schedule) => schedule.after(&now).next(),
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(interval) = s.strip_prefix("@every") {
            let interval = interval.trim();
            let parsed = humantime::parse_duration(interval)
                .map_err(|e| ScheduleError::InvalidInterval(interval.to_string(), e))?;
            return Schedule::every(parsed);
        }

        cron::Schedule::from_str(s)
            .map(|schedule| Schedule::Cron(Box::new(schedule)))
            .map_err(|source| ScheduleError::InvalidCron {
                expression: s.to_string(),
                source,
            })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Every(interval) => {
                write!(f, "@every {}", humantime::format_duration(*interval))
            }
            Schedule::Cron(schedule) => write!(f, "{}", schedule),
        }
    }
}

/// Calls `tick` at every firing of `schedule` until `shutdown` is cancelled.
///
/// A tick that outlasts the next firing delays it; firings are not queued.
pub async fn run<F, Fut>(schedule: &Schedule, shutdown: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            tracing::info!("Schedule has no further runs");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(next = %next, "Scheduled next run");

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("Scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        tick().await;
    }
}
