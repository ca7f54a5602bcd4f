// ABOUTME: One update session: what started it, when, and the progress so far.
// ABOUTME: Finishing a session freezes its progress into a Report.

mod progress;
mod report;

pub use progress::{ContainerStatus, Progress, State};
pub use report::Report;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// What kicked off a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trigger {
    Scheduler,
    #[serde(rename = "API")]
    Api,
    Startup,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::Scheduler => "Scheduler",
            Trigger::Api => "API",
            Trigger::Startup => "Startup",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub trigger: Trigger,
    pub started: DateTime<Utc>,
    pub progress: Progress,
}

impl Session {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            started: Utc::now(),
            progress: Progress::new(),
        }
    }

    /// Freezes the progress into a report stamped with start and finish times.
    pub fn report(&self) -> Report {
        let mut report = Report::from_progress(&self.progress);
        report.trigger = Some(self.trigger);
        report.started_at = Some(self.started);
        report.finished_at = Some(Utc::now());
        report
    }
}
