// ABOUTME: Notification contract: open a batch when a session starts, flush it with the report.
// ABOUTME: The built-in notifier writes a per-host session summary to the log.

use crate::session::{Report, State};
use async_trait::async_trait;
use std::sync::Arc;

/// Receives session reports. Flushing runs off the update path, so slow
/// transports never delay the next session.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Called when a session starts.
    fn start_batch(&self);

    /// Called with the finished session's report.
    async fn flush_batch(&self, report: Arc<Report>);
}

/// Logs a one-line summary plus one line per changed container.
pub struct LogNotifier {
    title: String,
}

impl LogNotifier {
    pub fn new() -> Self {
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        Self::with_title(format!("Watchtower updates on {}", host))
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Human summary of a report, or `None` when nothing noteworthy happened.
pub fn summarize(report: &Report) -> Option<String> {
    if report.updated.is_empty() && report.failed.is_empty() && report.stale.is_empty() {
        return None;
    }

    let mut lines = vec![format!(
        "{} scanned, {} updated, {} failed",
        report.scanned.len(),
        report.updated.len(),
        report.failed.len()
    )];
    for status in report.all() {
        let line = match (status.state, status.error.as_deref()) {
            (State::Updated, _) => format!(
                "- {} ({}): {} updated to {}",
                status.name,
                status.image_name,
                status.old_image.short_id(),
                status.new_image.short_id()
            ),
            (State::Failed, error) => format!(
                "- {} ({}): update failed: {}",
                status.name,
                status.image_name,
                error.unwrap_or("unknown error")
            ),
            (State::Stale, _) => format!(
                "- {} ({}): new image {} available",
                status.name,
                status.image_name,
                status.new_image.short_id()
            ),
            _ => continue,
        };
        lines.push(line);
    }
    Some(lines.join("\n"))
}

#[async_trait]
impl Notifier for LogNotifier {
    fn start_batch(&self) {
        tracing::trace!(title = %self.title, "Notification batch started");
    }

    async fn flush_batch(&self, report: Arc<Report>) {
        if let Some(summary) = summarize(&report) {
            tracing::info!(title = %self.title, "{}", summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ContainerStatus;
    use crate::types::{ContainerId, ImageId};

    fn status(id: &str, state: State, error: Option<&str>) -> ContainerStatus {
        ContainerStatus {
            id: ContainerId::new(id),
            name: id.to_string(),
            old_image: ImageId::new("sha256:1111111111119999"),
            new_image: ImageId::new("sha256:2222222222229999"),
            image_name: "app:latest".to_string(),
            error: error.map(String::from),
            state,
        }
    }

    #[test]
    fn quiet_report_has_no_summary() {
        let report = Report {
            scanned: vec![status("a", State::Fresh, None)],
            fresh: vec![status("a", State::Fresh, None)],
            ..Default::default()
        };
        assert_eq!(summarize(&report), None);
    }

    #[test]
    fn summary_lists_changes() {
        let report = Report {
            scanned: vec![
                status("a", State::Updated, None),
                status("b", State::Failed, Some("boom")),
            ],
            updated: vec![status("a", State::Updated, None)],
            failed: vec![status("b", State::Failed, Some("boom"))],
            ..Default::default()
        };
        let summary = summarize(&report).unwrap();
        assert_eq!(
            summary,
            "2 scanned, 1 updated, 1 failed\n\
             - a (app:latest): 111111111111 updated to 222222222222\n\
             - b (app:latest): update failed: boom"
        );
    }

    #[test]
    fn title_names_the_host() {
        assert!(LogNotifier::new().title().starts_with("Watchtower updates on "));
    }
}
