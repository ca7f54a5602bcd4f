// ABOUTME: Frozen, bucketed view of a finished session.
// ABOUTME: Serialises to the scanned/updated/failed/skipped/stale/fresh JSON shape.

use super::progress::{ContainerStatus, Progress, State};
use super::Trigger;
use crate::types::{ContainerId, short_id};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashSet;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusJson<'a> {
    id: &'a str,
    name: &'a str,
    current_image_id: &'a str,
    latest_image_id: &'a str,
    image_name: &'a str,
    state: State,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for ContainerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StatusJson {
            id: short_id(self.id.as_str()),
            name: &self.name,
            current_image_id: short_id(self.old_image.as_str()),
            latest_image_id: short_id(self.new_image.as_str()),
            image_name: &self.image_name,
            state: self.state,
            error: self.error.as_deref(),
        }
        .serialize(serializer)
    }
}

/// Session outcome split into buckets, each ordered by container id.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub scanned: Vec<ContainerStatus>,
    pub updated: Vec<ContainerStatus>,
    pub failed: Vec<ContainerStatus>,
    pub skipped: Vec<ContainerStatus>,
    pub stale: Vec<ContainerStatus>,
    pub fresh: Vec<ContainerStatus>,
}

impl Report {
    /// Buckets every status. Skipped entries go to `skipped` only; everything
    /// else is scanned and then classed fresh, updated, failed or stale.
    pub fn from_progress(progress: &Progress) -> Self {
        let mut report = Report::default();

        for status in progress.iter() {
            if status.state == State::Skipped {
                report.skipped.push(status.clone());
                continue;
            }

            report.scanned.push(status.clone());

            let mut status = status.clone();
            if status.new_image == status.old_image {
                status.state = State::Fresh;
                report.fresh.push(status);
                continue;
            }

            match status.state {
                State::Updated => report.updated.push(status),
                State::Failed => report.failed.push(status),
                _ => {
                    status.state = State::Stale;
                    report.stale.push(status);
                }
            }
        }

        for bucket in report.buckets_mut() {
            bucket.sort_by(|a, b| a.id.cmp(&b.id));
        }
        report
    }

    fn buckets_mut(&mut self) -> [&mut Vec<ContainerStatus>; 6] {
        [
            &mut self.scanned,
            &mut self.updated,
            &mut self.failed,
            &mut self.skipped,
            &mut self.stale,
            &mut self.fresh,
        ]
    }

    /// Every container once, sorted by id. Earlier buckets win on duplicates.
    pub fn all(&self) -> Vec<&ContainerStatus> {
        let mut seen: HashSet<&ContainerId> = HashSet::new();
        let mut all: Vec<&ContainerStatus> = [
            &self.updated,
            &self.failed,
            &self.skipped,
            &self.stale,
            &self.fresh,
            &self.scanned,
        ]
        .into_iter()
        .flatten()
        .filter(|status| seen.insert(&status.id))
        .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn is_empty(&self) -> bool {
        self.scanned.is_empty() && self.skipped.is_empty()
    }
}
