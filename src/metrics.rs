// ABOUTME: Session gauges and counters shared between the update loop and the HTTP API.
// ABOUTME: Rendered in the Prometheus text exposition format.

use crate::session::Report;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Figures from the last session plus lifetime scan counters.
#[derive(Debug, Default)]
pub struct Metrics {
    scanned: AtomicU64,
    updated: AtomicU64,
    failed: AtomicU64,
    scans_total: AtomicU64,
    scans_skipped: AtomicU64,
}

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub scanned: u64,
    pub updated: u64,
    pub failed: u64,
    pub scans_total: u64,
    pub scans_skipped: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished session.
    pub fn register_report(&self, report: &Report) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        self.scanned
            .store(report.scanned.len() as u64, Ordering::Relaxed);
        self.updated
            .store(report.updated.len() as u64, Ordering::Relaxed);
        self.failed.store(report.failed.len() as u64, Ordering::Relaxed);
    }

    /// Records a session that did not run because another one held the lock.
    /// The gauges reset to zero.
    pub fn register_skipped(&self) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        self.scans_skipped.fetch_add(1, Ordering::Relaxed);
        self.scanned.store(0, Ordering::Relaxed);
        self.updated.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            scanned: self.scanned.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            scans_total: self.scans_total.load(Ordering::Relaxed),
            scans_skipped: self.scans_skipped.load(Ordering::Relaxed),
        }
    }

    pub fn render(&self) -> String {
        let s = self.snapshot();
        let entries = [
            (
                "watchtower_containers_scanned",
                "gauge",
                "Number of containers scanned for changes by watchtower during the last scan",
                s.scanned,
            ),
            (
                "watchtower_containers_updated",
                "gauge",
                "Number of containers updated by watchtower during the last scan",
                s.updated,
            ),
            (
                "watchtower_containers_failed",
                "gauge",
                "Number of containers where update failed during the last scan",
                s.failed,
            ),
            (
                "watchtower_scans_total",
                "counter",
                "Number of scans since the watchtower started",
                s.scans_total,
            ),
            (
                "watchtower_scans_skipped",
                "counter",
                "Number of skipped scans since watchtower started",
                s.scans_skipped,
            ),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in entries {
            // Writing into a String cannot fail.
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} {}", name, kind);
            let _ = writeln!(out, "{} {}", name, value);
        }
        out
    }
}
