//! Per-job run guard, counters and periodic status logging.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio::time::Instant;

use crate::jobs::{JobKind, JobReport};
use crate::state::{new_shared, Shared};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job: JobKind,
    pub running: bool,
    pub runs: u64,
    pub skipped: u64,
    pub failures: u64,
    pub last_report: Option<JobReport>,
}

#[derive(Default)]
struct JobSlot {
    running: AtomicBool,
    runs: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
    last_report: Shared<Option<JobReport>>,
}

#[derive(Clone)]
pub struct JobTracker {
    start_time: Instant,
    slots: Arc<HashMap<JobKind, JobSlot>>,
}

/// Marks a job as running until dropped.
pub struct RunGuard {
    tracker: JobTracker,
    kind: JobKind,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.tracker.slot(self.kind).running.store(false, Ordering::Release);
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker {
    pub fn new() -> Self {
        let slots = JobKind::ALL
            .into_iter()
            .map(|kind| (kind, JobSlot { last_report: new_shared(None), ..Default::default() }))
            .collect();
        Self { start_time: Instant::now(), slots: Arc::new(slots) }
    }

    fn slot(&self, kind: JobKind) -> &JobSlot {
        // every kind is inserted in new()
        &self.slots[&kind]
    }

    /// Claims the job's run slot, or `None` if a run is already in progress.
    pub fn try_begin(&self, kind: JobKind) -> Option<RunGuard> {
        self.slot(kind)
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { tracker: self.clone(), kind })
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.slot(kind).running.load(Ordering::Acquire)
    }

    pub fn record_skip(&self, kind: JobKind) {
        self.slot(kind).skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report(&self, report: JobReport) {
        let slot = self.slot(report.job);
        slot.runs.fetch_add(1, Ordering::Relaxed);
        *slot.last_report.lock() = Some(report);
    }

    /// A run that aborted before producing a report.
    pub fn record_failure(&self, kind: JobKind) {
        let slot = self.slot(kind);
        slot.runs.fetch_add(1, Ordering::Relaxed);
        slot.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self, kind: JobKind) -> JobStatus {
        let slot = self.slot(kind);
        JobStatus {
            job: kind,
            running: slot.running.load(Ordering::Acquire),
            runs: slot.runs.load(Ordering::Relaxed),
            skipped: slot.skipped.load(Ordering::Relaxed),
            failures: slot.failures.load(Ordering::Relaxed),
            last_report: slot.last_report.lock().clone(),
        }
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        JobKind::ALL.into_iter().map(|kind| self.status(kind)).collect()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs one status line per job every `every`.
    pub fn spawn_status_logger(&self, every: Duration) -> task::JoinHandle<()> {
        let tracker = self.clone();
        task::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                interval.tick().await;
                for status in tracker.statuses() {
                    let last = status.last_report.as_ref();
                    tracing::info!(
                        job = status.job.as_str(),
                        running = status.running,
                        runs = status.runs,
                        skipped = status.skipped,
                        failures = status.failures,
                        last_devices = last.map(|r| r.devices).unwrap_or(0),
                        last_session_failures = last.map(|r| r.session_failures).unwrap_or(0),
                        uptime_s = tracker.uptime().as_secs(),
                        "job status"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn test_run_guard_is_exclusive_per_job() {
        let tracker = JobTracker::new();
        let guard = tracker.try_begin(JobKind::PowerScan).unwrap();
        assert!(tracker.is_running(JobKind::PowerScan));
        assert!(tracker.try_begin(JobKind::PowerScan).is_none());
        assert!(tracker.try_begin(JobKind::Backup).is_some());

        drop(guard);
        assert!(!tracker.is_running(JobKind::PowerScan));
        assert!(tracker.try_begin(JobKind::PowerScan).is_some());
    }

    #[test]
    fn test_counters() {
        let tracker = JobTracker::new();
        tracker.record_skip(JobKind::HealthScan);
        tracker.record_failure(JobKind::HealthScan);
        let report = JobReport {
            job: JobKind::HealthScan,
            devices: 3,
            succeeded: 2,
            empty: 0,
            session_failures: 1,
            write_failures: 0,
            rows_written: 2,
            started_at: OffsetDateTime::UNIX_EPOCH,
            finished_at: OffsetDateTime::UNIX_EPOCH,
        };
        tracker.record_report(report.clone());

        let status = tracker.status(JobKind::HealthScan);
        assert_eq!(status.runs, 2);
        assert_eq!(status.skipped, 1);
        assert_eq!(status.failures, 1);
        assert_eq!(status.last_report, Some(report));
        assert_eq!(tracker.status(JobKind::PortScan).runs, 0);
    }
}
