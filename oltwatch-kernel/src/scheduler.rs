//! Fixed-interval timers, one per job.
//!
//! Every job runs in its own spawned task so a slow job never delays the
//! timers of the others. A firing that finds the same job still running is
//! dropped and counted as skipped; the next attempt is the following tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{self, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::PollerConfig;
use crate::jobs::{job_for, run_job, JobKind, ScanContext, ScanJob};
use crate::tracker::JobTracker;

pub struct Scheduler {
    ctx: Arc<ScanContext>,
    tracker: JobTracker,
    run_on_start: bool,
    jobs: Vec<(Arc<dyn ScanJob>, Duration)>,
    timers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(ctx: Arc<ScanContext>, tracker: JobTracker) -> Self {
        Self { ctx, tracker, run_on_start: false, jobs: Vec::new(), timers: Vec::new() }
    }

    /// The five scan jobs at their configured intervals.
    pub fn from_config(ctx: Arc<ScanContext>, tracker: JobTracker, cfg: &PollerConfig) -> Self {
        let mut scheduler = Self::new(ctx, tracker).run_on_start(cfg.run_on_start);
        let every = &cfg.intervals;
        scheduler.add(job_for(JobKind::PowerScan), every.power);
        scheduler.add(job_for(JobKind::DescriptionScan), every.description);
        scheduler.add(job_for(JobKind::HealthScan), every.health);
        scheduler.add(job_for(JobKind::PortScan), every.port);
        scheduler.add(job_for(JobKind::Backup), every.backup);
        scheduler
    }

    pub fn run_on_start(mut self, enabled: bool) -> Self {
        self.run_on_start = enabled;
        self
    }

    pub fn add(&mut self, job: Arc<dyn ScanJob>, every: Duration) {
        self.jobs.push((job, every));
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn start(&mut self) {
        for (job, every) in &self.jobs {
            let kind = job.kind();
            if every.is_zero() {
                warn!(job = kind.as_str(), "zero interval, job not scheduled");
                continue;
            }
            info!(job = kind.as_str(), every = %humantime::format_duration(*every), "scheduled");

            let first = if self.run_on_start { Instant::now() } else { Instant::now() + *every };
            let (job, every) = (job.clone(), *every);
            let ctx = self.ctx.clone();
            let tracker = self.tracker.clone();
            self.timers.push(task::spawn(async move {
                let mut interval = tokio::time::interval_at(first, every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    trigger(ctx.clone(), &tracker, job.clone());
                }
            }));
        }
        info!(jobs = self.timers.len(), "scheduler started");
    }

    /// Stops the timers. Runs already in flight finish on their own.
    pub fn shutdown(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for timer in &self.timers {
            timer.abort();
        }
    }
}

/// Starts one run of `job` unless it is already running.
pub fn trigger(
    ctx: Arc<ScanContext>,
    tracker: &JobTracker,
    job: Arc<dyn ScanJob>,
) -> Option<JoinHandle<()>> {
    let kind = job.kind();
    let Some(guard) = tracker.try_begin(kind) else {
        tracker.record_skip(kind);
        info!(job = kind.as_str(), "previous run still active, firing skipped");
        return None;
    };

    let tracker = tracker.clone();
    Some(task::spawn(async move {
        let _guard = guard;
        match run_job(job.as_ref(), &ctx).await {
            Ok(report) => tracker.record_report(report),
            Err(_) => tracker.record_failure(kind),
        }
    }))
}
