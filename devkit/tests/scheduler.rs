use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oltwatch_devkit::TestHarness;
use oltwatch_kernel::jobs::{JobKind, Persisted, ScanContext, ScanJob, WriteError};
use oltwatch_kernel::models::{Device, Outcome, Roster, SessionOutput};
use oltwatch_kernel::scheduler::{trigger, Scheduler};
use oltwatch_kernel::tracker::JobTracker;
use time::OffsetDateTime;
use tokio::sync::mpsc;

const HOUR: Duration = Duration::from_secs(3600);
const MINUTE: Duration = Duration::from_secs(60);

/// Job whose dispatch stays open for `run_for` and yields no outcome.
struct SlowJob {
    kind: JobKind,
    run_for: Duration,
    started: Arc<AtomicUsize>,
}

impl SlowJob {
    fn new(kind: JobKind, run_for: Duration) -> Self {
        Self { kind, run_for, started: Arc::new(AtomicUsize::new(0)) }
    }
}

#[async_trait]
impl ScanJob for SlowJob {
    fn kind(&self) -> JobKind {
        self.kind
    }

    fn dispatch(&self, _ctx: &ScanContext, _roster: Roster) -> mpsc::Receiver<Outcome> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(1);
        let run_for = self.run_for;
        tokio::spawn(async move {
            tokio::time::sleep(run_for).await;
            drop(tx);
        });
        rx
    }

    async fn persist(
        &self,
        _ctx: &ScanContext,
        _device: &Device,
        _output: &SessionOutput,
        _now: OffsetDateTime,
    ) -> Result<Persisted, WriteError> {
        Ok(Persisted::Empty)
    }
}

#[tokio::test(start_paused = true)]
async fn test_overrunning_job_skips_firings_without_affecting_others() {
    let harness = TestHarness::new().unwrap();
    let ctx = Arc::new(harness.context());
    let tracker = JobTracker::new();

    let slow = Arc::new(SlowJob::new(JobKind::PowerScan, 90 * MINUTE));
    let quick = Arc::new(SlowJob::new(JobKind::HealthScan, 5 * MINUTE));
    let slow_started = slow.started.clone();
    let quick_started = quick.started.clone();

    let mut scheduler = Scheduler::new(ctx, tracker.clone());
    scheduler.add(slow, HOUR);
    scheduler.add(quick, HOUR);
    scheduler.start();

    // ticks at 1h, 2h, 3h and 4h
    tokio::time::sleep(4 * HOUR + 20 * MINUTE).await;

    let power = tracker.status(JobKind::PowerScan);
    assert_eq!(slow_started.load(Ordering::SeqCst), 2, "runs started at 1h and 3h");
    assert_eq!(power.skipped, 2, "firings at 2h and 4h dropped");
    assert_eq!(power.runs, 1);
    assert!(power.running);

    let health = tracker.status(JobKind::HealthScan);
    assert_eq!(quick_started.load(Ordering::SeqCst), 4);
    assert_eq!(health.skipped, 0);
    assert_eq!(health.runs, 4);
    assert!(!health.running);

    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_run_on_start_fires_immediately() {
    let harness = TestHarness::new().unwrap();
    let tracker = JobTracker::new();
    let job = Arc::new(SlowJob::new(JobKind::PortScan, MINUTE));
    let started = job.started.clone();

    let mut scheduler = Scheduler::new(Arc::new(harness.context()), tracker.clone()).run_on_start(true);
    scheduler.add(job, 2 * HOUR);
    scheduler.start();

    tokio::time::sleep(2 * MINUTE).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.status(JobKind::PortScan).runs, 1);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_timers() {
    let harness = TestHarness::new().unwrap();
    let tracker = JobTracker::new();
    let job = Arc::new(SlowJob::new(JobKind::Backup, MINUTE));
    let started = job.started.clone();

    let mut scheduler = Scheduler::new(Arc::new(harness.context()), tracker.clone());
    scheduler.add(job, HOUR);
    scheduler.start();
    scheduler.shutdown();

    tokio::time::sleep(3 * HOUR).await;
    assert_eq!(started.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_respects_running_guard() {
    let harness = TestHarness::new().unwrap();
    let ctx = Arc::new(harness.context());
    let tracker = JobTracker::new();
    let job: Arc<dyn ScanJob> = Arc::new(SlowJob::new(JobKind::DescriptionScan, 10 * MINUTE));

    let first = trigger(ctx.clone(), &tracker, job.clone()).expect("first run starts");
    tokio::task::yield_now().await;
    assert!(trigger(ctx.clone(), &tracker, job.clone()).is_none());

    first.await.unwrap();
    assert_eq!(tracker.status(JobKind::DescriptionScan).skipped, 1);
    assert!(trigger(ctx, &tracker, job).is_some());
}
