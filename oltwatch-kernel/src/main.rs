/**
 * OLTWATCH KERNEL - Entry point
 *
 * USAGE:
 *   oltwatch-kernel                 run the scheduler until Ctrl-C
 *   oltwatch-kernel run-once <job>  run a single job and print its report
 *   oltwatch-kernel report [dir]    export weak ONTs and summaries as JSON and xlsx
 */

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use oltwatch_kernel::config::{load_config, PollerConfig};
use oltwatch_kernel::jobs::{job_for, run_job, JobKind, ScanContext};
use oltwatch_kernel::report;
use oltwatch_kernel::scheduler::Scheduler;
use oltwatch_kernel::store::{JsonFileStore, TelemetryStore};
use oltwatch_kernel::tracker::JobTracker;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oltwatch_kernel=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("run-once") => {
            let job = args.get(1).context("usage: oltwatch-kernel run-once <job>")?;
            run_once(job.parse()?).await
        }
        Some("report") => {
            let dir = args.get(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("json"));
            export_reports(dir).await
        }
        Some(other) => bail!("unknown command '{other}' (expected serve, run-once or report)"),
    }
}

async fn open_store(cfg: &PollerConfig) -> Result<Arc<JsonFileStore>> {
    let store = JsonFileStore::open(&cfg.data_file)
        .await
        .with_context(|| format!("failed to open telemetry store {}", cfg.data_file.display()))?;
    Ok(Arc::new(store))
}

async fn serve() -> Result<()> {
    let cfg = load_config().await.context("failed to load configuration")?;
    info!(
        inventory = %cfg.inventory_url,
        max_sessions = cfg.max_sessions,
        session_timeout = %humantime::format_duration(cfg.session_timeout),
        "OLTWatch kernel starting"
    );

    let store: Arc<dyn TelemetryStore> = open_store(&cfg).await?;
    let ctx = Arc::new(ScanContext::from_config(&cfg, store).context("failed to build scan context")?);
    let tracker = JobTracker::new();
    let status_logger = tracker.spawn_status_logger(cfg.status_log_interval);

    let mut scheduler = Scheduler::from_config(ctx, tracker, &cfg);
    scheduler.start();

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    scheduler.shutdown();
    status_logger.abort();
    Ok(())
}

async fn run_once(kind: JobKind) -> Result<()> {
    let cfg = load_config().await.context("failed to load configuration")?;
    let store: Arc<dyn TelemetryStore> = open_store(&cfg).await?;
    let ctx = ScanContext::from_config(&cfg, store).context("failed to build scan context")?;

    let report = run_job(job_for(kind).as_ref(), &ctx).await?;
    if report.session_failures > 0 || report.write_failures > 0 {
        warn!(
            job = kind.as_str(),
            session_failures = report.session_failures,
            write_failures = report.write_failures,
            "run finished with failures"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn export_reports(dir: PathBuf) -> Result<()> {
    let cfg = oltwatch_kernel::config::load_file(
        std::env::var("OLTWATCH_CONFIG").unwrap_or_else(|_| "oltwatch.yaml".into()),
    )
    .await?;
    let store = open_store(&cfg).await?;
    let snapshot = store.snapshot().await?;
    let threshold = cfg.weak_threshold;

    let weak = report::weak_with_descriptions(&snapshot, threshold);
    let summary = report::power_summary(&snapshot, threshold);
    let mut written = vec![
        report::save_json(&dir, "weak_onts", &weak).await?,
        report::save_json(&dir, "power_summary", &summary).await?,
        report::save_json(&dir, "devices", &report::devices(&snapshot)).await?,
        report::save_json(&dir, "down_ports", &report::down_ports(&snapshot)).await?,
        report::save_json(&dir, "health", &snapshot.health).await?,
        report::save_json(&dir, "backups", &report::backups_by_site(&snapshot)).await?,
    ];
    if !weak.is_empty() {
        written.push(report::save_xlsx(&dir, "weak_onts", &weak).await?);
    }
    if !summary.is_empty() {
        written.push(report::save_xlsx(&dir, "power_summary", &summary).await?);
    }
    for path in written {
        info!(path = %path.display(), "report written");
    }
    Ok(())
}
