//! Scan jobs: resolve inventory, dispatch, extract, persist.
//!
//! A run is aborted only when the inventory cannot be resolved. Session
//! failures and per-host write failures are counted in the `JobReport`
//! and the run moves on to the next outcome.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backup::{write_backup, BackupError};
use crate::config::{Commands, PollerConfig};
use crate::dispatch::Dispatcher;
use crate::extract::{
    clean_backup_output, extract_all_desc, extract_all_ont_power, extract_health,
    extract_port_protection, filter_down,
};
use crate::inventory::{HttpInventory, InventoryError, InventoryResolver};
use crate::models::{
    Device, Dialect, OltHealth, OntDescription, Outcome, PortProtectionRecord, PowerReading,
    Roster, SessionOutput,
};
use crate::session::{SessionError, SshProcessClient};
use crate::store::{StoreError, TelemetryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    PowerScan,
    DescriptionScan,
    HealthScan,
    PortScan,
    Backup,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::PowerScan,
        JobKind::DescriptionScan,
        JobKind::HealthScan,
        JobKind::PortScan,
        JobKind::Backup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::PowerScan => "power-scan",
            JobKind::DescriptionScan => "desc-scan",
            JobKind::HealthScan => "health-scan",
            JobKind::PortScan => "port-scan",
            JobKind::Backup => "backup",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "power-scan" | "power" => Ok(JobKind::PowerScan),
            "desc-scan" | "description-scan" | "description" => Ok(JobKind::DescriptionScan),
            "health-scan" | "health" => Ok(JobKind::HealthScan),
            "port-scan" | "port" => Ok(JobKind::PortScan),
            "backup" => Ok(JobKind::Backup),
            other => Err(JobError::UnknownJob(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("inventory resolution failed: {0}")]
    Inventory(#[from] InventoryError),
    #[error("session client setup failed: {0}")]
    Session(#[from] SessionError),
    #[error("unknown job '{0}'")]
    UnknownJob(String),
}

/// Failure while persisting one host's extraction.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// What a job stored for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Rows(usize),
    /// Nothing extracted, previous rows left in place.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: JobKind,
    /// Outcomes received from the dispatcher.
    pub devices: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub session_failures: usize,
    pub write_failures: usize,
    pub rows_written: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl JobReport {
    fn new(job: JobKind, started_at: OffsetDateTime) -> Self {
        Self {
            job,
            devices: 0,
            succeeded: 0,
            empty: 0,
            session_failures: 0,
            write_failures: 0,
            rows_written: 0,
            started_at,
            finished_at: started_at,
        }
    }
}

/// Collaborators shared by every job, built once at startup.
pub struct ScanContext {
    pub inventory: InventoryResolver,
    pub dispatcher: Dispatcher,
    pub store: Arc<dyn TelemetryStore>,
    pub backup_dir: PathBuf,
    pub commands: Commands,
    pub weak_threshold: f64,
}

impl ScanContext {
    /// Production wiring: HTTP inventory and OpenSSH sessions.
    pub fn from_config(cfg: &PollerConfig, store: Arc<dyn TelemetryStore>) -> Result<Self, JobError> {
        let source = HttpInventory::new(cfg.inventory_url.clone(), cfg.inventory_timeout)?;
        let client = SshProcessClient::new(&cfg.ssh_command, cfg.session_timeout)?;
        Ok(Self {
            inventory: InventoryResolver::new(Arc::new(source), cfg.secondary_dialect.clone()),
            dispatcher: Dispatcher::new(Arc::new(client), cfg.credentials(), cfg.max_sessions),
            store,
            backup_dir: cfg.backup_dir.clone(),
            commands: cfg.commands.clone(),
            weak_threshold: cfg.weak_threshold,
        })
    }
}

#[async_trait]
pub trait ScanJob: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Starts sessions for the dialect group(s) this job targets.
    fn dispatch(&self, ctx: &ScanContext, roster: Roster) -> mpsc::Receiver<Outcome>;

    async fn persist(
        &self,
        ctx: &ScanContext,
        device: &Device,
        output: &SessionOutput,
        now: OffsetDateTime,
    ) -> Result<Persisted, WriteError>;
}

pub fn job_for(kind: JobKind) -> Arc<dyn ScanJob> {
    match kind {
        JobKind::PowerScan => Arc::new(PowerScan),
        JobKind::DescriptionScan => Arc::new(DescriptionScan),
        JobKind::HealthScan => Arc::new(HealthScan),
        JobKind::PortScan => Arc::new(PortScan),
        JobKind::Backup => Arc::new(Backup),
    }
}

/// One complete run of `job`.
pub async fn run_job(job: &dyn ScanJob, ctx: &ScanContext) -> Result<JobReport, JobError> {
    let kind = job.kind();
    let mut report = JobReport::new(kind, OffsetDateTime::now_utc());
    info!(job = kind.as_str(), "starting");

    let roster = match ctx.inventory.resolve().await {
        Ok(roster) => roster,
        Err(e) => {
            error!(job = kind.as_str(), error = %e, "inventory unavailable, run aborted");
            return Err(e.into());
        }
    };
    debug!(
        job = kind.as_str(),
        primary = roster.primary.len(),
        secondary = roster.secondary.len(),
        "inventory resolved"
    );

    let mut outcomes = job.dispatch(ctx, roster);
    while let Some(Outcome { device, dialect, result }) = outcomes.recv().await {
        report.devices += 1;
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                report.session_failures += 1;
                warn!(
                    job = kind.as_str(),
                    host = %device.host,
                    device = %device.name,
                    dialect = dialect.as_str(),
                    error = %e,
                    "session failed"
                );
                continue;
            }
        };

        match job.persist(ctx, &device, &output, OffsetDateTime::now_utc()).await {
            Ok(Persisted::Rows(n)) => {
                report.succeeded += 1;
                report.rows_written += n;
                debug!(job = kind.as_str(), host = %device.host, rows = n, "stored");
            }
            Ok(Persisted::Empty) => {
                report.succeeded += 1;
                report.empty += 1;
                debug!(job = kind.as_str(), host = %device.host, "nothing extracted");
            }
            Err(e) => {
                report.write_failures += 1;
                warn!(job = kind.as_str(), host = %device.host, error = %e, "write failed");
            }
        }
    }

    report.finished_at = OffsetDateTime::now_utc();
    info!(
        job = kind.as_str(),
        devices = report.devices,
        succeeded = report.succeeded,
        session_failures = report.session_failures,
        write_failures = report.write_failures,
        rows = report.rows_written,
        "done"
    );
    Ok(report)
}

fn primary_only(ctx: &ScanContext, roster: Roster, command: &str) -> mpsc::Receiver<Outcome> {
    ctx.dispatcher
        .dispatch(Dialect::Nokia, roster.primary, &[command.to_string()])
}

pub struct PowerScan;

#[async_trait]
impl ScanJob for PowerScan {
    fn kind(&self) -> JobKind {
        JobKind::PowerScan
    }

    fn dispatch(&self, ctx: &ScanContext, roster: Roster) -> mpsc::Receiver<Outcome> {
        primary_only(ctx, roster, &ctx.commands.power)
    }

    async fn persist(
        &self,
        ctx: &ScanContext,
        device: &Device,
        output: &SessionOutput,
        now: OffsetDateTime,
    ) -> Result<Persisted, WriteError> {
        let readings = extract_all_ont_power(&output.text);
        if readings.is_empty() {
            return Ok(Persisted::Empty);
        }
        let weak = readings.iter().filter(|r| r.olt_rx < ctx.weak_threshold).count();
        let records: Vec<PowerReading> = readings
            .into_iter()
            .map(|p| PowerReading {
                device: device.name.clone(),
                site: device.site.clone(),
                host: device.host.clone(),
                ont_idx: p.ont_idx,
                olt_rx: p.olt_rx,
                measured_at: now,
            })
            .collect();
        let n = records.len();
        ctx.store.replace_power(&device.host, records).await?;
        if weak > 0 {
            info!(host = %device.host, weak, threshold = ctx.weak_threshold, "weak ONTs");
        }
        Ok(Persisted::Rows(n))
    }
}

pub struct DescriptionScan;

#[async_trait]
impl ScanJob for DescriptionScan {
    fn kind(&self) -> JobKind {
        JobKind::DescriptionScan
    }

    fn dispatch(&self, ctx: &ScanContext, roster: Roster) -> mpsc::Receiver<Outcome> {
        primary_only(ctx, roster, &ctx.commands.description)
    }

    async fn persist(
        &self,
        ctx: &ScanContext,
        device: &Device,
        output: &SessionOutput,
        now: OffsetDateTime,
    ) -> Result<Persisted, WriteError> {
        let descs = extract_all_desc(&output.text);
        if descs.is_empty() {
            return Ok(Persisted::Empty);
        }
        let records: Vec<OntDescription> = descs
            .into_iter()
            .map(|d| OntDescription {
                device: device.name.clone(),
                site: device.site.clone(),
                host: device.host.clone(),
                ont_idx: d.ont_idx,
                desc1: d.desc1,
                desc2: d.desc2,
                measured_at: now,
            })
            .collect();
        let n = records.len();
        ctx.store.replace_descriptions(&device.host, records).await?;
        Ok(Persisted::Rows(n))
    }
}

pub struct HealthScan;

#[async_trait]
impl ScanJob for HealthScan {
    fn kind(&self) -> JobKind {
        JobKind::HealthScan
    }

    fn dispatch(&self, ctx: &ScanContext, roster: Roster) -> mpsc::Receiver<Outcome> {
        ctx.dispatcher
            .dispatch(Dialect::Nokia, roster.primary, &ctx.commands.health)
    }

    async fn persist(
        &self,
        ctx: &ScanContext,
        device: &Device,
        output: &SessionOutput,
        now: OffsetDateTime,
    ) -> Result<Persisted, WriteError> {
        // a reachable host always gets a row, even when nothing parsed
        let health = extract_health(&output.text);
        ctx.store
            .upsert_health(OltHealth {
                device: device.name.clone(),
                site: device.site.clone(),
                host: device.host.clone(),
                uptime: health.uptime,
                cpu_loads: health.cpu_loads,
                temperatures: health.temperatures,
                measured_at: now,
            })
            .await?;
        Ok(Persisted::Rows(1))
    }
}

/// Keeps only protection pairs with a down side. The host's previous rows
/// are cleared on every successful session, even when none remain.
pub struct PortScan;

#[async_trait]
impl ScanJob for PortScan {
    fn kind(&self) -> JobKind {
        JobKind::PortScan
    }

    fn dispatch(&self, ctx: &ScanContext, roster: Roster) -> mpsc::Receiver<Outcome> {
        primary_only(ctx, roster, &ctx.commands.port)
    }

    async fn persist(
        &self,
        ctx: &ScanContext,
        device: &Device,
        output: &SessionOutput,
        now: OffsetDateTime,
    ) -> Result<Persisted, WriteError> {
        let records: Vec<PortProtectionRecord> = filter_down(extract_port_protection(&output.text))
            .into_iter()
            .map(|p| PortProtectionRecord {
                device: device.name.clone(),
                site: device.site.clone(),
                host: device.host.clone(),
                port: p.port,
                port_state: p.port_state,
                paired_state: p.paired_state,
                swo_reason: p.swo_reason,
                num_swo: p.num_swo,
                measured_at: now,
            })
            .collect();
        let n = records.len();
        ctx.store.replace_port_protection(&device.host, records).await?;
        Ok(Persisted::Rows(n))
    }
}

/// Both dialect groups, each with its own configuration dump command.
pub struct Backup;

#[async_trait]
impl ScanJob for Backup {
    fn kind(&self) -> JobKind {
        JobKind::Backup
    }

    fn dispatch(&self, ctx: &ScanContext, roster: Roster) -> mpsc::Receiver<Outcome> {
        ctx.dispatcher.dispatch_all(
            roster,
            &[ctx.commands.backup_primary.clone()],
            &[ctx.commands.backup_secondary.clone()],
        )
    }

    async fn persist(
        &self,
        ctx: &ScanContext,
        device: &Device,
        output: &SessionOutput,
        now: OffsetDateTime,
    ) -> Result<Persisted, WriteError> {
        let cleaned = clean_backup_output(&output.text);
        if cleaned.is_empty() {
            return Ok(Persisted::Empty);
        }
        let record = write_backup(&ctx.backup_dir, device, &cleaned, now).await?;
        info!(host = %device.host, path = %record.file_path.display(), "backup saved");
        ctx.store.append_backup(record).await?;
        Ok(Persisted::Rows(1))
    }
}
