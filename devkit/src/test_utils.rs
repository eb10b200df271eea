/*!
Test harness for poller scenarios.

Wires a `ScanContext` around the mock session client, a static roster,
an in-memory store (optionally failing for chosen hosts) and a scratch
backup directory.
*/

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

use oltwatch_kernel::dispatch::Dispatcher;
use oltwatch_kernel::inventory::{DialectRules, InventoryError, InventoryResolver, InventorySource, StaticInventory};
use oltwatch_kernel::jobs::{job_for, run_job, JobKind, JobReport, ScanContext};
use oltwatch_kernel::config::Commands;
use oltwatch_kernel::models::{
    BackupRecord, Credentials, Device, OltHealth, OntDescription, PortProtectionRecord, PowerReading,
};
use oltwatch_kernel::store::{MemoryStore, Snapshot, StoreError, TelemetryStore};

use crate::session_stub::MockSessionClient;

pub fn device(name: &str, site: &str, host: &str) -> Device {
    Device { name: name.into(), site: site.into(), host: host.into(), vendor: String::new() }
}

/// In-memory store whose writes fail for selected hosts.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_host(&self, host: &str) {
        self.failing.lock().insert(host.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    fn check(&self, host: &str) -> Result<(), StoreError> {
        if self.failing.lock().contains(host) {
            log::info!("[MOCK] store write refused for {}", host);
            return Err(StoreError::Unavailable(format!("writes disabled for {host}")));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for FlakyStore {
    async fn replace_power(&self, host: &str, records: Vec<PowerReading>) -> Result<(), StoreError> {
        self.check(host)?;
        self.inner.replace_power(host, records).await
    }

    async fn replace_descriptions(&self, host: &str, records: Vec<OntDescription>) -> Result<(), StoreError> {
        self.check(host)?;
        self.inner.replace_descriptions(host, records).await
    }

    async fn replace_port_protection(
        &self,
        host: &str,
        records: Vec<PortProtectionRecord>,
    ) -> Result<(), StoreError> {
        self.check(host)?;
        self.inner.replace_port_protection(host, records).await
    }

    async fn upsert_health(&self, record: OltHealth) -> Result<(), StoreError> {
        self.check(&record.host)?;
        self.inner.upsert_health(record).await
    }

    async fn append_backup(&self, record: BackupRecord) -> Result<(), StoreError> {
        self.check(&record.host)?;
        self.inner.append_backup(record).await
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        self.inner.snapshot().await
    }
}

/// Inventory endpoint that is always down.
pub struct UnreachableInventory;

#[async_trait]
impl InventorySource for UnreachableInventory {
    async fn fetch(&self) -> Result<Vec<Device>, InventoryError> {
        Err(InventoryError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "inventory offline",
        )))
    }
}

/// Ready-wired environment for scan job tests.
pub struct TestHarness {
    pub client: MockSessionClient,
    pub store: FlakyStore,
    pub devices: Vec<Device>,
    pub rules: DialectRules,
    pub max_sessions: usize,
    backup_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        env_logger::try_init().ok();
        Ok(Self {
            client: MockSessionClient::new(),
            store: FlakyStore::new(),
            devices: Vec::new(),
            rules: DialectRules::default(),
            max_sessions: 4,
            backup_dir: tempfile::tempdir()?,
        })
    }

    pub fn with_device(mut self, name: &str, site: &str, host: &str) -> Self {
        self.devices.push(device(name, site, host));
        self
    }

    pub fn with_max_sessions(mut self, n: usize) -> Self {
        self.max_sessions = n;
        self
    }

    pub fn backup_dir(&self) -> &std::path::Path {
        self.backup_dir.path()
    }

    pub fn context(&self) -> ScanContext {
        self.context_with(Arc::new(StaticInventory::new(self.devices.clone())))
    }

    pub fn context_with(&self, source: Arc<dyn InventorySource>) -> ScanContext {
        ScanContext {
            inventory: InventoryResolver::new(source, self.rules.clone()),
            dispatcher: Dispatcher::new(
                Arc::new(self.client.clone()),
                Credentials { username: "isadmin".into(), password: "test".into() },
                self.max_sessions,
            ),
            store: Arc::new(self.store.clone()),
            backup_dir: self.backup_dir.path().to_path_buf(),
            commands: Commands::default(),
            weak_threshold: -24.0,
        }
    }

    pub async fn run(&self, kind: JobKind) -> Result<JobReport> {
        let ctx = self.context();
        let report = run_job(job_for(kind).as_ref(), &ctx).await?;
        log::info!(
            "{} finished: {} devices, {} session failures, {} write failures",
            kind,
            report.devices,
            report.session_failures,
            report.write_failures
        );
        Ok(report)
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.store.snapshot().await?)
    }
}
