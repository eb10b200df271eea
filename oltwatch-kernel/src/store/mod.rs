//! Persistence boundary for telemetry snapshots.
//!
//! Refresh policies per table:
//! - power, descriptions, port protection: replace every row of a host
//! - health: upsert the single row of a host
//! - backups: append
//!
//! Replacing a host's rows is a single step under the store lock, so a
//! reader sees either the previous set or the new one, never an empty gap.

pub mod json;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{BackupRecord, OltHealth, OntDescription, PortProtectionRecord, PowerReading};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("record for host {found} passed to replace for host {expected}")]
    HostMismatch { expected: String, found: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn replace_power(&self, host: &str, records: Vec<PowerReading>) -> Result<(), StoreError>;

    async fn replace_descriptions(
        &self,
        host: &str,
        records: Vec<OntDescription>,
    ) -> Result<(), StoreError>;

    async fn replace_port_protection(
        &self,
        host: &str,
        records: Vec<PortProtectionRecord>,
    ) -> Result<(), StoreError>;

    async fn upsert_health(&self, record: OltHealth) -> Result<(), StoreError>;

    async fn append_backup(&self, record: BackupRecord) -> Result<(), StoreError>;

    /// All tables, each ordered by (host, key).
    async fn snapshot(&self) -> Result<Snapshot, StoreError>;
}

/// Every table of the store. Also the on-disk document of `JsonFileStore`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub power: Vec<PowerReading>,
    #[serde(default)]
    pub descriptions: Vec<OntDescription>,
    #[serde(default)]
    pub health: Vec<OltHealth>,
    #[serde(default)]
    pub port_protection: Vec<PortProtectionRecord>,
    #[serde(default)]
    pub backups: Vec<BackupRecord>,
}

impl Snapshot {
    pub(crate) fn replace_power(&mut self, host: &str, records: Vec<PowerReading>) -> Result<(), StoreError> {
        check_hosts(host, records.iter().map(|r| r.host.as_str()))?;
        self.power.retain(|r| r.host != host);
        self.power.extend(records);
        self.power
            .sort_by(|a, b| (&a.host, &a.ont_idx).cmp(&(&b.host, &b.ont_idx)));
        Ok(())
    }

    pub(crate) fn replace_descriptions(
        &mut self,
        host: &str,
        records: Vec<OntDescription>,
    ) -> Result<(), StoreError> {
        check_hosts(host, records.iter().map(|r| r.host.as_str()))?;
        self.descriptions.retain(|r| r.host != host);
        self.descriptions.extend(records);
        self.descriptions
            .sort_by(|a, b| (&a.host, &a.ont_idx).cmp(&(&b.host, &b.ont_idx)));
        Ok(())
    }

    pub(crate) fn replace_port_protection(
        &mut self,
        host: &str,
        records: Vec<PortProtectionRecord>,
    ) -> Result<(), StoreError> {
        check_hosts(host, records.iter().map(|r| r.host.as_str()))?;
        self.port_protection.retain(|r| r.host != host);
        self.port_protection.extend(records);
        self.port_protection
            .sort_by(|a, b| (&a.host, &a.port).cmp(&(&b.host, &b.port)));
        Ok(())
    }

    pub(crate) fn upsert_health(&mut self, record: OltHealth) {
        match self.health.iter_mut().find(|h| h.host == record.host) {
            Some(existing) => *existing = record,
            None => {
                self.health.push(record);
                self.health.sort_by(|a, b| a.host.cmp(&b.host));
            }
        }
    }

    pub(crate) fn append_backup(&mut self, record: BackupRecord) {
        self.backups.push(record);
    }
}

fn check_hosts<'a>(expected: &str, hosts: impl Iterator<Item = &'a str>) -> Result<(), StoreError> {
    for found in hosts {
        if found != expected {
            return Err(StoreError::HostMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}
