//! Telemetry persisted as a single pretty-printed JSON document.
//!
//! Each mutation is applied to a copy of the tables, flushed through a
//! temporary file + rename, and only then swapped into memory. A failed
//! flush leaves both the file and the in-memory tables untouched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use super::{Snapshot, StoreError, TelemetryStore};
use crate::models::{BackupRecord, OltHealth, OntDescription, PortProtectionRecord, PowerReading};

pub struct JsonFileStore {
    tables: RwLock<Snapshot>,
    data_file: PathBuf,
}

impl JsonFileStore {
    /// Loads `data_file` if present, otherwise starts with empty tables.
    pub async fn open(data_file: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_file = data_file.as_ref().to_path_buf();
        let tables = if fs::try_exists(&data_file).await? {
            let content = fs::read_to_string(&data_file).await?;
            if content.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            tracing::info!(path = %data_file.display(), "no telemetry file yet, starting fresh");
            Snapshot::default()
        };

        tracing::info!(
            path = %data_file.display(),
            power = tables.power.len(),
            descriptions = tables.descriptions.len(),
            health = tables.health.len(),
            port_protection = tables.port_protection.len(),
            backups = tables.backups.len(),
            "telemetry store opened"
        );

        Ok(Self { tables: RwLock::new(tables), data_file })
    }

    pub fn path(&self) -> &Path {
        &self.data_file
    }

    async fn mutate<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Snapshot) -> Result<(), StoreError> + Send,
    {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        apply(&mut next)?;
        self.persist(&next).await?;
        *tables = next;
        Ok(())
    }

    async fn persist(&self, tables: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.data_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(tables)?;
        let tmp = self.data_file.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.data_file).await?;
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for JsonFileStore {
    async fn replace_power(&self, host: &str, records: Vec<PowerReading>) -> Result<(), StoreError> {
        self.mutate(|t| t.replace_power(host, records)).await
    }

    async fn replace_descriptions(
        &self,
        host: &str,
        records: Vec<OntDescription>,
    ) -> Result<(), StoreError> {
        self.mutate(|t| t.replace_descriptions(host, records)).await
    }

    async fn replace_port_protection(
        &self,
        host: &str,
        records: Vec<PortProtectionRecord>,
    ) -> Result<(), StoreError> {
        self.mutate(|t| t.replace_port_protection(host, records)).await
    }

    async fn upsert_health(&self, record: OltHealth) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.upsert_health(record);
            Ok(())
        })
        .await
    }

    async fn append_backup(&self, record: BackupRecord) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.append_backup(record);
            Ok(())
        })
        .await
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.tables.read().await.clone())
    }
}
